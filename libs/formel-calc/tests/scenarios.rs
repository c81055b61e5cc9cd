//! Formula Engine Scenario Tests
//!
//! End-to-end behavior through the public engine surface:
//! - Named-function evaluation scenarios
//! - Lowering round trip
//! - Submission validation of wire locations
//! - Batch execution

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use chrono::{DateTime, Duration, TimeZone, Utc};
use errors::ErrorCode;
use formel_calc::{
    lift, lower, Bindings, CalculationRequest, CalculationRunner, CalculationStatus,
    FormulaEngine, SubmissionStatus,
};
use formel_model::wire::WireFormulaLocation;
use formel_model::{
    CalculationFormula, ConstLiteral, DomainExpression, DomainFunction, EnergyDirection,
    FormulaVariable, MeterLocationId, MeterOperand, Operand, OutputSpec, Parameter, PercentValue,
    Period, Resolution, TimeSeries,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const MALO: &str = "57685676748";
const MELO: &str = "DE00014545768S0000000000000003054";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn quarter() -> Resolution {
    Resolution::minutes(15).unwrap()
}

fn period(intervals: i64) -> Period {
    Period::new(t0(), t0() + Duration::minutes(15 * intervals)).unwrap()
}

fn output() -> OutputSpec {
    OutputSpec::new("KWH", quarter())
}

fn inputs(series: &[(&str, &[f64])]) -> HashMap<String, TimeSeries> {
    series
        .iter()
        .map(|(name, values)| {
            (
                name.to_string(),
                TimeSeries::from_values(*name, "KWH", quarter(), t0(), values),
            )
        })
        .collect()
}

fn wire_location(slices: serde_json::Value) -> WireFormulaLocation {
    serde_json::from_value(json!({
        "maloId": MALO,
        "calculationFormulaTimeSlices": slices
    }))
    .unwrap()
}

// ============================================================================
// Evaluation scenarios
// ============================================================================

#[test]
fn test_division_by_zero_produces_no_series() {
    let engine = FormulaEngine::new();
    let formula = CalculationFormula::Div(vec![
        Operand::Variable(FormulaVariable::parse("a").unwrap()),
        Operand::Constant("0".parse::<ConstLiteral>().unwrap()),
    ]);
    for values in [&[1.0, 2.0, 3.0][..], &[0.0, 0.0, 0.0][..], &[-5.0, 7.5, 0.0][..]] {
        let err = engine
            .evaluate_formula(&formula, &inputs(&[("a", values)]), &period(3), &output())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DivisionByZero);
    }
}

#[test]
fn test_grouped_sum_scenario() {
    let engine = FormulaEngine::new();
    let expr = DomainExpression::grouped_sum([("lineA", 1.0), ("lineB", -1.0), ("lineC", -1.0)]);
    let data = inputs(&[
        ("lineA", &[10.0, 10.0, 10.0]),
        ("lineB", &[4.0, 4.0, 4.0]),
        ("lineC", &[1.0, 1.0, 1.0]),
    ]);
    let out = engine.evaluate_expression(&expr, &data, &period(3), &output()).unwrap();
    assert_eq!(out.quantities(), vec![5.0, 5.0, 5.0]);
    out.check_evaluable().unwrap();
}

#[test]
fn test_threshold_scenario() {
    let engine = FormulaEngine::new();
    let expr = DomainExpression::new(
        DomainFunction::PortionAboveThreshold,
        vec![Parameter::series("consumption"), Parameter::constant(1000.0)],
    );
    let data = inputs(&[("consumption", &[800.0, 1200.0, 1500.0])]);
    let out = engine.evaluate_expression(&expr, &data, &period(3), &output()).unwrap();
    assert_eq!(out.quantities(), vec![0.0, 200.0, 500.0]);
}

#[test]
fn test_cross_series_max_scenario() {
    let engine = FormulaEngine::new();
    let expr = DomainExpression::new(
        DomainFunction::CrossSeriesMax,
        vec![Parameter::series("series1"), Parameter::series("series2")],
    );
    let data = inputs(&[("series1", &[3.0, 7.0]), ("series2", &[5.0, 2.0])]);
    let out = engine.evaluate_expression(&expr, &data, &period(2), &output()).unwrap();
    assert_eq!(out.quantities(), vec![5.0, 7.0]);
}

#[test]
fn test_conditional_branch_with_nested_expression() {
    let engine = FormulaEngine::new();
    let net = DomainExpression::grouped_sum([("pv", 1.0), ("load", -1.0)]);
    let expr = DomainExpression::new(
        DomainFunction::ConditionalBranch,
        vec![
            Parameter::expression(net.clone()),
            Parameter::literal(">"),
            Parameter::constant(0.0),
            Parameter::expression(net),
            Parameter::constant(0.0),
        ],
    );
    let data = inputs(&[("pv", &[5.0, 2.0, 8.0]), ("load", &[3.0, 4.0, 8.0])]);
    let out = engine.evaluate_expression(&expr, &data, &period(3), &output()).unwrap();
    assert_eq!(out.quantities(), vec![2.0, 0.0, 0.0]);
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_lowered_expression_round_trips_numerically() {
    let engine = FormulaEngine::new();
    let data = inputs(&[
        ("lineA", &[10.0, -3.5, 0.25]),
        ("lineB", &[4.0, 1.0, 8.0]),
        ("lineC", &[0.0, 2.0, -1.0]),
    ]);
    let candidates = [
        DomainExpression::grouped_sum([("lineA", 1.0), ("lineB", -1.0), ("lineC", 0.5)]),
        DomainExpression::grouped_sum([("lineA", 2.5)]),
        DomainExpression::new(
            DomainFunction::GroupedSum,
            vec![Parameter::series("lineB"), Parameter::constant(3.0)],
        ),
    ];
    for expr in candidates {
        let lowered = lower(&expr, &Bindings::new()).unwrap();
        let lifted = lift(&lowered);
        let direct = engine.evaluate_expression(&expr, &data, &period(3), &output()).unwrap();
        let via_wire = engine.evaluate_formula(&lowered, &data, &period(3), &output()).unwrap();
        let via_lift = engine.evaluate_expression(&lifted, &data, &period(3), &output()).unwrap();
        assert_eq!(direct.quantities(), via_wire.quantities(), "{}", lowered);
        assert_eq!(direct.quantities(), via_lift.quantities(), "{}", lowered);
    }
}

// ============================================================================
// Submission
// ============================================================================

#[test]
fn test_operand_union_exclusivity() {
    let engine = FormulaEngine::new();
    let wire = wire_location(json!([{
        "timeSliceId": 1,
        "timeSliceQuality": "Gültige Daten",
        "periodOfUseFrom": "2024-01-01T00:00:00Z",
        "periodOfUseTo": "2025-01-01T00:00:00Z",
        "calculationFormula": {
            "add": [
                { "const": "1", "formulaVar": "a" },
                {}
            ]
        }
    }]));
    let validated = engine.submit_wire(&wire);
    assert_eq!(validated.result.status, SubmissionStatus::Rejected);
    assert!(validated.location.is_none());
    let union_errors: Vec<_> = validated
        .result
        .errors()
        .filter(|e| e.code == ErrorCode::InvalidOperandUnion)
        .collect();
    assert_eq!(union_errors.len(), 2);
}

#[test]
fn test_formula_union_exclusivity() {
    let engine = FormulaEngine::new();
    let wire = wire_location(json!([{
        "timeSliceId": 1,
        "timeSliceQuality": "Gültige Daten",
        "periodOfUseFrom": "2024-01-01T00:00:00Z",
        "periodOfUseTo": "2025-01-01T00:00:00Z",
        "calculationFormula": {
            "operand": { "const": "1" },
            "pos": { "const": "2" }
        }
    }]));
    let validated = engine.submit_wire(&wire);
    assert!(validated
        .result
        .error_codes()
        .contains(&ErrorCode::InvalidCalculationFormulaUnion));
}

#[test]
fn test_overlapping_slices_are_rejected() {
    let engine = FormulaEngine::new();
    let slice = |id: i64, from: &str, to: &str| {
        json!({
            "timeSliceId": id,
            "timeSliceQuality": "Gültige Daten",
            "periodOfUseFrom": from,
            "periodOfUseTo": to,
            "calculationFormula": { "operand": { "const": "1" } }
        })
    };
    let adjacent = wire_location(json!([
        slice(1, "2024-01-01T00:00:00Z", "2024-07-01T00:00:00Z"),
        slice(2, "2024-07-01T00:00:00Z", "2025-01-01T00:00:00Z"),
    ]));
    let accepted = engine.submit_wire(&adjacent);
    assert!(accepted.result.is_accepted());

    let location = accepted.location.unwrap();
    let periods: Vec<Period> = location.time_slices().iter().map(|s| s.validity()).collect();
    assert!(!periods[0].overlaps(&periods[1]));

    let overlapping = wire_location(json!([
        slice(1, "2024-01-01T00:00:00Z", "2024-07-01T00:00:00Z"),
        slice(2, "2024-06-30T23:45:00Z", "2025-01-01T00:00:00Z"),
    ]));
    let rejected = engine.submit_wire(&overlapping);
    assert_eq!(rejected.result.status, SubmissionStatus::Rejected);
    assert!(rejected
        .result
        .error_codes()
        .contains(&ErrorCode::OverlappingTimeSlice));
}

// ============================================================================
// Loss factors
// ============================================================================

#[test]
fn test_loss_factors_never_increase_contribution() {
    let engine = FormulaEngine::new();
    let raw = [0.0, 1.0, 250.0, 1e6];
    let data = inputs(&[(MELO, &raw)]);
    let factors = [0.0, 0.001, 0.25, 0.5, 1.0];

    for &transformer in &factors {
        for &conduction in &factors {
            for &distribution in &factors {
                let meter = MeterOperand {
                    meter_location_id: MeterLocationId::parse(MELO).unwrap(),
                    energy_direction: EnergyDirection::Consumption,
                    transformer_loss_factor: PercentValue::new(transformer).unwrap(),
                    conduction_loss_factor: PercentValue::new(conduction).unwrap(),
                    distribution_factor: PercentValue::new(distribution).unwrap(),
                };
                let formula = CalculationFormula::Operand(Operand::Meter(meter));
                let out = engine
                    .evaluate_formula(&formula, &data, &period(4), &output())
                    .unwrap();
                for (contribution, metered) in out.quantities().iter().zip(raw) {
                    assert!(*contribution <= metered, "{} > {}", contribution, metered);
                }
            }
        }
    }
}

// ============================================================================
// Batch execution
// ============================================================================

#[tokio::test]
async fn test_batch_runs_locations_independently() {
    let runner = CalculationRunner::new(Arc::new(FormulaEngine::new()));
    let request = |id: &str, formula: serde_json::Value| -> CalculationRequest {
        serde_json::from_value(json!({
            "calculationId": id,
            "formulaLocation": {
                "maloId": MALO,
                "calculationFormulaTimeSlices": [{
                    "timeSliceId": 1,
                    "timeSliceQuality": "Gültige Daten",
                    "periodOfUseFrom": "2024-01-01T00:00:00Z",
                    "periodOfUseTo": "2025-01-01T00:00:00Z",
                    "calculationFormula": formula
                }]
            },
            "inputs": inputs(&[("a", &[2.0, 4.0]), ("b", &[1.0, 1.0])]),
            "period": period(2),
            "output": output()
        }))
        .unwrap()
    };

    let results = runner
        .run_batch(vec![
            request("net", json!({ "sub": { "minuend": { "formulaVar": "a" }, "subtrahend": { "formulaVar": "b" } } })),
            request("missing", json!({ "add": [{ "formulaVar": "a" }, { "formulaVar": "c" }] })),
            request("invalid", json!({ "add": [] })),
        ])
        .await;

    let by_id: HashMap<&str, _> = results.iter().map(|r| (r.calculation_id.as_str(), r)).collect();
    assert_eq!(by_id["net"].status, CalculationStatus::Completed);
    assert_eq!(by_id["net"].output.as_ref().unwrap().quantities(), vec![1.0, 3.0]);
    assert_eq!(by_id["missing"].errors[0].code, ErrorCode::UnresolvedTimeSeriesReference);
    assert_eq!(by_id["invalid"].status, CalculationStatus::Failed);
    assert!(by_id["invalid"]
        .errors
        .iter()
        .any(|e| e.code == ErrorCode::EmptyOperandList));
}
