//! Validation Pipeline
//!
//! Turns a wire `FormulaLocation` into a typed [`FormulaLocation`] or a
//! complete defect report. The pipeline never stops at the first problem:
//! every union, identifier, percentage, timestamp and overlap defect is
//! reported with the path where it was found, and a location with any defect
//! is rejected as a whole.
//!
//! Paths follow the wire field names, e.g.
//! `timeSlice[0].calculationFormula.add[1].meloOperand.lossFactorTransformer`.

use errors::{ErrorCode, ErrorInfo, FormelErrorTrait};
use formel_model::location::overlapping_pairs;
use formel_model::wire::{
    WireCalculationFormula, WireFormulaLocation, WireMeloOperand, WireOperand, WirePercent,
    WireTimeSlice,
};
use formel_model::{
    parse_timestamp, CalculationFormula, CalculationFormulaTimeSlice, ConstLiteral,
    EnergyDirection, FormulaLocation, FormulaVariable, IdentifierKind, LocationId,
    MalformedIdentifier, MarketLocationId, MeterLocationId, MeterOperand, ModelError,
    NetworkLocationId, Operand, PercentValue, Period, TimeSliceQuality,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Outcome of validating one time slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slice_id: Option<i64>,
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
}

impl ValidationResult {
    fn new(time_slice_id: Option<i64>, errors: Vec<ErrorInfo>) -> Self {
        Self {
            time_slice_id,
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Accepted,
    Rejected,
}

/// Outcome of submitting a formula location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Defects that belong to the location rather than one slice
    #[serde(default)]
    pub location_errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub per_slice_results: Vec<ValidationResult>,
}

impl SubmissionResult {
    pub fn is_accepted(&self) -> bool {
        self.status == SubmissionStatus::Accepted
    }

    /// Every reported defect, location-level first
    pub fn errors(&self) -> impl Iterator<Item = &ErrorInfo> {
        self.location_errors
            .iter()
            .chain(self.per_slice_results.iter().flat_map(|r| r.errors.iter()))
    }

    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.errors().map(|e| e.code).collect()
    }
}

/// Pipeline output: the report, plus the typed location when accepted
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub result: SubmissionResult,
    pub location: Option<FormulaLocation>,
}

/// Validate a wire formula location
pub fn validate_location(wire: &WireFormulaLocation, max_depth: usize) -> Validated {
    let mut location_errors = Vec::new();
    let location = check_location_id(wire, &mut location_errors);
    let location_id = wire.malo_id.clone().or_else(|| wire.nelo_id.clone());

    let wire_slices = wire
        .calculation_formula_time_slices
        .as_deref()
        .unwrap_or_default();
    if wire_slices.is_empty() {
        location_errors.push(ModelError::EmptyTimeSlices.to_error_info());
    }

    let mut reports: Vec<Vec<ErrorInfo>> = Vec::with_capacity(wire_slices.len());
    let mut slices: Vec<Option<CalculationFormulaTimeSlice>> = Vec::with_capacity(wire_slices.len());
    for (i, ws) in wire_slices.iter().enumerate() {
        let mut checker = Checker::new(max_depth);
        slices.push(checker.time_slice(i, ws));
        reports.push(checker.errors);
    }

    check_duplicate_ids(wire_slices, &mut reports);
    check_overlaps(wire_slices, &mut reports);

    let per_slice_results: Vec<ValidationResult> = wire_slices
        .iter()
        .zip(reports)
        .map(|(ws, errors)| ValidationResult::new(ws.time_slice_id, errors))
        .collect();

    let all_valid =
        location_errors.is_empty() && per_slice_results.iter().all(|r| r.valid);
    let accepted = match (all_valid, location) {
        (true, Some(location)) => {
            let typed: Option<Vec<_>> = slices.into_iter().collect();
            match typed.map(|t| FormulaLocation::new(location, t)) {
                Some(Ok(loc)) => Some(loc),
                Some(Err(e)) => {
                    location_errors.push(e.to_error_info());
                    None
                },
                None => None,
            }
        },
        _ => None,
    };

    let status = if accepted.is_some() {
        SubmissionStatus::Accepted
    } else {
        SubmissionStatus::Rejected
    };
    debug!(
        location = location_id.as_deref().unwrap_or("-"),
        slices = per_slice_results.len(),
        status = ?status,
        errors = location_errors.len()
            + per_slice_results.iter().map(|r| r.errors.len()).sum::<usize>(),
        "location validated"
    );

    Validated {
        result: SubmissionResult {
            status,
            location_id,
            location_errors,
            per_slice_results,
        },
        location: accepted,
    }
}

/// Validate a single wire formula tree
pub fn validate_formula(
    wire: &WireCalculationFormula,
    max_depth: usize,
) -> std::result::Result<CalculationFormula, Vec<ErrorInfo>> {
    let mut checker = Checker::new(max_depth);
    match checker.formula(wire, "calculationFormula", 1) {
        Some(formula) if checker.errors.is_empty() => Ok(formula),
        _ => Err(checker.errors),
    }
}

fn check_location_id(wire: &WireFormulaLocation, errors: &mut Vec<ErrorInfo>) -> Option<LocationId> {
    match (&wire.malo_id, &wire.nelo_id) {
        (Some(malo), None) => MarketLocationId::parse(malo)
            .map(LocationId::Market)
            .map_err(|e| errors.push(e.to_error_info().at("maloId")))
            .ok(),
        (None, Some(nelo)) => NetworkLocationId::parse(nelo)
            .map(LocationId::Network)
            .map_err(|e| errors.push(e.to_error_info().at("neloId")))
            .ok(),
        (Some(_), Some(_)) => {
            errors.push(
                ModelError::InvalidLocationUnion("both are present".to_string()).to_error_info(),
            );
            None
        },
        (None, None) => {
            errors.push(
                ModelError::InvalidLocationUnion("neither is present".to_string()).to_error_info(),
            );
            None
        },
    }
}

fn check_duplicate_ids(slices: &[WireTimeSlice], reports: &mut [Vec<ErrorInfo>]) {
    let mut seen = HashSet::new();
    for (i, ws) in slices.iter().enumerate() {
        let Some(id) = ws.time_slice_id else {
            continue;
        };
        if !seen.insert(id) {
            reports[i].push(
                ErrorInfo::new(
                    ErrorCode::MalformedIdentifier,
                    format!("Duplicate timeSliceId {}", id),
                )
                .at(format!("timeSlice[{}].timeSliceId", i)),
            );
        }
    }
}

/// Report every overlapping pair on both slices
fn check_overlaps(slices: &[WireTimeSlice], reports: &mut [Vec<ErrorInfo>]) {
    let bounded: Vec<(usize, Period)> = slices
        .iter()
        .enumerate()
        .filter_map(|(i, ws)| {
            let start = parse_timestamp(ws.period_of_use_from.as_deref()?).ok()?;
            let end = parse_timestamp(ws.period_of_use_to.as_deref()?).ok()?;
            Some((i, Period { start, end }))
        })
        .collect();
    let periods: Vec<Period> = bounded.iter().map(|(_, p)| *p).collect();

    for (a, b) in overlapping_pairs(&periods) {
        let (ia, ib) = (bounded[a].0, bounded[b].0);
        let err = ModelError::OverlappingTimeSlice {
            first: slices[ia].time_slice_id.unwrap_or(ia as i64),
            second: slices[ib].time_slice_id.unwrap_or(ib as i64),
        };
        reports[ia].push(err.to_error_info().at(format!("timeSlice[{}]", ia)));
        reports[ib].push(err.to_error_info().at(format!("timeSlice[{}]", ib)));
    }
}

// ============================================================================
// Slice and formula checks
// ============================================================================

struct Checker {
    max_depth: usize,
    errors: Vec<ErrorInfo>,
}

impl Checker {
    fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            errors: Vec::new(),
        }
    }

    fn report(&mut self, path: &str, info: ErrorInfo) {
        self.errors.push(info.at(path));
    }

    fn fail(&mut self, path: &str, code: ErrorCode, message: impl Into<String>) {
        self.report(path, ErrorInfo::new(code, message));
    }

    fn malformed(&mut self, path: &str, e: MalformedIdentifier) {
        self.report(path, e.to_error_info());
    }

    fn time_slice(&mut self, index: usize, ws: &WireTimeSlice) -> Option<CalculationFormulaTimeSlice> {
        let path = format!("timeSlice[{}]", index);

        if ws.time_slice_id.is_none() {
            self.fail(
                &format!("{}.timeSliceId", path),
                ErrorCode::MalformedIdentifier,
                "timeSliceId is required",
            );
        }

        let quality = match ws.time_slice_quality.as_deref() {
            None => {
                self.fail(
                    &format!("{}.timeSliceQuality", path),
                    ErrorCode::MalformedIdentifier,
                    "timeSliceQuality is required",
                );
                None
            },
            Some(raw) => {
                let parsed = serde_json::from_value::<TimeSliceQuality>(Value::String(raw.to_string()));
                if parsed.is_err() {
                    self.fail(
                        &format!("{}.timeSliceQuality", path),
                        ErrorCode::MalformedIdentifier,
                        format!("Unknown time slice quality '{}'", raw),
                    );
                }
                parsed.ok()
            },
        };

        let valid_from = self.timestamp(&path, "periodOfUseFrom", ws.period_of_use_from.as_deref());
        let valid_to = self.timestamp(&path, "periodOfUseTo", ws.period_of_use_to.as_deref());
        if let (Some(from), Some(to)) = (valid_from, valid_to) {
            if from >= to {
                let err = ModelError::InvalidTimeSlicePeriod {
                    id: ws.time_slice_id.unwrap_or(index as i64),
                    from: from.to_rfc3339(),
                    to: to.to_rfc3339(),
                };
                self.report(&path, err.to_error_info());
            }
        }

        let formula_path = format!("{}.calculationFormula", path);
        let formula = match &ws.calculation_formula {
            Some(f) => self.formula(f, &formula_path, 1),
            None => {
                self.fail(
                    &formula_path,
                    ErrorCode::InvalidCalculationFormulaUnion,
                    "calculationFormula is required",
                );
                None
            },
        };

        if !self.errors.is_empty() {
            return None;
        }
        Some(CalculationFormulaTimeSlice {
            id: ws.time_slice_id?,
            quality: quality?,
            valid_from: valid_from?,
            valid_to: valid_to?,
            formula: formula?,
        })
    }

    fn timestamp(
        &mut self,
        slice_path: &str,
        field: &str,
        raw: Option<&str>,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        let path = format!("{}.{}", slice_path, field);
        match raw {
            None => {
                self.fail(&path, ErrorCode::MalformedTimestamp, format!("{} is required", field));
                None
            },
            Some(raw) => parse_timestamp(raw)
                .map_err(|e| self.report(&path, e.to_error_info()))
                .ok(),
        }
    }

    /// Check one formula node and, whatever its union state, all of its branches
    fn formula(&mut self, wire: &WireCalculationFormula, path: &str, depth: usize) -> Option<CalculationFormula> {
        if depth > self.max_depth {
            self.fail(
                path,
                ErrorCode::DepthLimitExceeded,
                format!("Formula nesting exceeds the limit of {}", self.max_depth),
            );
            return None;
        }

        let mut candidates: Vec<Option<CalculationFormula>> = Vec::new();
        if let Some(ops) = &wire.add {
            candidates.push(self.operand_list("add", ops, path, depth).map(CalculationFormula::Add));
        }
        if let Some(sub) = &wire.sub {
            let sub_path = format!("{}.sub", path);
            let minuend = self.required_operand(sub.minuend.as_deref(), &sub_path, "minuend", depth);
            let subtrahend =
                self.required_operand(sub.subtrahend.as_deref(), &sub_path, "subtrahend", depth);
            candidates.push(minuend.zip(subtrahend).map(|(minuend, subtrahend)| {
                CalculationFormula::Sub {
                    minuend,
                    subtrahend,
                }
            }));
        }
        if let Some(ops) = &wire.mul {
            candidates.push(self.operand_list("mul", ops, path, depth).map(CalculationFormula::Mul));
        }
        if let Some(ops) = &wire.div {
            candidates.push(self.operand_list("div", ops, path, depth).map(CalculationFormula::Div));
        }
        if let Some(op) = &wire.pos {
            candidates.push(
                self.operand(op, &format!("{}.pos", path), depth)
                    .map(CalculationFormula::Pos),
            );
        }
        if let Some(op) = &wire.operand {
            candidates.push(
                self.operand(op, &format!("{}.operand", path), depth)
                    .map(CalculationFormula::Operand),
            );
        }

        if candidates.len() != 1 {
            let populated = wire.populated();
            self.fail(
                path,
                ErrorCode::InvalidCalculationFormulaUnion,
                format!(
                    "Exactly one of add, sub, mul, div, pos, operand must be set; found {} {:?}",
                    populated.len(),
                    populated
                ),
            );
            return None;
        }
        candidates.pop().flatten()
    }

    fn operand_list(
        &mut self,
        operator: &str,
        ops: &[WireOperand],
        path: &str,
        depth: usize,
    ) -> Option<Vec<Operand>> {
        let list_path = format!("{}.{}", path, operator);
        if ops.is_empty() {
            self.fail(
                &list_path,
                ErrorCode::EmptyOperandList,
                format!("'{}' requires at least one operand", operator),
            );
            return None;
        }
        let checked: Vec<Option<Operand>> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| self.operand(op, &format!("{}[{}]", list_path, i), depth))
            .collect();
        checked.into_iter().collect()
    }

    fn required_operand(
        &mut self,
        op: Option<&WireOperand>,
        sub_path: &str,
        field: &str,
        depth: usize,
    ) -> Option<Operand> {
        let path = format!("{}.{}", sub_path, field);
        match op {
            Some(op) => self.operand(op, &path, depth),
            None => {
                self.fail(&path, ErrorCode::InvalidOperandUnion, format!("{} is required", field));
                None
            },
        }
    }

    /// Check one operand and, whatever its union state, all of its variants
    fn operand(&mut self, wire: &WireOperand, path: &str, depth: usize) -> Option<Operand> {
        let mut candidates: Vec<Option<Operand>> = Vec::new();
        if let Some(m) = &wire.melo_operand {
            candidates.push(
                self.meter(m, &format!("{}.meloOperand", path))
                    .map(Operand::Meter),
            );
        }
        if let Some(c) = &wire.constant {
            candidates.push(
                self.constant(c, &format!("{}.const", path))
                    .map(Operand::Constant),
            );
        }
        if let Some(v) = &wire.formula_var {
            candidates.push(
                FormulaVariable::parse(v)
                    .map_err(|e| self.malformed(&format!("{}.formulaVar", path), e))
                    .ok()
                    .map(Operand::Variable),
            );
        }
        if let Some(f) = &wire.calculation_formula {
            candidates.push(
                self.formula(f, &format!("{}.calculationFormula", path), depth + 1)
                    .map(Operand::nested),
            );
        }

        if candidates.len() != 1 {
            let populated = wire.populated();
            self.fail(
                path,
                ErrorCode::InvalidOperandUnion,
                format!(
                    "Exactly one of meloOperand, const, formulaVar, calculationFormula must be set; found {} {:?}",
                    populated.len(),
                    populated
                ),
            );
            return None;
        }
        candidates.pop().flatten()
    }

    fn meter(&mut self, wire: &WireMeloOperand, path: &str) -> Option<MeterOperand> {
        let id_path = format!("{}.meloId", path);
        let meter_location_id = match wire.melo_id.as_deref() {
            Some(raw) => MeterLocationId::parse(raw)
                .map_err(|e| self.malformed(&id_path, e))
                .ok(),
            None => {
                self.fail(&id_path, ErrorCode::MalformedIdentifier, "meloId is required");
                None
            },
        };

        let energy_direction = match wire.energy_direction.as_deref() {
            None => Some(EnergyDirection::Consumption),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "consumption" => Some(EnergyDirection::Consumption),
                "production" => Some(EnergyDirection::Production),
                _ => {
                    self.fail(
                        &format!("{}.energyDirection", path),
                        ErrorCode::MalformedIdentifier,
                        format!("Unknown energy direction '{}'", raw),
                    );
                    None
                },
            },
        };

        let transformer = self.percent(
            wire.loss_factor_transformer.as_ref(),
            PercentValue::ZERO,
            &format!("{}.lossFactorTransformer", path),
        );
        let conduction = self.percent(
            wire.loss_factor_conduction.as_ref(),
            PercentValue::ZERO,
            &format!("{}.lossFactorConduction", path),
        );
        let distribution = self.percent(
            wire.distribution_factor_energy_quantity.as_ref(),
            PercentValue::ONE,
            &format!("{}.distributionFactorEnergyQuantity", path),
        );

        Some(MeterOperand {
            meter_location_id: meter_location_id?,
            energy_direction: energy_direction?,
            transformer_loss_factor: transformer?,
            conduction_loss_factor: conduction?,
            distribution_factor: distribution?,
        })
    }

    /// Absent factors take `default`
    fn percent(&mut self, wire: Option<&WirePercent>, default: PercentValue, path: &str) -> Option<PercentValue> {
        let Some(raw) = wire.and_then(|p| p.percentvalue.as_ref()) else {
            return Some(default);
        };
        let parsed = match raw {
            Value::Number(n) => match n.as_f64() {
                Some(v) => PercentValue::new(v),
                None => Err(MalformedIdentifier::new(IdentifierKind::PercentValue, n.to_string())),
            },
            Value::String(s) => s.parse::<PercentValue>(),
            other => Err(MalformedIdentifier::new(
                IdentifierKind::PercentValue,
                other.to_string(),
            )),
        };
        parsed.map_err(|e| self.malformed(path, e)).ok()
    }

    fn constant(&mut self, raw: &Value, path: &str) -> Option<ConstLiteral> {
        let parsed = match raw {
            Value::String(s) => s.parse::<ConstLiteral>(),
            Value::Number(n) => n.to_string().parse::<ConstLiteral>(),
            other => Err(MalformedIdentifier::new(
                IdentifierKind::ConstLiteral,
                other.to_string(),
            )),
        };
        parsed.map_err(|e| self.malformed(path, e)).ok()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    const MELO: &str = "DE00014545768S0000000000000003054";

    fn location(value: serde_json::Value) -> WireFormulaLocation {
        serde_json::from_value(value).unwrap()
    }

    fn slice(id: i64, from: &str, to: &str, formula: serde_json::Value) -> serde_json::Value {
        json!({
            "timeSliceId": id,
            "timeSliceQuality": "Gültige Daten",
            "periodOfUseFrom": from,
            "periodOfUseTo": to,
            "calculationFormula": formula
        })
    }

    fn simple_formula() -> serde_json::Value {
        json!({ "add": [
            { "meloOperand": {
                "meloId": MELO,
                "energyDirection": "consumption",
                "lossFactorTransformer": { "percentvalue": "0.02" },
                "lossFactorConduction": { "percentvalue": 0 },
                "distributionFactorEnergyQuantity": { "percentvalue": 1 }
            } },
            { "const": "-1.5" }
        ] })
    }

    #[test]
    fn test_valid_location_accepted() {
        let wire = location(json!({
            "maloId": "57685676748",
            "calculationFormulaTimeSlices": [
                slice(1, "2024-01-01T00:00:00Z", "2024-07-01T00:00:00Z", simple_formula()),
                slice(2, "2024-07-01T00:00:00Z", "2025-01-01T00:00:00Z", json!({ "operand": { "formulaVar": "lineA" } }))
            ]
        }));
        let validated = validate_location(&wire, 32);
        assert!(validated.result.is_accepted(), "{:?}", validated.result);
        assert_eq!(validated.result.location_id.as_deref(), Some("57685676748"));
        let loc = validated.location.unwrap();
        assert_eq!(loc.time_slices().len(), 2);
        assert!(validated.result.per_slice_results.iter().all(|r| r.valid));
    }

    #[test]
    fn test_every_defect_reported() {
        let wire = location(json!({
            "maloId": "57685676748",
            "calculationFormulaTimeSlices": [slice(1, "2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z", json!({
                "add": [
                    { "const": "1", "formulaVar": "x" },
                    { "meloOperand": { "meloId": "DE123", "lossFactorTransformer": { "percentvalue": "1.2" } } },
                    { "calculationFormula": { "mul": [] } }
                ]
            }))]
        }));
        let validated = validate_location(&wire, 32);
        assert!(!validated.result.is_accepted());
        assert!(validated.location.is_none());

        let errors = &validated.result.per_slice_results[0].errors;
        let find = |code: ErrorCode| errors.iter().find(|e| e.code == code).unwrap();
        assert_eq!(
            find(ErrorCode::InvalidOperandUnion).path.as_deref(),
            Some("timeSlice[0].calculationFormula.add[0]")
        );
        assert_eq!(
            find(ErrorCode::MalformedIdentifier).path.as_deref(),
            Some("timeSlice[0].calculationFormula.add[1].meloOperand.meloId")
        );
        assert_eq!(
            find(ErrorCode::OutOfRangePercent).path.as_deref(),
            Some("timeSlice[0].calculationFormula.add[1].meloOperand.lossFactorTransformer")
        );
        assert_eq!(
            find(ErrorCode::EmptyOperandList).path.as_deref(),
            Some("timeSlice[0].calculationFormula.add[2].calculationFormula.mul")
        );
    }

    #[test]
    fn test_formula_union_exclusivity() {
        let err = validate_formula(
            &serde_json::from_value(json!({ "add": [{ "const": "1" }], "mul": [{ "const": "2" }] })).unwrap(),
            32,
        )
        .unwrap_err();
        assert_eq!(err[0].code, ErrorCode::InvalidCalculationFormulaUnion);

        let err = validate_formula(&WireCalculationFormula::default(), 32).unwrap_err();
        assert_eq!(err[0].code, ErrorCode::InvalidCalculationFormulaUnion);

        let err = validate_formula(
            &serde_json::from_value(json!({ "operand": {} })).unwrap(),
            32,
        )
        .unwrap_err();
        assert_eq!(err[0].code, ErrorCode::InvalidOperandUnion);
    }

    #[test]
    fn test_sub_requires_both_sides() {
        let err = validate_formula(
            &serde_json::from_value(json!({ "sub": { "minuend": { "const": "1" } } })).unwrap(),
            32,
        )
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].code, ErrorCode::InvalidOperandUnion);
        assert_eq!(err[0].path.as_deref(), Some("calculationFormula.sub.subtrahend"));
    }

    #[test]
    fn test_depth_limit() {
        let mut formula = json!({ "operand": { "const": "1" } });
        for _ in 0..5 {
            formula = json!({ "pos": { "calculationFormula": formula } });
        }
        let wire: WireCalculationFormula = serde_json::from_value(formula).unwrap();
        assert!(validate_formula(&wire, 6).is_ok());
        let err = validate_formula(&wire, 5).unwrap_err();
        assert_eq!(err[0].code, ErrorCode::DepthLimitExceeded);
    }

    #[test]
    fn test_overlap_reported_on_both_slices() {
        let wire = location(json!({
            "neloId": "E1234848431",
            "calculationFormulaTimeSlices": [
                slice(1, "2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z", simple_formula()),
                slice(2, "2024-02-01T00:00:00Z", "2024-04-01T00:00:00Z", simple_formula())
            ]
        }));
        let result = validate_location(&wire, 32).result;
        assert_eq!(result.status, SubmissionStatus::Rejected);
        for r in &result.per_slice_results {
            assert!(!r.valid);
            assert_eq!(r.errors[0].code, ErrorCode::OverlappingTimeSlice);
        }
    }

    #[test]
    fn test_location_level_defects() {
        let result = validate_location(&location(json!({})), 32).result;
        assert_eq!(
            result.error_codes(),
            vec![ErrorCode::InvalidLocationUnion, ErrorCode::EmptyTimeSlices]
        );

        let result = validate_location(
            &location(json!({
                "maloId": "57685676748",
                "neloId": "E1234848431",
                "calculationFormulaTimeSlices": [slice(1, "2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z", simple_formula())]
            })),
            32,
        )
        .result;
        assert_eq!(result.location_errors[0].code, ErrorCode::InvalidLocationUnion);
        assert!(result.per_slice_results[0].valid);
        assert!(!result.is_accepted());
    }

    #[test]
    fn test_slice_field_defects() {
        let wire = location(json!({
            "maloId": "57685676748",
            "calculationFormulaTimeSlices": [
                { "timeSliceQuality": "kaputt", "periodOfUseFrom": "yesterday", "periodOfUseTo": "2024-01-01T00:00:00Z" },
                slice(7, "2024-02-01T00:00:00Z", "2024-01-01T00:00:00Z", simple_formula())
            ]
        }));
        let result = validate_location(&wire, 32).result;
        let first: Vec<ErrorCode> = result.per_slice_results[0].errors.iter().map(|e| e.code).collect();
        assert_eq!(
            first,
            vec![
                ErrorCode::MalformedIdentifier,
                ErrorCode::MalformedIdentifier,
                ErrorCode::MalformedTimestamp,
                ErrorCode::InvalidCalculationFormulaUnion,
            ]
        );
        assert_eq!(
            result.per_slice_results[1].errors[0].code,
            ErrorCode::InvalidTimeSlicePeriod
        );
    }
}
