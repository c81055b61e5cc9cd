//! Formula Engine
//!
//! Facade over the converter, the validation pipeline and the evaluator.
//! Pure calculation logic without IO: callers fetch input series and persist
//! results themselves.

use crate::builtin_functions::round_half_away;
use crate::config::EngineConfig;
use crate::converter::{self, Bindings};
use crate::error::{ConversionError, EvalError, Result};
use crate::evaluator::Evaluator;
use crate::grid::{Grid, Sample};
use crate::validation::{validate_location, SubmissionResult, Validated};
use chrono::{DateTime, Utc};
use errors::FormelErrorTrait;
use formel_model::wire::{WireFormulaLocation, WireTimeSlice};
use formel_model::{
    CalculationFormula, CalculationFormulaTimeSlice, DomainExpression, DomainFunction,
    FormulaLocation, Interval, IntervalQuality, LocationId, OutputSpec, Period, Resolution,
    TimeSeries, TimeSliceQuality,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Measurement type stamped on every produced series
pub const CALCULATED_MEASUREMENT_TYPE: &str = "CALCULATED";

/// Time slice authored in named-function form
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredSlice {
    pub id: i64,
    pub quality: TimeSliceQuality,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub expression: DomainExpression,
}

/// Result of evaluating one time slice of a location
#[derive(Debug, Clone, PartialEq)]
pub struct SliceOutcome {
    pub time_slice_id: i64,
    pub result: Result<TimeSeries>,
}

/// Formula Engine - validation, conversion and evaluation
#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    config: EngineConfig,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Validate a typed formula location
    pub fn submit(&self, location: &FormulaLocation) -> SubmissionResult {
        self.submit_wire(&WireFormulaLocation::from(location)).result
    }

    /// Validate a wire formula location; accept or reject it as a whole
    pub fn submit_wire(&self, wire: &WireFormulaLocation) -> Validated {
        let validated = validate_location(wire, self.config.max_formula_depth);
        let location = validated.result.location_id.as_deref().unwrap_or("-");
        if validated.result.is_accepted() {
            info!(
                location,
                slices = validated.result.per_slice_results.len(),
                "Formula location accepted"
            );
        } else {
            warn!(
                location,
                errors = validated.result.errors().count(),
                "Formula location rejected"
            );
        }
        validated
    }

    /// Lower authored slices and submit them in wire form
    ///
    /// Fails with the first conversion error; a formula that cannot be
    /// lowered is never submitted.
    pub fn submit_authored(
        &self,
        location: &LocationId,
        slices: &[AuthoredSlice],
        bindings: &Bindings,
    ) -> std::result::Result<Validated, ConversionError> {
        let wire_slices = slices
            .iter()
            .map(|s| {
                let formula = converter::lower(&s.expression, bindings)?;
                Ok(WireTimeSlice::from(&CalculationFormulaTimeSlice {
                    id: s.id,
                    quality: s.quality,
                    valid_from: s.valid_from,
                    valid_to: s.valid_to,
                    formula,
                }))
            })
            .collect::<std::result::Result<Vec<_>, ConversionError>>()?;

        let (malo_id, nelo_id) = match location {
            LocationId::Market(id) => (Some(id.to_string()), None),
            LocationId::Network(id) => (None, Some(id.to_string())),
        };
        Ok(self.submit_wire(&WireFormulaLocation {
            malo_id,
            nelo_id,
            calculation_formula_time_slices: Some(wire_slices),
        }))
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    pub fn convert_to_wire_form(
        &self,
        expr: &DomainExpression,
        bindings: &Bindings,
    ) -> std::result::Result<CalculationFormula, ConversionError> {
        converter::lower(expr, bindings).inspect_err(|e| {
            debug!(function = %expr.function, code = %e.error_code(), "lowering failed")
        })
    }

    pub fn render_for_display(&self, formula: &CalculationFormula) -> DomainExpression {
        converter::lift(formula)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate a recursive formula over `period`
    pub fn evaluate_formula(
        &self,
        formula: &CalculationFormula,
        inputs: &HashMap<String, TimeSeries>,
        period: &Period,
        output: &OutputSpec,
    ) -> Result<TimeSeries> {
        let grid = Grid::new(*period, output.resolution)?;
        let samples = self.formula_samples(formula, inputs, grid)?;
        Ok(self.output_series(&grid, &samples, output, None))
    }

    /// Evaluate a named-function expression over `period`
    ///
    /// `IMax`/`IMin` at the root produce a single interval spanning the
    /// whole period.
    pub fn evaluate_expression(
        &self,
        expr: &DomainExpression,
        inputs: &HashMap<String, TimeSeries>,
        period: &Period,
        output: &OutputSpec,
    ) -> Result<TimeSeries> {
        let depth = expr.depth();
        if depth > self.config.max_formula_depth {
            return Err(EvalError::depth_exceeded(depth, self.config.max_formula_depth));
        }
        let grid = Grid::new(*period, output.resolution)?;
        let signal = Evaluator::for_expression(grid, inputs, expr)?.eval_expression(expr)?;
        debug!(function = %expr.function, intervals = grid.len(), "expression evaluated");

        let reduction = matches!(
            expr.function,
            DomainFunction::IntervalMax | DomainFunction::IntervalMin
        );
        if reduction && signal.is_scalar() {
            let single = Resolution::from_seconds(period.duration().num_seconds())?;
            let point = Grid::new(*period, single)?;
            return Ok(self.output_series(&point, &signal.into_samples(1), output, None));
        }
        Ok(self.output_series(&grid, &signal.into_samples(grid.len()), output, None))
    }

    /// Evaluate one time slice over its intersection with `period`
    pub fn evaluate_slice(
        &self,
        slice: &CalculationFormulaTimeSlice,
        location: &LocationId,
        inputs: &HashMap<String, TimeSeries>,
        period: &Period,
        output: &OutputSpec,
    ) -> Result<TimeSeries> {
        let window = slice_window(slice, period)?;
        let grid = Grid::new(window, output.resolution)?;
        let samples = self.slice_samples(slice, inputs, grid)?;
        Ok(self.output_series(&grid, &samples, output, Some(location)))
    }

    /// Evaluate every slice overlapping `period`; outcomes are independent
    pub fn evaluate_location_slices(
        &self,
        location: &FormulaLocation,
        inputs: &HashMap<String, TimeSeries>,
        period: &Period,
        output: &OutputSpec,
    ) -> Vec<SliceOutcome> {
        location
            .slices_overlapping(period)
            .map(|slice| {
                let result = self.evaluate_slice(slice, location.location(), inputs, period, output);
                if let Err(e) = &result {
                    warn!(
                        location = %location.location(),
                        time_slice = slice.id,
                        code = %e.code,
                        "Time slice evaluation failed: {}",
                        e
                    );
                }
                SliceOutcome {
                    time_slice_id: slice.id,
                    result,
                }
            })
            .collect()
    }

    /// Evaluate a location into one series covering `period`
    ///
    /// The slices overlapping `period` must cover it without gaps and change
    /// only on output interval boundaries. The first failing slice fails the
    /// whole result.
    pub fn evaluate_location(
        &self,
        location: &FormulaLocation,
        inputs: &HashMap<String, TimeSeries>,
        period: &Period,
        output: &OutputSpec,
    ) -> Result<TimeSeries> {
        let grid = Grid::new(*period, output.resolution)?;

        let mut windows = Vec::new();
        let mut cursor = period.start;
        for slice in location.slices_overlapping(period) {
            let window = slice_window(slice, period)?;
            if window.start != cursor {
                return Err(EvalError::uncovered(format!(
                    "No time slice of {} is valid from {} to {}",
                    location.location(),
                    cursor.to_rfc3339(),
                    window.start.to_rfc3339()
                )));
            }
            if !grid.is_boundary(window.start) || !grid.is_boundary(window.end) {
                return Err(EvalError::misaligned(format!(
                    "Time slice {} validity {} does not fall on {} interval boundaries",
                    slice.id, window, grid.resolution()
                )));
            }
            cursor = window.end;
            windows.push((slice, window));
        }
        if cursor != period.end {
            return Err(EvalError::uncovered(format!(
                "No time slice of {} is valid from {} to {}",
                location.location(),
                cursor.to_rfc3339(),
                period.end.to_rfc3339()
            )));
        }

        let mut samples = Vec::with_capacity(grid.len());
        for (slice, window) in windows {
            let slice_grid = Grid::new(window, output.resolution)?;
            samples.extend(self.slice_samples(slice, inputs, slice_grid)?);
        }
        debug!(
            location = %location.location(),
            intervals = samples.len(),
            "location evaluated"
        );
        Ok(self.output_series(&grid, &samples, output, Some(location.location())))
    }

    fn formula_samples(
        &self,
        formula: &CalculationFormula,
        inputs: &HashMap<String, TimeSeries>,
        grid: Grid,
    ) -> Result<Vec<Sample>> {
        let depth = formula.depth();
        if depth > self.config.max_formula_depth {
            return Err(EvalError::depth_exceeded(depth, self.config.max_formula_depth));
        }
        let signal = Evaluator::for_formula(grid, inputs, formula)?.eval_formula(formula)?;
        debug!(
            operator = formula.operator_name(),
            intervals = grid.len(),
            "formula evaluated"
        );
        Ok(signal.into_samples(grid.len()))
    }

    /// No-data slices are not evaluated: zero with quality missing
    fn slice_samples(
        &self,
        slice: &CalculationFormulaTimeSlice,
        inputs: &HashMap<String, TimeSeries>,
        grid: Grid,
    ) -> Result<Vec<Sample>> {
        match slice.quality {
            TimeSliceQuality::NoData => Ok(vec![Sample::new(0.0, IntervalQuality::Missing); grid.len()]),
            TimeSliceQuality::Valid => self
                .formula_samples(&slice.formula, inputs, grid)
                .map_err(|mut e| {
                    e.message = format!("Time slice {}: {}", slice.id, e.message);
                    e
                }),
        }
    }

    fn output_series(
        &self,
        grid: &Grid,
        samples: &[Sample],
        output: &OutputSpec,
        location: Option<&LocationId>,
    ) -> TimeSeries {
        let scale = self.config.quantity_scale;
        let mut intervals: Vec<Interval> = grid.intervals(samples);
        for interval in &mut intervals {
            interval.quantity = round_half_away(interval.quantity, scale);
        }
        let id = output.time_series_id.clone().unwrap_or_else(|| match location {
            Some(loc) => format!("TS-CALC-{}", loc),
            None => "TS-CALC".to_string(),
        });
        TimeSeries {
            id,
            market_location_id: match location {
                Some(LocationId::Market(id)) => Some(id.to_string()),
                _ => None,
            },
            network_location_id: match location {
                Some(LocationId::Network(id)) => Some(id.to_string()),
                _ => None,
            },
            meter_location_id: None,
            measurement_type: Some(CALCULATED_MEASUREMENT_TYPE.to_string()),
            unit: output.unit.clone(),
            resolution: grid.resolution(),
            period: *grid.period(),
            intervals,
        }
    }
}

fn slice_window(slice: &CalculationFormulaTimeSlice, period: &Period) -> Result<Period> {
    slice.validity().intersect(period).ok_or_else(|| {
        EvalError::uncovered(format!(
            "Time slice {} ({}) does not overlap {}",
            slice.id,
            slice.validity(),
            period
        ))
    })
}
