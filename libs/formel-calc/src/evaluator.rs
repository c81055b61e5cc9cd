//! Evaluator
//!
//! Walks either formula representation over one output grid. All referenced
//! inputs are aligned onto the grid before the walk starts, so a missing or
//! misaligned input fails the evaluation before any operator runs.

use crate::builtin_functions::{self as bf, Comparison, Signal};
use crate::converter::is_passthrough;
use crate::error::{EvalError, Result};
use crate::grid::{align, Grid, Sample};
use formel_model::{
    CalculationFormula, DomainExpression, DomainFunction, Operand, Parameter, TimeSeries,
};
use std::collections::HashMap;
use tracing::debug;

/// Largest `n` accepted by `Round(value, n)`
pub const MAX_ROUND_DECIMALS: u32 = 28;

/// Grid plus the aligned samples of every referenced input
#[derive(Debug, Clone)]
pub struct Evaluator {
    grid: Grid,
    inputs: HashMap<String, Vec<Sample>>,
}

impl Evaluator {
    /// Align the named inputs onto `grid`
    ///
    /// Fails with `UnresolvedTimeSeriesReference` for a name missing from
    /// `inputs`, and with the alignment error of the first input that cannot
    /// be joined onto the grid.
    pub fn prepare<I, S>(grid: Grid, inputs: &HashMap<String, TimeSeries>, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut aligned = HashMap::new();
        for name in names {
            let name = name.as_ref();
            if aligned.contains_key(name) {
                continue;
            }
            let series = inputs.get(name).ok_or_else(|| EvalError::unresolved(name))?;
            aligned.insert(name.to_string(), align(series, &grid)?);
        }
        debug!(
            intervals = grid.len(),
            resolution = %grid.resolution(),
            inputs = aligned.len(),
            "grid prepared"
        );
        Ok(Self {
            grid,
            inputs: aligned,
        })
    }

    /// Evaluator over the inputs referenced by `formula`
    pub fn for_formula(
        grid: Grid,
        inputs: &HashMap<String, TimeSeries>,
        formula: &CalculationFormula,
    ) -> Result<Self> {
        let references = formula.references();
        Self::prepare(grid, inputs, references.iter().map(|r| r.name()))
    }

    /// Evaluator over the inputs referenced by `expr`
    pub fn for_expression(
        grid: Grid,
        inputs: &HashMap<String, TimeSeries>,
        expr: &DomainExpression,
    ) -> Result<Self> {
        Self::prepare(grid, inputs, expr.series_names())
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn series(&self, name: &str) -> Result<Signal> {
        self.inputs
            .get(name)
            .map(|samples| Signal::Series(samples.clone()))
            .ok_or_else(|| EvalError::unresolved(name))
    }

    // ========================================================================
    // Recursive arithmetic form
    // ========================================================================

    pub fn eval_formula(&self, formula: &CalculationFormula) -> Result<Signal> {
        match formula {
            CalculationFormula::Add(ops) => {
                bf::sum(&self.eval_operands(ops)?).ok_or_else(|| EvalError::empty_operands("add"))
            },
            CalculationFormula::Sub {
                minuend,
                subtrahend,
            } => {
                let a = self.eval_operand(minuend)?;
                let b = self.eval_operand(subtrahend)?;
                Ok(bf::combine(&a, &b, |x, y| x - y))
            },
            CalculationFormula::Mul(ops) => bf::product(&self.eval_operands(ops)?)
                .ok_or_else(|| EvalError::empty_operands("mul")),
            CalculationFormula::Div(ops) => bf::divide(&self.eval_operands(ops)?)
                .unwrap_or_else(|| Err(EvalError::empty_operands("div"))),
            CalculationFormula::Pos(op) => Ok(bf::abs(&self.eval_operand(op)?)),
            CalculationFormula::Operand(op) => self.eval_operand(op),
        }
    }

    fn eval_operands(&self, ops: &[Operand]) -> Result<Vec<Signal>> {
        ops.iter().map(|op| self.eval_operand(op)).collect()
    }

    fn eval_operand(&self, op: &Operand) -> Result<Signal> {
        match op {
            Operand::Meter(m) => Ok(bf::scale(
                &self.series(m.meter_location_id.as_str())?,
                m.effective_factor(),
            )),
            Operand::Constant(c) => Ok(Signal::constant(c.value())),
            Operand::Variable(v) => self.series(v.as_str()),
            Operand::Nested(inner) => self.eval_formula(inner),
        }
    }

    // ========================================================================
    // Named-function form
    // ========================================================================

    pub fn eval_expression(&self, expr: &DomainExpression) -> Result<Signal> {
        let f = &expr.function;
        match f {
            DomainFunction::ConditionalBranch => self.eval_branch(expr),
            DomainFunction::GroupedSum | DomainFunction::CrossSeriesMax | DomainFunction::CrossSeriesMin => {
                let signals = self.eval_parameters(expr)?;
                let folded = match f {
                    DomainFunction::GroupedSum => bf::sum(&signals),
                    DomainFunction::CrossSeriesMax => bf::cross_max(&signals),
                    _ => bf::cross_min(&signals),
                };
                folded.ok_or_else(|| arity(expr, "at least one parameter"))
            },
            DomainFunction::PortionAboveThreshold => {
                let [series, threshold] = self.arguments(expr)?;
                Ok(bf::portion_above(&series, &threshold))
            },
            DomainFunction::PortionBelowThreshold => {
                let [series, threshold] = self.arguments(expr)?;
                Ok(bf::portion_below(&series, &threshold))
            },
            DomainFunction::GreaterThan => {
                let [a, b] = self.arguments(expr)?;
                Ok(bf::greater_than(&a, &b))
            },
            DomainFunction::Round => {
                let [value, decimals] = self.arguments(expr)?;
                Ok(bf::round(&value, round_decimals(expr, &decimals)?))
            },
            DomainFunction::MeteringTypeConversion => match expr.parameters.len() {
                1 => {
                    let [series] = self.arguments(expr)?;
                    Ok(series)
                },
                _ => {
                    let [series, factor] = self.arguments(expr)?;
                    Ok(bf::combine(&series, &factor, |v, k| v * k))
                },
            },
            DomainFunction::IntervalMax => {
                let [series] = self.arguments(expr)?;
                Ok(bf::interval_max(&series))
            },
            DomainFunction::IntervalMin => {
                let [series] = self.arguments(expr)?;
                Ok(bf::interval_min(&series))
            },
            DomainFunction::Extension(name) if is_passthrough(f) => self.eval_passthrough(name, expr),
            DomainFunction::Extension(name) => Err(EvalError::unknown_function(name)),
        }
    }

    /// `Wenn_Dann(a, op, b, then, else)`
    fn eval_branch(&self, expr: &DomainExpression) -> Result<Signal> {
        let [a, op, b, then, otherwise] = expr.parameters.as_slice() else {
            return Err(arity(expr, "five parameters"));
        };
        let comparison = match op {
            Parameter::LiteralString { value } => Comparison::parse(value).ok_or_else(|| {
                EvalError::invalid_parameter(format!(
                    "{} parameter 1: unknown comparison operator '{}'",
                    expr.function, value
                ))
            })?,
            other => {
                return Err(EvalError::invalid_parameter(format!(
                    "{} parameter 1: expected a comparison operator, got {}",
                    expr.function,
                    other.type_name()
                )));
            },
        };
        let condition = bf::compare(
            &self.eval_parameter(expr, 0, a)?,
            comparison,
            &self.eval_parameter(expr, 2, b)?,
        );
        bf::select(
            &condition,
            self.eval_parameter(expr, 3, then),
            self.eval_parameter(expr, 4, otherwise),
            self.grid.len(),
        )
    }

    /// Arithmetic passthrough functions (`add`, `sub`, `mul`, `div`, `pos`, `operand`)
    fn eval_passthrough(&self, name: &str, expr: &DomainExpression) -> Result<Signal> {
        match name {
            "sub" => {
                let [a, b] = self.arguments(expr)?;
                Ok(bf::combine(&a, &b, |x, y| x - y))
            },
            "pos" => {
                let [a] = self.arguments(expr)?;
                Ok(bf::abs(&a))
            },
            "operand" => {
                let [a] = self.arguments(expr)?;
                Ok(a)
            },
            _ => {
                let signals = self.eval_parameters(expr)?;
                let result = match name {
                    "add" => bf::sum(&signals).map(Ok),
                    "mul" => bf::product(&signals).map(Ok),
                    "div" => bf::divide(&signals),
                    other => return Err(EvalError::unknown_function(other)),
                };
                result.unwrap_or_else(|| Err(arity(expr, "at least one parameter")))
            },
        }
    }

    fn eval_parameters(&self, expr: &DomainExpression) -> Result<Vec<Signal>> {
        expr.parameters
            .iter()
            .enumerate()
            .map(|(i, p)| self.eval_parameter(expr, i, p))
            .collect()
    }

    /// Exactly `N` evaluated parameters
    fn arguments<const N: usize>(&self, expr: &DomainExpression) -> Result<[Signal; N]> {
        let expected = || match N {
            1 => "one parameter".to_string(),
            n => format!("{} parameters", n),
        };
        if expr.parameters.len() != N {
            return Err(arity(expr, &expected()));
        }
        self.eval_parameters(expr)?
            .try_into()
            .map_err(|_| arity(expr, &expected()))
    }

    fn eval_parameter(&self, expr: &DomainExpression, index: usize, p: &Parameter) -> Result<Signal> {
        let finite = |value: f64, what: &str| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(EvalError::invalid_parameter(format!(
                    "{} parameter {}: {} {} is not a finite number",
                    expr.function, index, what, value
                )))
            }
        };
        match p {
            Parameter::Constant { value } => Ok(Signal::constant(finite(*value, "constant")?)),
            Parameter::TimeseriesRef {
                name,
                scaling_factor,
            } => {
                let factor = finite(*scaling_factor, "scaling factor")?;
                Ok(bf::scale(&self.series(name)?, factor))
            },
            Parameter::Expression { value } => self.eval_expression(value),
            Parameter::LiteralString { .. } => Err(EvalError::invalid_parameter(format!(
                "{} parameter {}: string literals are only valid as a comparison operator",
                expr.function, index
            ))),
        }
    }
}

fn arity(expr: &DomainExpression, expected: &str) -> EvalError {
    EvalError::invalid_parameter(format!(
        "{} takes {}, got {}",
        expr.function,
        expected,
        expr.parameters.len()
    ))
}

/// `n` of `Round(value, n)`: a non-negative whole constant
fn round_decimals(expr: &DomainExpression, n: &Signal) -> Result<u32> {
    match n {
        Signal::Scalar(Sample { value, .. })
            if value.fract() == 0.0 && (0.0..=MAX_ROUND_DECIMALS as f64).contains(value) =>
        {
            Ok(*value as u32)
        },
        _ => Err(EvalError::invalid_parameter(format!(
            "{} parameter 1: decimal places must be a whole constant between 0 and {}",
            expr.function, MAX_ROUND_DECIMALS
        ))),
    }
}
