//! Formula Converter
//!
//! `lower` turns a named-function expression into the recursive arithmetic
//! form used on the wire; `lift` renders an arithmetic formula back as a
//! named-function expression for display.
//!
//! The arithmetic form has no comparison, branch, extremum or rounding
//! operator, so only `Grp_Sum` and the arithmetic passthrough functions
//! (`add`, `sub`, `mul`, `div`, `pos`, `operand`) can be lowered. Everything
//! else fails with `UnrepresentableInLoweredForm` and must be evaluated in
//! named-function form.
//!
//! Round trip: for every `e` that lowers, `lift(lower(e))` evaluates to the
//! same values as `e`. A `Grp_Sum` over series references comes back
//! unchanged.

use crate::error::ConversionError;
use formel_model::{
    CalculationFormula, ConstLiteral, DomainExpression, DomainFunction, FormulaVariable, Operand,
    Parameter,
};
use std::collections::HashMap;
use tracing::debug;

type Result<T> = std::result::Result<T, ConversionError>;

/// Arithmetic passthrough function names, one per wire operator
pub const PASSTHROUGH_FUNCTIONS: [&str; 6] = ["add", "sub", "mul", "div", "pos", "operand"];

/// True for the reserved passthrough names
pub fn is_passthrough(function: &DomainFunction) -> bool {
    matches!(function, DomainFunction::Extension(name) if PASSTHROUGH_FUNCTIONS.contains(&name.as_str()))
}

/// Series name → operand used when lowering a `timeseries_ref`
///
/// Unbound names lower to a formula variable of the same name.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    operands: HashMap<String, Operand>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, operand: Operand) -> Self {
        self.operands.insert(name.into(), operand);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Operand> {
        self.operands.get(name)
    }
}

// ============================================================================
// lower
// ============================================================================

/// Lower a named-function expression into the recursive arithmetic form
pub fn lower(expr: &DomainExpression, bindings: &Bindings) -> Result<CalculationFormula> {
    let formula = match &expr.function {
        DomainFunction::GroupedSum => lower_grouped_sum(expr, bindings)?,
        DomainFunction::Extension(name) if is_passthrough(&expr.function) => {
            lower_passthrough(name, expr, bindings)?
        },
        DomainFunction::Extension(name) => {
            return Err(ConversionError::UnknownFunction(name.clone()));
        },
        DomainFunction::ConditionalBranch => {
            return Err(ConversionError::unrepresentable(
                expr.function.wire_name(),
                "the arithmetic form has no comparison or branch operator",
            ));
        },
        other => {
            return Err(ConversionError::unrepresentable(
                other.wire_name(),
                "only sums, differences, products and ratios can be lowered",
            ));
        },
    };
    debug!(function = %expr.function, operator = formula.operator_name(), "lowered");
    Ok(formula)
}

fn constant(function: &DomainFunction, index: usize, value: f64) -> Result<Operand> {
    ConstLiteral::from_value(value)
        .map(Operand::Constant)
        .map_err(|e| ConversionError::invalid_parameter(function.wire_name(), index, e.to_string()))
}

fn reference(
    function: &DomainFunction,
    index: usize,
    name: &str,
    bindings: &Bindings,
) -> Result<Operand> {
    if let Some(bound) = bindings.get(name) {
        return Ok(bound.clone());
    }
    FormulaVariable::parse(name)
        .map(Operand::Variable)
        .map_err(|e| ConversionError::invalid_parameter(function.wire_name(), index, e.to_string()))
}

/// `mul([ref, const(s)])`
fn scaled(
    function: &DomainFunction,
    index: usize,
    name: &str,
    factor: f64,
    bindings: &Bindings,
) -> Result<CalculationFormula> {
    Ok(CalculationFormula::Mul(vec![
        reference(function, index, name, bindings)?,
        constant(function, index, factor)?,
    ]))
}

fn literal_rejected(function: &DomainFunction, index: usize) -> ConversionError {
    ConversionError::invalid_parameter(
        function.wire_name(),
        index,
        "string literals have no arithmetic meaning",
    )
}

/// `Grp_Sum`: each reference becomes `mul([ref, const(s)])` inside an `add`;
/// a single unscaled reference becomes a bare `operand`
fn lower_grouped_sum(expr: &DomainExpression, bindings: &Bindings) -> Result<CalculationFormula> {
    let f = &expr.function;
    match expr.parameters.as_slice() {
        [] => Err(ConversionError::invalid_parameter(
            f.wire_name(),
            0,
            "at least one term is required",
        )),
        [single] => match single {
            Parameter::TimeseriesRef {
                name,
                scaling_factor,
            } if *scaling_factor == 1.0 => Ok(CalculationFormula::Operand(reference(
                f, 0, name, bindings,
            )?)),
            Parameter::TimeseriesRef {
                name,
                scaling_factor,
            } => scaled(f, 0, name, *scaling_factor, bindings),
            Parameter::Constant { value } => Ok(CalculationFormula::Operand(constant(f, 0, *value)?)),
            Parameter::Expression { value } => Ok(CalculationFormula::Operand(Operand::nested(
                lower(value, bindings)?,
            ))),
            Parameter::LiteralString { .. } => Err(literal_rejected(f, 0)),
        },
        params => {
            let terms = params
                .iter()
                .enumerate()
                .map(|(i, p)| match p {
                    Parameter::TimeseriesRef {
                        name,
                        scaling_factor,
                    } => scaled(f, i, name, *scaling_factor, bindings).map(Operand::nested),
                    Parameter::Constant { value } => constant(f, i, *value),
                    Parameter::Expression { value } => lower(value, bindings).map(Operand::nested),
                    Parameter::LiteralString { .. } => Err(literal_rejected(f, i)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(CalculationFormula::Add(terms))
        },
    }
}

fn passthrough_operand(
    function: &DomainFunction,
    index: usize,
    param: &Parameter,
    bindings: &Bindings,
) -> Result<Operand> {
    match param {
        Parameter::TimeseriesRef {
            name,
            scaling_factor,
        } if *scaling_factor == 1.0 => reference(function, index, name, bindings),
        Parameter::TimeseriesRef {
            name,
            scaling_factor,
        } => scaled(function, index, name, *scaling_factor, bindings).map(Operand::nested),
        Parameter::Constant { value } => constant(function, index, *value),
        Parameter::Expression { value } => lower(value, bindings).map(Operand::nested),
        Parameter::LiteralString { .. } => Err(literal_rejected(function, index)),
    }
}

fn lower_passthrough(
    name: &str,
    expr: &DomainExpression,
    bindings: &Bindings,
) -> Result<CalculationFormula> {
    let f = &expr.function;
    let mut operands = expr
        .parameters
        .iter()
        .enumerate()
        .map(|(i, p)| passthrough_operand(f, i, p, bindings))
        .collect::<Result<Vec<_>>>()?;

    let arity = |expected: &str| {
        ConversionError::invalid_parameter(
            name,
            expr.parameters.len(),
            format!("'{}' takes {}", name, expected),
        )
    };

    match name {
        "add" | "mul" | "div" if operands.is_empty() => Err(arity("at least one operand")),
        "add" => Ok(CalculationFormula::Add(operands)),
        "mul" => Ok(CalculationFormula::Mul(operands)),
        "div" => Ok(CalculationFormula::Div(operands)),
        "sub" if operands.len() == 2 => {
            let subtrahend = operands.pop().ok_or_else(|| arity("two operands"))?;
            let minuend = operands.pop().ok_or_else(|| arity("two operands"))?;
            Ok(CalculationFormula::Sub {
                minuend,
                subtrahend,
            })
        },
        "sub" => Err(arity("two operands")),
        "pos" | "operand" if operands.len() == 1 => {
            let op = operands.pop().ok_or_else(|| arity("one operand"))?;
            Ok(if name == "pos" {
                CalculationFormula::Pos(op)
            } else {
                CalculationFormula::Operand(op)
            })
        },
        "pos" | "operand" => Err(arity("one operand")),
        other => Err(ConversionError::UnknownFunction(other.to_string())),
    }
}

// ============================================================================
// lift
// ============================================================================

/// Render an arithmetic formula as a named-function expression
///
/// Sums (and single scaled or bare terms) become `Grp_Sum`; every other
/// operator becomes the passthrough function of the same name. A meter
/// operand is rendered as a reference to its meter location id scaled by its
/// combined loss and distribution factor.
pub fn lift(formula: &CalculationFormula) -> DomainExpression {
    match formula {
        CalculationFormula::Add(ops) => DomainExpression::new(
            DomainFunction::GroupedSum,
            ops.iter().map(lift_term).collect(),
        ),
        CalculationFormula::Mul(ops) if scaled_reference(ops).is_some() => DomainExpression::new(
            DomainFunction::GroupedSum,
            scaled_reference(ops).into_iter().collect(),
        ),
        CalculationFormula::Operand(op) => {
            DomainExpression::new(DomainFunction::GroupedSum, vec![lift_term(op)])
        },
        other => DomainExpression::new(
            DomainFunction::Extension(other.operator_name().to_string()),
            other.operands().into_iter().map(lift_term).collect(),
        ),
    }
}

/// `[ref, const]` → `timeseries_ref` with the combined factor
fn scaled_reference(ops: &[Operand]) -> Option<Parameter> {
    match ops {
        [reference, Operand::Constant(c)] => match lift_term(reference) {
            Parameter::TimeseriesRef {
                name,
                scaling_factor,
            } => Some(Parameter::scaled(name, scaling_factor * c.value())),
            _ => None,
        },
        _ => None,
    }
}

fn lift_term(op: &Operand) -> Parameter {
    match op {
        Operand::Variable(v) => Parameter::series(v.as_str()),
        Operand::Meter(m) => Parameter::scaled(m.meter_location_id.as_str(), m.effective_factor()),
        Operand::Constant(c) => Parameter::constant(c.value()),
        Operand::Nested(inner) => match inner.as_ref() {
            CalculationFormula::Mul(ops) => scaled_reference(ops)
                .unwrap_or_else(|| Parameter::expression(lift(inner))),
            _ => Parameter::expression(lift(inner)),
        },
    }
}
