//! Recursive Arithmetic Form
//!
//! The wire-level formula tree: addition, subtraction, multiplication,
//! division and unary-positive over typed operands. Nodes own their
//! children, so a formula is always a finite tree.

use crate::identifiers::{ConstLiteral, FormulaVariable, MeterLocationId, PercentValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Energy flow direction of a metered quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyDirection {
    Consumption,
    Production,
}

impl EnergyDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consumption => "consumption",
            Self::Production => "production",
        }
    }
}

/// Metered quantity adjusted by loss and distribution factors
#[derive(Debug, Clone, PartialEq)]
pub struct MeterOperand {
    pub meter_location_id: MeterLocationId,
    pub energy_direction: EnergyDirection,
    pub transformer_loss_factor: PercentValue,
    pub conduction_loss_factor: PercentValue,
    pub distribution_factor: PercentValue,
}

impl MeterOperand {
    /// Meter operand without losses and with full distribution
    pub fn lossless(meter_location_id: MeterLocationId, energy_direction: EnergyDirection) -> Self {
        Self {
            meter_location_id,
            energy_direction,
            transformer_loss_factor: PercentValue::ZERO,
            conduction_loss_factor: PercentValue::ZERO,
            distribution_factor: PercentValue::ONE,
        }
    }

    /// Combined factor `(1 - t) * (1 - c) * d`, always within [0, 1]
    pub fn effective_factor(&self) -> f64 {
        (1.0 - self.transformer_loss_factor.value())
            * (1.0 - self.conduction_loss_factor.value())
            * self.distribution_factor.value()
    }

    /// Contribution of a raw metered quantity
    pub fn effective_value(&self, raw: f64) -> f64 {
        raw * self.effective_factor()
    }
}

/// Operand: exactly one variant by construction
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Meter(MeterOperand),
    Constant(ConstLiteral),
    Variable(FormulaVariable),
    Nested(Box<CalculationFormula>),
}

impl Operand {
    pub fn nested(formula: CalculationFormula) -> Self {
        Operand::Nested(Box::new(formula))
    }

    /// Wire field name of the populated variant
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Meter(_) => "meloOperand",
            Self::Constant(_) => "const",
            Self::Variable(_) => "formulaVar",
            Self::Nested(_) => "calculationFormula",
        }
    }
}

/// Calculation formula: exactly one operator by construction
#[derive(Debug, Clone, PartialEq)]
pub enum CalculationFormula {
    /// Sum of all operands
    Add(Vec<Operand>),
    /// `minuend - subtrahend`
    Sub { minuend: Operand, subtrahend: Operand },
    /// Product of all operands
    Mul(Vec<Operand>),
    /// Left-to-right division
    Div(Vec<Operand>),
    /// Absolute value
    Pos(Operand),
    /// Identity over a single operand
    Operand(Operand),
}

/// Name resolved against the caller's input series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Meter(MeterLocationId),
    Variable(FormulaVariable),
}

impl Reference {
    pub fn name(&self) -> &str {
        match self {
            Self::Meter(id) => id.as_str(),
            Self::Variable(var) => var.as_str(),
        }
    }
}

impl CalculationFormula {
    /// Wire field name of the operator
    pub fn operator_name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Sub { .. } => "sub",
            Self::Mul(_) => "mul",
            Self::Div(_) => "div",
            Self::Pos(_) => "pos",
            Self::Operand(_) => "operand",
        }
    }

    /// Direct child operands in evaluation order
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Self::Add(ops) | Self::Mul(ops) | Self::Div(ops) => ops.iter().collect(),
            Self::Sub {
                minuend,
                subtrahend,
            } => vec![minuend, subtrahend],
            Self::Pos(op) | Self::Operand(op) => vec![op],
        }
    }

    /// Number of formula nodes on the longest root-to-leaf path
    ///
    /// ```
    /// use formel_model::formula::{CalculationFormula, Operand};
    /// use formel_model::identifiers::ConstLiteral;
    ///
    /// let leaf = Operand::Constant(ConstLiteral::from_value(1.0).unwrap());
    /// let inner = CalculationFormula::Operand(leaf);
    /// let outer = CalculationFormula::Pos(Operand::nested(inner));
    /// assert_eq!(outer.depth(), 2);
    /// ```
    pub fn depth(&self) -> usize {
        1 + self
            .operands()
            .into_iter()
            .map(|op| match op {
                Operand::Nested(inner) => inner.depth(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Distinct series references, sorted
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs.sort();
        refs.dedup();
        refs
    }

    fn collect_references(&self, refs: &mut Vec<Reference>) {
        for op in self.operands() {
            match op {
                Operand::Meter(m) => refs.push(Reference::Meter(m.meter_location_id.clone())),
                Operand::Variable(v) => refs.push(Reference::Variable(v.clone())),
                Operand::Constant(_) => {},
                Operand::Nested(inner) => inner.collect_references(refs),
            }
        }
    }
}

// ============================================================================
// Infix rendering
// ============================================================================

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meter(m) => {
                let factor = m.effective_factor();
                if factor == 1.0 {
                    write!(f, "{}", m.meter_location_id)
                } else {
                    write!(f, "{}*{}", m.meter_location_id, factor)
                }
            },
            Self::Constant(c) => write!(f, "{}", c),
            Self::Variable(v) => write!(f, "{}", v),
            Self::Nested(inner) => match inner.as_ref() {
                CalculationFormula::Operand(_) | CalculationFormula::Pos(_) => {
                    write!(f, "{}", inner)
                },
                _ => write!(f, "({})", inner),
            },
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, ops: &[Operand], sep: &str) -> fmt::Result {
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", op)?;
    }
    Ok(())
}

impl fmt::Display for CalculationFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(ops) => join(f, ops, " + "),
            Self::Sub {
                minuend,
                subtrahend,
            } => write!(f, "{} - {}", minuend, subtrahend),
            Self::Mul(ops) => join(f, ops, " * "),
            Self::Div(ops) => join(f, ops, " / "),
            Self::Pos(op) => write!(f, "|{}|", op),
            Self::Operand(op) => write!(f, "{}", op),
        }
    }
}
