//! EDI@Energy Interchange Shapes
//!
//! Loosely-typed mirrors of the formula JSON (`formel_v0.0.1`). Every field
//! is optional so that a document with missing fields or ambiguous unions
//! still deserializes and the validation pipeline can report all of its
//! defects at once. Typed → wire conversion is total; wire → typed happens
//! only through validation.

use crate::formula::{CalculationFormula, MeterOperand, Operand};
use crate::identifiers::PercentValue;
use crate::location::{CalculationFormulaTimeSlice, FormulaLocation, LocationId, TimeSliceQuality};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `FormulaLocation` request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFormulaLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nelo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_formula_time_slices: Option<Vec<WireTimeSlice>>,
}

/// `calculationFormulaTimeSlice`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTimeSlice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slice_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slice_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_of_use_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_of_use_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_formula: Option<WireCalculationFormula>,
}

/// `calculationFormula`: oneOf add, sub, mul, div, pos, operand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireCalculationFormula {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<Vec<WireOperand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<WireSub>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mul: Option<Vec<WireOperand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub div: Option<Vec<WireOperand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Box<WireOperand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Box<WireOperand>>,
}

impl WireCalculationFormula {
    /// Names of the populated operator fields
    pub fn populated(&self) -> Vec<&'static str> {
        [
            ("add", self.add.is_some()),
            ("sub", self.sub.is_some()),
            ("mul", self.mul.is_some()),
            ("div", self.div.is_some()),
            ("pos", self.pos.is_some()),
            ("operand", self.operand.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

/// `sub` operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireSub {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minuend: Option<Box<WireOperand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtrahend: Option<Box<WireOperand>>,
}

/// Operand: oneOf meloOperand, const, formulaVar, calculationFormula
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireOperand {
    #[serde(
        rename = "meloOperand",
        alias = "meterOperand",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub melo_operand: Option<WireMeloOperand>,
    /// Literal as string or number
    #[serde(
        rename = "const",
        alias = "constant",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub constant: Option<Value>,
    #[serde(
        rename = "formulaVar",
        alias = "variable",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub formula_var: Option<String>,
    #[serde(
        rename = "calculationFormula",
        alias = "nestedFormula",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub calculation_formula: Option<Box<WireCalculationFormula>>,
}

impl WireOperand {
    /// Names of the populated variant fields
    pub fn populated(&self) -> Vec<&'static str> {
        [
            ("meloOperand", self.melo_operand.is_some()),
            ("const", self.constant.is_some()),
            ("formulaVar", self.formula_var.is_some()),
            ("calculationFormula", self.calculation_formula.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

/// `meloOperand`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMeloOperand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_factor_transformer: Option<WirePercent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_factor_conduction: Option<WirePercent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_factor_energy_quantity: Option<WirePercent>,
}

/// `{ "percentvalue": ... }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePercent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentvalue: Option<Value>,
}

// ============================================================================
// Typed → wire
// ============================================================================

impl From<PercentValue> for WirePercent {
    fn from(value: PercentValue) -> Self {
        Self {
            percentvalue: Some(Value::from(value.value())),
        }
    }
}

impl From<&MeterOperand> for WireMeloOperand {
    fn from(m: &MeterOperand) -> Self {
        Self {
            melo_id: Some(m.meter_location_id.to_string()),
            energy_direction: Some(m.energy_direction.as_str().to_string()),
            loss_factor_transformer: Some(m.transformer_loss_factor.into()),
            loss_factor_conduction: Some(m.conduction_loss_factor.into()),
            distribution_factor_energy_quantity: Some(m.distribution_factor.into()),
        }
    }
}

impl From<&Operand> for WireOperand {
    fn from(op: &Operand) -> Self {
        let mut wire = WireOperand::default();
        match op {
            Operand::Meter(m) => wire.melo_operand = Some(m.into()),
            Operand::Constant(c) => wire.constant = Some(Value::String(c.to_string())),
            Operand::Variable(v) => wire.formula_var = Some(v.to_string()),
            Operand::Nested(inner) => {
                wire.calculation_formula = Some(Box::new(inner.as_ref().into()))
            },
        }
        wire
    }
}

fn wire_list(ops: &[Operand]) -> Vec<WireOperand> {
    ops.iter().map(WireOperand::from).collect()
}

impl From<&CalculationFormula> for WireCalculationFormula {
    fn from(formula: &CalculationFormula) -> Self {
        let mut wire = WireCalculationFormula::default();
        match formula {
            CalculationFormula::Add(ops) => wire.add = Some(wire_list(ops)),
            CalculationFormula::Sub {
                minuend,
                subtrahend,
            } => {
                wire.sub = Some(WireSub {
                    minuend: Some(Box::new(minuend.into())),
                    subtrahend: Some(Box::new(subtrahend.into())),
                })
            },
            CalculationFormula::Mul(ops) => wire.mul = Some(wire_list(ops)),
            CalculationFormula::Div(ops) => wire.div = Some(wire_list(ops)),
            CalculationFormula::Pos(op) => wire.pos = Some(Box::new(op.into())),
            CalculationFormula::Operand(op) => wire.operand = Some(Box::new(op.into())),
        }
        wire
    }
}

impl From<&CalculationFormulaTimeSlice> for WireTimeSlice {
    fn from(slice: &CalculationFormulaTimeSlice) -> Self {
        let quality = match slice.quality {
            TimeSliceQuality::Valid => "Gültige Daten",
            TimeSliceQuality::NoData => "Keine Daten",
        };
        Self {
            time_slice_id: Some(slice.id),
            time_slice_quality: Some(quality.to_string()),
            period_of_use_from: Some(slice.valid_from.to_rfc3339()),
            period_of_use_to: Some(slice.valid_to.to_rfc3339()),
            calculation_formula: Some((&slice.formula).into()),
        }
    }
}

impl From<&FormulaLocation> for WireFormulaLocation {
    fn from(location: &FormulaLocation) -> Self {
        let (malo_id, nelo_id) = match location.location() {
            LocationId::Market(id) => (Some(id.to_string()), None),
            LocationId::Network(id) => (None, Some(id.to_string())),
        };
        Self {
            malo_id,
            nelo_id,
            calculation_formula_time_slices: Some(
                location
                    .time_slices()
                    .iter()
                    .map(WireTimeSlice::from)
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::formula::EnergyDirection;
    use crate::identifiers::{ConstLiteral, FormulaVariable, MeterLocationId};
    use serde_json::json;

    #[test]
    fn test_operand_aliases_and_union_report() {
        let op: WireOperand = serde_json::from_value(json!({
            "meterOperand": { "meloId": "DE00014545768S0000000000000003054" },
            "constant": 5
        }))
        .unwrap();
        assert_eq!(op.populated(), vec!["meloOperand", "const"]);

        let empty: WireOperand = serde_json::from_value(json!({})).unwrap();
        assert!(empty.populated().is_empty());
    }

    #[test]
    fn test_typed_to_wire() {
        let meter = MeterOperand {
            meter_location_id: MeterLocationId::parse("DE00014545768S0000000000000003054")
                .unwrap(),
            energy_direction: EnergyDirection::Production,
            transformer_loss_factor: PercentValue::new(0.02).unwrap(),
            conduction_loss_factor: PercentValue::new(0.01).unwrap(),
            distribution_factor: PercentValue::new(0.95).unwrap(),
        };
        let formula = CalculationFormula::Sub {
            minuend: Operand::Meter(meter),
            subtrahend: Operand::nested(CalculationFormula::Mul(vec![
                Operand::Variable(FormulaVariable::parse("x").unwrap()),
                Operand::Constant(ConstLiteral::from_value(0.5).unwrap()),
            ])),
        };
        let json = serde_json::to_value(WireCalculationFormula::from(&formula)).unwrap();
        assert_eq!(
            json,
            json!({
                "sub": {
                    "minuend": {
                        "meloOperand": {
                            "meloId": "DE00014545768S0000000000000003054",
                            "energyDirection": "production",
                            "lossFactorTransformer": { "percentvalue": 0.02 },
                            "lossFactorConduction": { "percentvalue": 0.01 },
                            "distributionFactorEnergyQuantity": { "percentvalue": 0.95 }
                        }
                    },
                    "subtrahend": {
                        "calculationFormula": {
                            "mul": [ { "formulaVar": "x" }, { "const": "0.5" } ]
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_formula_populated() {
        let wire: WireCalculationFormula = serde_json::from_value(json!({
            "add": [],
            "pos": { "const": "1" }
        }))
        .unwrap();
        assert_eq!(wire.populated(), vec!["add", "pos"]);
    }
}
