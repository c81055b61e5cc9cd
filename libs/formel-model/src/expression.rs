//! Named-Function Form
//!
//! Authoring representation of a formula: a domain function applied to an
//! ordered list of tagged parameters. Serializes to the builder JSON
//! `{function, parameters: [{type, value, ...}]}` with the interchange
//! (German) function names.

use crate::serde_helpers;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain function of a named-function expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DomainFunction {
    /// `Wenn_Dann(a, op, b, then, else)`
    ConditionalBranch,
    /// `Grp_Sum(ref*s, ...)`
    GroupedSum,
    /// `Anteil_Groesser_Als(series, t)`: `max(series - t, 0)`
    PortionAboveThreshold,
    /// `Anteil_Kleiner_Als(series, t)`: `max(t - series, 0)`
    PortionBelowThreshold,
    /// `Quer_Max(series...)`
    CrossSeriesMax,
    /// `Quer_Min(series...)`
    CrossSeriesMin,
    /// `Groesser_Als(a, b)`: 1 where `a > b`, else 0
    GreaterThan,
    /// `Round(value, n)`
    Round,
    /// `Conv_RKMG(series[, factor])`
    MeteringTypeConversion,
    /// `IMax(series)`: scalar over all intervals
    IntervalMax,
    /// `IMin(series)`: scalar over all intervals
    IntervalMin,
    /// Any other function name
    Extension(String),
}

impl DomainFunction {
    pub const KNOWN: [DomainFunction; 11] = [
        DomainFunction::ConditionalBranch,
        DomainFunction::GroupedSum,
        DomainFunction::PortionAboveThreshold,
        DomainFunction::PortionBelowThreshold,
        DomainFunction::CrossSeriesMax,
        DomainFunction::CrossSeriesMin,
        DomainFunction::GreaterThan,
        DomainFunction::Round,
        DomainFunction::MeteringTypeConversion,
        DomainFunction::IntervalMax,
        DomainFunction::IntervalMin,
    ];

    /// Interchange name
    pub fn wire_name(&self) -> &str {
        match self {
            Self::ConditionalBranch => "Wenn_Dann",
            Self::GroupedSum => "Grp_Sum",
            Self::PortionAboveThreshold => "Anteil_Groesser_Als",
            Self::PortionBelowThreshold => "Anteil_Kleiner_Als",
            Self::CrossSeriesMax => "Quer_Max",
            Self::CrossSeriesMin => "Quer_Min",
            Self::GreaterThan => "Groesser_Als",
            Self::Round => "Round",
            Self::MeteringTypeConversion => "Conv_RKMG",
            Self::IntervalMax => "IMax",
            Self::IntervalMin => "IMin",
            Self::Extension(name) => name,
        }
    }

    /// Descriptive name
    pub fn english_name(&self) -> &str {
        match self {
            Self::ConditionalBranch => "ConditionalBranch",
            Self::GroupedSum => "GroupedSum",
            Self::PortionAboveThreshold => "PortionAboveThreshold",
            Self::PortionBelowThreshold => "PortionBelowThreshold",
            Self::CrossSeriesMax => "CrossSeriesMax",
            Self::CrossSeriesMin => "CrossSeriesMin",
            Self::GreaterThan => "GreaterThan",
            Self::Round => "Round",
            Self::MeteringTypeConversion => "MeteringTypeConversion",
            Self::IntervalMax => "IntervalMax",
            Self::IntervalMin => "IntervalMin",
            Self::Extension(name) => name,
        }
    }

    /// Resolve a function name; accepts interchange and descriptive names
    pub fn from_name(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|f| f.wire_name() == name || f.english_name() == name)
            .cloned()
            .unwrap_or_else(|| Self::Extension(name.to_string()))
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, Self::Extension(_))
    }
}

impl From<String> for DomainFunction {
    fn from(name: String) -> Self {
        match DomainFunction::from_name(&name) {
            DomainFunction::Extension(_) => DomainFunction::Extension(name),
            known => known,
        }
    }
}

impl From<DomainFunction> for String {
    fn from(function: DomainFunction) -> String {
        match function {
            DomainFunction::Extension(name) => name,
            known => known.wire_name().to_string(),
        }
    }
}

impl fmt::Display for DomainFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Parameter of a named-function expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Parameter {
    #[serde(rename = "constant")]
    Constant {
        #[serde(deserialize_with = "serde_helpers::deserialize_f64_flexible")]
        value: f64,
    },
    #[serde(rename = "timeseries_ref")]
    TimeseriesRef {
        #[serde(rename = "value", alias = "name")]
        name: String,
        #[serde(
            rename = "scalingFactor",
            default = "serde_helpers::scale_one",
            deserialize_with = "serde_helpers::deserialize_f64_flexible"
        )]
        scaling_factor: f64,
    },
    #[serde(rename = "string")]
    LiteralString { value: String },
    #[serde(rename = "expression")]
    Expression { value: Box<DomainExpression> },
}

impl Parameter {
    pub fn constant(value: f64) -> Self {
        Parameter::Constant { value }
    }

    pub fn series(name: impl Into<String>) -> Self {
        Self::scaled(name, 1.0)
    }

    pub fn scaled(name: impl Into<String>, scaling_factor: f64) -> Self {
        Parameter::TimeseriesRef {
            name: name.into(),
            scaling_factor,
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Parameter::LiteralString {
            value: value.into(),
        }
    }

    pub fn expression(expr: DomainExpression) -> Self {
        Parameter::Expression {
            value: Box::new(expr),
        }
    }

    /// Builder JSON `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::TimeseriesRef { .. } => "timeseries_ref",
            Self::LiteralString { .. } => "string",
            Self::Expression { .. } => "expression",
        }
    }
}

/// Named-function expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainExpression {
    pub function: DomainFunction,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl DomainExpression {
    pub fn new(function: DomainFunction, parameters: Vec<Parameter>) -> Self {
        Self {
            function,
            parameters,
        }
    }

    /// `Grp_Sum` over `(name, scalingFactor)` pairs
    pub fn grouped_sum<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::new(
            DomainFunction::GroupedSum,
            terms
                .into_iter()
                .map(|(name, s)| Parameter::scaled(name, s))
                .collect(),
        )
    }

    /// Number of expression nodes on the longest path
    pub fn depth(&self) -> usize {
        1 + self
            .parameters
            .iter()
            .map(|p| match p {
                Parameter::Expression { value } => value.depth(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Distinct series names referenced anywhere in the tree, sorted
    pub fn series_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names.sort();
        names.dedup();
        names
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        for p in &self.parameters {
            match p {
                Parameter::TimeseriesRef { name, .. } => names.push(name.clone()),
                Parameter::Expression { value } => value.collect_names(names),
                Parameter::Constant { .. } | Parameter::LiteralString { .. } => {},
            }
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value } => write!(f, "{}", value),
            Self::TimeseriesRef {
                name,
                scaling_factor,
            } => {
                if *scaling_factor == 1.0 {
                    write!(f, "{}", name)
                } else {
                    write!(f, "{}*{}", name, scaling_factor)
                }
            },
            Self::LiteralString { value } => write!(f, "\"{}\"", value),
            Self::Expression { value } => write!(f, "{}", value),
        }
    }
}

impl fmt::Display for DomainExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", p)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_names() {
        assert_eq!(
            DomainFunction::from_name("Wenn_Dann"),
            DomainFunction::ConditionalBranch
        );
        assert_eq!(
            DomainFunction::from_name("CrossSeriesMax"),
            DomainFunction::CrossSeriesMax
        );
        assert_eq!(
            DomainFunction::from_name("Foo_Bar"),
            DomainFunction::Extension("Foo_Bar".to_string())
        );
        for f in DomainFunction::KNOWN {
            assert_eq!(DomainFunction::from(String::from(f.clone())), f);
        }
    }

    #[test]
    fn test_builder_json() {
        let raw = json!({
            "function": "Wenn_Dann",
            "parameters": [
                {
                    "type": "expression",
                    "value": {
                        "function": "Grp_Sum",
                        "parameters": [
                            { "type": "timeseries_ref", "value": "lineA", "scalingFactor": 1.0 },
                            { "type": "timeseries_ref", "value": "lineB", "scalingFactor": -1.0 },
                            { "type": "timeseries_ref", "value": "lineC" }
                        ]
                    }
                },
                { "type": "string", "value": ">" },
                { "type": "constant", "value": 0 },
                { "type": "constant", "value": "2.5" },
                { "type": "constant", "value": 0 }
            ]
        });
        let expr: DomainExpression = serde_json::from_value(raw).unwrap();
        assert_eq!(expr.function, DomainFunction::ConditionalBranch);
        assert_eq!(expr.parameters.len(), 5);
        assert_eq!(expr.parameters[1], Parameter::literal(">"));
        assert_eq!(expr.parameters[3], Parameter::constant(2.5));
        let Parameter::Expression { value: inner } = &expr.parameters[0] else {
            panic!("expected nested expression");
        };
        assert_eq!(inner.parameters[2], Parameter::series("lineC"));
        assert_eq!(expr.depth(), 2);
        assert_eq!(expr.series_names(), vec!["lineA", "lineB", "lineC"]);

        let back = serde_json::to_value(&expr).unwrap();
        assert_eq!(back["function"], "Wenn_Dann");
        assert_eq!(back["parameters"][0]["value"]["function"], "Grp_Sum");
        assert_eq!(back["parameters"][0]["value"]["parameters"][2]["scalingFactor"], 1.0);
    }

    #[test]
    fn test_display() {
        let expr = DomainExpression::grouped_sum([("lineA", 1.0), ("lineB", -1.0)]);
        assert_eq!(expr.to_string(), "Grp_Sum(lineA; lineB*-1)");
    }
}
