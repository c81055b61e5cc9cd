//! Identifier & Literal Validation
//!
//! Structural rules for the EDI@Energy identifiers and literals used by
//! calculation formulas. The pattern strings are interchange contracts and
//! are exposed verbatim for transport layers that serialize these types.
//!
//! All checks are pure: [`validate`] answers yes/no, [`parse`] returns the
//! typed value or a [`MalformedIdentifier`]; nothing here panics on bad input.

use crate::error::MalformedIdentifier;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

// ============================================================================
// Interchange patterns
// ============================================================================

/// Market location (Marktlokation): 11 digits
pub const MARKET_LOCATION_ID_PATTERN: &str = r"^\d{11}$";
/// Meter location (Messlokation): `DE` + 11 digits + 20 alphanumerics
pub const METER_LOCATION_ID_PATTERN: &str = r"^DE\d{11}[A-Z0-9]{20}$";
/// Network location (Netzlokation): `E` + 9 alphanumerics + 1 digit
pub const NETWORK_LOCATION_ID_PATTERN: &str = r"^E[A-Z0-9]{9}\d$";
/// RFC 4122 textual UUID
pub const TRANSACTION_ID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
/// Percentage in [0.0, 1.0]
pub const PERCENT_VALUE_PATTERN: &str = r"^(0(\.\d+)?|1(\.0+)?)$";
/// Signed decimal with optional exponent
pub const CONST_LITERAL_PATTERN: &str = r"^-?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$";
/// Formula variable: begins with a letter
pub const FORMULA_VARIABLE_PATTERN: &str = r"^[a-zA-Z].*";

/// Kinds of validated identifiers and literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentifierKind {
    MarketLocationId,
    MeterLocationId,
    NetworkLocationId,
    TransactionId,
    PercentValue,
    ConstLiteral,
    FormulaVariable,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 7] = [
        IdentifierKind::MarketLocationId,
        IdentifierKind::MeterLocationId,
        IdentifierKind::NetworkLocationId,
        IdentifierKind::TransactionId,
        IdentifierKind::PercentValue,
        IdentifierKind::ConstLiteral,
        IdentifierKind::FormulaVariable,
    ];

    /// Interchange pattern for this kind
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::MarketLocationId => MARKET_LOCATION_ID_PATTERN,
            Self::MeterLocationId => METER_LOCATION_ID_PATTERN,
            Self::NetworkLocationId => NETWORK_LOCATION_ID_PATTERN,
            Self::TransactionId => TRANSACTION_ID_PATTERN,
            Self::PercentValue => PERCENT_VALUE_PATTERN,
            Self::ConstLiteral => CONST_LITERAL_PATTERN,
            Self::FormulaVariable => FORMULA_VARIABLE_PATTERN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketLocationId => "market location id",
            Self::MeterLocationId => "meter location id",
            Self::NetworkLocationId => "network location id",
            Self::TransactionId => "transaction id",
            Self::PercentValue => "percent value",
            Self::ConstLiteral => "constant literal",
            Self::FormulaVariable => "formula variable",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::MarketLocationId => 0,
            Self::MeterLocationId => 1,
            Self::NetworkLocationId => 2,
            Self::TransactionId => 3,
            Self::PercentValue => 4,
            Self::ConstLiteral => 5,
            Self::FormulaVariable => 6,
        }
    }

    fn regex(&self) -> &'static Regex {
        &PATTERNS[self.index()]
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled patterns, indexed by `IdentifierKind::index`
///
/// `\d` must mean ASCII digits only, so Unicode classes are disabled for
/// every pattern except the formula variable, whose `.*` tail may match any
/// character.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    IdentifierKind::ALL
        .iter()
        .map(|kind| {
            RegexBuilder::new(kind.pattern())
                .unicode(*kind == IdentifierKind::FormulaVariable)
                .build()
                .expect("identifier patterns are valid regular expressions")
        })
        .collect()
});

// ============================================================================
// validate / parse
// ============================================================================

/// Check a raw value against the structural rule of `kind`
///
/// # Examples
/// ```
/// use formel_model::identifiers::{validate, IdentifierKind};
///
/// assert!(validate(IdentifierKind::MarketLocationId, "57685676748"));
/// assert!(validate(IdentifierKind::NetworkLocationId, "E1234848431"));
/// assert!(!validate(IdentifierKind::MarketLocationId, "5768567674"));
/// assert!(!validate(IdentifierKind::FormulaVariable, "1abc"));
/// ```
pub fn validate(kind: IdentifierKind, value: &str) -> bool {
    kind.regex().is_match(value)
}

/// A parsed identifier or literal
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    MarketLocation(MarketLocationId),
    MeterLocation(MeterLocationId),
    NetworkLocation(NetworkLocationId),
    Transaction(TransactionId),
    Percent(PercentValue),
    Constant(ConstLiteral),
    Variable(FormulaVariable),
}

/// Parse a raw value into its typed form
pub fn parse(kind: IdentifierKind, value: &str) -> Result<TypedValue, MalformedIdentifier> {
    Ok(match kind {
        IdentifierKind::MarketLocationId => TypedValue::MarketLocation(value.parse()?),
        IdentifierKind::MeterLocationId => TypedValue::MeterLocation(value.parse()?),
        IdentifierKind::NetworkLocationId => TypedValue::NetworkLocation(value.parse()?),
        IdentifierKind::TransactionId => TypedValue::Transaction(value.parse()?),
        IdentifierKind::PercentValue => TypedValue::Percent(value.parse()?),
        IdentifierKind::ConstLiteral => TypedValue::Constant(value.parse()?),
        IdentifierKind::FormulaVariable => TypedValue::Variable(value.parse()?),
    })
}

fn check(kind: IdentifierKind, value: &str) -> Result<(), MalformedIdentifier> {
    if validate(kind, value) {
        Ok(())
    } else {
        Err(MalformedIdentifier::new(kind, value))
    }
}

// ============================================================================
// String identifiers
// ============================================================================

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(value: &str) -> Result<Self, MalformedIdentifier> {
                check($kind, value)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = MalformedIdentifier;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = MalformedIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                check($kind, &value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_identifier!(
    /// Market location id (maloId), e.g. `57685676748`
    MarketLocationId,
    IdentifierKind::MarketLocationId
);

string_identifier!(
    /// Meter location id (meloId), e.g. `DE00014545768S0000000000000003054`
    MeterLocationId,
    IdentifierKind::MeterLocationId
);

string_identifier!(
    /// Network location id (neloId), e.g. `E1234848431`
    NetworkLocationId,
    IdentifierKind::NetworkLocationId
);

string_identifier!(
    /// Formula variable name, resolved against named input series
    FormulaVariable,
    IdentifierKind::FormulaVariable
);

// ============================================================================
// TransactionId
// ============================================================================

/// RFC 4122 transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for TransactionId {
    type Err = MalformedIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check(IdentifierKind::TransactionId, s)?;
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| MalformedIdentifier::new(IdentifierKind::TransactionId, s))
    }
}

impl TryFrom<String> for TransactionId {
    type Error = MalformedIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransactionId> for String {
    fn from(value: TransactionId) -> String {
        value.0.hyphenated().to_string()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// ============================================================================
// PercentValue
// ============================================================================

/// Real number in [0.0, 1.0] inclusive (loss and distribution factors)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct PercentValue(f64);

impl PercentValue {
    pub const ZERO: PercentValue = PercentValue(0.0);
    pub const ONE: PercentValue = PercentValue(1.0);

    /// Range-checked constructor for numeric input
    pub fn new(value: f64) -> Result<Self, MalformedIdentifier> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(MalformedIdentifier::new(
                IdentifierKind::PercentValue,
                value.to_string(),
            ))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl FromStr for PercentValue {
    type Err = MalformedIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check(IdentifierKind::PercentValue, s)?;
        let value: f64 = s
            .parse()
            .map_err(|_| MalformedIdentifier::new(IdentifierKind::PercentValue, s))?;
        Self::new(value)
    }
}

impl TryFrom<f64> for PercentValue {
    type Error = MalformedIdentifier;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PercentValue> for f64 {
    fn from(value: PercentValue) -> f64 {
        value.0
    }
}

// ============================================================================
// ConstLiteral
// ============================================================================

/// Signed decimal literal; keeps its interchange text next to the value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConstLiteral {
    text: String,
    value: f64,
}

impl ConstLiteral {
    /// Literal for a finite number, rendered in shortest round-trip form
    ///
    /// ```
    /// use formel_model::identifiers::ConstLiteral;
    ///
    /// assert_eq!(ConstLiteral::from_value(-1.0).unwrap().as_str(), "-1");
    /// assert_eq!(ConstLiteral::from_value(0.25).unwrap().as_str(), "0.25");
    /// assert!(ConstLiteral::from_value(f64::NAN).is_err());
    /// ```
    pub fn from_value(value: f64) -> Result<Self, MalformedIdentifier> {
        if !value.is_finite() {
            return Err(MalformedIdentifier::new(
                IdentifierKind::ConstLiteral,
                value.to_string(),
            ));
        }
        let text = value.to_string();
        check(IdentifierKind::ConstLiteral, &text)?;
        Ok(Self { text, value })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for ConstLiteral {
    type Err = MalformedIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check(IdentifierKind::ConstLiteral, s)?;
        let value: f64 = s
            .parse()
            .map_err(|_| MalformedIdentifier::new(IdentifierKind::ConstLiteral, s))?;
        if !value.is_finite() {
            return Err(MalformedIdentifier::new(IdentifierKind::ConstLiteral, s));
        }
        Ok(Self {
            text: s.to_string(),
            value,
        })
    }
}

impl TryFrom<String> for ConstLiteral {
    type Error = MalformedIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConstLiteral> for String {
    fn from(value: ConstLiteral) -> String {
        value.text
    }
}

impl fmt::Display for ConstLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::{ErrorCode, FormelErrorTrait};

    #[test]
    fn test_market_location_id() {
        assert!(validate(IdentifierKind::MarketLocationId, "57685676748"));
        assert!(!validate(IdentifierKind::MarketLocationId, "576856767480"));
        assert!(!validate(IdentifierKind::MarketLocationId, "5768567674a"));
        // Non-ASCII digits are not digits here
        assert!(!validate(IdentifierKind::MarketLocationId, "٥٧٦٨٥٦٧٦٧٤٨"));
    }

    #[test]
    fn test_meter_location_id() {
        let id = "DE00014545768S0000000000000003054";
        assert_eq!(id.len(), 33);
        assert!(validate(IdentifierKind::MeterLocationId, id));
        assert!(!validate(
            IdentifierKind::MeterLocationId,
            "DE00014545768s0000000000000003054"
        ));
        assert!(!validate(
            IdentifierKind::MeterLocationId,
            "AT00014545768S0000000000000003054"
        ));
        assert!(MeterLocationId::parse(id).is_ok());
    }

    #[test]
    fn test_network_location_id() {
        assert!(validate(IdentifierKind::NetworkLocationId, "E1234848431"));
        assert!(validate(IdentifierKind::NetworkLocationId, "EABCDEFGHI7"));
        assert!(!validate(IdentifierKind::NetworkLocationId, "E123484843A"));
        assert!(!validate(IdentifierKind::NetworkLocationId, "F1234848431"));
    }

    #[test]
    fn test_transaction_id() {
        let raw = "f81d4fae-7dec-11d0-a765-00a0c91e6bf6";
        let id: TransactionId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("F81D4FAE-7DEC-11D0-A765-00A0C91E6BF6"
            .parse::<TransactionId>()
            .is_ok());
        // Braced and simple forms are accepted by uuid but not by the interchange pattern
        assert!("f81d4fae7dec11d0a76500a0c91e6bf6"
            .parse::<TransactionId>()
            .is_err());
        assert!("{f81d4fae-7dec-11d0-a765-00a0c91e6bf6}"
            .parse::<TransactionId>()
            .is_err());
    }

    #[test]
    fn test_percent_value() {
        for ok in ["0", "1", "0.5", "0.015", "1.000"] {
            assert!(validate(IdentifierKind::PercentValue, ok), "{}", ok);
        }
        for bad in ["1.5", "-0.1", ".5", "2", "1.01"] {
            assert!(!validate(IdentifierKind::PercentValue, bad), "{}", bad);
        }
        assert!(PercentValue::new(1.0).is_ok());
        assert!(PercentValue::new(1.0000001).is_err());
        assert!(PercentValue::new(f64::NAN).is_err());
    }

    #[test]
    fn test_percent_out_of_range_code() {
        let err = PercentValue::new(1.5).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::OutOfRangePercent);

        let err = "abc".parse::<PercentValue>().unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MalformedIdentifier);
    }

    #[test]
    fn test_const_literal() {
        for ok in ["0", "-1", "3.", ".5", "-.5", "1e5", "2.5E-3", "-0.0"] {
            let lit: ConstLiteral = ok.parse().unwrap_or_else(|e| panic!("{}: {}", ok, e));
            assert_eq!(lit.as_str(), ok);
        }
        assert_eq!("2.5E-3".parse::<ConstLiteral>().unwrap().value(), 0.0025);
        for bad in ["", "+1", "1.2.3", "e5", "abc", "1e"] {
            assert!(bad.parse::<ConstLiteral>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_const_literal_from_value_round_trips() {
        for v in [0.0, -1.0, 1.0, 0.1, 1234.5678, -0.000001, 1e21] {
            let lit = ConstLiteral::from_value(v).unwrap();
            let back: ConstLiteral = lit.as_str().parse().unwrap();
            assert_eq!(back.value(), v);
        }
    }

    #[test]
    fn test_formula_variable() {
        assert!(validate(IdentifierKind::FormulaVariable, "lineA"));
        assert!(validate(IdentifierKind::FormulaVariable, "W+Z1 – x"));
        assert!(!validate(IdentifierKind::FormulaVariable, "1line"));
        assert!(!validate(IdentifierKind::FormulaVariable, ""));
        assert!(!validate(IdentifierKind::FormulaVariable, "_x"));
    }

    #[test]
    fn test_parse_dispatch() {
        assert!(matches!(
            parse(IdentifierKind::MarketLocationId, "57685676748"),
            Ok(TypedValue::MarketLocation(_))
        ));
        assert!(matches!(
            parse(IdentifierKind::ConstLiteral, "-2.5"),
            Ok(TypedValue::Constant(c)) if c.value() == -2.5
        ));
        let err = parse(IdentifierKind::NetworkLocationId, "nope").unwrap_err();
        assert_eq!(err.kind, IdentifierKind::NetworkLocationId);
        assert!(err.to_string().contains("^E[A-Z0-9]{9}\\d$"));
    }

    #[test]
    fn test_serde_rejects_malformed() {
        let ok: MarketLocationId = serde_json::from_str("\"57685676748\"").unwrap();
        assert_eq!(ok.as_str(), "57685676748");
        assert!(serde_json::from_str::<MarketLocationId>("\"123\"").is_err());
        assert!(serde_json::from_str::<PercentValue>("1.2").is_err());
        assert_eq!(
            serde_json::to_string(&ConstLiteral::from_value(2.0).unwrap()).unwrap(),
            "\"2\""
        );
    }
}
