//! formel-model - Formula data model for EDI@Energy calculation formulas
//!
//! Pure data types; no I/O and no evaluation logic.
//!
//! # Modules
//!
//! - `identifiers`: Structural validation of location ids, transaction ids,
//!   percentages and literals (`validate` / `parse`)
//! - `formula`: Recursive arithmetic form (`CalculationFormula`, `Operand`)
//! - `expression`: Named-function form (`DomainExpression`, `Parameter`)
//! - `location`: Time slices and the `FormulaLocation` aggregate
//! - `timeseries`: Periods, ISO-8601 resolutions and interval series
//! - `wire`: All-optional interchange JSON shapes
//!
//! # Example
//!
//! ```
//! use formel_model::identifiers::{validate, IdentifierKind};
//! use formel_model::{DomainExpression, DomainFunction};
//!
//! assert!(validate(IdentifierKind::MeterLocationId, "DE00014545768S0000000000000003054"));
//!
//! let expr = DomainExpression::grouped_sum([("lineA", 1.0), ("lineB", -1.0)]);
//! assert_eq!(expr.function, DomainFunction::GroupedSum);
//! ```

pub mod error;
pub mod expression;
pub mod formula;
pub mod identifiers;
pub mod location;
pub mod serde_helpers;
pub mod timeseries;
pub mod wire;

// Re-exports for convenience
pub use error::{MalformedIdentifier, ModelError, Result};
pub use expression::{DomainExpression, DomainFunction, Parameter};
pub use formula::{CalculationFormula, EnergyDirection, MeterOperand, Operand, Reference};
pub use identifiers::{
    ConstLiteral, FormulaVariable, IdentifierKind, MarketLocationId, MeterLocationId,
    NetworkLocationId, PercentValue, TransactionId, TypedValue,
};
pub use location::{CalculationFormulaTimeSlice, FormulaLocation, LocationId, TimeSliceQuality};
pub use timeseries::{
    Interval, IntervalQuality, OutputSpec, Period, Resolution, TimeSeries, parse_timestamp,
};
