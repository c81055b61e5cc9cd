//! formel-calc - Formula engine for EDI@Energy calculation formulas
//!
//! Lowers named-function expressions into the recursive arithmetic form,
//! validates wire formula locations, evaluates formulas over interval time
//! series and keeps an in-memory registry of accepted submissions.
//!
//! # Modules
//!
//! - `converter`: `lower` / `lift` between the two formula forms
//! - `validation`: Aggregating validation of wire formula locations
//! - `grid`: Output interval grid and input alignment
//! - `builtin_functions`: Stateless functions over grid signals
//! - `evaluator`: Tree walk over formulas and expressions
//! - `engine`: `FormulaEngine` facade (submit / convert / render / evaluate)
//! - `runner`: Bounded concurrent execution of calculation requests
//! - `registry`: Accepted formulas per location, replay by transaction id
//!
//! # Example
//!
//! ```
//! use formel_calc::converter::{lower, Bindings};
//! use formel_model::DomainExpression;
//!
//! let expr = DomainExpression::grouped_sum([("lineA", 1.0), ("lineB", -1.0)]);
//! let formula = lower(&expr, &Bindings::new()).unwrap();
//! assert_eq!(formula.operator_name(), "add");
//! ```

pub mod builtin_functions;
pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod grid;
pub mod registry;
pub mod runner;
pub mod validation;

pub use config::EngineConfig;
pub use converter::{lift, lower, Bindings};
pub use engine::{AuthoredSlice, FormulaEngine, SliceOutcome, CALCULATED_MEASUREMENT_TYPE};
pub use error::{ConversionError, EvalError};
pub use registry::{FormulaRegistry, FormulaSummary, StoredFormula, SubmissionEnvelope, SubmissionReceipt};
pub use runner::{CalculationRequest, CalculationResult, CalculationRunner, CalculationStatus};
pub use validation::{
    validate_formula, validate_location, SubmissionResult, SubmissionStatus, Validated,
    ValidationResult,
};
