//! Shared error taxonomy for the formel workspace
//!
//! Every crate keeps its own domain error type (`MalformedIdentifier`,
//! `ModelError`, `ConversionError`, `EvalError`) and exposes a common
//! interface by implementing [`FormelErrorTrait`]. Reports handed back to
//! callers are flattened into [`ErrorInfo`] items (`{code, message}`).

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ErrorCode - wire-stable error codes
// ============================================================================

/// Stable error codes reported to callers
///
/// Serialized in SCREAMING_SNAKE_CASE (e.g. `DIVISION_BY_ZERO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ======================================
    // Identifier & literal errors
    // ======================================
    MalformedIdentifier,
    OutOfRangePercent,
    MalformedTimestamp,

    // ======================================
    // Structural errors
    // ======================================
    InvalidOperandUnion,
    InvalidCalculationFormulaUnion,
    InvalidLocationUnion,
    EmptyOperandList,
    EmptyTimeSlices,
    OverlappingTimeSlice,
    InvalidTimeSlicePeriod,
    DepthLimitExceeded,

    // ======================================
    // Conversion errors
    // ======================================
    UnrepresentableInLoweredForm,
    UnknownFunction,
    InvalidParameter,

    // ======================================
    // Evaluation errors
    // ======================================
    UnresolvedTimeSeriesReference,
    MisalignedResolution,
    DivisionByZero,
    NotEvaluable,
    IncompleteInput,
    UncoveredPeriod,

    // ======================================
    // Envelope errors
    // ======================================
    InvalidEnvelope,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier => "MALFORMED_IDENTIFIER",
            Self::OutOfRangePercent => "OUT_OF_RANGE_PERCENT",
            Self::MalformedTimestamp => "MALFORMED_TIMESTAMP",
            Self::InvalidOperandUnion => "INVALID_OPERAND_UNION",
            Self::InvalidCalculationFormulaUnion => "INVALID_CALCULATION_FORMULA_UNION",
            Self::InvalidLocationUnion => "INVALID_LOCATION_UNION",
            Self::EmptyOperandList => "EMPTY_OPERAND_LIST",
            Self::EmptyTimeSlices => "EMPTY_TIME_SLICES",
            Self::OverlappingTimeSlice => "OVERLAPPING_TIME_SLICE",
            Self::InvalidTimeSlicePeriod => "INVALID_TIME_SLICE_PERIOD",
            Self::DepthLimitExceeded => "DEPTH_LIMIT_EXCEEDED",
            Self::UnrepresentableInLoweredForm => "UNREPRESENTABLE_IN_LOWERED_FORM",
            Self::UnknownFunction => "UNKNOWN_FUNCTION",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::UnresolvedTimeSeriesReference => "UNRESOLVED_TIME_SERIES_REFERENCE",
            Self::MisalignedResolution => "MISALIGNED_RESOLUTION",
            Self::DivisionByZero => "DIVISION_BY_ZERO",
            Self::NotEvaluable => "NOT_EVALUABLE",
            Self::IncompleteInput => "INCOMPLETE_INPUT",
            Self::UncoveredPeriod => "UNCOVERED_PERIOD",
            Self::InvalidEnvelope => "INVALID_ENVELOPE",
        }
    }

    /// Classification used for logging and reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedIdentifier | Self::OutOfRangePercent | Self::MalformedTimestamp => {
                ErrorCategory::Identifier
            },

            Self::InvalidOperandUnion
            | Self::InvalidCalculationFormulaUnion
            | Self::InvalidLocationUnion
            | Self::EmptyOperandList
            | Self::EmptyTimeSlices
            | Self::OverlappingTimeSlice
            | Self::InvalidTimeSlicePeriod
            | Self::DepthLimitExceeded => ErrorCategory::Structure,

            Self::UnrepresentableInLoweredForm | Self::UnknownFunction | Self::InvalidParameter => {
                ErrorCategory::Conversion
            },

            Self::UnresolvedTimeSeriesReference
            | Self::MisalignedResolution
            | Self::DivisionByZero
            | Self::NotEvaluable
            | Self::IncompleteInput
            | Self::UncoveredPeriod => ErrorCategory::Evaluation,

            Self::InvalidEnvelope => ErrorCategory::Envelope,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error category enum - used for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Identifier and literal format checks
    Identifier,
    /// Shape of formulas, time slices and locations
    Structure,
    /// Named-function to arithmetic lowering
    Conversion,
    /// Execution against time series
    Evaluation,
    /// Caller-supplied submission metadata
    Envelope,
}

// ============================================================================
// ErrorInfo - report item
// ============================================================================

/// One reported problem: `{code, message}` plus an optional location path
///
/// The path is the position inside a formula tree or location, e.g.
/// `timeSlice[0].add[1].meloOperand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: ErrorCode,
    /// Human readable message
    pub message: String,
    /// Where the problem was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorInfo {
    /// Create a new ErrorInfo without a path
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Attach the location of the problem
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{}] {}: {}", self.code, path, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

// ============================================================================
// FormelErrorTrait - common interface
// ============================================================================

/// Error capability trait shared by all formel error types
pub trait FormelErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for reports and logs)
    fn error_code(&self) -> ErrorCode;

    /// Get error category
    fn category(&self) -> ErrorCategory {
        self.error_code().category()
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        match self.category() {
            ErrorCategory::Evaluation => tracing::Level::WARN,
            _ => tracing::Level::INFO,
        }
    }

    /// Flatten into a report item
    fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.error_code(), self.to_string())
    }
}
