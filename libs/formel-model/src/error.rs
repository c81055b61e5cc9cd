//! Model Layer Error Types

use crate::identifiers::IdentifierKind;
use errors::{ErrorCode, FormelErrorTrait};
use thiserror::Error;

/// Result type for formel-model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// A raw value that does not satisfy the structural rule of its kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed {kind}: '{value}' does not match {pattern}", pattern = .kind.pattern())]
pub struct MalformedIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl MalformedIdentifier {
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl FormelErrorTrait for MalformedIdentifier {
    fn error_code(&self) -> ErrorCode {
        // A well-formed number outside [0, 1] is a range problem, not a format problem
        let numeric = self
            .value
            .trim()
            .parse::<f64>()
            .is_ok_and(|v| v.is_finite());
        if self.kind == IdentifierKind::PercentValue && numeric {
            ErrorCode::OutOfRangePercent
        } else {
            ErrorCode::MalformedIdentifier
        }
    }
}

/// Model layer errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Identifier or literal error
    #[error(transparent)]
    Identifier(#[from] MalformedIdentifier),

    /// Neither or both of maloId/neloId present
    #[error("Formula location must carry exactly one of maloId or neloId: {0}")]
    InvalidLocationUnion(String),

    /// Location without any time slice
    #[error("Formula location has no calculation formula time slices")]
    EmptyTimeSlices,

    /// validFrom not strictly before validTo
    #[error("Time slice {id}: validFrom {from} is not before validTo {to}")]
    InvalidTimeSlicePeriod { id: i64, from: String, to: String },

    /// Two time slices of one location intersect
    #[error("Time slices {first} and {second} have overlapping validity periods")]
    OverlappingTimeSlice { first: i64, second: i64 },

    /// Timestamp that is not RFC 3339
    #[error("Malformed timestamp '{value}': {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// Period whose start is not before its end
    #[error("Invalid period: start {start} is not before end {end}")]
    InvalidPeriod { start: String, end: String },

    /// Unsupported or malformed ISO-8601 resolution
    #[error("Invalid resolution '{value}': {reason}")]
    InvalidResolution { value: String, reason: String },

    /// Series violating the tiling invariant
    #[error("Time series '{id}' is not evaluable: {reason}")]
    NotEvaluable { id: String, reason: String },
}

impl FormelErrorTrait for ModelError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Identifier(e) => e.error_code(),
            Self::InvalidLocationUnion(_) => ErrorCode::InvalidLocationUnion,
            Self::EmptyTimeSlices => ErrorCode::EmptyTimeSlices,
            Self::InvalidTimeSlicePeriod { .. } => ErrorCode::InvalidTimeSlicePeriod,
            Self::OverlappingTimeSlice { .. } => ErrorCode::OverlappingTimeSlice,
            Self::MalformedTimestamp { .. } => ErrorCode::MalformedTimestamp,
            Self::InvalidPeriod { .. }
            | Self::InvalidResolution { .. }
            | Self::NotEvaluable { .. } => ErrorCode::NotEvaluable,
        }
    }
}

// Helper methods
impl ModelError {
    pub fn not_evaluable(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::NotEvaluable {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_timestamp(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::MalformedTimestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_resolution(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidResolution {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
