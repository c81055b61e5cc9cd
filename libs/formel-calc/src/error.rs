//! Error types for formel-calc

use errors::{ErrorCode, ErrorInfo, FormelErrorTrait};
use formel_model::{MalformedIdentifier, ModelError};
use thiserror::Error;

/// Named-function → arithmetic lowering errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Function has no recursive-arithmetic equivalent
    #[error("{function} has no representation in the recursive arithmetic form: {reason}")]
    UnrepresentableInLoweredForm { function: String, reason: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function} parameter {index}: {reason}")]
    InvalidParameter {
        function: String,
        index: usize,
        reason: String,
    },
}

impl ConversionError {
    pub fn unrepresentable(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnrepresentableInLoweredForm {
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(
        function: impl Into<String>,
        index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            function: function.into(),
            index,
            reason: reason.into(),
        }
    }
}

impl FormelErrorTrait for ConversionError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnrepresentableInLoweredForm { .. } => ErrorCode::UnrepresentableInLoweredForm,
            Self::UnknownFunction(_) => ErrorCode::UnknownFunction,
            Self::InvalidParameter { .. } => ErrorCode::InvalidParameter,
        }
    }
}

/// Evaluation failure of one time slice or expression
///
/// `position` is the 1-based output interval position where the failure
/// occurred, when the failure belongs to a single interval.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}{}", .position.map(|p| format!(" (interval {})", p)).unwrap_or_default())]
pub struct EvalError {
    pub code: ErrorCode,
    pub position: Option<i64>,
    pub message: String,
}

impl EvalError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            position: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn division_by_zero(position: Option<i64>) -> Self {
        Self {
            code: ErrorCode::DivisionByZero,
            position,
            message: "Division by zero".to_string(),
        }
    }

    pub fn unresolved(name: &str) -> Self {
        Self::new(
            ErrorCode::UnresolvedTimeSeriesReference,
            format!("Time series '{}' is not present in the supplied inputs", name),
        )
    }

    pub fn misaligned(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::MisalignedResolution, msg)
    }

    pub fn incomplete_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::IncompleteInput, msg)
    }

    pub fn uncovered(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UncoveredPeriod, msg)
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, msg)
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(ErrorCode::UnknownFunction, format!("Unknown function: {}", name))
    }

    pub fn empty_operands(operator: &str) -> Self {
        Self::new(
            ErrorCode::EmptyOperandList,
            format!("'{}' has no operands", operator),
        )
    }

    pub fn depth_exceeded(depth: usize, limit: usize) -> Self {
        Self::new(
            ErrorCode::DepthLimitExceeded,
            format!("Formula depth {} exceeds the limit of {}", depth, limit),
        )
    }
}

impl FormelErrorTrait for EvalError {
    fn error_code(&self) -> ErrorCode {
        self.code
    }

    fn to_error_info(&self) -> ErrorInfo {
        let info = ErrorInfo::new(self.code, self.message.clone());
        match self.position {
            Some(p) => info.at(format!("interval[{}]", p)),
            None => info,
        }
    }
}

impl From<ModelError> for EvalError {
    fn from(e: ModelError) -> Self {
        Self::new(e.error_code(), e.to_string())
    }
}

impl From<MalformedIdentifier> for EvalError {
    fn from(e: MalformedIdentifier) -> Self {
        Self::new(e.error_code(), e.to_string())
    }
}

impl From<ConversionError> for EvalError {
    fn from(e: ConversionError) -> Self {
        Self::new(e.error_code(), e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_error_display() {
        let err = EvalError::division_by_zero(Some(3));
        assert_eq!(err.to_string(), "Division by zero (interval 3)");
        assert_eq!(err.to_error_info().path.as_deref(), Some("interval[3]"));

        let err = EvalError::unresolved("lineA");
        assert_eq!(err.error_code(), ErrorCode::UnresolvedTimeSeriesReference);
        assert!(err.to_error_info().path.is_none());
    }

    #[test]
    fn test_conversion_codes() {
        assert_eq!(
            ConversionError::unrepresentable("Wenn_Dann", "no branch operator").error_code(),
            ErrorCode::UnrepresentableInLoweredForm
        );
        assert_eq!(
            ConversionError::UnknownFunction("Foo".into()).error_code(),
            ErrorCode::UnknownFunction
        );
    }
}
