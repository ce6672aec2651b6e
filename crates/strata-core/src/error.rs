//! Error types for strata operations.
//!
//! Errors carry a structured [`ErrorCode`] for programmatic handling. Business
//! outcomes such as a rejected promotion are *not* errors; they are returned as
//! decisions or transition records. Errors are reserved for invalid input,
//! missing ids, illegal layer moves and collaborator failures.

use std::collections::HashMap;
use thiserror::Error;

use crate::types::KnowledgeLayer;

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

/// Main error type for all strata operations.
#[derive(Error, Debug)]
pub enum StrataError {
    /// Input was rejected before any work was done.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
    },

    /// Entity or review entry does not exist.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        entity_id: Option<String>,
    },

    /// Regression or layer skip.
    #[error("Illegal transition {from} -> {to}: {message}")]
    IllegalTransition {
        message: String,
        code: ErrorCode,
        from: KnowledgeLayer,
        to: KnowledgeLayer,
    },

    /// Graph backend, event bus or terminology service failed.
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValEmptyInput,
    ValOutOfRange,
    ValWeightMismatch,
    ValInvalidInput,

    // Lookup (NF_xxx)
    EntityNotFound,
    ReviewNotFound,
    RecordNotFound,

    // Transition (TRN_xxx)
    TrnRegression,
    TrnLayerSkip,

    // Backend (BCK_xxx)
    BckOperationFailed,
    BckTimeout,
    BckTerminologyFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValEmptyInput => "VAL_001",
            ErrorCode::ValOutOfRange => "VAL_002",
            ErrorCode::ValWeightMismatch => "VAL_003",
            ErrorCode::ValInvalidInput => "VAL_004",
            ErrorCode::EntityNotFound => "NF_001",
            ErrorCode::ReviewNotFound => "NF_002",
            ErrorCode::RecordNotFound => "NF_003",
            ErrorCode::TrnRegression => "TRN_001",
            ErrorCode::TrnLayerSkip => "TRN_002",
            ErrorCode::BckOperationFailed => "BCK_001",
            ErrorCode::BckTimeout => "BCK_002",
            ErrorCode::BckTerminologyFailed => "BCK_003",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl StrataError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
        }
    }

    /// Create an invalid argument error for an empty collection.
    pub fn empty_input(what: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: format!("{} must not be empty", what.into()),
            code: ErrorCode::ValEmptyInput,
            details: HashMap::new(),
        }
    }

    /// Create an invalid argument error for a value outside its allowed range.
    pub fn out_of_range(name: &str, value: f64, range: &str) -> Self {
        let mut details = HashMap::new();
        details.insert("value".to_string(), value.to_string());
        details.insert("range".to_string(), range.to_string());
        Self::InvalidArgument {
            message: format!("{} = {} is outside {}", name, value, range),
            code: ErrorCode::ValOutOfRange,
            details,
        }
    }

    /// Create an invalid argument error for weights that do not fit the inputs.
    pub fn weight_mismatch(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            code: ErrorCode::ValWeightMismatch,
            details: HashMap::new(),
        }
    }

    /// Create a not found error for an entity.
    pub fn not_found(entity_id: impl Into<String>) -> Self {
        let id = entity_id.into();
        Self::NotFound {
            message: format!("Entity with id '{}' not found", id),
            code: ErrorCode::EntityNotFound,
            entity_id: Some(id),
        }
    }

    /// Create a not found error for an id that is not in the review queue.
    pub fn review_not_found(entity_id: impl Into<String>) -> Self {
        let id = entity_id.into();
        Self::NotFound {
            message: format!("No pending review for entity '{}'", id),
            code: ErrorCode::ReviewNotFound,
            entity_id: Some(id),
        }
    }

    /// Create a not found error for a transition record.
    pub fn record_not_found(record_id: impl Into<String>) -> Self {
        Self::NotFound {
            message: format!("Transition record '{}' not found", record_id.into()),
            code: ErrorCode::RecordNotFound,
            entity_id: None,
        }
    }

    /// Create an illegal transition error, picking the code from the direction.
    pub fn illegal_transition(from: KnowledgeLayer, to: KnowledgeLayer) -> Self {
        let (code, message) = if to.rank() <= from.rank() {
            (
                ErrorCode::TrnRegression,
                "target layer does not rank above the source layer".to_string(),
            )
        } else {
            let message = match from.next() {
                Some(next) => format!("layers cannot be skipped, only {} -> {} is allowed", from, next),
                None => format!("{} is the top layer", from),
            };
            (ErrorCode::TrnLayerSkip, message)
        };
        Self::IllegalTransition {
            message,
            code,
            from,
            to,
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: ErrorCode::BckOperationFailed,
            source: None,
        }
    }

    /// Create a backend error wrapping a source error.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            code: ErrorCode::BckOperationFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Create a backend timeout error.
    pub fn timeout(operation: &str, millis: u64) -> Self {
        Self::Backend {
            message: format!("{} timed out after {}ms", operation, millis),
            code: ErrorCode::BckTimeout,
            source: None,
        }
    }

    /// Create a terminology service error.
    pub fn terminology(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: ErrorCode::BckTerminologyFailed,
            source: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::IllegalTransition { code, .. } => *code,
            Self::Backend { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error is a typed "not found" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument { code: ErrorCode::ValEmptyInput, .. } => {
                Some("Provide at least one confidence value")
            }
            Self::InvalidArgument { code: ErrorCode::ValWeightMismatch, .. } => {
                Some("Pass one non-negative weight per input, or omit weights")
            }
            Self::NotFound { code: ErrorCode::ReviewNotFound, .. } => {
                Some("List pending reviews to see which ids are queued")
            }
            Self::NotFound { .. } => Some("Check the entity id and ensure it exists"),
            Self::IllegalTransition { .. } => {
                Some("Promote one layer at a time, in PERCEPTION -> APPLICATION order")
            }
            Self::Backend { code: ErrorCode::BckTimeout, .. } => {
                Some("Retry through a promotion scan once the backend recovers")
            }
            Self::Backend { .. } => Some("Check the graph backend connection"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_error() {
        let err = StrataError::invalid_argument("bad input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_review_not_found_is_typed() {
        let err = StrataError::review_not_found("ent-1");
        assert!(err.is_not_found());
        assert_eq!(err.code(), ErrorCode::ReviewNotFound);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_illegal_transition_codes() {
        let regression =
            StrataError::illegal_transition(KnowledgeLayer::Reasoning, KnowledgeLayer::Semantic);
        assert_eq!(regression.code(), ErrorCode::TrnRegression);

        let skip =
            StrataError::illegal_transition(KnowledgeLayer::Perception, KnowledgeLayer::Reasoning);
        assert_eq!(skip.code(), ErrorCode::TrnLayerSkip);
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ValEmptyInput.as_str(), "VAL_001");
        assert_eq!(ErrorCode::BckTimeout.as_str(), "BCK_002");
    }
}
