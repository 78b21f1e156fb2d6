//! Unified error handling for the ingestion-association pipeline.

use crate::models::association::AttemptRecord;

/// Pipeline error type covering the failure taxonomy of every stage.
///
/// Malformed top-level input and boundary validation failures are fatal
/// and rejected before any processing; per-record parse problems are not
/// errors at all (they are dropped records carried in the parse outcome).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid object URI: {0}")]
    Uri(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "Association failed after {} attempts: {}",
        .attempts.len(),
        .attempts.last().map(|a| a.message.as_str()).unwrap_or("no attempts made")
    )]
    AssociationExhausted { attempts: Vec<AttemptRecord> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Check if this error represents an exhausted association retry budget.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::AssociationExhausted { .. })
    }

    /// Check if this error is fatal at the step boundary (no retry).
    pub fn is_fatal_input(&self) -> bool {
        matches!(self, Self::MalformedInput(_) | Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::association::AttemptErrorKind;

    #[test]
    fn malformed_input_is_fatal() {
        let err = PipelineError::MalformedInput("not a JSON array".to_string());
        assert!(err.is_fatal_input());
        assert!(!err.is_retry_exhausted());
    }

    #[test]
    fn exhausted_display_reports_attempt_count_and_last_error() {
        let err = PipelineError::AssociationExhausted {
            attempts: vec![
                AttemptRecord {
                    attempt: 1,
                    kind: AttemptErrorKind::Invocation,
                    message: "timeout".to_string(),
                },
                AttemptRecord {
                    attempt: 2,
                    kind: AttemptErrorKind::InvalidResponse,
                    message: "not valid JSON".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 attempts"));
        assert!(msg.contains("not valid JSON"));
    }

    #[test]
    fn validation_display() {
        let err = PipelineError::Validation("assessmentId must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: assessmentId must not be empty"
        );
    }
}
