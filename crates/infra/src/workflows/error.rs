use std::time::Duration;

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

/// Error returned by workflow services.
///
/// Everything except `PartialFailure` means nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The action is not allowed in the document's current state.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Concurrent writers kept winning until retries ran out.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// Some steps may have been applied. Retrying the same action is safe.
    #[error("partial failure during {stage}: {message}")]
    PartialFailure {
        stage: &'static str,
        message: String,
    },
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::Invariant(msg),
            DomainError::NotFound(msg) => Self::NotFound(msg),
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Backend(msg) => Self::Store(msg),
            StoreError::Timeout(after) => Self::Timeout(after),
            StoreError::CommitOutcomeUnknown(message) => Self::PartialFailure {
                stage: "commit",
                message,
            },
        }
    }
}

impl WorkflowError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Invariant(_) => "invariant",
            Self::Conflict(_) => "conflict",
            Self::Store(_) => "store",
            Self::Timeout(_) => "timeout",
            Self::PartialFailure { .. } => "partial_failure",
        }
    }
}
