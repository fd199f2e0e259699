use thiserror::Error;

use crate::keystroke::RecordError;
use crate::session::SessionState;

/// Errors surfaced by the assessment engine and its collaborators
#[derive(Debug, Error)]
pub enum AssessError {
    /// A lifecycle operation was attempted from a state that does not allow it.
    /// These are client errors and are never retried.
    #[error("cannot {operation} a session that is {from}")]
    InvalidStateTransition {
        from: SessionState,
        operation: &'static str,
    },

    #[error("deadline not reached yet ({remaining_ms} ms remaining)")]
    DeadlineNotReached { remaining_ms: u64 },

    #[error("invalid test definition: {0}")]
    Validation(String),

    #[error("rejected keystroke: {0}")]
    InvalidEvent(#[from] RecordError),

    /// Delivery to the backend failed; the payload can be resent unchanged
    #[error("delivery failed: {0}")]
    Network(String),

    #[error("unknown test id {0}")]
    UnknownTest(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl AssessError {
    /// Only transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssessError::Network(_))
    }
}

pub type Result<T, E = AssessError> = std::result::Result<T, E>;
