//! Errors surfaced by pairing operations.

use crate::generator::GenerateError;
use pairing_types::{GroupId, ParticipantId};
use thiserror::Error;

/// Failure of `create_run`, `retire_run`, `get_view`, or `run_history`.
///
/// Notification failures never appear here; they are logged and counted in
/// the operation's `NotificationReport`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("participant {requester} does not own group {group}")]
    NotOwner {
        group: GroupId,
        requester: ParticipantId,
    },

    /// Retire the current run before drawing again.
    #[error("group {0} already has an active pairing")]
    ActiveRunExists(GroupId),

    #[error("need at least {required} participants to draw, found {found}")]
    InsufficientParticipants { found: usize, required: usize },

    #[error("invalid roster: {0}")]
    InvalidRoster(String),

    #[error("group directory failure: {0}")]
    DirectoryFailure(String),

    /// Nothing was written; the operation can be retried as-is.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl PairingError {
    /// Whether retrying the same call may succeed without caller intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PairingError::PersistenceFailure(_) | PairingError::DirectoryFailure(_)
        )
    }
}

impl From<GenerateError> for PairingError {
    fn from(value: GenerateError) -> Self {
        match value {
            GenerateError::InsufficientParticipants { found, required } => {
                PairingError::InsufficientParticipants { found, required }
            }
            GenerateError::DuplicateParticipant(_) => PairingError::InvalidRoster(value.to_string()),
        }
    }
}

/// Result type for pairing operations.
pub type PairingResult<T> = Result<T, PairingError>;
