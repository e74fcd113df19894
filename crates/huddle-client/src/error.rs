//! Client error types.

use huddle_commands::ParameterValidationError;
use huddle_core::{AckError, ConnectionError, JoinError, LeaveError, TimeoutError};
use thiserror::Error;

use crate::collaborators::CollaboratorError;

/// Why a command did not execute.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Parameters failed re-validation
    #[error(transparent)]
    Validation(#[from] ParameterValidationError),

    /// Command could not be sent
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Server never acknowledged the command
    #[error("timed out")]
    Timeout(TimeoutError),

    /// Server refused the command
    #[error("rejected: {reason}")]
    Rejected {
        /// Reason given by the server
        reason: String,
    },

    /// Command was confirmed but its collaborator failed
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl ExecutionError {
    /// Whether the server never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<AckError> for ExecutionError {
    fn from(err: AckError) -> Self {
        match err {
            AckError::Timeout(timeout) => Self::Timeout(timeout),
            AckError::Rejected { reason } => Self::Rejected { reason },
        }
    }
}

/// Errors surfaced by [`crate::Client`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Connection or frame failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Join failure
    #[error(transparent)]
    Join(#[from] JoinError),

    /// Leave failure
    #[error(transparent)]
    Leave(#[from] LeaveError),

    /// Command failure
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
