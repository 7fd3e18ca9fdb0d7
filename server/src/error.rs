//! Error taxonomy of the ground-service core

use crate::store::StoreError;
use dronepost_shared::{CommandStatus, ErrorKind, ParamError};
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input; the caller can fix it
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// No GPS log sample inside the correlation window
    #[error("no coordinate log within {window_ms} ms of {trigger}")]
    NoMatchingLog { trigger: u64, window_ms: u64 },

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: CommandStatus,
        to: CommandStatus,
    },

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    /// Wire category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::NoMatchingLog { .. } => ErrorKind::NoMatchingLog,
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { table, id } => CoreError::NotFound(format!("{table} record {id}")),
            other => CoreError::Storage(other),
        }
    }
}

impl From<ParamError> for CoreError {
    fn from(err: ParamError) -> Self {
        CoreError::Validation(err.to_string())
    }
}
