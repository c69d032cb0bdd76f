use thiserror::Error;
use uuid::Uuid;

use copro_domain::{AmountError, IbanError, TransitionError};

/// Broad category of a [`CoreError`], used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    InUse,
    Consistency,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Cannot delete {entity} {id}: {reason}")]
    InUse {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error("Consistency check failed: {0}")]
    Consistency(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InUse { .. } => ErrorKind::InUse,
            CoreError::Consistency(_) => ErrorKind::Consistency,
            CoreError::Storage(_) | CoreError::Serde(_) | CoreError::Io(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Message suitable for end users. Validation and conflict errors keep their
    /// specific wording; lookups and blocked deletions stay generic.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(message) | CoreError::Conflict(message) => message.clone(),
            CoreError::NotFound { .. } => "not found".into(),
            CoreError::InUse { .. } => "cannot delete: still in use".into(),
            other => other.to_string(),
        }
    }
}

impl From<AmountError> for CoreError {
    fn from(err: AmountError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl From<IbanError> for CoreError {
    fn from(err: IbanError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl From<TransitionError> for CoreError {
    fn from(err: TransitionError) -> Self {
        CoreError::Conflict(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serde(err.to_string())
    }
}

impl From<csv::Error> for CoreError {
    fn from(err: csv::Error) -> Self {
        CoreError::Serde(err.to_string())
    }
}
