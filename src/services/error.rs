use crate::database::{DatabaseError, RecordError};
use crate::filter::FilterError;
use crate::plan::{FieldErrors, PlanError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("{message}")]
    Validation { message: String, field_errors: FieldErrors },

    /// Deliberately carries no detail; the reason is only logged.
    #[error("Permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.into())
    }
}

impl StoreError {
    pub fn validation(message: impl Into<String>, field_errors: FieldErrors) -> Self {
        StoreError::Validation {
            message: message.into(),
            field_errors,
        }
    }
}
