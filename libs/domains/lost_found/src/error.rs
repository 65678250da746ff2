use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ItemStatus;

/// Coarse classification of [`LifecycleError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced item or admin record is missing
    NotFound,
    /// The operation is not allowed in the current state
    Precondition,
    /// No eligible found item exists to link with
    NoCandidates,
    /// Underlying read or write failed
    Storage,
    /// Malformed input
    Validation,
    /// Missing identity or privilege
    Auth,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("Linked item not found: {0}")]
    LinkedItemNotFound(Uuid),

    #[error("Admin not found: {0}")]
    AdminNotFound(String),

    #[error("Cannot change status from {from} to {to}: {hint}")]
    InvalidTransition {
        from: ItemStatus,
        to: ItemStatus,
        hint: &'static str,
    },

    #[error("Item {id} is not eligible: {reason}")]
    NotEligible { id: Uuid, reason: &'static str },

    #[error("Item {0} is not linked")]
    NotLinked(Uuid),

    #[error("{0} is already an admin")]
    AlreadyAdmin(String),

    #[error("Admins cannot revoke their own privileges")]
    SelfRevocation,

    #[error("Another operation on item {0} is in progress")]
    OperationInProgress(Uuid),

    #[error("Item {0} changed since it was read; reload and retry")]
    StaleSnapshot(Uuid),

    #[error("No eligible found items to link with {0}")]
    NoCandidates(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Partial write: updated {completed:?}, failed on {failed}: {reason}")]
    PartialWrite {
        completed: Vec<Uuid>,
        failed: Uuid,
        reason: String,
    },
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ItemNotFound(_) | Self::LinkedItemNotFound(_) | Self::AdminNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidTransition { .. }
            | Self::NotEligible { .. }
            | Self::NotLinked(_)
            | Self::AlreadyAdmin(_)
            | Self::SelfRevocation
            | Self::OperationInProgress(_)
            | Self::StaleSnapshot(_) => ErrorKind::Precondition,
            Self::NoCandidates(_) => ErrorKind::NoCandidates,
            Self::Database(_) | Self::PartialWrite { .. } => ErrorKind::Storage,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized(_) | Self::Forbidden(_) => ErrorKind::Auth,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        let message = err.to_string();
        match err {
            LifecycleError::Unauthorized(msg) => AppError::Unauthorized(msg),
            LifecycleError::Forbidden(msg) => AppError::Forbidden(msg),
            LifecycleError::Database(msg) => AppError::Database(msg),
            LifecycleError::PartialWrite { .. } => AppError::PartialWrite(message),
            other => match other.kind() {
                ErrorKind::NotFound => AppError::NotFound(message),
                ErrorKind::NoCandidates => AppError::UnprocessableEntity(message),
                ErrorKind::Validation => AppError::BadRequest(message),
                _ => AppError::Conflict(message),
            },
        }
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

impl From<mongodb::error::Error> for LifecycleError {
    fn from(err: mongodb::error::Error) -> Self {
        LifecycleError::Database(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for LifecycleError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        LifecycleError::Database(err.to_string())
    }
}
