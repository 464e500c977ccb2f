//! Error kinds callers tell apart.
//!
//! Everything travels as `anyhow::Error`; the types here are attached so the
//! CLI and the HTTP layer can classify with `downcast_ref` instead of
//! matching on message text.

use shelf_core::store::StoreError;

use crate::optimistic::SaveError;

/// User input rejected before anything was written.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

pub fn invalid(message: impl Into<String>) -> anyhow::Error {
    ValidationError(message.into()).into()
}

/// Coarse classification used for exit messages and HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PermissionDenied,
    NotFound,
    Internal,
}

pub fn classify(err: &anyhow::Error) -> ErrorKind {
    if err.downcast_ref::<ValidationError>().is_some() {
        return ErrorKind::Validation;
    }
    if err.downcast_ref::<SaveError>().is_some() || StoreError::is_permission_denied(err) {
        return ErrorKind::PermissionDenied;
    }
    if StoreError::is_not_found(err) {
        return ErrorKind::NotFound;
    }
    ErrorKind::Internal
}
