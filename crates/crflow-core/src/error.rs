//! Error types for crflow

use crate::request::Status;
use serde::Serialize;
use thiserror::Error;

/// A single failing input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request was well formed but the change request is not in a state
    /// that allows it.
    #[error("{reason} (status: {status})")]
    Precondition {
        reason: String,
        status: Status,
        count: Option<u32>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Store not initialized. Run 'crflow init' first.")]
    NotInitialized,

    #[error("Store already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Error::Forbidden(message.into())
    }

    pub fn precondition(reason: impl Into<String>, status: Status) -> Self {
        Error::Precondition {
            reason: reason.into(),
            status,
            count: None,
        }
    }

    pub fn revision_cap(reason: impl Into<String>, status: Status, count: u32) -> Self {
        Error::Precondition {
            reason: reason.into(),
            status,
            count: Some(count),
        }
    }

    /// Field errors, if this is a validation failure
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::Validation(fields) => fields,
            _ => &[],
        }
    }

    /// Status code a transport layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_)
            | Error::Precondition { .. }
            | Error::InvalidStatus(_)
            | Error::InvalidRole(_) => 400,
            Error::Forbidden(_) => 403,
            Error::NotFound { .. } => 404,
            Error::Store(StoreError::Conflict(_)) | Error::AlreadyInitialized(_) => 409,
            _ => 500,
        }
    }
}

/// Errors raised by a record store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("Record missing: {0}")]
    Missing(String),

    #[error("Corrupt record in {file}: {reason}")]
    Corrupt { file: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = Error::Validation(vec![
            FieldError::new("title", "must be at least 5 characters"),
            FieldError::new("background", "must be at least 20 characters"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("title: must be at least 5 characters"));
        assert!(msg.contains("background"));
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::invalid("notes", "too short").http_status(), 400);
        assert_eq!(Error::forbidden("nope").http_status(), 403);
        assert_eq!(Error::not_found("Change request", "CR-1").http_status(), 404);
        assert_eq!(
            Error::precondition("wrong state", Status::Draft).http_status(),
            400
        );
        assert_eq!(
            Error::Store(StoreError::Conflict("CR-2026-01-000001".into())).http_status(),
            409
        );
    }
}
