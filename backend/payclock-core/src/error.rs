// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

pub const UNKNOWN_USERNAME: &str = "The username does not exist.";
pub const WRONG_PASSWORD: &str = "The password is incorrect.";
pub const ALREADY_TIMED_IN: &str = "You are already time in.";
pub const ALREADY_TIMED_OUT: &str = "You are already time out.";
pub const NOT_TIMED_IN: &str = "You do not already time in.";
pub const REQUEST_FAILED: &str = "request failed.";
pub const REQUEST_SUCCESS: &str = "request success.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthField {
    Username,
    Password,
}

/// Discriminator reported to the caller for a rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Timein,
    Timeout,
    Payroll,
    Leave,
    Duplicate,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{message}")]
    Auth { field: AuthField, message: String },

    #[error("{message}")]
    Conflict { kind: ConflictKind, message: String },

    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ServiceError {
    pub fn unknown_username() -> Self {
        ServiceError::Auth {
            field: AuthField::Username,
            message: UNKNOWN_USERNAME.to_string(),
        }
    }

    pub fn wrong_password() -> Self {
        ServiceError::Auth {
            field: AuthField::Password,
            message: WRONG_PASSWORD.to_string(),
        }
    }

    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        ServiceError::Conflict {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        ServiceError::NotFound(format!("{} '{}' not found", what, id))
    }
}

/// Error body: `{"type": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

fn body(kind: impl Serialize, message: &str) -> ErrorBody {
    let kind = serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    ErrorBody {
        kind,
        message: message.to_string(),
    }
}

/// HTTP-facing error for the axum handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Service(ServiceError::Persistence(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Service(err) = self;
        match &err {
            ServiceError::Auth { field, message } => {
                warn!("Authentication rejected: Field={:?}, Msg={}", field, message);
                (StatusCode::UNAUTHORIZED, Json(body(field, message))).into_response()
            }
            ServiceError::Conflict { kind, message } => {
                warn!("Request conflict: Kind={:?}, Msg={}", kind, message);
                let status = match kind {
                    ConflictKind::Timein | ConflictKind::Timeout => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::CONFLICT,
                };
                (status, Json(body(kind, message))).into_response()
            }
            ServiceError::Validation { field, message } => {
                warn!("Validation failed: Field={}, Msg={}", field, message);
                (StatusCode::BAD_REQUEST, Json(body(field, message))).into_response()
            }
            ServiceError::Forbidden(message) => {
                warn!("Forbidden: {}", message);
                (StatusCode::FORBIDDEN, Json(body("forbidden", message))).into_response()
            }
            ServiceError::NotFound(message) => {
                warn!("Not found: {}", message);
                (StatusCode::NOT_FOUND, Json(body("notfound", message))).into_response()
            }
            ServiceError::Persistence(store_err) => {
                error!("Persistence failure: {}", store_err);
                (StatusCode::BAD_REQUEST, REQUEST_FAILED).into_response()
            }
        }
    }
}
