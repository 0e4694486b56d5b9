use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::membership::MembershipError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend failed in a way retrying will not fix.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// No identity could be established for the caller.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Identity is known but not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {message}")]
    InvalidInput {
        field: Option<String>,
        message: String,
    },
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("lobby full: {0}")]
    LobbyFull(String),
    #[error("lobby closed: {0}")]
    LobbyClosed(String),
    /// Lock contention, store timeout or retry budget exhausted.
    #[error("temporarily unavailable: {0}")]
    Transient(String),
}

impl ServiceError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::InvalidInput {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            ServiceError::Transient(err.to_string())
        } else {
            ServiceError::Unavailable(err)
        }
    }
}

impl From<MembershipError> for ServiceError {
    fn from(err: MembershipError) -> Self {
        let message = err.to_string();
        match err {
            MembershipError::Validation { field, reason } => {
                ServiceError::invalid_field(field, reason)
            }
            MembershipError::NotFound { .. } => ServiceError::NotFound(message),
            MembershipError::Closed { .. } => ServiceError::LobbyClosed(message),
            MembershipError::Full { .. } => ServiceError::LobbyFull(message),
            MembershipError::Forbidden(reason) => ServiceError::Forbidden(reason),
            MembershipError::Store(source) => source.into(),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        let mut fields: Vec<(String, String)> = err
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let reason = errors
                    .first()
                    .map(|error| match &error.message {
                        Some(message) => message.to_string(),
                        None => error.code.to_string(),
                    })
                    .unwrap_or_else(|| "is invalid".into());
                (camel_case(&field), reason)
            })
            .collect();
        fields.sort();

        match fields.into_iter().next() {
            Some((field, reason)) => ServiceError::invalid_field(field, reason),
            None => ServiceError::InvalidInput {
                field: None,
                message: format!("validation failed: {err}"),
            },
        }
    }
}

/// `max_players` -> `maxPlayers`, matching the wire names.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {message}")]
    BadRequest {
        field: Option<String>,
        message: String,
    },
    /// Missing or unknown caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current lobby state.
    #[error("conflict: {message}")]
    Conflict { code: &'static str, message: String },
    /// Service unavailable, degraded or momentarily contended.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { code: &'static str, message: String },
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable {
                code: "unavailable",
                message: source.to_string(),
            },
            ServiceError::Degraded => AppError::ServiceUnavailable {
                code: "unavailable",
                message: "degraded mode".into(),
            },
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput { field, message } => {
                AppError::BadRequest { field, message }
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::LobbyFull(message) => AppError::Conflict {
                code: "lobby_full",
                message,
            },
            ServiceError::LobbyClosed(message) => AppError::Conflict {
                code: "lobby_closed",
                message,
            },
            ServiceError::Transient(message) => AppError::ServiceUnavailable {
                code: "transient",
                message,
            },
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::from(err).into()
    }
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code such as `lobby_full` or `validation_error`.
    pub code: String,
    pub message: String,
    /// Offending field for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, code),
            AppError::ServiceUnavailable { code, .. } => (StatusCode::SERVICE_UNAVAILABLE, code),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();
        let field = match &self {
            AppError::BadRequest { field, .. } => field.clone(),
            _ => None,
        };

        let payload = Json(ErrorBody {
            code: code.into(),
            message: self.to_string(),
            field,
        });

        (status, payload).into_response()
    }
}
