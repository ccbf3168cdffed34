//! Structured error types for API responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    NoFieldsToUpdate,
    MalformedBody,

    // Not found errors
    TaskNotFound,
    CarNotFound,
    MechanicNotFound,
    PunchNotFound,
    SessionNotFound,

    // Conflict errors
    AlreadyActive,
    AlreadyClosed,
    AlreadyExists,

    // Admin secret mismatch
    Unauthorized,

    // Internal errors
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    /// HTTP status this code maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::NoFieldsToUpdate
            | ErrorCode::MalformedBody
            | ErrorCode::AlreadyActive
            | ErrorCode::AlreadyClosed
            | ErrorCode::AlreadyExists => StatusCode::BAD_REQUEST,
            ErrorCode::TaskNotFound
            | ErrorCode::CarNotFound
            | ErrorCode::MechanicNotFound
            | ErrorCode::PunchNotFound
            | ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Structured error returned by store operations and API handlers.
#[derive(Debug, Serialize, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn no_fields() -> Self {
        Self::new(ErrorCode::NoFieldsToUpdate, "No fields to update")
    }

    pub fn task_not_found(id: i64) -> Self {
        Self::new(ErrorCode::TaskNotFound, format!("Task not found: {}", id))
    }

    pub fn car_not_found(id: i64) -> Self {
        Self::new(ErrorCode::CarNotFound, format!("Car not found: {}", id))
    }

    pub fn mechanic_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::MechanicNotFound,
            format!("Mechanic not found: {}", name),
        )
    }

    /// A referenced car that does not exist, reported as bad input.
    pub fn unknown_car(id: i64) -> Self {
        Self::invalid_value("car_id", format!("Car not found: {}", id))
    }

    /// A referenced punch that does not exist, reported as bad input.
    pub fn unknown_punch(id: i64) -> Self {
        Self::invalid_value("punch_id", format!("Punch not found: {}", id))
    }

    pub fn punch_not_found(id: i64) -> Self {
        Self::new(ErrorCode::PunchNotFound, format!("Punch not found: {}", id))
    }

    pub fn session_not_found(id: i64) -> Self {
        Self::new(
            ErrorCode::SessionNotFound,
            format!("Car work session not found: {}", id),
        )
    }

    pub fn already_active(mechanic: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyActive,
            format!(
                "Mechanic {} already has an active punch. Please punch out first.",
                mechanic
            ),
        )
    }

    pub fn already_working(mechanic: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyActive,
            format!(
                "Mechanic {} already working on another car. Please end current session first.",
                mechanic
            ),
        )
    }

    pub fn already_closed(what: &str, id: i64) -> Self {
        Self::new(
            ErrorCode::AlreadyClosed,
            format!("{} {} is already closed", what, id),
        )
    }

    pub fn already_exists(what: &str, key: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("{} already exists: {}", what, key),
        )
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Invalid password")
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn is_internal(&self) -> bool {
        self.code.status().is_server_error()
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service_err) => service_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(sql_err) => ServiceError::database(sql_err),
                Err(err) => ServiceError::internal(format!("{:#}", err)),
            },
        }
    }
}

/// Prefix axum puts in front of serde's `path: message` detail.
const DATA_ERROR_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// Map a deserialization failure to the field it concerns.
///
/// serde reports `status: unknown variant ...` for a bad value and
/// ``missing field `title` `` (with no path) for an absent required field.
fn body_data_error(body_text: &str) -> ServiceError {
    let detail = body_text.strip_prefix(DATA_ERROR_PREFIX).unwrap_or(body_text);

    if let Some(field) = missing_field_name(detail) {
        return ServiceError::missing_field(field);
    }
    match detail.split_once(": ") {
        Some((path, reason)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            ServiceError::invalid_value(path, format!("Invalid value for {}: {}", path, reason))
        }
        _ => ServiceError::new(ErrorCode::InvalidFieldValue, detail),
    }
}

fn missing_field_name(detail: &str) -> Option<&str> {
    const MARKER: &str = "missing field `";
    let start = detail.find(MARKER)? + MARKER.len();
    detail[start..].split('`').next().filter(|f| !f.is_empty())
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => body_data_error(&err.body_text()),
            JsonRejection::JsonSyntaxError(err) => {
                ServiceError::new(ErrorCode::MalformedBody, err.body_text())
            }
            JsonRejection::MissingJsonContentType(_) => ServiceError::new(
                ErrorCode::MalformedBody,
                "Content-Type must be application/json",
            ),
            other => ServiceError::new(ErrorCode::MalformedBody, other.body_text()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if self.is_internal() {
            // Details stay in the server log.
            tracing::error!(code = ?self.code, error = %self.message, "Request failed");
            let body = serde_json::json!({ "error": "Internal server error" });
            return (status, Json(body)).into_response();
        }

        tracing::debug!(code = ?self.code, error = %self.message, "Request rejected");
        let mut body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        if let Some(field) = self.field {
            body["field"] = serde_json::Value::String(field);
        }
        (status, Json(body)).into_response()
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
