use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Stable error name, human readable message and optional attributes
/// carried by every client-facing error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.attributes.insert(key.into(), value);
        self
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(ErrorDetail),

    #[error("Malformed credential: {0}")]
    MalformedCredential(ErrorDetail),

    #[error("Permission denied: {0}")]
    PermissionDenied(ErrorDetail),

    #[error("Not found: {0}")]
    NotFound(ErrorDetail),

    #[error("Invalid argument: {0}")]
    InvalidArgument(ErrorDetail),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(ErrorDetail),

    #[error("Conflict: {0}")]
    Conflict(ErrorDetail),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Taxonomy code reported in the `code` field of the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::MalformedCredential(_) => "malformed_credential",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::FailedPrecondition(_) => "failed_precondition",
            AppError::Conflict(_) => "conflict",
            AppError::ServiceUnavailable => "unavailable",
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                "internal"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) | AppError::MalformedCredential(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    name: String,
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let detail = match self {
            AppError::Unauthenticated(detail)
            | AppError::MalformedCredential(detail)
            | AppError::PermissionDenied(detail)
            | AppError::NotFound(detail)
            | AppError::InvalidArgument(detail)
            | AppError::FailedPrecondition(detail)
            | AppError::Conflict(detail) => detail,
            AppError::ServiceUnavailable => {
                ErrorDetail::new("unavailable", "Service unavailable")
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                ErrorDetail::new("internal", "Internal server error")
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ErrorDetail::new("database", "Database error")
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ErrorDetail::new("configuration", "Configuration error")
            }
        };

        (
            status,
            Json(ErrorResponse {
                code,
                name: detail.name,
                message: detail.message,
                attributes: detail.attributes,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let denied = AppError::PermissionDenied(ErrorDetail::new("missing_rights", "no"));
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(denied.code(), "permission_denied");

        let precondition =
            AppError::FailedPrecondition(ErrorDetail::new("entity_needs_collaborator", "no"));
        assert_eq!(precondition.status(), StatusCode::PRECONDITION_FAILED);

        let internal = AppError::InternalError(anyhow::anyhow!("boom"));
        assert_eq!(internal.code(), "internal");
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_detail_attributes() {
        let detail = ErrorDetail::new("missing_rights", "Missing rights")
            .with_attribute("missing_rights", vec!["APPLICATION_DELETE"]);

        assert_eq!(
            detail.attributes.get("missing_rights"),
            Some(&serde_json::json!(["APPLICATION_DELETE"]))
        );
        assert_eq!(detail.to_string(), "missing_rights: Missing rights");
    }
}
