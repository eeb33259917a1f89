use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Wire shape of every error response: `{"error": ...}` plus optional
/// per-field details on validation failures.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
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

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation Error")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Permission denied.")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    // The API reports duplicates (email, participant) as 400, not 409.
    #[error("{0}")]
    Conflict(String),
    #[error("file I/O failed")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Validation Error".into(),
                    details: Some(details),
                },
            ),
            AppError::BadRequest(msg) | AppError::Conflict(msg) => {
                (StatusCode::BAD_REQUEST, plain(msg))
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, plain(msg)),
            AppError::Forbidden => (StatusCode::FORBIDDEN, plain("Permission denied.")),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, plain(msg)),
            AppError::Io(e) => {
                error!(error = %e, "file I/O failure");
                internal()
            }
            AppError::Database(e) => {
                error!(error = %e, "database failure");
                internal()
            }
            AppError::Internal(e) => {
                error!(error = %e, "unexpected failure");
                internal()
            }
        };
        (status, Json(body)).into_response()
    }
}

fn plain(msg: impl Into<String>) -> ErrorBody {
    ErrorBody {
        error: msg.into(),
        details: None,
    }
}

// Store and I/O internals must never reach the client.
fn internal() -> (StatusCode, ErrorBody) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        plain("Internal Server Error"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_body_includes_details() {
        let body = ErrorBody {
            error: "Validation Error".into(),
            details: Some(vec![FieldError::new("date", "Invalid date format")]),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("Validation Error"));
        assert!(json.contains("Invalid date format"));
    }

    #[test]
    fn plain_body_skips_details() {
        let json = serde_json::to_string(&plain("Event not found.")).unwrap();
        assert_eq!(json, r#"{"error":"Event not found."}"#);
    }
}
