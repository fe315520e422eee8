use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    /// 403 carrying a machine-readable `code` next to the message.
    #[error("Access denied ({code}): {message}")]
    AccessDenied { code: &'static str, message: String },

    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(..) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::RedisError(_)
            | AppError::EmailError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
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

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side failures are logged here and reach the client as a generic message.
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let (error, code, details, retry_after) = match self {
            AppError::ValidationError(err) => (
                "Validation error".to_string(),
                None,
                Some(err.to_string()),
                None,
            ),
            AppError::BadRequest(err)
            | AppError::NotFound(err)
            | AppError::Unauthorized(err)
            | AppError::Forbidden(err)
            | AppError::AuthError(err)
            | AppError::Conflict(err) => (err.to_string(), None, None, None),
            AppError::AccessDenied { code, message } => (message, Some(code), None, None),
            AppError::TooManyRequests(msg, retry) => (msg, None, None, retry),
            AppError::ServiceUnavailable => ("Service unavailable".to_string(), None, None, None),
            AppError::InternalError(_) => ("Internal server error".to_string(), None, None, None),
            AppError::DatabaseError(_) => ("Database error".to_string(), None, None, None),
            AppError::RedisError(_) => ("Cache error".to_string(), None, None, None),
            AppError::EmailError(_) => ("Email error".to_string(), None, None, None),
            AppError::ConfigError(_) => ("Configuration error".to_string(), None, None, None),
        };

        let mut res = (
            status,
            Json(ErrorBody {
                error,
                code,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}
