use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

/// One variant per error kind in the kernel's error taxonomy. Boundary adapters map
/// these to HTTP status codes; internal layers never leak credentials, tokens,
/// hashes, stack traces, or paths through `message` (see [`sanitize`]).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("{0}")]
    BusinessRule(String),
    #[error("insufficient tokens")]
    InsufficientTokens,
    #[error("user is inactive")]
    UserInactive,
    #[error("user is blocked")]
    UserBlocked,
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("timed out")]
    Timeout,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },
    #[error("{0}")]
    Internal(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::MissingField(_) => "MissingField",
            AppError::InvalidFormat(_) => "InvalidFormat",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::TokenExpired => "TokenExpired",
            AppError::InvalidToken(_) => "InvalidToken",
            AppError::NotFound(_) => "NotFound",
            AppError::AlreadyExists(_) => "AlreadyExists",
            AppError::Conflict(_) => "Conflict",
            AppError::ConstraintViolation(_) => "ConstraintViolation",
            AppError::BusinessRule(_) => "BusinessRule",
            AppError::InsufficientTokens => "InsufficientTokens",
            AppError::UserInactive => "UserInactive",
            AppError::UserBlocked => "UserBlocked",
            AppError::ExternalService(_) => "ExternalService",
            AppError::Timeout => "Timeout",
            AppError::RateLimit { .. } => "RateLimit",
            AppError::Internal(_) => "Internal",
            AppError::Configuration(_) => "Configuration",
            AppError::NotImplemented(_) => "NotImplemented",
            AppError::Database(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::MissingField(_)
            | AppError::InvalidFormat(_)
            | AppError::BusinessRule(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::TokenExpired | AppError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) | AppError::UserBlocked => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ConstraintViolation(_) | AppError::InsufficientTokens | AppError::UserInactive => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Configuration(_) | AppError::Internal(_) | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Drops or replaces message content that looks like it carries credentials,
    /// tokens, hashes, stack traces, or filesystem paths before it reaches a client.
    fn sanitized_message(&self) -> String {
        let raw = match self {
            AppError::Database(_) => return "a database error occurred".to_string(),
            AppError::Configuration(_) | AppError::Internal(_) => {
                return "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        sanitize(&raw)
    }
}

/// Redacts substrings that look like secrets from an otherwise user-facing message.
pub fn sanitize(input: &str) -> String {
    const MARKERS: &[&str] = &[
        "password", "secret", "token", "hash", "bearer ", "/home/", "/root/", "at src/",
        "panicked at",
    ];
    let lowered = input.to_lowercase();
    if MARKERS.iter().any(|m| lowered.contains(m)) {
        return "request could not be processed".to_string();
    }
    input.to_string()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_) | AppError::Database(_) | AppError::Configuration(_)) {
            tracing::error!(error = %self, kind = self.kind(), "internal error surfaced to boundary");
        }

        let status = self.status();
        let kind = self.kind();
        let message = self.sanitized_message();

        let mut body = json!({
            "error": true,
            "type": kind,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });

        if let AppError::RateLimit { retry_after_secs } = &self {
            body["details"] = json!({ "retry_after": retry_after_secs });
        }

        (status, Json(body)).into_response()
    }
}
