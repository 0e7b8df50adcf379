use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The connection pool could not be built.
    #[error("Pool build error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No valid session accompanied the request.
    #[error("Unauthorized")]
    Unauthenticated,

    /// A login attempt with an unknown username or wrong password.
    #[error("Invalid credentials.")]
    InvalidCredentials,

    /// The session is valid but its role may not perform the action.
    #[error("Forbidden")]
    Forbidden,

    /// A resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A validation error that carries per-item details.
    #[error("Validation error: {message}")]
    ValidationDetails {
        message: String,
        details: serde_json::Value,
    },

    /// The request body (or part of it) is larger than allowed.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: u64,
    },
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Shorthand for the generic "not found" used by entry routes.
    pub fn entry_not_found() -> Self {
        AppError::NotFound("Entry not found".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut details = None;

        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool build error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::Unauthenticated => {
                tracing::warn!("Request without a valid session");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }

            AppError::InvalidCredentials => {
                tracing::warn!("Login rejected");
                (StatusCode::UNAUTHORIZED, "Invalid credentials.".to_string())
            }

            AppError::Forbidden => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::NotFound(msg) => {
                tracing::debug!("Resource not found: {}", msg);
                (StatusCode::NOT_FOUND, msg)
            }

            AppError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }

            AppError::ValidationDetails { message, details: extra } => {
                tracing::debug!("Validation error: {}", message);
                details = Some(extra);
                (StatusCode::BAD_REQUEST, message)
            }

            AppError::PayloadTooLarge(msg) => {
                tracing::warn!("Payload too large: {}", msg);
                (StatusCode::PAYLOAD_TOO_LARGE, msg)
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::RateLimited { message, retry_after: seconds } => {
                tracing::warn!("Rate limit exceeded: {} (retry in {}s)", message, seconds);
                retry_after = Some(seconds);
                (StatusCode::TOO_MANY_REQUESTS, message)
            }
        };

        let body = match details {
            Some(details) => serde_json::to_string(&serde_json::json!({
                "error": message,
                "details": details,
            }))
            .ok(),
            None => sonic_rs::to_string(&sonic_rs::json!({
                "error": message
            }))
            .ok(),
        }
        .unwrap_or_else(|| r#"{"error":"Internal server error"}"#.to_string());

        let mut response = (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}
