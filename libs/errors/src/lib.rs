//! Shared error layer for dispatch services
//!
//! Services keep their own domain error enums and implement [`ServiceErrorTrait`]
//! to get a uniform error code, category, retry policy and HTTP mapping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ErrorInfo - API error response type
// ============================================================================

/// Standard error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (HTTP status or custom)
    pub code: u16,
    /// Error message
    pub message: String,
    /// Detailed error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    /// Create a new ErrorInfo with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            details: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    /// Add details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// ServiceError - ambient errors raised by the shared libraries
// ============================================================================

/// Errors raised by the shared infrastructure (bootstrap, logging, config)
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ServiceErrorTrait for ServiceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

// ============================================================================
// Service Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and HTTP mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Timeout,

    // Business logic layer
    Validation,
    Permission,

    // Upstream layer
    Upstream,
    MalformedResponse,

    // System level
    Internal,
}

/// Error capability trait
///
/// Each service keeps its own domain error type and gains the common
/// outward-facing behavior by implementing this trait.
pub trait ServiceErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for API, logs)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::Upstream
        )
    }

    /// Convert to HTTP status code
    #[cfg(feature = "axum-support")]
    fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Permission => StatusCode::UNAUTHORIZED,
            ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCategory::Upstream | ErrorCategory::MalformedResponse => StatusCode::BAD_GATEWAY,
            ErrorCategory::Configuration | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Convert into an Axum HTTP response
    #[cfg(feature = "axum-support")]
    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    fn into_http_response(self) -> axum::response::Response
    where
        Self: Sized,
    {
        use axum::response::{IntoResponse, Json};
        use serde_json::json;

        (
            self.http_status(),
            Json(json!({
                "success": false,
                "error_code": self.error_code(),
                "message": self.to_string(),
                "category": format!("{:?}", self.category()),
                "retryable": self.is_retryable(),
            })),
        )
            .into_response()
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Configuration => Level::ERROR,
            ErrorCategory::Timeout | ErrorCategory::Upstream | ErrorCategory::MalformedResponse => {
                Level::WARN
            },
            ErrorCategory::Validation | ErrorCategory::Permission => Level::INFO,
        }
    }
}
