//! Error handling for the dispatch service
//!
//! One domain enum for the whole pipeline. Place resolution misses are not
//! errors and never show up here.

use axum::response::{IntoResponse, Response};
use errors::{ErrorCategory, ServiceError, ServiceErrorTrait};
use thiserror::Error;

/// Dispatch Service Error Type
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Caller secret missing or wrong
    #[error("Unauthorized")]
    Unauthorized,

    /// One channel answered non-2xx or could not be reached
    #[error("Upstream failure on {channel}: {reason}")]
    UpstreamFailure { channel: String, reason: String },

    /// Primary and backup alarm both failed
    #[error("Both channels failed (primary: {primary}; backup: {backup})")]
    BothChannelsFailed { primary: String, backup: String },

    /// Upstream answered 2xx with a body we cannot interpret
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedUpstreamResponse { endpoint: String, reason: String },

    /// Caller input rejected before anything is sent
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the dispatch service
pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    /// Upstream failure on a named channel or endpoint
    pub fn upstream(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamFailure {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Malformed body from a named endpoint
    pub fn malformed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUpstreamResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Map a reqwest error, keeping timeouts distinguishable
    pub fn from_reqwest(channel: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{} request timed out", channel))
        } else {
            Self::upstream(channel, err.to_string())
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ServiceError> for DispatchError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Io(e) => Self::Io(e),
            ServiceError::Serialization(msg) => Self::Serialization(msg),
            ServiceError::Internal(msg) => Self::Internal(msg),
            ServiceError::Configuration(msg) => Self::Config(msg),
        }
    }
}

impl ServiceErrorTrait for DispatchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "DISPATCH_UNAUTHORIZED",
            Self::UpstreamFailure { .. } => "DISPATCH_UPSTREAM_FAILURE",
            Self::BothChannelsFailed { .. } => "DISPATCH_BOTH_CHANNELS_FAILED",
            Self::MalformedUpstreamResponse { .. } => "DISPATCH_MALFORMED_RESPONSE",
            Self::Validation(_) => "DISPATCH_VALIDATION_ERROR",
            Self::Config(_) => "DISPATCH_CONFIG_ERROR",
            Self::Timeout(_) => "DISPATCH_TIMEOUT",
            Self::Serialization(_) => "DISPATCH_SERIALIZATION_ERROR",
            Self::Io(_) => "DISPATCH_IO_ERROR",
            Self::Internal(_) => "DISPATCH_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized => ErrorCategory::Permission,
            Self::UpstreamFailure { .. } | Self::BothChannelsFailed { .. } => {
                ErrorCategory::Upstream
            },
            Self::MalformedUpstreamResponse { .. } => ErrorCategory::MalformedResponse,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    fn is_retryable(&self) -> bool {
        // Both channels already tried once each
        match self {
            Self::BothChannelsFailed { .. } => false,
            _ => matches!(
                self.category(),
                ErrorCategory::Upstream | ErrorCategory::Timeout
            ),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self.log_level() {
            tracing::Level::ERROR => tracing::error!("{}", self),
            tracing::Level::WARN => tracing::warn!("{}", self),
            _ => tracing::debug!("{}", self),
        }
        self.into_http_response()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_unauthorized_maps_to_401() {
        let err = DispatchError::Unauthorized;
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert_eq!(err.http_status(), StatusCode::UNAUTHORIZED);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_both_failed_is_terminal() {
        let err = DispatchError::BothChannelsFailed {
            primary: "HTTP 500".into(),
            backup: "HTTP 503".into(),
        };
        assert_eq!(err.http_status(), StatusCode::BAD_GATEWAY);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_upstream_failure_is_retryable() {
        let err = DispatchError::upstream("triggerAlarm", "HTTP 500");
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "DISPATCH_UPSTREAM_FAILURE");
    }

    #[test]
    fn test_validation_maps_to_400() {
        let err = DispatchError::Validation("place is blank".into());
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_service_error_conversion() {
        let err: DispatchError =
            ServiceError::Configuration("Failed to load configuration: bad key".into()).into();
        assert!(matches!(err, DispatchError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Failed to load configuration: bad key"
        );
    }
}
