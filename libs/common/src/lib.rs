//! Dispatch basic library
//!
//! Provides basic functions shared by all services, including:
//! - logging and startup bootstrap
//! - layered configuration loading
//! - graceful shutdown
//! - API response types

pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod serde_helpers;
pub mod service_bootstrap;
pub mod shutdown;

// Re-export commonly used API types
pub use api_types::{
    ComponentHealth, ErrorInfo, ErrorResponse, HealthStatus, ServiceStatus, SuccessResponse,
};

// Re-export AppError when axum feature is enabled
#[cfg(feature = "axum")]
pub use api_types::AppError;

pub use config_loader::{load_layered, ConfigSources};

// Re-export common dependencies
pub use serde;
pub use serde_json;
pub use tokio;
