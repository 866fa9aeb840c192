//! Unified service bootstrap utilities
//!
//! Provides common initialization functionality for dispatch services,
//! including startup banners, logging initialization, and environment setup.

use crate::logging::{self, LogConfig};
use errors::ServiceResult;
use tracing::{info, Level};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "dispatchsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
    /// Default port
    pub default_port: u16,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ██████╗ ██╗███████╗██████╗  █████╗ ████████╗ ██████╗██╗  ██╗
 ██╔══██╗██║██╔════╝██╔══██╗██╔══██╗╚══██╔══╝██╔════╝██║  ██║
 ██║  ██║██║███████╗██████╔╝███████║   ██║   ██║     ███████║
 ██║  ██║██║╚════██║██╔═══╝ ██╔══██║   ██║   ██║     ██╔══██║
 ██████╔╝██║███████║██║     ██║  ██║   ██║   ╚██████╗██║  ██║
 ╚═════╝ ╚═╝╚══════╝╚═╝     ╚═╝  ╚═╝   ╚═╝    ╚═════╝╚═╝  ╚═╝
            "#;

    info!("{}", banner);
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
    info!("");
}

/// Initialize logging for a service with standard configuration
///
/// Log root directory priority:
/// 1. DISPATCH_LOG_DIR environment variable
/// 2. `log_dir` from the service configuration
/// 3. Default "logs"
pub fn init_logging(service: &ServiceInfo, log_dir: Option<&str>, debug: bool) -> ServiceResult<()> {
    logging::init_log_root(log_dir);

    let console_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        console_level,
        debug,
    };

    logging::init_with_config(log_config)
}

/// Load environment variables in development mode
///
/// In debug builds, reads .env file and sets environment variables.
/// In release builds, this is a no-op (production environments should set variables externally).
pub fn load_development_env() {
    #[cfg(debug_assertions)]
    {
        if let Ok(content) = std::fs::read_to_string(".env") {
            for line in content.lines() {
                let trimmed = line.trim();
                if trimmed.starts_with('#') || trimmed.is_empty() {
                    continue;
                }

                if let Some((key, value)) = trimmed.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"');

                    // Only set if not already set
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
        }
    }
}

/// Helper to get service port from configuration or environment
pub fn get_service_port(config_port: u16, service: &ServiceInfo) -> u16 {
    let is_default = config_port == 0 || config_port == service.default_port;

    if is_default {
        // Try SERVICE_PORT first (unified across all services)
        if let Ok(port) = std::env::var("SERVICE_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                return p;
            }
        }

        let env_var = format!("{}_PORT", service.name.to_uppercase());
        if let Ok(port) = std::env::var(&env_var) {
            if let Ok(p) = port.parse::<u16>() {
                return p;
            }
        }
    }

    if config_port > 0 {
        config_port
    } else {
        service.default_port
    }
}
