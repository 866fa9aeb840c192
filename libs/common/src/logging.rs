//! Unified logging module for dispatch services
//!
//! Console output plus a daily rolling log file per service, with a reloadable
//! filter so the level can be changed at runtime.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use errors::{ServiceError, ServiceResult};

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "DISPATCH_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Service started`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Global guard keeping the non-blocking file writer alive
static GUARDS: OnceLock<Arc<Mutex<Vec<WorkerGuard>>>> = OnceLock::new();

type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

// ============================================================================
// Log Root Directory Configuration
// ============================================================================

/// Global log root directory (initialized once from config or env)
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory from config or environment
///
/// Priority:
/// 1. `DISPATCH_LOG_DIR` environment variable (highest)
/// 2. `config_dir` parameter
/// 3. Default value "logs" (lowest)
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                config_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs"))
            })
    });
}

/// Get log root directory
///
/// Falls back to the environment or "logs" when `init_log_root` was never called.
/// Under `cargo test` the system temp directory is used instead.
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                if is_test_environment() {
                    std::env::temp_dir().join("dispatch-test-logs")
                } else {
                    PathBuf::from("logs")
                }
            })
    })
}

/// Detect if we're running in a test environment
fn is_test_environment() -> bool {
    if std::env::var("CARGO_TARGET_TMPDIR").is_ok() {
        return true;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(path_str) = exe.to_str() {
            if path_str.contains("target/debug/deps") || path_str.contains("target/release/deps") {
                return true;
            }
        }
    }

    false
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "dispatchsrv")
    pub service_name: String,
    /// Directory for this service's log files
    pub log_dir: PathBuf,
    /// Console log level
    pub console_level: Level,
    /// Verbose mode: the service's own target logs at DEBUG
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "service".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            debug: false,
        }
    }
}

/// Build the initial filter string
///
/// `RUST_LOG` wins when set; otherwise the console level applies globally and
/// the service target is raised to DEBUG in verbose mode.
fn initial_filter(config: &LogConfig) -> String {
    if let Ok(env_str) = std::env::var("RUST_LOG") {
        return env_str;
    }
    let base = config.console_level.as_str().to_lowercase();
    if config.debug {
        format!("{},{}=debug", base, config.service_name)
    } else {
        base
    }
}

/// Initialize the logging system with the given configuration
pub fn init_with_config(config: LogConfig) -> ServiceResult<()> {
    fs::create_dir_all(&config.log_dir)?;

    let file_appender = tracing_appender::rolling::daily(
        &config.log_dir,
        format!("{}.log", config.service_name),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let guards = GUARDS.get_or_init(|| Arc::new(Mutex::new(Vec::new())));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => {
            eprintln!("Warning: GUARDS lock was poisoned, recovering...");
            poisoned.into_inner().push(guard);
        },
    }

    let filter_str = initial_filter(&config);
    let env_filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| ServiceError::Configuration(format!("Invalid log filter: {}", e)))?;

    let (reload_filter, reload_handle) = reload::Layer::new(env_filter);
    let _ = LOG_FILTER_HANDLE.set(reload_handle);
    let _ = CURRENT_LOG_LEVEL.set(Mutex::new(filter_str));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(BracketedLevelFormat)
        .boxed();

    tracing_subscriber::registry()
        .with(reload_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ServiceError::Internal(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

/// Dynamically set log filter level at runtime
///
/// Accepts a plain level ("debug") or a full filter spec ("info,dispatchsrv=debug").
pub fn set_log_level(level: &str) -> Result<(), String> {
    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or("Logging not initialized with reload support")?;

    let new_filter =
        EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e))?;

    handle
        .reload(new_filter)
        .map_err(|e| format!("Failed to reload log filter: {}", e))?;

    if let Some(current) = CURRENT_LOG_LEVEL.get() {
        if let Ok(mut guard) = current.lock() {
            *guard = level.to_string();
        }
    }

    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Get current log filter level
pub fn get_log_level() -> String {
    CURRENT_LOG_LEVEL
        .get()
        .and_then(|m| m.lock().ok())
        .map(|guard| guard.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }

    #[test]
    fn test_initial_filter_debug_mode() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LogConfig {
            service_name: "dispatchsrv".to_string(),
            debug: true,
            ..Default::default()
        };
        assert_eq!(initial_filter(&config), "info,dispatchsrv=debug");

        let quiet = LogConfig {
            debug: false,
            console_level: Level::WARN,
            ..config
        };
        assert_eq!(initial_filter(&quiet), "warn");
    }

    #[test]
    fn test_log_root_in_tests() {
        let root = get_log_root();
        assert!(!root.as_os_str().is_empty());
    }

    #[test]
    fn test_set_log_level_without_init() {
        if LOG_FILTER_HANDLE.get().is_none() {
            assert!(set_log_level("debug").is_err());
        }
    }
}
