//! Dispatch service configuration
//!
//! Priority (highest first):
//! 1. Flat variables (`WEB_API_KEY`, `PRIVATE_AUTH_KEY`, `DEBUG`, ...)
//!    `DEBUG` is read leniently and never fails the load
//! 2. `DISPATCHSRV_` variables, nested with `__` (`DISPATCHSRV_HTTP__TIMEOUT_SECS=20`)
//! 3. YAML file (`config/dispatchsrv.yaml` or `--config`)
//! 4. Built-in defaults

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::config_loader::{load_layered, ConfigSources};
use common::serde_helpers::{bool_false, deserialize_bool_flexible};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DispatchError, Result};
use crate::roster::DEFAULT_WIDGET_BASE_URL;
use crate::transport::DEFAULT_ALARM_BASE_URL;

pub const SERVICE_NAME: &str = "dispatchsrv";
pub const DEFAULT_PORT: u16 = 6010;
pub const DEFAULT_CONFIG_PATH: &str = "config/dispatchsrv.yaml";
pub const ENV_PREFIX: &str = "DISPATCHSRV_";
/// JSON array of `{guid, name}` push groups
pub const GROUPS_ENV: &str = "GROUP_GUIDS_JSON";
/// Only `true` (any case) enables debug; other values such as `express:*` mean off
pub const DEBUG_ENV: &str = "DEBUG";

/// Flat variable names and the config keys they set
const ENV_ALIASES: &[(&str, &str)] = &[
    ("WEB_API_KEY", "credentials.signing_key"),
    ("WEB_API_TOKEN", "credentials.web_api_token"),
    ("SELECTIVE_CALL_CODE", "credentials.selective_call_code"),
    ("ACCESS_TOKEN", "credentials.access_token"),
    ("PRIVATE_AUTH_KEY", "credentials.caller_secret"),
    ("WEB_PASSWORD", "credentials.web_password"),
    ("DISPLAY_TOKEN", "credentials.display_token"),
    ("ORGANISATION_TOKEN", "credentials.organisation_token"),
    ("LEADER_NAME", "dispatch.leader_name"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    /// Push message targets offered to the operator
    #[serde(default)]
    pub groups: Vec<PushGroup>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Test keyword on every alarm and verbose logging
    #[serde(
        default = "bool_false",
        deserialize_with = "deserialize_bool_flexible"
    )]
    pub debug: bool,
}

fn default_service_name() -> String {
    SERVICE_NAME.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
        }
    }
}

/// Shared secrets, read once at startup
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// HMAC key for outbound signatures
    #[serde(default)]
    pub signing_key: String,
    #[serde(default)]
    pub web_api_token: String,
    #[serde(default)]
    pub selective_call_code: String,
    #[serde(default)]
    pub access_token: String,
    /// Inbound `securitykey`
    #[serde(default)]
    pub caller_secret: String,
    #[serde(default)]
    pub web_password: String,
    #[serde(default)]
    pub display_token: String,
    #[serde(default)]
    pub organisation_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "<unset>" } else { "***" };
        f.debug_struct("Credentials")
            .field("signing_key", &mask(&self.signing_key))
            .field("web_api_token", &mask(&self.web_api_token))
            .field("selective_call_code", &mask(&self.selective_call_code))
            .field("access_token", &mask(&self.access_token))
            .field("caller_secret", &mask(&self.caller_secret))
            .field("web_password", &mask(&self.web_password))
            .field("display_token", &mask(&self.display_token))
            .field("organisation_token", &mask(&self.organisation_token))
            .finish()
    }
}

impl Credentials {
    /// Flat variable names of every empty secret
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("WEB_API_KEY", &self.signing_key),
            ("WEB_API_TOKEN", &self.web_api_token),
            ("SELECTIVE_CALL_CODE", &self.selective_call_code),
            ("ACCESS_TOKEN", &self.access_token),
            ("PRIVATE_AUTH_KEY", &self.caller_secret),
            ("WEB_PASSWORD", &self.web_password),
            ("DISPLAY_TOKEN", &self.display_token),
            ("ORGANISATION_TOKEN", &self.organisation_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bound on every upstream call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// PEM bundle with client certificate and private key
    #[serde(default)]
    pub identity_pem: Option<PathBuf>,
    #[serde(default = "default_alarm_base_url")]
    pub alarm_base_url: String,
    #[serde(default = "default_widget_base_url")]
    pub widget_base_url: String,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_alarm_base_url() -> String {
    DEFAULT_ALARM_BASE_URL.to_string()
}

fn default_widget_base_url() -> String {
    DEFAULT_WIDGET_BASE_URL.to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            identity_pem: None,
            alarm_base_url: default_alarm_base_url(),
            widget_base_url: default_widget_base_url(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_live_keyword")]
    pub live_keyword: String,
    #[serde(default = "default_backup_keyword")]
    pub backup_keyword: String,
    /// Appended to the live keyword when leadership is notified
    #[serde(default = "default_leader_suffix")]
    pub leader_suffix: String,
    /// Label of the leadership switch
    #[serde(default)]
    pub leader_name: String,
}

fn default_live_keyword() -> String {
    "FR".to_string()
}

fn default_backup_keyword() -> String {
    crate::fallback::DEFAULT_BACKUP_KEYWORD.to_string()
}

fn default_leader_suffix() -> String {
    " + K".to_string()
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            live_keyword: default_live_keyword(),
            backup_keyword: default_backup_keyword(),
            leader_suffix: default_leader_suffix(),
            leader_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Start polling at boot instead of waiting for a foreground signal
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub autostart: bool,
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            autostart: false,
        }
    }
}

impl RosterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    #[serde(default = "default_places_path")]
    pub path: PathBuf,
}

fn default_places_path() -> PathBuf {
    PathBuf::from("data/places.json")
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            path: default_places_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushGroup {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log root; `DISPATCH_LOG_DIR` overrides it
    #[serde(default)]
    pub dir: Option<String>,
}

impl DispatchConfig {
    /// Load from defaults, YAML and environment
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let yaml_path = match path {
            Some(p) if !p.exists() => {
                return Err(DispatchError::Config(format!(
                    "Configuration file not found: {}",
                    p.display()
                )))
            },
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let mut config: Self = load_layered(
            &Self::default(),
            &ConfigSources {
                yaml_path: Some(&yaml_path),
                env_prefix: ENV_PREFIX,
                env_aliases: ENV_ALIASES,
            },
        )?;

        if let Ok(raw) = std::env::var(DEBUG_ENV) {
            if !raw.is_empty() {
                config.service.debug = raw.trim().eq_ignore_ascii_case("true");
            }
        }

        if let Ok(raw) = std::env::var(GROUPS_ENV) {
            if !raw.trim().is_empty() {
                config.groups = serde_json::from_str(&raw).map_err(|e| {
                    DispatchError::Config(format!("{} is not a valid group list: {}", GROUPS_ENV, e))
                })?;
            }
        }

        info!(
            "Configuration loaded: {} push group(s), debug={}",
            config.groups.len(),
            config.service.debug
        );
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let missing = self.credentials.missing();
        if !missing.is_empty() {
            return Err(DispatchError::Config(format!(
                "Missing required configuration: {}",
                missing.join(", ")
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(DispatchError::Config(
                "http.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.roster.poll_interval_secs == 0 {
            return Err(DispatchError::Config(
                "roster.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// A configuration that passes validation
    pub(crate) fn complete() -> DispatchConfig {
        DispatchConfig {
            credentials: Credentials {
                signing_key: "key".into(),
                web_api_token: "tok".into(),
                selective_call_code: "scc".into(),
                access_token: "acc".into(),
                caller_secret: "s3cret".into(),
                web_password: "hunter2".into(),
                display_token: "display".into(),
                organisation_token: "org".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.api.port, 6010);
        assert_eq!(config.http.timeout(), Duration::from_secs(15));
        assert_eq!(config.roster.interval(), Duration::from_secs(10));
        assert_eq!(config.dispatch.live_keyword, "FR");
        assert_eq!(config.dispatch.backup_keyword, "TEST");
        assert!(!config.service.debug);
    }

    #[test]
    fn test_validate_reports_missing_secrets() {
        let err = DispatchConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("WEB_API_KEY"));
        assert!(msg.contains("PRIVATE_AUTH_KEY"));

        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = complete();
        config.http.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_masked() {
        let out = format!("{:?}", complete().credentials);
        assert!(!out.contains("hunter2"));
        assert!(out.contains("***"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = DispatchConfig::load(Some(Path::new("/nonexistent/dispatchsrv.yaml")));
        assert!(matches!(err, Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
http:
  timeout_secs: 30
roster:
  poll_interval_secs: 5
dispatch:
  live_keyword: "RD"
places:
  path: /srv/places.json
"#
        )
        .unwrap();

        let config = DispatchConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.roster.poll_interval_secs, 5);
        assert_eq!(config.dispatch.live_keyword, "RD");
        assert_eq!(config.dispatch.backup_keyword, "TEST");
        assert_eq!(config.places.path, PathBuf::from("/srv/places.json"));
    }

    #[test]
    fn test_flat_environment_names() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::env::set_var("WEB_API_KEY", "0042key");
        std::env::set_var(
            GROUPS_ENV,
            r#"[{"guid": "a-1", "name": "Einsatzabteilung"}]"#,
        );

        let config = DispatchConfig::load(Some(file.path()));

        std::env::remove_var("WEB_API_KEY");
        std::env::remove_var(GROUPS_ENV);

        let config = config.unwrap();
        assert_eq!(config.credentials.signing_key, "0042key");
        assert_eq!(
            config.groups,
            vec![PushGroup {
                guid: "a-1".into(),
                name: "Einsatzabteilung".into()
            }]
        );
    }

    #[test]
    fn test_invalid_yaml_value_reports_single_prefix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http:\n  timeout_secs: soon").unwrap();

        let err = DispatchConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
        let msg = err.to_string();
        assert!(msg.starts_with("Configuration error: Failed to load configuration"));
        assert!(!msg.contains("Configuration error: Configuration error"));
    }

    #[test]
    fn test_debug_variable_is_lenient() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service:\n  debug: true").unwrap();

        let load_with = |value: &str| {
            std::env::set_var(DEBUG_ENV, value);
            let config = DispatchConfig::load(Some(file.path()));
            std::env::remove_var(DEBUG_ENV);
            config
        };

        let config = load_with("express:*").unwrap();
        assert!(!config.service.debug);

        let config = load_with("*").unwrap();
        assert!(!config.service.debug);

        let config = load_with("TRUE").unwrap();
        assert!(config.service.debug);

        let config = load_with("true").unwrap();
        assert!(config.service.debug);
    }
}
