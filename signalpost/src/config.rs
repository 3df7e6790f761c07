//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/signalpost/config.toml`.
//!
//! All sections are plain immutable records with documented defaults; a
//! tracker can also be assembled entirely from values built in code, the
//! TOML file is just the convenient path for host applications.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/signalpost/` (~/.config/signalpost/)
//! - Data (queue database): `$XDG_DATA_HOME/signalpost/` (~/.local/share/signalpost/)
//! - State/Logs: `$XDG_STATE_HOME/signalpost/` (~/.local/state/signalpost/)

use crate::error::{Error, Result};
use crate::network::HttpMethod;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker identity and worker sizing
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Emitter batching and drain-loop tuning
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Collector endpoint configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Durable queue storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform tag stamped onto every payload.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    App,
    Desktop,
    Mobile,
    Server,
}

impl Platform {
    /// Short wire form of the platform tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::App => "app",
            Platform::Desktop => "dsk",
            Platform::Mobile => "mob",
            Platform::Server => "srv",
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::App
    }
}

/// Tracker identity configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Tracker instance namespace, distinguishes multiple trackers
    /// reporting to the same collector
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Application identifier reported with every event
    #[serde(default)]
    pub app_id: String,

    /// Platform tag (app, desktop, mobile, server)
    #[serde(default)]
    pub platform: Platform,

    /// Worker threads for rendering and delivery (a minimum of 2 is enforced)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            app_id: String::new(),
            platform: Platform::default(),
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_worker_threads() -> usize {
    2
}

/// Emitter batching and drain-loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EmitterConfig {
    /// Max queued events pulled per drain cycle
    #[serde(default = "default_send_limit")]
    pub send_limit: usize,

    /// Max events packed into one POST request
    #[serde(default = "default_buffer_group_size")]
    pub buffer_group_size: usize,

    /// Byte budget for a GET request
    #[serde(default = "default_byte_limit")]
    pub byte_limit_get: usize,

    /// Byte budget for a POST request body
    #[serde(default = "default_byte_limit")]
    pub byte_limit_post: usize,

    /// Sleep between empty-queue polls, in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Consecutive empty polls tolerated before the drain loop stops
    #[serde(default = "default_idle_limit")]
    pub idle_limit: u32,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            send_limit: default_send_limit(),
            buffer_group_size: default_buffer_group_size(),
            byte_limit_get: default_byte_limit(),
            byte_limit_post: default_byte_limit(),
            tick_interval_ms: default_tick_interval_ms(),
            idle_limit: default_idle_limit(),
        }
    }
}

impl EmitterConfig {
    /// Empty-queue poll interval as a [`Duration`]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_send_limit() -> usize {
    100
}

fn default_buffer_group_size() -> usize {
    10
}

fn default_byte_limit() -> usize {
    40_000
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_idle_limit() -> u32 {
    5
}

/// Collector endpoint configuration
///
/// The endpoint is the collector base URL; the delivery path is derived from
/// the HTTP method (see the `network` module).
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Collector base URL (e.g. `https://collector.example.com`)
    pub endpoint: Option<String>,

    /// HTTP method used for delivery (get or post)
    #[serde(default)]
    pub method: HttpMethod,

    /// API key sent as a bearer token (optional)
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            method: HttpMethod::default(),
            api_key: None,
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    /// Check if the network section carries enough to build a transport
    pub fn is_ready(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Validate the section, returning an error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_none() {
            return Err(Error::Config(
                "network.endpoint is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "network.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Durable queue storage configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Queue database path override; defaults to the XDG data directory
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the queue database path for a tracker namespace
    ///
    /// `$XDG_DATA_HOME/signalpost/<namespace>/events.db` unless overridden.
    pub fn resolve_database_path(&self, namespace: &str) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join(namespace).join("events.db"))
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory override; defaults to the XDG state directory
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/signalpost/config.toml` (~/.config/signalpost/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("signalpost").join("config.toml")
    }

    /// Returns the data directory path (for the queue database)
    ///
    /// `$XDG_DATA_HOME/signalpost/` (~/.local/share/signalpost/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("signalpost")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/signalpost/` (~/.local/state/signalpost/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("signalpost")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/signalpost/signalpost.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("signalpost.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracker.namespace, "default");
        assert_eq!(config.tracker.worker_threads, 2);
        assert_eq!(config.emitter.send_limit, 100);
        assert_eq!(config.emitter.buffer_group_size, 10);
        assert_eq!(config.emitter.idle_limit, 5);
        assert_eq!(config.network.method, HttpMethod::Post);
        assert!(!config.network.is_ready());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tracker]
namespace = "checkout"
app_id = "shop-ios"
platform = "mobile"

[emitter]
buffer_group_size = 25
tick_interval_ms = 1000

[network]
endpoint = "https://collector.example.com"
method = "get"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tracker.namespace, "checkout");
        assert_eq!(config.tracker.app_id, "shop-ios");
        assert_eq!(config.tracker.platform, Platform::Mobile);
        assert_eq!(config.emitter.buffer_group_size, 25);
        assert_eq!(config.emitter.tick(), Duration::from_millis(1000));
        assert_eq!(config.network.method, HttpMethod::Get);
        assert!(config.network.is_ready());
    }

    #[test]
    fn test_network_config_validation() {
        // Missing endpoint should fail
        let config = NetworkConfig::default();
        assert!(config.validate().is_err());

        let config = NetworkConfig {
            endpoint: Some("https://collector.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());
    }

    #[test]
    fn test_platform_wire_forms() {
        assert_eq!(Platform::App.as_str(), "app");
        assert_eq!(Platform::Desktop.as_str(), "dsk");
        assert_eq!(Platform::Mobile.as_str(), "mob");
        assert_eq!(Platform::Server.as_str(), "srv");
    }

    #[test]
    fn test_resolve_database_path() {
        let storage = StorageConfig::default();
        let path = storage.resolve_database_path("default");
        assert!(path.ends_with("signalpost/default/events.db"));

        let storage = StorageConfig {
            database_path: Some(PathBuf::from("/tmp/queue.db")),
        };
        assert_eq!(
            storage.resolve_database_path("default"),
            PathBuf::from("/tmp/queue.db")
        );
    }
}
