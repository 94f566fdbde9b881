//! # Engine Configuration
//!
//! Configuration management for the engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PANTRY_DB_PATH=/var/lib/pantry/pantry.db                           │
//! │     PANTRY_BUSY_TIMEOUT_MS=2000                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pantry/pantry.toml (Linux)                               │
//! │     ~/Library/Application Support/com.pantry.engine/pantry.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # pantry.toml
//! [database]
//! path = "/var/lib/pantry/pantry.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [sales]
//! max_lines = 100
//! max_line_quantity = 999
//!
//! [costing]
//! cost_history_limit = 50
//!
//! [events]
//! batch_size = 100
//! poll_interval_secs = 5
//! max_attempts = 10
//!
//! [logging]
//! filter = "info,pantry=debug,sqlx=warn"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use pantry_core::{DEFAULT_COST_HISTORY_LIMIT, MAX_LINE_QUANTITY, MAX_SALE_LINES};
use pantry_db::DbConfig;

// =============================================================================
// Config Error
// =============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how the SQLite store is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a writer waits for a conflicting transaction (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Pool acquire timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_min_connections() -> u32 {
    1
}
fn default_busy_timeout() -> u64 {
    5000
}
fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout_ms: default_busy_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Resolved database file path.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("pantry.db")))
            .unwrap_or_else(|| PathBuf::from("pantry.db"))
    }

    /// Builds the pool configuration.
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(self.resolved_path())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

// =============================================================================
// Sales, Costing, Events, Logging
// =============================================================================

/// Limits applied to sale requests. Cannot exceed the hard caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    #[serde(default = "default_max_line_quantity")]
    pub max_line_quantity: i64,
}

fn default_max_lines() -> usize {
    MAX_SALE_LINES
}
fn default_max_line_quantity() -> i64 {
    MAX_LINE_QUANTITY
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            max_lines: default_max_lines(),
            max_line_quantity: default_max_line_quantity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostingSettings {
    /// Cost history entries returned per product, newest first.
    #[serde(default = "default_cost_history_limit")]
    pub cost_history_limit: i64,
}

fn default_cost_history_limit() -> i64 {
    DEFAULT_COST_HISTORY_LIMIT
}

impl Default for CostingSettings {
    fn default() -> Self {
        CostingSettings {
            cost_history_limit: default_cost_history_limit(),
        }
    }
}

/// Post-commit event delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Outbox entries handled per dispatch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Interval between background dispatch cycles (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Failed deliveries before an entry is skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Buffer of the broadcast sink. Slow subscribers lag past this.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Delivered entries older than this are removed by cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_batch_size() -> u32 {
    100
}
fn default_poll_interval() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    10
}
fn default_broadcast_capacity() -> usize {
    256
}
fn default_retention_days() -> u32 {
    7
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            broadcast_capacity: default_broadcast_capacity(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directives. `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

pub(crate) const DEFAULT_LOG_FILTER: &str = "info,pantry=debug,sqlx=warn";

fn default_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
            json: false,
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub costing: CostingSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (pantry.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.sales.max_lines == 0 || self.sales.max_lines > MAX_SALE_LINES {
            return Err(ConfigError::Invalid(format!(
                "sales.max_lines must be between 1 and {}",
                MAX_SALE_LINES
            )));
        }
        if self.sales.max_line_quantity < 1 || self.sales.max_line_quantity > MAX_LINE_QUANTITY {
            return Err(ConfigError::Invalid(format!(
                "sales.max_line_quantity must be between 1 and {}",
                MAX_LINE_QUANTITY
            )));
        }

        if self.costing.cost_history_limit < 1 {
            return Err(ConfigError::Invalid(
                "costing.cost_history_limit must be at least 1".into(),
            ));
        }

        if self.events.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "events.batch_size must be greater than 0".into(),
            ));
        }
        if self.events.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "events.max_attempts must be greater than 0".into(),
            ));
        }
        if self.events.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.broadcast_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `PANTRY_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PANTRY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("PANTRY_MAX_CONNECTIONS") {
            match value.parse() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid PANTRY_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("PANTRY_BUSY_TIMEOUT_MS") {
            match value.parse() {
                Ok(ms) => self.database.busy_timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid PANTRY_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(value) = lookup("PANTRY_COST_HISTORY_LIMIT") {
            match value.parse() {
                Ok(limit) => self.costing.cost_history_limit = limit,
                Err(_) => warn!(value = %value, "Ignoring invalid PANTRY_COST_HISTORY_LIMIT"),
            }
        }

        if let Some(value) = lookup("PANTRY_EVENT_POLL_SECS") {
            match value.parse() {
                Ok(secs) => self.events.poll_interval_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid PANTRY_EVENT_POLL_SECS"),
            }
        }

        if let Some(filter) = lookup("PANTRY_LOG") {
            self.logging.filter = filter;
        }

        if let Some(value) = lookup("PANTRY_LOG_JSON") {
            self.logging.json = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("pantry.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.events.poll_interval_secs)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "pantry", "engine")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sales.max_lines, 100);
        assert_eq!(config.sales.max_line_quantity, 999);
        assert_eq!(config.costing.cost_history_limit, 50);
        assert_eq!(config.events.max_attempts, 10);
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/pantry-test.db"

            [events]
            poll_interval_secs = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/pantry-test.db")));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.events.poll_interval_secs, 1);
        assert_eq!(config.events.batch_size, 100);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PANTRY_DB_PATH", "/data/pantry.db"),
            ("PANTRY_BUSY_TIMEOUT_MS", "250"),
            ("PANTRY_COST_HISTORY_LIMIT", "not-a-number"),
            ("PANTRY_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.resolved_path(), PathBuf::from("/data/pantry.db"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.costing.cost_history_limit, 50);
        assert!(config.logging.json);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.sales.max_lines = 101;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.events.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.min_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_mapping() {
        let mut config = EngineConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/x.db"));
        config.database.busy_timeout_ms = 1500;

        let db = config.database.to_db_config();
        assert_eq!(db.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(db.busy_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[events]"));
    }
}
