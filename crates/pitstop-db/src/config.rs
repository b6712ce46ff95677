//! # Pitstop Configuration
//!
//! Settings for the store: where the database lives, how hard a commit
//! retries, the default GST rate, and the number prefixes.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PITSTOP_DB_PATH=/var/lib/pitstop/pitstop.db                        │
//! │     PITSTOP_COMMIT_MAX_ATTEMPTS=8                                      │
//! │     PITSTOP_DEFAULT_TAX_BPS=1200                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pitstop/pitstop.toml (Linux)                             │
//! │     ~/Library/Application Support/com.pitstop.pitstop/pitstop.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # pitstop.toml
//! [database]
//! path = "/var/lib/pitstop/pitstop.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [commit]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//!
//! [billing]
//! default_tax_bps = 1800
//!
//! [sequences]
//! service_prefix = "SE"
//! order_prefix = "OD"
//! invoice_prefix = "BS"
//! width = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use pitstop_core::validation::validate_tax_rate_bps;
use pitstop_core::{TaxRate, DEFAULT_GST_BPS};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;
use crate::repository::counter::SequenceSettings;
use crate::retry::RetryPolicy;

const CONFIG_FILE: &str = "pitstop.toml";
const DATABASE_FILE: &str = "pitstop.db";

// =============================================================================
// Sections
// =============================================================================

/// `[database]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to `pitstop.db` in the platform data dir.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long SQLite waits on a lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "pitstop", "pitstop")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// `[commit]`: retry policy for write conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    20
}

fn default_max_backoff() -> u64 {
    500
}

impl Default for CommitSettings {
    fn default() -> Self {
        CommitSettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl CommitSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// `[billing]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    /// GST in basis points (1800 = 18%).
    #[serde(default = "default_tax_bps")]
    pub default_tax_bps: u32,
}

fn default_tax_bps() -> u32 {
    DEFAULT_GST_BPS
}

impl Default for BillingSettings {
    fn default() -> Self {
        BillingSettings {
            default_tax_bps: default_tax_bps(),
        }
    }
}

// =============================================================================
// Pitstop Config
// =============================================================================

/// Complete store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitstopConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub commit: CommitSettings,

    #[serde(default)]
    pub billing: BillingSettings,

    #[serde(default)]
    pub sequences: SequenceSettings,
}

impl PitstopConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Load from `config_path` or the platform default, if the file exists
    /// 3. Apply environment overrides
    /// 4. Validate
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

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
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
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
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
        if self.commit.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "commit.max_attempts must be at least 1".into(),
            ));
        }
        if self.commit.initial_backoff_ms > self.commit.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "commit.initial_backoff_ms cannot exceed max_backoff_ms".into(),
            ));
        }
        validate_tax_rate_bps(self.billing.default_tax_bps)
            .map_err(|e| ConfigError::Invalid(format!("billing.default_tax_bps: {}", e)))?;

        let prefixes = [
            &self.sequences.service_prefix,
            &self.sequences.order_prefix,
            &self.sequences.invoice_prefix,
        ];
        if prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid("sequence prefixes must not be empty".into()));
        }
        if prefixes[0] == prefixes[1] || prefixes[1] == prefixes[2] || prefixes[0] == prefixes[2] {
            return Err(ConfigError::Invalid("sequence prefixes must be distinct".into()));
        }
        if self.sequences.width == 0 {
            return Err(ConfigError::Invalid("sequences.width must be at least 1".into()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("PITSTOP_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(attempts) = lookup("PITSTOP_COMMIT_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.commit.max_attempts = n,
                Err(_) => warn!(value = %attempts, "Ignoring invalid PITSTOP_COMMIT_MAX_ATTEMPTS"),
            }
        }

        if let Some(bps) = lookup("PITSTOP_DEFAULT_TAX_BPS") {
            match bps.parse::<u32>() {
                Ok(n) => self.billing.default_tax_bps = n,
                Err(_) => warn!(value = %bps, "Ignoring invalid PITSTOP_DEFAULT_TAX_BPS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "pitstop", "pitstop")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Builds the pool configuration for [`Database::new`](crate::Database::new).
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .retry(self.commit.retry_policy())
            .sequences(self.sequences.clone())
            .default_tax_rate(TaxRate::from_bps(self.billing.default_tax_bps))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PitstopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.billing.default_tax_bps, 1800);
        assert_eq!(config.sequences.invoice_prefix, "BS");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PitstopConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/shop.db"

            [sequences]
            invoice_prefix = "INV"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.commit.max_attempts, 5);
        assert_eq!(config.sequences.invoice_prefix, "INV");
        assert_eq!(config.sequences.order_prefix, "OD");
    }

    #[test]
    fn test_overrides() {
        let mut config = PitstopConfig::default();
        config.apply_overrides(|key| match key {
            "PITSTOP_DB_PATH" => Some("/srv/pitstop.db".to_string()),
            "PITSTOP_COMMIT_MAX_ATTEMPTS" => Some("9".to_string()),
            "PITSTOP_DEFAULT_TAX_BPS" => Some("not-a-number".to_string()),
            _ => None,
        });

        assert_eq!(config.database.path, PathBuf::from("/srv/pitstop.db"));
        assert_eq!(config.commit.max_attempts, 9);
        assert_eq!(config.billing.default_tax_bps, 1800);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PitstopConfig::default();
        config.commit.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PitstopConfig::default();
        config.sequences.order_prefix = "SE".to_string();
        assert!(config.validate().is_err());

        let mut config = PitstopConfig::default();
        config.billing.default_tax_bps = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join(CONFIG_FILE);

        let mut config = PitstopConfig::default();
        config.database.path = dir.path().join("pitstop.db");
        config.billing.default_tax_bps = 500;
        config.save(Some(path.clone())).unwrap();

        let loaded = PitstopConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.billing.default_tax_bps, 500);
        assert_eq!(loaded.database.path, config.database.path);
    }

    #[test]
    fn test_db_config() {
        let mut config = PitstopConfig::default();
        config.commit.max_attempts = 7;
        config.billing.default_tax_bps = 1200;

        let db = config.db_config();
        assert_eq!(db.retry.max_attempts, 7);
        assert_eq!(db.default_tax_rate.bps(), 1200);
        assert_eq!(db.busy_timeout, Duration::from_millis(5_000));
    }
}
