//! # Clipper Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CLIPPER_DB_PATH=/var/lib/clipper/clipper.db                        │
//! │     CLIPPER_SERVICE_RATE / CLIPPER_RETAIL_RATE / CLIPPER_POS_RATE      │
//! │     CLIPPER_AUDIT_BUFFER=4096                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/clipper/clipper.toml (Linux)                             │
//! │     ~/Library/Application Support/com.clipper.clipper/clipper.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     service 0.30, retail 0.10, pos 0.30, no minimum fees               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "clipper.db"
//! max_connections = 5
//!
//! [rates]
//! service = "0.30"
//! retail = "0.10"
//! pos = "0.30"
//!
//! [fees]
//! service = "1.50"
//! pos = "0.50"
//!
//! [audit]
//! enabled = true
//! buffer_size = 1024
//! ```

use clipper_core::{CommissionRate, MinimumFees, RateDefaults};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::audit::DEFAULT_AUDIT_BUFFER;
use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "clipper", "clipper")
        .map(|dirs| dirs.data_dir().join("clipper.db"))
        .unwrap_or_else(|| PathBuf::from("clipper.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Builds the pool configuration.
    pub fn db_config(&self) -> DbConfig {
        if self.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(self.path.clone()).max_connections(self.max_connections)
    }
}

/// Audit channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// When off, records go to a no-op sink.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_audit_buffer() -> usize {
    DEFAULT_AUDIT_BUFFER
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            enabled: true,
            buffer_size: default_audit_buffer(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Clipper configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipperConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// System default commission rates.
    #[serde(default)]
    pub rates: RateDefaults,

    /// Minimum platform fees.
    #[serde(default)]
    pub fees: MinimumFees,

    #[serde(default)]
    pub audit: AuditSettings,
}

impl ClipperConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (clipper.toml)
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

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns the defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<&Path>) -> ConfigResult<()> {
        let path = config_path
            .map(Path::to_path_buf)
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
    ///
    /// Rates are range-checked on deserialization already; this covers the
    /// rest.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        for (name, fee) in [("service", self.fees.service), ("pos", self.fees.pos)] {
            if fee.is_negative() {
                return Err(ConfigError::Invalid(format!(
                    "fees.{} must not be negative, got {}",
                    name, fee
                )));
            }
        }
        if self.audit.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "audit.buffer_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CLIPPER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        for (var, slot) in [
            ("CLIPPER_SERVICE_RATE", &mut self.rates.service),
            ("CLIPPER_RETAIL_RATE", &mut self.rates.retail),
            ("CLIPPER_POS_RATE", &mut self.rates.pos),
        ] {
            if let Ok(raw) = std::env::var(var) {
                match raw.parse::<CommissionRate>() {
                    Ok(rate) => {
                        debug!(var, rate = %rate, "Overriding default rate from environment");
                        *slot = rate;
                    }
                    Err(e) => warn!(var, value = %raw, error = %e, "Ignoring invalid rate in environment"),
                }
            }
        }

        if let Ok(raw) = std::env::var("CLIPPER_AUDIT_BUFFER") {
            if let Ok(size) = raw.parse::<usize>() {
                self.audit.buffer_size = size;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "clipper", "clipper")
            .map(|dirs| dirs.config_dir().join("clipper.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipper_core::Money;

    #[test]
    fn test_default_config() {
        let config = ClipperConfig::default();
        assert_eq!(config.rates.service, "0.30".parse().unwrap());
        assert_eq!(config.rates.retail, "0.10".parse().unwrap());
        assert!(config.fees.service.is_zero());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClipperConfig = toml::from_str(
            r#"
            [rates]
            retail = "0.15"

            [fees]
            pos = "0.50"
            "#,
        )
        .unwrap();

        assert_eq!(config.rates.retail, "0.15".parse().unwrap());
        assert_eq!(config.rates.service, "0.30".parse().unwrap());
        assert_eq!(config.fees.pos, Money::from_cents(50));
        assert_eq!(config.audit.buffer_size, DEFAULT_AUDIT_BUFFER);
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        let parsed = toml::from_str::<ClipperConfig>("[rates]\nservice = \"1.5\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = ClipperConfig::default();
        config.audit.buffer_size = 0;
        assert!(config.validate().is_err());

        config.audit.buffer_size = 16;
        config.fees.service = Money::from_cents(-100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("clipper-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("clipper.toml");

        let mut config = ClipperConfig::default();
        config.database.path = PathBuf::from(":memory:");
        config.rates.pos = "0.25".parse().unwrap();
        config.save(Some(&path)).unwrap();

        let loaded = ClipperConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.rates.pos, config.rates.pos);
        assert!(loaded.database.db_config().is_in_memory());

        std::fs::remove_dir_all(dir).ok();
    }
}
