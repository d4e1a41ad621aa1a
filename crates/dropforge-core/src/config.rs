//! Engine configuration.
//!
//! Loaded once at startup from TOML (or built programmatically in tests).
//! Every field has a default so an empty document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Cents;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prize in cents for globally triggered lottery rounds (ace, headshot,
    /// bomb plant).
    #[serde(default = "default_global_prize_cents")]
    pub global_prize_cents: Cents,

    /// Window in hours for a viewer to count as recently active in global
    /// draws.
    #[serde(default = "default_activity_window_hours")]
    pub activity_window_hours: u32,

    /// Price cache TTL in seconds.
    #[serde(default = "default_price_ttl_secs")]
    pub price_ttl_secs: u64,

    /// Timeout in milliseconds for external market price lookups.
    #[serde(default = "default_market_timeout_ms")]
    pub market_timeout_ms: u64,

    /// Default reward name for case-kind rewards with a blank name.
    #[serde(default = "default_case_reward")]
    pub default_case_reward: String,

    /// Default reward name for skin-kind rewards with a blank name.
    #[serde(default = "default_skin_reward")]
    pub default_skin_reward: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            global_prize_cents: default_global_prize_cents(),
            activity_window_hours: default_activity_window_hours(),
            price_ttl_secs: default_price_ttl_secs(),
            market_timeout_ms: default_market_timeout_ms(),
            default_case_reward: default_case_reward(),
            default_skin_reward: default_skin_reward(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Price cache TTL as a [`Duration`].
    #[must_use]
    pub const fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }

    /// Market lookup timeout as a [`Duration`].
    #[must_use]
    pub const fn market_timeout(&self) -> Duration {
        Duration::from_millis(self.market_timeout_ms)
    }

    /// Activity window in milliseconds, for comparisons against stored
    /// activity timestamps.
    #[must_use]
    pub const fn activity_window_ms(&self) -> i64 {
        self.activity_window_hours as i64 * 60 * 60 * 1000
    }
}

fn default_global_prize_cents() -> Cents {
    100
}

fn default_activity_window_hours() -> u32 {
    24
}

fn default_price_ttl_secs() -> u64 {
    600
}

fn default_market_timeout_ms() -> u64 {
    3500
}

fn default_case_reward() -> String {
    "Revolution Case".to_string()
}

fn default_skin_reward() -> String {
    "AK-47 | Slate".to_string()
}
