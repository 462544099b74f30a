//! Economy configuration loaded from TOML.

use std::path::Path;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::games::tictactoe::DEFAULT_OPENING_RANDOMNESS;

/// Points economy and engine settings.
///
/// Every key is optional in the file:
///
/// ```toml
/// fee_percent = 5
/// min_bet = 10
/// max_bet = 1000
/// initial_points = 100
/// bot_randomness = 0.3
/// ```
#[derive(Debug, Clone, PartialEq, Getters, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Percentage withheld from approved withdrawals.
    #[serde(default = "default_fee_percent")]
    fee_percent: i64,

    /// Smallest accepted wager.
    #[serde(default = "default_min_bet")]
    min_bet: i64,

    /// Largest accepted wager.
    #[serde(default = "default_max_bet")]
    max_bet: i64,

    /// Balance granted to a newly seen participant.
    #[serde(default = "default_initial_points")]
    initial_points: i64,

    /// Probability of a random opening move by the engine.
    #[serde(default = "default_bot_randomness")]
    bot_randomness: f64,
}

fn default_fee_percent() -> i64 {
    5
}

fn default_min_bet() -> i64 {
    10
}

fn default_max_bet() -> i64 {
    1000
}

fn default_initial_points() -> i64 {
    100
}

fn default_bot_randomness() -> f64 {
    DEFAULT_OPENING_RANDOMNESS
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            fee_percent: default_fee_percent(),
            min_bet: default_min_bet(),
            max_bet: default_max_bet(),
            initial_points: default_initial_points(),
            bot_randomness: default_bot_randomness(),
        }
    }
}

impl EconomyConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// a value is out of range.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on a parse failure or an out-of-range value.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(
            fee_percent = config.fee_percent,
            min_bet = config.min_bet,
            max_bet = config.max_bet,
            "Config loaded"
        );
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=100).contains(&self.fee_percent) {
            return Err(ConfigError::new(format!(
                "fee_percent must be within 0..=100, got {}",
                self.fee_percent
            )));
        }
        if self.min_bet < 0 {
            return Err(ConfigError::new(format!(
                "min_bet must not be negative, got {}",
                self.min_bet
            )));
        }
        if self.min_bet > self.max_bet {
            return Err(ConfigError::new(format!(
                "min_bet ({}) exceeds max_bet ({})",
                self.min_bet, self.max_bet
            )));
        }
        if self.initial_points < 0 {
            return Err(ConfigError::new(format!(
                "initial_points must not be negative, got {}",
                self.initial_points
            )));
        }
        if !(0.0..=1.0).contains(&self.bot_randomness) {
            return Err(ConfigError::new(format!(
                "bot_randomness must be within [0, 1], got {}",
                self.bot_randomness
            )));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error at the caller's location.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
