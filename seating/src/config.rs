//! Configuration for the seating engine.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Missing variables fall back to the defaults; malformed ones are reported.

use crate::error::ConfigError;
use crate::types::ShowKey;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timer and batching settings
    pub timing: TimingConfig,
    /// Block scoring weights
    pub scoring: ScoringWeights,
    /// Performance the engine works on
    pub show: ShowKey,
    /// Log filter for the demo binary (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Timer and batching settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Window in which a second activation of the same seat counts as a
    /// double activation (default: 300)
    pub activation_window_ms: u64,
    /// Quiet period after the last buffered write before a flush (default: 500)
    pub debounce_ms: u64,
    /// Delay of the flush forced by a full buffer (default: 50)
    pub grace_ms: u64,
    /// Buffered writes that force a grace flush (default: 20)
    pub batch_threshold: usize,
}

impl TimingConfig {
    /// Activation window as a `Duration`
    #[must_use]
    pub const fn activation_window(&self) -> Duration {
        Duration::from_millis(self.activation_window_ms)
    }

    /// Debounce delay as a `Duration`
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Grace delay as a `Duration`
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            activation_window_ms: 300,
            debounce_ms: 500,
            grace_ms: 50,
            batch_threshold: 20,
        }
    }
}

/// Weights of the block scoring terms
///
/// The defaults reproduce the box office's long-standing seating heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Center score of a block sitting exactly on the row center
    pub center_base: f64,
    /// Center score lost per seat of distance from the row center
    pub center_slope: f64,
    /// Bonus for the preferred row
    pub preferred_row_bonus: f64,
    /// Bonus by row position within the class; positions past the end reuse
    /// the last entry
    pub row_priority: Vec<f64>,
    /// Penalty for the base row itself
    pub base_penalty: f64,
    /// Extra penalty per row behind the base row
    pub base_penalty_step: f64,
    /// Weight of the smaller free distance to the row ends
    pub buffer_weight: f64,
    /// Bonus for rows with an aisle gap
    pub aisle_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            center_base: 100.0,
            center_slope: 8.0,
            preferred_row_bonus: 1000.0,
            row_priority: vec![500.0, 400.0, 300.0, 200.0, 100.0, 50.0, 1.0, 1.0],
            base_penalty: 500.0,
            base_penalty_step: 100.0,
            buffer_weight: 2.0,
            aisle_bonus: 5.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `SEATING_ACTIVATION_WINDOW_MS` | 300 |
    /// | `SEATING_DEBOUNCE_MS` | 500 |
    /// | `SEATING_GRACE_MS` | 50 |
    /// | `SEATING_BATCH_THRESHOLD` | 20 |
    /// | `SEATING_SHOW_DATE` | today (UTC), `YYYY-MM-DD` |
    /// | `SEATING_SHOW_NAME` | `evening` |
    /// | `RUST_LOG` | `info` |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but cannot be
    /// parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = TimingConfig::default();
        Ok(Self {
            timing: TimingConfig {
                activation_window_ms: parse_var(
                    "SEATING_ACTIVATION_WINDOW_MS",
                    defaults.activation_window_ms,
                )?,
                debounce_ms: parse_var("SEATING_DEBOUNCE_MS", defaults.debounce_ms)?,
                grace_ms: parse_var("SEATING_GRACE_MS", defaults.grace_ms)?,
                batch_threshold: parse_var("SEATING_BATCH_THRESHOLD", defaults.batch_threshold)?,
            },
            scoring: ScoringWeights::default(),
            show: ShowKey {
                date: parse_var("SEATING_SHOW_DATE", Utc::now().date_naive())?,
                show: env::var("SEATING_SHOW_NAME").unwrap_or_else(|_| "evening".to_string()),
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            scoring: ScoringWeights::default(),
            show: ShowKey::new(NaiveDate::default(), "evening"),
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    env::var(key).map_or(Ok(default), |value| parse_value(key, &value))
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
