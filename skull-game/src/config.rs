//! Session timing configuration.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    DEFAULT_CLICK_PULSE_MS, DEFAULT_MAX_ACTIVE_REWARDS, DEFAULT_REMOTE_DEBOUNCE_MS,
    DEFAULT_REWARD_LIFETIME_MS, DEFAULT_TICK_INTERVAL_MS, SPECIAL_AUTO_CLICK_RATE,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timers, caps and seeding for one engine. Balance numbers are not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub special_auto_click_rate: u32,
    pub remote_debounce_ms: u64,
    pub reward_lifetime_ms: u64,
    pub click_pulse_ms: u64,
    pub max_active_rewards: usize,
    /// Fixed RNG seed; the clock's time is used when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            special_auto_click_rate: SPECIAL_AUTO_CLICK_RATE,
            remote_debounce_ms: DEFAULT_REMOTE_DEBOUNCE_MS,
            reward_lifetime_ms: DEFAULT_REWARD_LIFETIME_MS,
            click_pulse_ms: DEFAULT_CLICK_PULSE_MS,
            max_active_rewards: DEFAULT_MAX_ACTIVE_REWARDS,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a config. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or a failed [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] naming the first zero interval, rate or cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("tick_interval_ms", self.tick_interval_ms == 0),
            ("special_auto_click_rate", self.special_auto_click_rate == 0),
            ("remote_debounce_ms", self.remote_debounce_ms == 0),
            ("reward_lifetime_ms", self.reward_lifetime_ms == 0),
            ("click_pulse_ms", self.click_pulse_ms == 0),
            ("max_active_rewards", self.max_active_rewards == 0),
        ];
        match checks.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(ConfigError::Zero(name)),
            None => Ok(()),
        }
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn remote_debounce(&self) -> Duration {
        Duration::from_millis(self.remote_debounce_ms)
    }

    #[must_use]
    pub const fn reward_lifetime(&self) -> Duration {
        Duration::from_millis(self.reward_lifetime_ms)
    }
}
