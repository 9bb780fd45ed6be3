//! Runtime toggles for the synchronization engine.
//!
//! Values come from an optional JSON file; the server binary lets CLI flags
//! override the booleans after loading.

use crate::error::ConfigError;
use serde::Deserialize;
use shared::TICKS_PER_SECOND;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Master switch for projectile interception.
    pub enable_plugin: bool,
    pub enable_homing: bool,
    /// Interval between masking drop retries.
    pub retry_interval_ms: u64,
    /// Minimum delay between two inventory refreshes of the same player.
    pub spawn_item_delay_ms: u64,
    /// Drop attempts (including the first) before a masking session is abandoned.
    pub max_drop_attempts: u32,
    /// How long a deferred refresh waits for the use button to be released.
    pub release_wait_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_plugin: true,
            enable_homing: true,
            retry_interval_ms: 1000,
            spawn_item_delay_ms: 250,
            max_drop_attempts: 10,
            release_wait_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn spawn_item_delay_ticks(&self) -> u64 {
        ms_to_ticks(self.spawn_item_delay_ms)
    }

    pub fn release_wait_timeout_ticks(&self) -> u32 {
        u32::try_from(ms_to_ticks(self.release_wait_timeout_ms)).unwrap_or(u32::MAX)
    }
}

fn ms_to_ticks(ms: u64) -> u64 {
    ms.saturating_mul(TICKS_PER_SECOND as u64).div_ceil(1000)
}
