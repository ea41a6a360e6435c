//! Booking engine configuration types.
//!
//! `BookingConfig` represents the top-level `config.toml` that controls
//! deposit amounts, the cancellation window, bulk insert sizing and the
//! daily slot scheduler.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::appointment::{DEFAULT_CANCEL_WINDOW_HOURS, DEFAULT_DEPOSIT_CENTS};

/// Upper bound for rows per multi-row INSERT. SQLite caps bound parameters
/// per statement and each slot row binds a dozen.
pub const MAX_INSERT_BATCH_SIZE: usize = 500;

/// Top-level configuration for the booking engine.
///
/// Loaded from `~/.slotbook/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Deposit charged per appointment, in cents.
    #[serde(default = "default_deposit_cents")]
    pub deposit_cents: i64,

    /// Customers cannot cancel within this many hours of the start time.
    #[serde(default = "default_cancel_window_hours")]
    pub cancel_window_hours: i64,

    /// Rows per INSERT statement when generating slots.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    /// How far ahead capacity recalculation reaches, in days.
    #[serde(default = "default_recalc_horizon_days")]
    pub recalc_horizon_days: u32,

    /// Offset of store-local time from UTC. Slot dates and template times are local.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_deposit_cents() -> i64 {
    DEFAULT_DEPOSIT_CENTS
}

fn default_cancel_window_hours() -> i64 {
    DEFAULT_CANCEL_WINDOW_HOURS
}

fn default_insert_batch_size() -> usize {
    100
}

fn default_recalc_horizon_days() -> u32 {
    90
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            deposit_cents: default_deposit_cents(),
            cancel_window_hours: default_cancel_window_hours(),
            insert_batch_size: default_insert_batch_size(),
            recalc_horizon_days: default_recalc_horizon_days(),
            utc_offset_minutes: 0,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl BookingConfig {
    /// Clamp out-of-range values into their usable ranges.
    pub fn normalized(mut self) -> Self {
        self.cancel_window_hours = self.cancel_window_hours.max(0);
        self.insert_batch_size = self.insert_batch_size.clamp(1, MAX_INSERT_BATCH_SIZE);
        self.scheduler.run_timeout_secs = self.scheduler.run_timeout_secs.max(1);
        self
    }

    /// The configured store-local offset, falling back to UTC when out of range.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }
}

/// Daily slot scheduler settings (the `[scheduler]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cron expression or human-readable schedule (`daily`, `every day at 00:05`).
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Upper bound for one generation run, in seconds.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_schedule() -> String {
    "daily".to_string()
}

fn default_run_timeout_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            schedule: default_schedule(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}
