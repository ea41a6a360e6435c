//! Daily slot scheduler.
//!
//! Once per local day (midnight by default) every operating store gets the
//! next day's slots generated from its active template, sized by the number
//! of technicians currently working. A store whose next day already holds
//! locked or booked units is left untouched.
//!
//! Provides:
//! - Human-readable schedule normalization ("daily" -> cron)
//! - Next-fire computation in the business timezone
//! - One-shot runs with a timeout, and a cancellable run loop

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use croner::parser::{CronParser, Seconds};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use slotbook_types::config::SchedulerConfig;
use slotbook_types::error::SlotError;
use slotbook_types::store::Store;

use crate::repository::slot::SlotRepository;
use crate::repository::store::StoreDirectory;
use crate::repository::template::TemplateRepository;
use crate::service::expander::{SlotExpander, local_date};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid cron expression or schedule string.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("scheduler run exceeded {secs}s")]
    Timeout { secs: u64 },

    /// The list of operating stores could not be read.
    #[error("store directory unavailable: {0}")]
    Directory(String),

    #[error("no calendar day follows {0}")]
    DateOverflow(NaiveDate),
}

// ---------------------------------------------------------------------------
// Schedule strings
// ---------------------------------------------------------------------------

/// Cron text for a configured schedule.
///
/// `daily` (or `midnight`) and `every day at HH:MM` name a local wall-clock
/// time; anything with five or six fields is taken as cron as-is.
pub fn schedule_to_cron(input: &str) -> Result<String, SchedulerError> {
    let trimmed = input.trim();
    if matches!(trimmed.split_whitespace().count(), 5 | 6) {
        return Ok(trimmed.to_string());
    }

    let lower = trimmed.to_lowercase();
    if lower == "daily" || lower == "midnight" {
        return Ok("0 0 0 * * *".to_string());
    }

    let invalid = || SchedulerError::InvalidSchedule(format!("unrecognized schedule: '{trimmed}'"));
    let at = lower.strip_prefix("every day at ").ok_or_else(invalid)?;
    let time = NaiveTime::parse_from_str(at.trim(), "%H:%M").map_err(|_| invalid())?;
    Ok(format!("0 {} {} * * *", time.minute(), time.hour()))
}

/// Parse a schedule (human-readable or cron) into a croner expression.
pub fn parse_schedule(input: &str) -> Result<croner::Cron, SchedulerError> {
    let expr = schedule_to_cron(input)?;
    CronParser::builder()
        .seconds(Seconds::Optional)
        .build()
        .parse(&expr)
        .map_err(|e| SchedulerError::InvalidSchedule(format!("{expr}: {e}")))
}

/// First fire time strictly after `now`, evaluated in the business timezone.
pub fn next_fire(cron: &croner::Cron, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    cron.find_next_occurrence(&now.with_timezone(&offset), false)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Per-run counters. `succeeded + skipped + failed == total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub slots_written: u64,
}

impl RunSummary {
    fn new(date: NaiveDate, total: usize) -> Self {
        Self {
            date,
            total,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            slots_written: 0,
        }
    }
}

enum StoreOutcome {
    Generated(u64),
    NoActiveTemplate,
    HasLiveUnits,
}

// ---------------------------------------------------------------------------
// DailySlotScheduler
// ---------------------------------------------------------------------------

pub struct DailySlotScheduler<S, T, D>
where
    S: SlotRepository,
    T: TemplateRepository,
    D: StoreDirectory,
{
    expander: SlotExpander<S, T>,
    directory: D,
    cron: croner::Cron,
    schedule: String,
    run_timeout: Duration,
}

impl<S, T, D> DailySlotScheduler<S, T, D>
where
    S: SlotRepository,
    T: TemplateRepository,
    D: StoreDirectory,
{
    pub fn new(
        expander: SlotExpander<S, T>,
        directory: D,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let cron = parse_schedule(&config.schedule)?;
        Ok(Self {
            expander,
            directory,
            cron,
            schedule: config.schedule.clone(),
            run_timeout: Duration::from_secs(config.run_timeout_secs.max(1)),
        })
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    fn offset(&self) -> FixedOffset {
        self.expander.settings().offset
    }

    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_fire(&self.cron, now, self.offset())
    }

    /// The business day the next run generates: tomorrow in local time.
    pub fn target_date(&self, now: DateTime<Utc>) -> Result<NaiveDate, SchedulerError> {
        let today = local_date(self.offset(), now);
        today.succ_opt().ok_or(SchedulerError::DateOverflow(today))
    }

    /// Generate tomorrow's slots for every operating store.
    pub async fn run_once(&self) -> Result<RunSummary, SchedulerError> {
        let date = self.target_date(Utc::now())?;
        self.run_for_date(date).await
    }

    /// Like [`run_once`](Self::run_once), bounded by the configured run timeout.
    ///
    /// A store whose write is in flight at the deadline is rolled back with
    /// its transaction.
    pub async fn run_with_timeout(&self) -> Result<RunSummary, SchedulerError> {
        let secs = self.run_timeout.as_secs();
        tokio::time::timeout(self.run_timeout, self.run_once())
            .await
            .map_err(|_| SchedulerError::Timeout { secs })?
    }

    /// Generate slots for `date` across all operating stores.
    ///
    /// One store failing never stops the others.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<RunSummary, SchedulerError> {
        let stores = self
            .directory
            .list_operating_stores()
            .await
            .map_err(|e| SchedulerError::Directory(e.to_string()))?;

        tracing::info!(%date, stores = stores.len(), "daily slot generation started");
        let mut summary = RunSummary::new(date, stores.len());

        for store in &stores {
            match self.sync_store(store, date).await {
                Ok(StoreOutcome::Generated(written)) => {
                    summary.succeeded += 1;
                    summary.slots_written += written;
                }
                Ok(StoreOutcome::NoActiveTemplate) => {
                    tracing::warn!(store_id = %store.id, store = %store.name, "no active template, skipping");
                    summary.skipped += 1;
                }
                Ok(StoreOutcome::HasLiveUnits) => {
                    tracing::info!(store_id = %store.id, %date, "slots already hold bookings, skipping");
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(store_id = %store.id, store = %store.name, error = %e, "slot generation failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            %date,
            total = summary.total,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            slots = summary.slots_written,
            "daily slot generation finished"
        );
        Ok(summary)
    }

    async fn sync_store(&self, store: &Store, date: NaiveDate) -> Result<StoreOutcome, SlotError> {
        let Some(template) = self.expander.active_template(&store.id).await? else {
            return Ok(StoreOutcome::NoActiveTemplate);
        };
        if self.expander.has_live_units(&store.id, date).await? {
            return Ok(StoreOutcome::HasLiveUnits);
        }

        let headcount = self
            .directory
            .count_working_technicians(&store.id)
            .await
            .map_err(SlotError::from)?;
        let written = self
            .expander
            .generate_slots_with_template(&store.id, &template.id, date, date, headcount)
            .await?;
        tracing::debug!(store_id = %store.id, %date, headcount, written, "store slots generated");
        Ok(StoreOutcome::Generated(written))
    }

    /// Fire on schedule until `cancel` is triggered.
    ///
    /// Cancellation only interrupts the wait between runs; a run in progress
    /// finishes (or times out) first.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(schedule = %self.schedule, "daily slot scheduler started");
        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire_after(now) else {
                tracing::warn!(schedule = %self.schedule, "schedule has no future fire time");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next_run = %next, "waiting for next slot generation");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if let Err(e) = self.run_with_timeout().await {
                tracing::error!(error = %e, "daily slot generation run failed");
            }
        }
        tracing::info!("daily slot scheduler stopped");
    }
}
