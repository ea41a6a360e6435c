//! Slot template expander.
//!
//! Turns a store's weekly template into concrete slot rows for a date range
//! and keeps slot capacity in step with technician headcount.

use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};

use slotbook_types::config::BookingConfig;
use slotbook_types::error::SlotError;
use slotbook_types::id::{SlotId, StaffId, StoreId, TemplateId};
use slotbook_types::slot::{Slot, SlotStatus, StaffPurge};
use slotbook_types::template::Template;

use crate::drift::{DriftKind, LedgerDrift};
use crate::repository::slot::{CapacityRecalc, SlotRepository};
use crate::repository::template::TemplateRepository;

/// Tuning knobs taken from [`BookingConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ExpanderSettings {
    pub insert_batch_size: usize,
    pub recalc_horizon_days: u32,
    pub offset: FixedOffset,
}

impl From<&BookingConfig> for ExpanderSettings {
    fn from(config: &BookingConfig) -> Self {
        Self {
            insert_batch_size: config.insert_batch_size,
            recalc_horizon_days: config.recalc_horizon_days,
            offset: config.local_offset(),
        }
    }
}

impl Default for ExpanderSettings {
    fn default() -> Self {
        Self::from(&BookingConfig::default())
    }
}

/// Convert a store-local date and wall-clock time to UTC.
pub fn local_to_utc(offset: FixedOffset, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    (date.and_time(time) - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// The store-local calendar date of `now`.
pub fn local_date(offset: FixedOffset, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

pub struct SlotExpander<S: SlotRepository, T: TemplateRepository> {
    slots: S,
    templates: T,
    drift: Arc<LedgerDrift>,
    settings: ExpanderSettings,
}

impl<S: SlotRepository, T: TemplateRepository> SlotExpander<S, T> {
    pub fn new(slots: S, templates: T, drift: Arc<LedgerDrift>, settings: ExpanderSettings) -> Self {
        Self {
            slots,
            templates,
            drift,
            settings,
        }
    }

    pub fn settings(&self) -> &ExpanderSettings {
        &self.settings
    }

    pub async fn active_template(&self, store_id: &StoreId) -> Result<Option<Template>, SlotError> {
        Ok(self.templates.get_active_by_store(store_id).await?)
    }

    /// True if any slot of the store on `date` holds locked or booked units.
    pub async fn has_live_units(&self, store_id: &StoreId, date: NaiveDate) -> Result<bool, SlotError> {
        Ok(self.slots.has_live_units(store_id, date).await?)
    }

    /// Generate slots for `[start, end]` from the store's active template.
    ///
    /// Returns the number of rows inserted or refreshed. Retrying a range is
    /// safe: idle rows get their capacity refreshed, rows holding units are
    /// left alone.
    pub async fn generate_slots(
        &self,
        store_id: &StoreId,
        start: NaiveDate,
        end: NaiveDate,
        headcount: i32,
    ) -> Result<u64, SlotError> {
        validate_request(start, end, headcount)?;

        let template = self
            .templates
            .get_active_by_store(store_id)
            .await?
            .ok_or(SlotError::TemplateNotFound)?;

        self.expand(&template, start, end, headcount).await
    }

    /// Generate slots from an explicit template, which must belong to the store.
    pub async fn generate_slots_with_template(
        &self,
        store_id: &StoreId,
        template_id: &TemplateId,
        start: NaiveDate,
        end: NaiveDate,
        headcount: i32,
    ) -> Result<u64, SlotError> {
        validate_request(start, end, headcount)?;

        let template = self
            .templates
            .get_by_id(template_id)
            .await?
            .filter(|t| t.store_id == *store_id)
            .ok_or(SlotError::TemplateNotFound)?;

        self.expand(&template, start, end, headcount).await
    }

    /// Build the slot rows a template yields for `[start, end]`.
    pub fn build_slots(
        &self,
        template: &Template,
        start: NaiveDate,
        end: NaiveDate,
        headcount: i32,
    ) -> Vec<Slot> {
        let now = Utc::now();
        start
            .iter_days()
            .take_while(|date| *date <= end)
            .flat_map(|date| {
                template
                    .ranges_for(date.weekday())
                    .iter()
                    .map(move |range| Slot {
                        id: SlotId::new(),
                        store_id: template.store_id,
                        staff_id: None,
                        date,
                        start_time: local_to_utc(self.settings.offset, date, range.start),
                        end_time: local_to_utc(self.settings.offset, date, range.end),
                        capacity: headcount,
                        locked_count: 0,
                        booked_count: 0,
                        status: SlotStatus::derive(headcount, 0, 0),
                        created_at: now,
                        updated_at: now,
                    })
            })
            .collect()
    }

    async fn expand(
        &self,
        template: &Template,
        start: NaiveDate,
        end: NaiveDate,
        headcount: i32,
    ) -> Result<u64, SlotError> {
        let batch = self.build_slots(template, start, end, headcount);
        if batch.is_empty() {
            tracing::debug!(
                store_id = %template.store_id,
                template_id = %template.id,
                %start,
                %end,
                "template yields no slots for range"
            );
            return Ok(0);
        }

        let written = self
            .slots
            .upsert_batch(&batch, self.settings.insert_batch_size)
            .await?;

        tracing::info!(
            store_id = %template.store_id,
            template_id = %template.id,
            %start,
            %end,
            headcount,
            built = batch.len(),
            written,
            "generated slots"
        );
        Ok(written)
    }

    /// Set capacity to `headcount` on available slots from `from` through the
    /// recalculation horizon.
    pub async fn recalculate_capacity(
        &self,
        store_id: &StoreId,
        from: NaiveDate,
        headcount: i32,
    ) -> Result<CapacityRecalc, SlotError> {
        if headcount < 0 {
            return Err(SlotError::InvalidCount(headcount));
        }

        let to = from + TimeDelta::days(i64::from(self.settings.recalc_horizon_days));
        let result = self
            .slots
            .recalculate_capacity(store_id, from, to, headcount)
            .await?;

        if result.clamped_locks > 0 {
            self.drift.record(DriftKind::LockClamped, result.clamped_locks);
            tracing::warn!(
                store_id = %store_id,
                drift_kind = DriftKind::LockClamped.as_str(),
                count = result.clamped_locks,
                "capacity cut below held locks; locks clamped"
            );
        }

        tracing::info!(
            store_id = %store_id,
            %from,
            %to,
            headcount,
            updated = result.updated,
            "recalculated slot capacity"
        );
        Ok(result)
    }

    /// Purge a departing staff member's pinned slots dated on or after `from`.
    ///
    /// Slots still holding units are kept and counted in `retained`; cancel
    /// their appointments first.
    pub async fn release_staff_slots(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
    ) -> Result<StaffPurge, SlotError> {
        let purge = self.slots.purge_staff_slots(staff_id, from).await?;

        if purge.retained > 0 {
            tracing::warn!(
                staff_id = %staff_id,
                retained = purge.retained,
                "staff slots still hold appointments; kept"
            );
        }
        tracing::info!(
            staff_id = %staff_id,
            %from,
            deleted = purge.deleted,
            "released staff slots"
        );
        Ok(purge)
    }
}

fn validate_request(start: NaiveDate, end: NaiveDate, headcount: i32) -> Result<(), SlotError> {
    if end < start {
        return Err(SlotError::InvalidDateRange { start, end });
    }
    if headcount < 0 {
        return Err(SlotError::InvalidCount(headcount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::slot::LedgerOp;
    use crate::testing::{
        MemorySlots, MemoryTemplates, date, daily_template, monday_template, slot_at, utc,
    };

    fn expander(
        slots: &MemorySlots,
        templates: MemoryTemplates,
    ) -> SlotExpander<MemorySlots, MemoryTemplates> {
        SlotExpander::new(
            slots.clone(),
            templates,
            Arc::new(LedgerDrift::new()),
            ExpanderSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_monday_template_yields_two_slots() {
        let store_id = StoreId::new();
        let slots = MemorySlots::default();
        let exp = expander(
            &slots,
            MemoryTemplates::default().with_template(monday_template(store_id)),
        );

        // 2026-03-02 is a Monday.
        let monday = date(2026, 3, 2);
        let written = exp.generate_slots(&store_id, monday, monday, 3).await.unwrap();
        assert_eq!(written, 2);

        let all = slots.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].start_time, utc(2026, 3, 2, 9));
        assert_eq!(all[0].end_time, utc(2026, 3, 2, 10));
        assert_eq!(all[1].start_time, utc(2026, 3, 2, 10));
        for slot in &all {
            assert_eq!(slot.capacity, 3);
            assert!(slot.is_idle());
            assert_eq!(slot.status, SlotStatus::Available);
            assert_eq!(slot.date, monday);
            assert!(slot.staff_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_days_without_rules_are_skipped() {
        let store_id = StoreId::new();
        let slots = MemorySlots::default();
        let exp = expander(
            &slots,
            MemoryTemplates::default().with_template(monday_template(store_id)),
        );

        // Tuesday through Sunday.
        let written = exp
            .generate_slots(&store_id, date(2026, 3, 3), date(2026, 3, 8), 2)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(slots.all().is_empty());
    }

    #[tokio::test]
    async fn test_no_active_template() {
        let slots = MemorySlots::default();
        let exp = expander(&slots, MemoryTemplates::default());
        let d = date(2026, 3, 2);
        assert!(matches!(
            exp.generate_slots(&StoreId::new(), d, d, 1).await,
            Err(SlotError::TemplateNotFound)
        ));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let store_id = StoreId::new();
        let slots = MemorySlots::default();
        let exp = expander(
            &slots,
            MemoryTemplates::default().with_template(monday_template(store_id)),
        );
        assert!(matches!(
            exp.generate_slots(&store_id, date(2026, 3, 3), date(2026, 3, 2), 1).await,
            Err(SlotError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            exp.generate_slots(&store_id, date(2026, 3, 2), date(2026, 3, 2), -1).await,
            Err(SlotError::InvalidCount(-1))
        ));
    }

    #[tokio::test]
    async fn test_regenerating_is_idempotent_and_spares_live_rows() {
        let store_id = StoreId::new();
        let slots = MemorySlots::default();
        let exp = expander(
            &slots,
            MemoryTemplates::default().with_template(monday_template(store_id)),
        );
        let monday = date(2026, 3, 2);
        exp.generate_slots(&store_id, monday, monday, 3).await.unwrap();

        let first = slots.all()[0].clone();
        slots.apply(&first.id, LedgerOp::Lock, 1).await.unwrap();

        exp.generate_slots(&store_id, monday, monday, 5).await.unwrap();

        let all = slots.all();
        assert_eq!(all.len(), 2, "no duplicates on retry");
        assert_eq!(all[0].capacity, 3, "row with a held lock is untouched");
        assert_eq!(all[0].locked_count, 1);
        assert_eq!(all[1].capacity, 5, "idle row refreshed");
    }

    #[tokio::test]
    async fn test_failed_insert_surfaces_storage_error() {
        let store_id = StoreId::new();
        let slots = MemorySlots::default();
        slots.fail_upserts();
        let exp = expander(
            &slots,
            MemoryTemplates::default().with_template(monday_template(store_id)),
        );
        let monday = date(2026, 3, 2);
        assert!(matches!(
            exp.generate_slots(&store_id, monday, monday, 3).await,
            Err(SlotError::StorageError(_))
        ));
        assert!(slots.all().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_template_must_belong_to_store() {
        let owner = StoreId::new();
        let template = daily_template(owner);
        let template_id = template.id;
        let slots = MemorySlots::default();
        let exp = expander(&slots, MemoryTemplates::default().with_template(template));
        let d = date(2026, 3, 4);

        assert!(matches!(
            exp.generate_slots_with_template(&StoreId::new(), &template_id, d, d, 1)
                .await,
            Err(SlotError::TemplateNotFound)
        ));
        let written = exp
            .generate_slots_with_template(&owner, &template_id, d, d, 1)
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn test_local_offset_shifts_slot_times() {
        let store_id = StoreId::new();
        let exp = SlotExpander::new(
            MemorySlots::default(),
            MemoryTemplates::default(),
            Arc::new(LedgerDrift::new()),
            ExpanderSettings {
                offset: FixedOffset::east_opt(8 * 3600).unwrap(),
                ..ExpanderSettings::default()
            },
        );
        let monday = date(2026, 3, 2);
        let built = exp.build_slots(&monday_template(store_id), monday, monday, 1);
        // 09:00 at UTC+8 is 01:00 UTC.
        assert_eq!(built[0].start_time, utc(2026, 3, 2, 1));
        assert_eq!(built[0].date, monday);
    }

    #[tokio::test]
    async fn test_recalculate_capacity_clamps_and_counts_drift() {
        let store_id = StoreId::new();
        let mut held = slot_at(store_id, utc(2026, 3, 2, 9), 5);
        held.locked_count = 3;
        held.booked_count = 1;
        held.status = SlotStatus::derive(5, 3, 1);
        let idle = slot_at(store_id, utc(2026, 3, 2, 10), 4);
        let beyond = slot_at(store_id, utc(2026, 9, 1, 10), 4);
        let slots = MemorySlots::default()
            .with_slot(held.clone())
            .with_slot(idle.clone())
            .with_slot(beyond.clone());

        let drift = Arc::new(LedgerDrift::new());
        let exp = SlotExpander::new(
            slots.clone(),
            MemoryTemplates::default(),
            drift.clone(),
            ExpanderSettings::default(),
        );

        let result = exp
            .recalculate_capacity(&store_id, date(2026, 3, 1), 2)
            .await
            .unwrap();
        assert_eq!(result.updated, 2);
        assert_eq!(result.clamped_locks, 2);
        assert_eq!(drift.snapshot().lock_clamped, 2);

        let held_after = slots.get(&held.id);
        assert_eq!(held_after.capacity, 2);
        assert_eq!(held_after.locked_count, 1);
        assert_eq!(held_after.booked_count, 1);
        assert!(held_after.is_consistent());

        assert_eq!(slots.get(&idle.id).capacity, 2);
        assert_eq!(slots.get(&beyond.id).capacity, 4, "outside the horizon");
    }

    #[tokio::test]
    async fn test_recalculate_never_drops_below_booked() {
        let store_id = StoreId::new();
        let mut booked = slot_at(store_id, utc(2026, 3, 2, 9), 5);
        booked.booked_count = 3;
        let slots = MemorySlots::default().with_slot(booked.clone());
        let exp = expander(&slots, MemoryTemplates::default());

        exp.recalculate_capacity(&store_id, date(2026, 3, 1), 1)
            .await
            .unwrap();
        let after = slots.get(&booked.id);
        assert_eq!(after.capacity, 3);
        assert!(after.is_consistent());
    }

    #[tokio::test]
    async fn test_release_staff_slots_keeps_live_rows() {
        let staff = StaffId::new();
        let store_id = StoreId::new();
        let mut idle = slot_at(store_id, utc(2026, 3, 3, 9), 1);
        idle.staff_id = Some(staff);
        let mut live = slot_at(store_id, utc(2026, 3, 4, 9), 1);
        live.staff_id = Some(staff);
        live.booked_count = 1;
        let mut past = slot_at(store_id, utc(2026, 2, 20, 9), 1);
        past.staff_id = Some(staff);
        let slots = MemorySlots::default()
            .with_slot(idle)
            .with_slot(live)
            .with_slot(past);
        let exp = expander(&slots, MemoryTemplates::default());

        let purge = exp
            .release_staff_slots(&staff, date(2026, 3, 1))
            .await
            .unwrap();
        assert_eq!(purge, StaffPurge { deleted: 1, retained: 1 });
        assert_eq!(slots.all().len(), 2);
    }
}
