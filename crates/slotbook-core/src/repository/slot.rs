//! Slot repository trait definition.

use chrono::NaiveDate;

use slotbook_types::error::RepositoryError;
use slotbook_types::id::{SlotId, StaffId, StoreId};
use slotbook_types::slot::{Slot, StaffPurge};

/// A capacity counter mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    /// Hold units for an unpaid appointment.
    Lock,
    /// Give held units back.
    Unlock,
    /// Move held units to booked.
    Book,
    /// Give booked units back.
    Release,
    /// Move booked units back to held.
    Unbook,
}

impl LedgerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOp::Lock => "lock",
            LedgerOp::Unlock => "unlock",
            LedgerOp::Book => "book",
            LedgerOp::Release => "release",
            LedgerOp::Unbook => "unbook",
        }
    }

    /// Whether applying `n` units to `slot` keeps the counters consistent.
    pub fn permits(&self, slot: &Slot, n: i32) -> bool {
        match self {
            LedgerOp::Lock => slot.remaining() >= n,
            LedgerOp::Unlock | LedgerOp::Book => slot.locked_count >= n,
            LedgerOp::Release | LedgerOp::Unbook => slot.booked_count >= n,
        }
    }

    /// New `(locked_count, booked_count)` after applying `n` units.
    pub fn counts_after(&self, slot: &Slot, n: i32) -> (i32, i32) {
        match self {
            LedgerOp::Lock => (slot.locked_count + n, slot.booked_count),
            LedgerOp::Unlock => (slot.locked_count - n, slot.booked_count),
            LedgerOp::Book => (slot.locked_count - n, slot.booked_count + n),
            LedgerOp::Release => (slot.locked_count, slot.booked_count - n),
            LedgerOp::Unbook => (slot.locked_count + n, slot.booked_count - n),
        }
    }
}

/// Result of a conditional counter update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The update applied; carries the slot as it is now.
    Applied(Slot),
    /// No slot with that id.
    Missing,
    /// The precondition failed; carries the slot as it was observed.
    Rejected(Slot),
}

/// Rows touched by a capacity recalculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityRecalc {
    /// Slots whose capacity changed.
    pub updated: u64,
    /// Lock units dropped because capacity fell below `locked + booked`.
    pub clamped_locks: u64,
}

/// Repository trait for slot persistence and capacity counters.
///
/// Counter mutations must be single conditional updates: the precondition
/// check and the write happen atomically with respect to other mutators.
pub trait SlotRepository: Send + Sync {
    fn get_by_id(
        &self,
        id: &SlotId,
    ) -> impl std::future::Future<Output = Result<Option<Slot>, RepositoryError>> + Send;

    /// All slots of a store on one date, ordered by start time.
    fn list_by_store_date(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Slot>, RepositoryError>> + Send;

    /// All slots of a store in an inclusive date range.
    fn list_by_store_range(
        &self,
        store_id: &StoreId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Slot>, RepositoryError>> + Send;

    /// Slots with free capacity and status `available`.
    fn list_bookable(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Slot>, RepositoryError>> + Send;

    fn list_by_staff_range(
        &self,
        staff_id: &StaffId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Slot>, RepositoryError>> + Send;

    /// True if any slot of the store on `date` has locked or booked units.
    fn has_live_units(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Insert slots in one transaction, `chunk_size` rows per statement.
    ///
    /// Unpinned slots are keyed on (store, start, end): an existing idle row
    /// gets its capacity refreshed, a row holding units is left alone.
    /// Returns the number of rows inserted or refreshed.
    fn upsert_batch(
        &self,
        slots: &[Slot],
        chunk_size: usize,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Apply a counter mutation if its precondition holds.
    fn apply(
        &self,
        id: &SlotId,
        op: LedgerOp,
        n: i32,
    ) -> impl std::future::Future<Output = Result<LedgerOutcome, RepositoryError>> + Send;

    /// Set `capacity = headcount` on available slots of a store dated in
    /// `[from, to]`. Capacity never drops below `booked_count`, and
    /// `locked_count` is clamped to fit.
    fn recalculate_capacity(
        &self,
        store_id: &StoreId,
        from: NaiveDate,
        to: NaiveDate,
        headcount: i32,
    ) -> impl std::future::Future<Output = Result<CapacityRecalc, RepositoryError>> + Send;

    /// Delete idle slots pinned to a staff member dated on or after `from`.
    fn purge_staff_slots(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
    ) -> impl std::future::Future<Output = Result<StaffPurge, RepositoryError>> + Send;
}
