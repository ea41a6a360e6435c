//! Slot ledger: the authoritative capacity counters of each slot.
//!
//! Every mutator validates `n >= 1` up front, then hands a single
//! conditional update to the repository. A rejected update is classified
//! from the slot state observed in the same transaction.

use std::sync::Arc;

use chrono::NaiveDate;

use slotbook_types::error::SlotError;
use slotbook_types::id::{SlotId, StaffId, StoreId};
use slotbook_types::slot::Slot;

use crate::drift::LedgerDrift;
use crate::repository::slot::{LedgerOp, LedgerOutcome, SlotRepository};

pub struct SlotLedger<S: SlotRepository> {
    repo: S,
    drift: Arc<LedgerDrift>,
}

impl<S: SlotRepository> SlotLedger<S> {
    pub fn new(repo: S, drift: Arc<LedgerDrift>) -> Self {
        Self { repo, drift }
    }

    pub fn drift(&self) -> &Arc<LedgerDrift> {
        &self.drift
    }

    /// Hold `n` units of free capacity.
    pub async fn lock(&self, id: &SlotId, n: i32) -> Result<Slot, SlotError> {
        self.mutate(id, LedgerOp::Lock, n).await
    }

    /// Return `n` held units. Never clamps.
    pub async fn unlock(&self, id: &SlotId, n: i32) -> Result<Slot, SlotError> {
        self.mutate(id, LedgerOp::Unlock, n).await
    }

    /// Convert `n` held units into bookings.
    pub async fn book(&self, id: &SlotId, n: i32) -> Result<Slot, SlotError> {
        self.mutate(id, LedgerOp::Book, n).await
    }

    /// Return `n` booked units.
    pub async fn release(&self, id: &SlotId, n: i32) -> Result<Slot, SlotError> {
        self.mutate(id, LedgerOp::Release, n).await
    }

    /// Turn `n` booked units back into held ones.
    pub async fn unbook(&self, id: &SlotId, n: i32) -> Result<Slot, SlotError> {
        self.mutate(id, LedgerOp::Unbook, n).await
    }

    async fn mutate(&self, id: &SlotId, op: LedgerOp, n: i32) -> Result<Slot, SlotError> {
        if n <= 0 {
            return Err(SlotError::InvalidCount(n));
        }

        match self.repo.apply(id, op, n).await? {
            LedgerOutcome::Applied(slot) => {
                tracing::info!(
                    slot_id = %id,
                    op = op.as_str(),
                    count = n,
                    locked = slot.locked_count,
                    booked = slot.booked_count,
                    capacity = slot.capacity,
                    "slot counters updated"
                );
                Ok(slot)
            }
            LedgerOutcome::Missing => Err(SlotError::NotFound),
            LedgerOutcome::Rejected(slot) => {
                tracing::debug!(slot_id = %id, op = op.as_str(), count = n, "ledger update rejected");
                Err(match op {
                    LedgerOp::Lock => SlotError::InsufficientCapacity {
                        requested: n,
                        available: slot.remaining().max(0),
                    },
                    LedgerOp::Unlock => {
                        SlotError::InvalidState("unlock exceeds locked count".to_string())
                    }
                    LedgerOp::Book => {
                        SlotError::InvalidState("book exceeds locked count".to_string())
                    }
                    LedgerOp::Release => {
                        SlotError::InvalidState("release exceeds booked count".to_string())
                    }
                    LedgerOp::Unbook => {
                        SlotError::InvalidState("unbook exceeds booked count".to_string())
                    }
                })
            }
        }
    }

    pub async fn get(&self, id: &SlotId) -> Result<Slot, SlotError> {
        tracing::debug!(slot_id = %id, "get slot");
        self.repo.get_by_id(id).await?.ok_or(SlotError::NotFound)
    }

    pub async fn list_by_store_date(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError> {
        tracing::debug!(store_id = %store_id, %date, "list slots");
        Ok(self.repo.list_by_store_date(store_id, date).await?)
    }

    pub async fn list_by_store_range(
        &self,
        store_id: &StoreId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError> {
        if end < start {
            return Err(SlotError::InvalidDateRange { start, end });
        }
        Ok(self.repo.list_by_store_range(store_id, start, end).await?)
    }

    /// Slots a customer can still book on `date`.
    pub async fn list_bookable(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError> {
        Ok(self.repo.list_bookable(store_id, date).await?)
    }

    pub async fn list_by_staff_range(
        &self,
        staff_id: &StaffId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError> {
        if end < start {
            return Err(SlotError::InvalidDateRange { start, end });
        }
        Ok(self.repo.list_by_staff_range(staff_id, start, end).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySlots, slot_at, utc};

    fn ledger_with(capacity: i32) -> (SlotLedger<MemorySlots>, MemorySlots, SlotId) {
        let slot = slot_at(StoreId::new(), utc(2026, 3, 2, 9), capacity);
        let id = slot.id;
        let repo = MemorySlots::default().with_slot(slot);
        (SlotLedger::new(repo.clone(), Arc::new(LedgerDrift::new())), repo, id)
    }

    #[tokio::test]
    async fn test_lock_beyond_capacity_leaves_counters_unchanged() {
        let (ledger, repo, id) = ledger_with(5);

        let slot = ledger.lock(&id, 3).await.unwrap();
        assert_eq!(slot.locked_count, 3);

        let err = ledger.lock(&id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            SlotError::InsufficientCapacity {
                requested: 3,
                available: 2
            }
        ));
        let after = repo.get(&id);
        assert_eq!(after.locked_count, 3);
        assert_eq!(after.booked_count, 0);
    }

    #[tokio::test]
    async fn test_non_positive_counts_rejected() {
        let (ledger, repo, id) = ledger_with(5);
        for n in [0, -1] {
            assert!(matches!(ledger.lock(&id, n).await, Err(SlotError::InvalidCount(_))));
            assert!(matches!(ledger.release(&id, n).await, Err(SlotError::InvalidCount(_))));
        }
        assert!(repo.get(&id).is_idle());
    }

    #[tokio::test]
    async fn test_unlock_more_than_locked_is_invalid_state() {
        let (ledger, repo, id) = ledger_with(5);
        ledger.lock(&id, 1).await.unwrap();

        let err = ledger.unlock(&id, 2).await.unwrap_err();
        assert!(matches!(err, SlotError::InvalidState(_)));
        assert_eq!(repo.get(&id).locked_count, 1);
    }

    #[tokio::test]
    async fn test_book_moves_locked_to_booked() {
        let (ledger, _repo, id) = ledger_with(2);
        ledger.lock(&id, 2).await.unwrap();
        let slot = ledger.book(&id, 1).await.unwrap();
        assert_eq!(slot.locked_count, 1);
        assert_eq!(slot.booked_count, 1);

        // Cannot book units that were never locked.
        let err = ledger.book(&id, 2).await.unwrap_err();
        assert!(matches!(err, SlotError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_release_requires_booked_units() {
        let (ledger, _repo, id) = ledger_with(2);
        assert!(matches!(
            ledger.release(&id, 1).await,
            Err(SlotError::InvalidState(_))
        ));

        ledger.lock(&id, 1).await.unwrap();
        ledger.book(&id, 1).await.unwrap();
        let slot = ledger.release(&id, 1).await.unwrap();
        assert!(slot.is_idle());
    }

    #[tokio::test]
    async fn test_missing_slot_is_not_found() {
        let (ledger, _repo, _id) = ledger_with(2);
        let missing = SlotId::new();
        assert!(matches!(ledger.lock(&missing, 1).await, Err(SlotError::NotFound)));
        assert!(matches!(ledger.get(&missing).await, Err(SlotError::NotFound)));
    }

    #[tokio::test]
    async fn test_status_follows_counters() {
        use slotbook_types::slot::SlotStatus;

        let (ledger, _repo, id) = ledger_with(2);
        assert_eq!(ledger.lock(&id, 2).await.unwrap().status, SlotStatus::Locked);
        assert_eq!(ledger.book(&id, 2).await.unwrap().status, SlotStatus::Booked);
        assert_eq!(ledger.release(&id, 1).await.unwrap().status, SlotStatus::Available);
    }

    #[tokio::test]
    async fn test_invariant_holds_over_mixed_sequence() {
        let (ledger, repo, id) = ledger_with(3);
        let ops: [(LedgerOp, i32); 12] = [
            (LedgerOp::Lock, 2),
            (LedgerOp::Book, 1),
            (LedgerOp::Lock, 2),
            (LedgerOp::Release, 2),
            (LedgerOp::Unlock, 1),
            (LedgerOp::Lock, 1),
            (LedgerOp::Book, 2),
            (LedgerOp::Lock, 1),
            (LedgerOp::Release, 1),
            (LedgerOp::Unlock, 1),
            (LedgerOp::Unbook, 2),
            (LedgerOp::Unbook, 1),
        ];
        for (op, n) in ops {
            let _ = ledger.mutate(&id, op, n).await;
            assert!(repo.get(&id).is_consistent(), "after {op:?} {n}");
        }
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let (ledger, _repo, _id) = ledger_with(1);
        let start = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        assert!(matches!(
            ledger.list_by_store_range(&StoreId::new(), start, end).await,
            Err(SlotError::InvalidDateRange { .. })
        ));
    }
}
