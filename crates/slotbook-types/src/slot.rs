use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::id::{SlotId, StaffId, StoreId};

/// A bookable time window at one store.
///
/// Capacity accounting lives in three counters. At all times
/// `0 <= locked_count`, `0 <= booked_count` and
/// `locked_count + booked_count <= capacity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub store_id: StoreId,
    /// Staff member this slot is pinned to. `None` means any technician.
    pub staff_id: Option<StaffId>,
    /// Calendar date in the store's local offset.
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Total concurrent bookings this window can hold (on-shift headcount).
    pub capacity: i32,
    /// Units held by appointments still inside the payment window.
    pub locked_count: i32,
    /// Units held by paid appointments.
    pub booked_count: i32,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Units still free for new locks.
    pub fn remaining(&self) -> i32 {
        self.capacity - self.locked_count - self.booked_count
    }

    /// True when no appointment holds a unit of this slot.
    pub fn is_idle(&self) -> bool {
        self.locked_count == 0 && self.booked_count == 0
    }

    /// Whether capacity may be rewritten by expansion or recalculation.
    ///
    /// Administrative markers are never touched. Otherwise the slot must be
    /// open for booking, or hold nothing (a zero-capacity slot derives `booked`).
    pub fn accepts_capacity_change(&self) -> bool {
        !self.status.is_terminal() && (self.status == SlotStatus::Available || self.is_idle())
    }

    /// Check the capacity invariant.
    pub fn is_consistent(&self) -> bool {
        self.locked_count >= 0
            && self.booked_count >= 0
            && self.locked_count + self.booked_count <= self.capacity
    }
}

/// Slot status.
///
/// `Available`, `Locked` and `Booked` are derived from the counters after every
/// ledger mutation (see [`SlotStatus::derive`]). `Completed` and `Cancelled`
/// are administrative markers the ledger never overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Locked,
    Booked,
    Completed,
    Cancelled,
}

impl SlotStatus {
    /// Derive the informational status from the capacity counters.
    pub fn derive(capacity: i32, locked_count: i32, booked_count: i32) -> Self {
        if capacity - locked_count - booked_count > 0 {
            SlotStatus::Available
        } else if locked_count > 0 {
            SlotStatus::Locked
        } else {
            SlotStatus::Booked
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SlotStatus::Completed | SlotStatus::Cancelled)
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Locked => write!(f, "locked"),
            SlotStatus::Booked => write!(f, "booked"),
            SlotStatus::Completed => write!(f, "completed"),
            SlotStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(SlotStatus::Available),
            "locked" => Ok(SlotStatus::Locked),
            "booked" => Ok(SlotStatus::Booked),
            "completed" => Ok(SlotStatus::Completed),
            "cancelled" => Ok(SlotStatus::Cancelled),
            other => Err(format!("invalid slot status: '{other}'")),
        }
    }
}

/// Result of purging a departing staff member's pinned future slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffPurge {
    /// Idle slots removed.
    pub deleted: u64,
    /// Slots kept because appointments still hold units on them.
    pub retained: u64,
}
