//! Appointment domain types and the lifecycle transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::id::{AppointmentId, CustomerId, SlotId, StaffId, StoreId};

/// Deposit charged when a customer books, in cents.
pub const DEFAULT_DEPOSIT_CENTS: i64 = 1000;

/// Customers may cancel up to this many hours before the appointment starts.
pub const DEFAULT_CANCEL_WINDOW_HOURS: i64 = 3;

/// Lifecycle status of an appointment.
///
/// `pending -> paid -> confirmed -> completed`, with `cancelled` reachable
/// from `pending` and `paid` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Paid,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Paid, Confirmed)
                | (Confirmed, Completed)
                | (Pending, Cancelled)
                | (Paid, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Paid => write!(f, "paid"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "paid" => Ok(AppointmentStatus::Paid),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("invalid appointment status: '{other}'")),
        }
    }
}

/// Who cancelled an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelActor {
    Customer,
    Technician,
    System,
}

impl fmt::Display for CancelActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelActor::Customer => write!(f, "customer"),
            CancelActor::Technician => write!(f, "technician"),
            CancelActor::System => write!(f, "system"),
        }
    }
}

impl FromStr for CancelActor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(CancelActor::Customer),
            "technician" => Ok(CancelActor::Technician),
            "system" => Ok(CancelActor::System),
            other => Err(format!("invalid cancel actor: '{other}'")),
        }
    }
}

/// One customer's claim on one unit of slot capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub slot_id: SlotId,
    pub staff_id: Option<StaffId>,
    pub service_name: String,
    /// Service price in cents.
    pub service_price: i64,
    /// Deposit amount in cents.
    pub deposit_amount: i64,
    pub deposit_paid: bool,
    pub deposit_paid_at: Option<DateTime<Utc>>,
    pub deposit_refunded: bool,
    pub deposit_refunded_at: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelActor>,
    pub cancel_reason: Option<String>,
    pub remark: Option<String>,
    /// Slot start copied at creation.
    pub appointment_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// True when a paid deposit is still held and would be refunded on cancel.
    pub fn holds_deposit(&self) -> bool {
        self.deposit_paid && !self.deposit_refunded
    }
}

/// Request to create a new appointment against a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub customer_id: CustomerId,
    pub slot_id: SlotId,
    #[serde(default)]
    pub staff_id: Option<StaffId>,
    pub service_name: String,
    pub service_price: i64,
    #[serde(default)]
    pub remark: Option<String>,
}
