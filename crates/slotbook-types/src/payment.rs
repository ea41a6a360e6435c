//! Payment and refund ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::id::{AppointmentId, PaymentId, RefundId};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => write!(f, $text)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(concat!("invalid ", $label, ": '{}'"), other)),
                }
            }
        }
    };
}

string_enum!(
    /// What a payment was for.
    PaymentType, "payment type" { Deposit => "deposit" }
);

string_enum!(
    /// Why a deposit was returned.
    RefundType, "refund type" { Arrival => "arrival", Cancel => "cancel" }
);

string_enum!(
    PaymentStatus, "payment status" {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
        Closed => "closed",
    }
);

string_enum!(
    RefundStatus, "refund status" {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
    }
);

/// An append-only payment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub appointment_id: AppointmentId,
    pub order_no: String,
    pub payment_type: PaymentType,
    /// Amount in cents.
    pub amount: i64,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An append-only refund row, tied to the payment it returns money from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub appointment_id: AppointmentId,
    pub payment_id: PaymentId,
    /// Order number of the originating payment.
    pub order_no: String,
    pub refund_no: String,
    pub refund_type: RefundType,
    pub amount: i64,
    pub status: RefundStatus,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub appointment_id: AppointmentId,
    pub amount: i64,
    pub payment_method: String,
    pub payment_type: PaymentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub appointment_id: AppointmentId,
    pub amount: i64,
    pub refund_type: RefundType,
}

/// Build an order number: prefix, UTC timestamp to the second, then six
/// random hex digits.
pub fn order_number(prefix: &str, now: DateTime<Utc>) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    // Leading digits of a v7 UUID are the timestamp; the tail is random.
    let suffix = &uuid[uuid.len() - 6..];
    format!("{prefix}{}{}", now.format("%Y%m%d%H%M%S"), suffix.to_uppercase())
}
