//! Stub payment gateway backed by the `payments` and `refunds` tables.
//!
//! No provider is called. Each charge or refund is written as `pending` and
//! settled to `success` in the same transaction, leaving the same ledger rows
//! a real provider callback would.

use chrono::{DateTime, Duration, Utc};
use slotbook_core::payment::PaymentGateway;
use slotbook_types::error::PaymentError;
use slotbook_types::id::{AppointmentId, PaymentId, RefundId};
use slotbook_types::payment::{
    Payment, PaymentRequest, PaymentStatus, Refund, RefundRequest, RefundStatus, order_number,
};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_id, query_error};

/// How long an unpaid payment order stays open.
const PAYMENT_TTL_MINUTES: i64 = 30;

fn storage(e: sqlx::Error) -> PaymentError {
    PaymentError::from(query_error(e))
}

#[derive(Clone)]
pub struct StubPaymentGateway {
    pool: DatabasePool,
}

impl StubPaymentGateway {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// All payments recorded for an appointment, oldest first.
    pub async fn payments_for(&self, appointment_id: &AppointmentId) -> Result<Vec<Payment>, PaymentError> {
        let rows = sqlx::query("SELECT * FROM payments WHERE appointment_id = ? ORDER BY created_at")
            .bind(appointment_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(storage)?;
        rows.iter().map(payment_from_row).collect()
    }

    /// All refunds recorded for an appointment, oldest first.
    pub async fn refunds_for(&self, appointment_id: &AppointmentId) -> Result<Vec<Refund>, PaymentError> {
        let rows = sqlx::query("SELECT * FROM refunds WHERE appointment_id = ? ORDER BY created_at")
            .bind(appointment_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(storage)?;
        rows.iter().map(refund_from_row).collect()
    }
}

fn optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, PaymentError> {
    Ok(value.as_deref().map(parse_datetime).transpose()?)
}

fn payment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Payment, PaymentError> {
    let get = |col: &str| row.try_get::<String, _>(col).map_err(storage);
    Ok(Payment {
        id: parse_id(&get("id")?, "payment")?,
        appointment_id: parse_id(&get("appointment_id")?, "appointment")?,
        order_no: get("order_no")?,
        payment_type: get("payment_type")?
            .parse()
            .map_err(PaymentError::StorageError)?,
        amount: row.try_get("amount").map_err(storage)?,
        payment_method: get("payment_method")?,
        status: get("status")?.parse().map_err(PaymentError::StorageError)?,
        expires_at: parse_datetime(&get("expires_at")?)?,
        paid_at: optional_time(row.try_get("paid_at").map_err(storage)?)?,
        created_at: parse_datetime(&get("created_at")?)?,
        updated_at: parse_datetime(&get("updated_at")?)?,
    })
}

fn refund_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Refund, PaymentError> {
    let get = |col: &str| row.try_get::<String, _>(col).map_err(storage);
    Ok(Refund {
        id: parse_id(&get("id")?, "refund")?,
        appointment_id: parse_id(&get("appointment_id")?, "appointment")?,
        payment_id: parse_id(&get("payment_id")?, "payment")?,
        order_no: get("order_no")?,
        refund_no: get("refund_no")?,
        refund_type: get("refund_type")?
            .parse()
            .map_err(PaymentError::StorageError)?,
        amount: row.try_get("amount").map_err(storage)?,
        status: get("status")?.parse().map_err(PaymentError::StorageError)?,
        refunded_at: optional_time(row.try_get("refunded_at").map_err(storage)?)?,
        created_at: parse_datetime(&get("created_at")?)?,
        updated_at: parse_datetime(&get("updated_at")?)?,
    })
}

impl PaymentGateway for StubPaymentGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<Payment, PaymentError> {
        if request.amount <= 0 {
            return Err(PaymentError::InvalidAmount(request.amount));
        }

        let now = Utc::now();
        let mut payment = Payment {
            id: PaymentId::new(),
            appointment_id: request.appointment_id,
            order_no: order_number("PAY", now),
            payment_type: request.payment_type,
            amount: request.amount,
            payment_method: request.payment_method.clone(),
            status: PaymentStatus::Pending,
            expires_at: now + Duration::minutes(PAYMENT_TTL_MINUTES),
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.writer.begin().await.map_err(storage)?;

        sqlx::query(
            "INSERT INTO payments (id, appointment_id, order_no, payment_type, amount, payment_method,
                 status, expires_at, paid_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(payment.id.to_string())
        .bind(payment.appointment_id.to_string())
        .bind(&payment.order_no)
        .bind(payment.payment_type.to_string())
        .bind(payment.amount)
        .bind(&payment.payment_method)
        .bind(payment.status.to_string())
        .bind(format_datetime(&payment.expires_at))
        .bind(format_datetime(&payment.created_at))
        .bind(format_datetime(&payment.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.message().contains("FOREIGN KEY") => {
                PaymentError::Declined("unknown appointment".to_string())
            }
            other => storage(other),
        })?;

        let paid_at = Utc::now();
        sqlx::query("UPDATE payments SET status = ?, paid_at = ?, updated_at = ? WHERE id = ?")
            .bind(PaymentStatus::Success.to_string())
            .bind(format_datetime(&paid_at))
            .bind(format_datetime(&paid_at))
            .bind(payment.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        payment.status = PaymentStatus::Success;
        payment.paid_at = Some(paid_at);
        payment.updated_at = paid_at;
        tracing::info!(
            appointment_id = %payment.appointment_id,
            order_no = %payment.order_no,
            amount = payment.amount,
            "deposit payment recorded"
        );
        Ok(payment)
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<Refund, PaymentError> {
        if request.amount <= 0 {
            return Err(PaymentError::InvalidAmount(request.amount));
        }

        let mut tx = self.pool.writer.begin().await.map_err(storage)?;

        let row = sqlx::query(
            "SELECT * FROM payments WHERE appointment_id = ? AND status = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(request.appointment_id.to_string())
        .bind(PaymentStatus::Success.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;
        let payment = row
            .as_ref()
            .map(payment_from_row)
            .transpose()?
            .ok_or(PaymentError::PaymentNotFound)?;

        let refunded: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE payment_id = ? AND status = ?",
        )
        .bind(payment.id.to_string())
        .bind(RefundStatus::Success.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;
        if refunded >= payment.amount {
            return Err(PaymentError::FullyRefunded);
        }
        if refunded + request.amount > payment.amount {
            return Err(PaymentError::Declined(format!(
                "refund of {} exceeds refundable {}",
                request.amount,
                payment.amount - refunded
            )));
        }

        let now = Utc::now();
        let refund = Refund {
            id: RefundId::new(),
            appointment_id: request.appointment_id,
            payment_id: payment.id,
            order_no: payment.order_no.clone(),
            refund_no: order_number("REF", now),
            refund_type: request.refund_type,
            amount: request.amount,
            status: RefundStatus::Success,
            refunded_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO refunds (id, appointment_id, payment_id, order_no, refund_no, refund_type,
                 amount, status, refunded_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(refund.id.to_string())
        .bind(refund.appointment_id.to_string())
        .bind(refund.payment_id.to_string())
        .bind(&refund.order_no)
        .bind(&refund.refund_no)
        .bind(refund.refund_type.to_string())
        .bind(refund.amount)
        .bind(RefundStatus::Pending.to_string())
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("UPDATE refunds SET status = ?, refunded_at = ?, updated_at = ? WHERE id = ?")
            .bind(RefundStatus::Success.to_string())
            .bind(format_datetime(&now))
            .bind(format_datetime(&now))
            .bind(refund.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        tracing::info!(
            appointment_id = %refund.appointment_id,
            refund_no = %refund.refund_no,
            refund_type = %refund.refund_type,
            amount = refund.amount,
            "deposit refund recorded"
        );
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::appointment::SqliteAppointmentRepository;
    use crate::sqlite::appointment::tests::make_appointment;
    use crate::sqlite::test_support::test_pool;
    use slotbook_core::repository::appointment::AppointmentRepository;
    use slotbook_types::id::CustomerId;
    use slotbook_types::payment::{PaymentType, RefundType};

    async fn setup() -> (StubPaymentGateway, AppointmentId) {
        let pool = test_pool().await;
        let appt = SqliteAppointmentRepository::new(pool.clone())
            .create(&make_appointment(CustomerId::new(), Utc::now()))
            .await
            .unwrap();
        (StubPaymentGateway::new(pool), appt.id)
    }

    fn deposit(appointment_id: AppointmentId, amount: i64) -> PaymentRequest {
        PaymentRequest {
            appointment_id,
            amount,
            payment_method: "wechat".to_string(),
            payment_type: PaymentType::Deposit,
        }
    }

    fn refund(appointment_id: AppointmentId, amount: i64) -> RefundRequest {
        RefundRequest {
            appointment_id,
            amount,
            refund_type: RefundType::Cancel,
        }
    }

    #[tokio::test]
    async fn test_payment_settles_to_success() {
        let (gateway, appt) = setup().await;
        let payment = gateway.create_payment(&deposit(appt, 1000)).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert!(payment.order_no.starts_with("PAY"));
        assert!(payment.paid_at.is_some());

        let stored = gateway.payments_for(&appt).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, PaymentStatus::Success);
        assert_eq!(stored[0].order_no, payment.order_no);
    }

    #[tokio::test]
    async fn test_refund_requires_successful_payment() {
        let (gateway, appt) = setup().await;
        assert!(matches!(
            gateway.create_refund(&refund(appt, 1000)).await,
            Err(PaymentError::PaymentNotFound)
        ));
    }

    #[tokio::test]
    async fn test_refund_cannot_exceed_payment() {
        let (gateway, appt) = setup().await;
        let payment = gateway.create_payment(&deposit(appt, 1000)).await.unwrap();

        let first = gateway.create_refund(&refund(appt, 1000)).await.unwrap();
        assert_eq!(first.payment_id, payment.id);
        assert_eq!(first.order_no, payment.order_no);
        assert!(first.refund_no.starts_with("REF"));

        assert!(matches!(
            gateway.create_refund(&refund(appt, 1)).await,
            Err(PaymentError::FullyRefunded)
        ));
        assert_eq!(gateway.refunds_for(&appt).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_refund_then_overshoot_declined() {
        let (gateway, appt) = setup().await;
        gateway.create_payment(&deposit(appt, 1000)).await.unwrap();
        gateway.create_refund(&refund(appt, 400)).await.unwrap();

        match gateway.create_refund(&refund(appt, 1000)).await {
            Err(PaymentError::Declined(msg)) => assert!(msg.contains("refundable 600")),
            other => panic!("unexpected result: {other:?}"),
        }
        gateway.create_refund(&refund(appt, 600)).await.unwrap();
        assert!(matches!(
            gateway.create_refund(&refund(appt, 1)).await,
            Err(PaymentError::FullyRefunded)
        ));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (gateway, appt) = setup().await;
        assert!(matches!(
            gateway.create_payment(&deposit(appt, 0)).await,
            Err(PaymentError::InvalidAmount(0))
        ));
        assert!(matches!(
            gateway.create_refund(&refund(appt, -5)).await,
            Err(PaymentError::InvalidAmount(-5))
        ));
    }

    #[tokio::test]
    async fn test_payment_for_unknown_appointment_declined() {
        let (gateway, _appt) = setup().await;
        assert!(matches!(
            gateway.create_payment(&deposit(AppointmentId::new(), 1000)).await,
            Err(PaymentError::Declined(_))
        ));
    }
}
