//! SQLite appointment repository.
//!
//! Status changes are compare-and-set: `UPDATE ... WHERE id = ? AND status = ?`.

use chrono::{DateTime, Utc};
use slotbook_core::repository::appointment::AppointmentRepository;
use slotbook_types::appointment::{Appointment, AppointmentStatus, CancelActor};
use slotbook_types::error::RepositoryError;
use slotbook_types::id::{AppointmentId, CustomerId, SlotId, StaffId, StoreId};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, is_unique_violation, parse_datetime, parse_id, query_error};

#[derive(Clone)]
pub struct SqliteAppointmentRepository {
    pool: DatabasePool,
}

impl SqliteAppointmentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, binds: &[String]) -> Result<Vec<Appointment>, RepositoryError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(appointment_from_row).collect()
    }
}

struct AppointmentRow {
    id: String,
    customer_id: String,
    store_id: String,
    slot_id: String,
    staff_id: Option<String>,
    service_name: String,
    service_price: i64,
    deposit_amount: i64,
    deposit_paid: bool,
    deposit_paid_at: Option<String>,
    deposit_refunded: bool,
    deposit_refunded_at: Option<String>,
    status: String,
    cancelled_at: Option<String>,
    cancelled_by: Option<String>,
    cancel_reason: Option<String>,
    remark: Option<String>,
    appointment_time: String,
    created_at: String,
    updated_at: String,
}

impl AppointmentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            store_id: row.try_get("store_id")?,
            slot_id: row.try_get("slot_id")?,
            staff_id: row.try_get("staff_id")?,
            service_name: row.try_get("service_name")?,
            service_price: row.try_get("service_price")?,
            deposit_amount: row.try_get("deposit_amount")?,
            deposit_paid: row.try_get("deposit_paid")?,
            deposit_paid_at: row.try_get("deposit_paid_at")?,
            deposit_refunded: row.try_get("deposit_refunded")?,
            deposit_refunded_at: row.try_get("deposit_refunded_at")?,
            status: row.try_get("status")?,
            cancelled_at: row.try_get("cancelled_at")?,
            cancelled_by: row.try_get("cancelled_by")?,
            cancel_reason: row.try_get("cancel_reason")?,
            remark: row.try_get("remark")?,
            appointment_time: row.try_get("appointment_time")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_appointment(self) -> Result<Appointment, RepositoryError> {
        let optional_time = |value: Option<String>| value.as_deref().map(parse_datetime).transpose();
        let cancelled_by = self
            .cancelled_by
            .as_deref()
            .map(|s| s.parse::<CancelActor>().map_err(RepositoryError::Query))
            .transpose()?;

        Ok(Appointment {
            id: parse_id(&self.id, "appointment")?,
            customer_id: parse_id(&self.customer_id, "customer")?,
            store_id: parse_id(&self.store_id, "store")?,
            slot_id: parse_id(&self.slot_id, "slot")?,
            staff_id: self
                .staff_id
                .as_deref()
                .map(|s| parse_id::<StaffId>(s, "staff"))
                .transpose()?,
            service_name: self.service_name,
            service_price: self.service_price,
            deposit_amount: self.deposit_amount,
            deposit_paid: self.deposit_paid,
            deposit_paid_at: optional_time(self.deposit_paid_at)?,
            deposit_refunded: self.deposit_refunded,
            deposit_refunded_at: optional_time(self.deposit_refunded_at)?,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            cancelled_at: optional_time(self.cancelled_at)?,
            cancelled_by,
            cancel_reason: self.cancel_reason,
            remark: self.remark,
            appointment_time: parse_datetime(&self.appointment_time)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn appointment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Appointment, RepositoryError> {
    AppointmentRow::from_row(row)
        .map_err(query_error)?
        .into_appointment()
}

impl AppointmentRepository for SqliteAppointmentRepository {
    async fn create(&self, appointment: &Appointment) -> Result<Appointment, RepositoryError> {
        let a = appointment;
        let result = sqlx::query(
            "INSERT INTO appointments (id, customer_id, store_id, slot_id, staff_id, service_name,
                 service_price, deposit_amount, deposit_paid, deposit_paid_at, deposit_refunded,
                 deposit_refunded_at, status, cancelled_at, cancelled_by, cancel_reason, remark,
                 appointment_time, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(a.id.to_string())
        .bind(a.customer_id.to_string())
        .bind(a.store_id.to_string())
        .bind(a.slot_id.to_string())
        .bind(a.staff_id.map(|s| s.to_string()))
        .bind(&a.service_name)
        .bind(a.service_price)
        .bind(a.deposit_amount)
        .bind(a.deposit_paid)
        .bind(a.deposit_paid_at.as_ref().map(format_datetime))
        .bind(a.deposit_refunded)
        .bind(a.deposit_refunded_at.as_ref().map(format_datetime))
        .bind(a.status.to_string())
        .bind(a.cancelled_at.as_ref().map(format_datetime))
        .bind(a.cancelled_by.map(|c| c.to_string()))
        .bind(&a.cancel_reason)
        .bind(&a.remark)
        .bind(format_datetime(&a.appointment_time))
        .bind(format_datetime(&a.created_at))
        .bind(format_datetime(&a.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(appointment.clone()),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Conflict(format!(
                "appointment {} already exists",
                appointment.id
            ))),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get_by_id(&self, id: &AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM appointments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn update_if_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<bool, RepositoryError> {
        let a = appointment;
        let result = sqlx::query(
            "UPDATE appointments SET
                 deposit_paid = ?, deposit_paid_at = ?, deposit_refunded = ?,
                 deposit_refunded_at = ?, status = ?, cancelled_at = ?, cancelled_by = ?,
                 cancel_reason = ?, remark = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(a.deposit_paid)
        .bind(a.deposit_paid_at.as_ref().map(format_datetime))
        .bind(a.deposit_refunded)
        .bind(a.deposit_refunded_at.as_ref().map(format_datetime))
        .bind(a.status.to_string())
        .bind(a.cancelled_at.as_ref().map(format_datetime))
        .bind(a.cancelled_by.map(|c| c.to_string()))
        .bind(&a.cancel_reason)
        .bind(&a.remark)
        .bind(format_datetime(&a.updated_at))
        .bind(a.id.to_string())
        .bind(expected.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM appointments WHERE customer_id = ? ORDER BY appointment_time DESC",
            &[customer_id.to_string()],
        )
        .await
    }

    async fn list_upcoming_by_customer(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM appointments WHERE customer_id = ? AND appointment_time >= ?
                 AND status NOT IN ('cancelled', 'completed')
             ORDER BY appointment_time ASC",
            &[customer_id.to_string(), format_datetime(&now)],
        )
        .await
    }

    async fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<Appointment>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM appointments WHERE store_id = ? ORDER BY appointment_time DESC",
            &[store_id.to_string()],
        )
        .await
    }

    async fn list_by_slot(&self, slot_id: &SlotId) -> Result<Vec<Appointment>, RepositoryError> {
        self.fetch_many(
            "SELECT * FROM appointments WHERE slot_id = ? ORDER BY created_at ASC",
            &[slot_id.to_string()],
        )
        .await
    }
}
