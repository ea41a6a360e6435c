//! Appointment repository trait definition.

use chrono::{DateTime, Utc};

use slotbook_types::appointment::{Appointment, AppointmentStatus};
use slotbook_types::error::RepositoryError;
use slotbook_types::id::{AppointmentId, CustomerId, SlotId, StoreId};

/// Repository trait for appointment persistence.
///
/// Appointments are never deleted. Every status change goes through
/// [`AppointmentRepository::update_if_status`], a compare-and-set on the
/// stored status.
pub trait AppointmentRepository: Send + Sync {
    fn create(
        &self,
        appointment: &Appointment,
    ) -> impl std::future::Future<Output = Result<Appointment, RepositoryError>> + Send;

    fn get_by_id(
        &self,
        id: &AppointmentId,
    ) -> impl std::future::Future<Output = Result<Option<Appointment>, RepositoryError>> + Send;

    /// Persist `appointment` only if the stored status still equals `expected`.
    ///
    /// Returns `false` when the row is missing or its status moved on.
    fn update_if_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All appointments of a customer, newest appointment time first.
    fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> impl std::future::Future<Output = Result<Vec<Appointment>, RepositoryError>> + Send;

    /// Live appointments of a customer starting at or after `now`, soonest first.
    fn list_upcoming_by_customer(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<Appointment>, RepositoryError>> + Send;

    fn list_by_store(
        &self,
        store_id: &StoreId,
    ) -> impl std::future::Future<Output = Result<Vec<Appointment>, RepositoryError>> + Send;

    fn list_by_slot(
        &self,
        slot_id: &SlotId,
    ) -> impl std::future::Future<Output = Result<Vec<Appointment>, RepositoryError>> + Send;
}
