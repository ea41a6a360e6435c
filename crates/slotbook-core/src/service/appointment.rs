//! Appointment state machine.
//!
//! ```text
//! pending --pay--> paid --confirm--> confirmed --complete--> completed
//!    |               |
//!    +----cancel-----+--> cancelled
//! ```
//!
//! Each transition drives the slot ledger (lock on create, book on pay,
//! unlock/release on cancel, release on complete) and, where money moves,
//! the payment gateway. Persisted transitions are compare-and-set on the
//! stored status, so concurrent transitions on one appointment cannot both
//! apply.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use slotbook_types::appointment::{
    Appointment, AppointmentStatus, CancelActor, CreateAppointmentRequest,
};
use slotbook_types::config::BookingConfig;
use slotbook_types::error::{AppointmentError, PaymentError, SlotError};
use slotbook_types::id::{AppointmentId, CustomerId, SlotId, StoreId};
use slotbook_types::payment::{PaymentRequest, PaymentType, RefundRequest, RefundType};

use crate::drift::{DriftKind, LedgerDrift};
use crate::payment::PaymentGateway;
use crate::repository::appointment::AppointmentRepository;
use crate::repository::slot::SlotRepository;
use crate::service::ledger::SlotLedger;

#[derive(Debug, Clone, Copy)]
pub struct AppointmentSettings {
    pub deposit_cents: i64,
    pub cancel_window_hours: i64,
}

impl From<&BookingConfig> for AppointmentSettings {
    fn from(config: &BookingConfig) -> Self {
        Self {
            deposit_cents: config.deposit_cents,
            cancel_window_hours: config.cancel_window_hours.max(0),
        }
    }
}

impl Default for AppointmentSettings {
    fn default() -> Self {
        Self::from(&BookingConfig::default())
    }
}

pub struct AppointmentService<A: AppointmentRepository, S: SlotRepository, P: PaymentGateway> {
    repo: A,
    ledger: SlotLedger<S>,
    payments: P,
    settings: AppointmentSettings,
}

impl<A: AppointmentRepository, S: SlotRepository, P: PaymentGateway> AppointmentService<A, S, P> {
    pub fn new(repo: A, ledger: SlotLedger<S>, payments: P, settings: AppointmentSettings) -> Self {
        Self {
            repo,
            ledger,
            payments,
            settings,
        }
    }

    fn drift(&self) -> &Arc<LedgerDrift> {
        self.ledger.drift()
    }

    /// Create a pending appointment holding one unit of the slot.
    pub async fn create(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let slot = self.ledger.get(&request.slot_id).await?;
        if slot.remaining() < 1 {
            return Err(AppointmentError::InsufficientCapacity {
                requested: 1,
                available: slot.remaining().max(0),
            });
        }

        self.ledger.lock(&slot.id, 1).await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: AppointmentId::new(),
            customer_id: request.customer_id,
            store_id: slot.store_id,
            slot_id: slot.id,
            staff_id: request.staff_id,
            service_name: request.service_name,
            service_price: request.service_price,
            deposit_amount: self.settings.deposit_cents,
            deposit_paid: false,
            deposit_paid_at: None,
            deposit_refunded: false,
            deposit_refunded_at: None,
            status: AppointmentStatus::Pending,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            remark: request.remark,
            appointment_time: slot.start_time,
            created_at: now,
            updated_at: now,
        };

        match self.repo.create(&appointment).await {
            Ok(created) => {
                tracing::info!(
                    appointment_id = %created.id,
                    slot_id = %slot.id,
                    customer_id = %created.customer_id,
                    "appointment created"
                );
                Ok(created)
            }
            Err(e) => {
                if let Err(unlock_err) = self.ledger.unlock(&slot.id, 1).await {
                    self.drift().record(DriftKind::CompensationFailed, 1);
                    tracing::warn!(
                        slot_id = %slot.id,
                        drift_kind = DriftKind::CompensationFailed.as_str(),
                        error = %unlock_err,
                        "failed to release lock after appointment insert failed"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Charge the deposit and convert the held lock into a booking.
    pub async fn pay_deposit(
        &self,
        id: &AppointmentId,
        payment_method: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        if appointment.status != AppointmentStatus::Pending || appointment.deposit_paid {
            return Err(invalid_state(&appointment, "pay"));
        }

        let payment = self
            .payments
            .create_payment(&PaymentRequest {
                appointment_id: appointment.id,
                amount: appointment.deposit_amount,
                payment_method: payment_method.to_string(),
                payment_type: PaymentType::Deposit,
            })
            .await
            .map_err(|e| {
                tracing::warn!(appointment_id = %id, error = %e, "deposit payment failed");
                AppointmentError::from(e)
            })?;

        // Book before the status write: anyone who later sees `paid` must
        // also see the booked unit.
        let booked = self.ledger.book(&appointment.slot_id, 1).await;

        let now = Utc::now();
        let mut updated = appointment.clone();
        updated.deposit_paid = true;
        updated.deposit_paid_at = Some(now);
        updated.status = AppointmentStatus::Paid;
        updated.updated_at = now;

        if let Err(e) = self.persist(&updated, AppointmentStatus::Pending, "pay").await {
            // Lost a race after the money moved; hand both back.
            let refund = self
                .payments
                .create_refund(&RefundRequest {
                    appointment_id: appointment.id,
                    amount: appointment.deposit_amount,
                    refund_type: RefundType::Cancel,
                })
                .await;
            if booked.is_ok() {
                self.undo_booking(&appointment).await;
            }
            tracing::warn!(
                appointment_id = %id,
                order_no = %payment.order_no,
                refunded = refund.is_ok(),
                "appointment changed while deposit was charged"
            );
            return Err(e);
        }

        if let Err(e) = booked {
            self.drift().record(DriftKind::BookFailed, 1);
            tracing::warn!(
                appointment_id = %id,
                slot_id = %appointment.slot_id,
                drift_kind = DriftKind::BookFailed.as_str(),
                error = %e,
                "deposit paid but slot lock could not be converted to a booking"
            );
        }

        tracing::info!(appointment_id = %id, order_no = %payment.order_no, "deposit paid");
        Ok(updated)
    }

    /// Customer arrived: refund the deposit and mark the appointment confirmed.
    pub async fn confirm_arrival(&self, id: &AppointmentId) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        if appointment.status != AppointmentStatus::Paid {
            return Err(invalid_state(&appointment, "confirm"));
        }
        if appointment.deposit_refunded {
            return Err(AppointmentError::AlreadyRefunded);
        }

        self.refund_deposit(&appointment, RefundType::Arrival).await?;

        let now = Utc::now();
        let mut updated = appointment;
        updated.status = AppointmentStatus::Confirmed;
        updated.deposit_refunded = true;
        updated.deposit_refunded_at = Some(now);
        updated.updated_at = now;
        self.persist(&updated, AppointmentStatus::Paid, "confirm").await?;

        tracing::info!(appointment_id = %id, "arrival confirmed, deposit refunded");
        Ok(updated)
    }

    /// Service done: mark completed and give the booked unit back.
    pub async fn complete(&self, id: &AppointmentId) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        if appointment.status != AppointmentStatus::Confirmed {
            return Err(invalid_state(&appointment, "complete"));
        }

        let mut updated = appointment;
        updated.status = AppointmentStatus::Completed;
        updated.updated_at = Utc::now();
        self.persist(&updated, AppointmentStatus::Confirmed, "complete")
            .await?;

        if let Err(e) = self.ledger.release(&updated.slot_id, 1).await {
            self.record_release_drift(&updated, &e.to_string());
        }

        tracing::info!(appointment_id = %id, "appointment completed");
        Ok(updated)
    }

    /// Customer cancellation. Refused inside the cancellation window.
    pub async fn cancel_by_customer(
        &self,
        id: &AppointmentId,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.cancel(id, CancelActor::Customer, reason).await
    }

    /// Technician cancellation. No time window.
    pub async fn cancel_by_technician(
        &self,
        id: &AppointmentId,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.cancel(id, CancelActor::Technician, reason).await
    }

    /// Administrative cancellation. No time window.
    pub async fn cancel_by_system(
        &self,
        id: &AppointmentId,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.cancel(id, CancelActor::System, reason).await
    }

    pub async fn cancel(
        &self,
        id: &AppointmentId,
        actor: CancelActor,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        let previous = appointment.status;
        if !previous.can_transition_to(AppointmentStatus::Cancelled) {
            return Err(invalid_state(&appointment, "cancel"));
        }

        let now = Utc::now();
        if actor == CancelActor::Customer {
            let window = TimeDelta::hours(self.settings.cancel_window_hours);
            if appointment.appointment_time - now < window {
                return Err(AppointmentError::CancelTooLate {
                    window_hours: self.settings.cancel_window_hours,
                });
            }
        }

        let mut updated = appointment.clone();
        if previous == AppointmentStatus::Paid && appointment.holds_deposit() {
            self.refund_deposit(&appointment, RefundType::Cancel).await?;
            updated.deposit_refunded = true;
            updated.deposit_refunded_at = Some(now);
        }

        updated.status = AppointmentStatus::Cancelled;
        updated.cancelled_at = Some(now);
        updated.cancelled_by = Some(actor);
        updated.cancel_reason = reason.filter(|r| !r.trim().is_empty());
        updated.updated_at = now;
        self.persist(&updated, previous, "cancel").await?;

        let give_back = match previous {
            AppointmentStatus::Pending => self.ledger.unlock(&updated.slot_id, 1).await,
            _ => self.ledger.release(&updated.slot_id, 1).await,
        };
        if let Err(e) = give_back {
            self.record_release_drift(&updated, &e.to_string());
        }

        tracing::info!(
            appointment_id = %id,
            actor = %actor,
            previous = %previous,
            "appointment cancelled"
        );
        Ok(updated)
    }

    pub async fn get(&self, id: &AppointmentId) -> Result<Appointment, AppointmentError> {
        tracing::debug!(appointment_id = %id, "get appointment");
        self.load(id).await
    }

    pub async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.repo.list_by_customer(customer_id).await?)
    }

    /// Live appointments that have not started yet.
    pub async fn list_upcoming_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self
            .repo
            .list_upcoming_by_customer(customer_id, Utc::now())
            .await?)
    }

    pub async fn list_by_store(
        &self,
        store_id: &StoreId,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.repo.list_by_store(store_id).await?)
    }

    pub async fn list_by_slot(&self, slot_id: &SlotId) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.repo.list_by_slot(slot_id).await?)
    }

    async fn load(&self, id: &AppointmentId) -> Result<Appointment, AppointmentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Give back a booking whose `paid` write did not land.
    async fn undo_booking(&self, appointment: &Appointment) {
        let current = self
            .repo
            .get_by_id(&appointment.id)
            .await
            .ok()
            .flatten()
            .map(|a| a.status);
        let undo = match current {
            // The write failed outright; the appointment still holds its lock.
            Some(AppointmentStatus::Pending) => self.ledger.unbook(&appointment.slot_id, 1).await,
            // A concurrent cancel found no lock to give back.
            Some(AppointmentStatus::Cancelled) => {
                self.ledger.release(&appointment.slot_id, 1).await
            }
            // Another payment landed first and owns this booking.
            Some(_) => return,
            None => Err(SlotError::StorageError("appointment unreadable".to_string())),
        };
        if let Err(e) = undo {
            self.drift().record(DriftKind::CompensationFailed, 1);
            tracing::warn!(
                appointment_id = %appointment.id,
                slot_id = %appointment.slot_id,
                drift_kind = DriftKind::CompensationFailed.as_str(),
                error = %e,
                "failed to undo booking after deposit was rolled back"
            );
        }
    }

    /// Refund the deposit. A payment with nothing left to refund counts as
    /// refunded: an earlier attempt moved the money but failed to persist.
    async fn refund_deposit(
        &self,
        appointment: &Appointment,
        refund_type: RefundType,
    ) -> Result<(), AppointmentError> {
        let request = RefundRequest {
            appointment_id: appointment.id,
            amount: appointment.deposit_amount,
            refund_type,
        };
        match self.payments.create_refund(&request).await {
            Ok(refund) => {
                tracing::debug!(
                    appointment_id = %appointment.id,
                    refund_no = %refund.refund_no,
                    %refund_type,
                    "deposit refunded"
                );
                Ok(())
            }
            Err(PaymentError::FullyRefunded) => {
                tracing::info!(
                    appointment_id = %appointment.id,
                    %refund_type,
                    "deposit already returned, finishing transition"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    %refund_type,
                    error = %e,
                    "deposit refund failed"
                );
                Err(e.into())
            }
        }
    }

    async fn persist(
        &self,
        updated: &Appointment,
        expected: AppointmentStatus,
        action: &str,
    ) -> Result<(), AppointmentError> {
        if self.repo.update_if_status(updated, expected).await? {
            return Ok(());
        }
        let current = self.load(&updated.id).await?;
        tracing::debug!(
            appointment_id = %updated.id,
            expected = %expected,
            actual = %current.status,
            "appointment status changed concurrently"
        );
        Err(invalid_state(&current, action))
    }

    fn record_release_drift(&self, appointment: &Appointment, error: &str) {
        self.drift().record(DriftKind::ReleaseFailed, 1);
        tracing::warn!(
            appointment_id = %appointment.id,
            slot_id = %appointment.slot_id,
            drift_kind = DriftKind::ReleaseFailed.as_str(),
            error,
            "slot capacity not returned"
        );
    }
}

fn invalid_state(appointment: &Appointment, action: &str) -> AppointmentError {
    AppointmentError::InvalidState {
        status: appointment.status.to_string(),
        action: action.to_string(),
    }
}
