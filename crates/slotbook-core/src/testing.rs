//! In-memory port implementations shared by the service tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

use slotbook_types::appointment::{Appointment, AppointmentStatus};
use slotbook_types::error::{PaymentError, RepositoryError};
use slotbook_types::id::{
    AppointmentId, CustomerId, PaymentId, RefundId, SlotId, StaffId, StoreId, TemplateId,
};
use slotbook_types::payment::{
    Payment, PaymentRequest, PaymentStatus, Refund, RefundRequest, RefundStatus,
};
use slotbook_types::slot::{Slot, SlotStatus, StaffPurge};
use slotbook_types::store::{Store, StoreStatus};
use slotbook_types::template::{Template, TemplateStatus, TimeRange, WeekdayRule};

use crate::payment::PaymentGateway;
use crate::repository::appointment::AppointmentRepository;
use crate::repository::slot::{CapacityRecalc, LedgerOp, LedgerOutcome, SlotRepository};
use crate::repository::store::StoreDirectory;
use crate::repository::template::TemplateRepository;

pub fn slot_at(store_id: StoreId, start: DateTime<Utc>, capacity: i32) -> Slot {
    Slot {
        id: SlotId::new(),
        store_id,
        staff_id: None,
        date: start.date_naive(),
        start_time: start,
        end_time: start + Duration::hours(1),
        capacity,
        locked_count: 0,
        booked_count: 0,
        status: SlotStatus::derive(capacity, 0, 0),
        created_at: start,
        updated_at: start,
    }
}

pub fn monday_template(store_id: StoreId) -> Template {
    let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    Template {
        id: TemplateId::new(),
        store_id,
        name: "mornings".into(),
        status: TemplateStatus::Active,
        rules: vec![WeekdayRule {
            weekday: Weekday::Mon,
            ranges: vec![TimeRange::new(t(9), t(10)), TimeRange::new(t(10), t(11))],
        }],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Every weekday gets one 09:00-10:00 range.
pub fn daily_template(store_id: StoreId) -> Template {
    let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    let days = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    Template {
        rules: days
            .into_iter()
            .map(|weekday| WeekdayRule {
                weekday,
                ranges: vec![TimeRange::new(t(9), t(10))],
            })
            .collect(),
        name: "daily".into(),
        ..monday_template(store_id)
    }
}

pub fn store(name: &str) -> Store {
    Store {
        id: StoreId::new(),
        name: name.into(),
        status: StoreStatus::Operating,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemorySlots {
    slots: Arc<Mutex<HashMap<SlotId, Slot>>>,
    failing_ops: Arc<Mutex<HashSet<&'static str>>>,
    stalled_ops: Arc<Mutex<HashMap<&'static str, std::time::Duration>>>,
    fail_upsert: Arc<AtomicBool>,
}

impl MemorySlots {
    pub fn with_slot(self, slot: Slot) -> Self {
        self.insert(slot);
        self
    }

    pub fn insert(&self, slot: Slot) {
        self.slots.lock().unwrap().insert(slot.id, slot);
    }

    pub fn get(&self, id: &SlotId) -> Slot {
        self.slots.lock().unwrap()[id].clone()
    }

    pub fn all(&self) -> Vec<Slot> {
        let mut all: Vec<Slot> = self.slots.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|s| s.start_time);
        all
    }

    /// Make every `apply` with this op fail with a storage error.
    pub fn fail_op(&self, op: LedgerOp) {
        self.failing_ops.lock().unwrap().insert(op.as_str());
    }

    /// Sleep before applying this op, so another task can run in between.
    pub fn stall_op(&self, op: LedgerOp, delay: std::time::Duration) {
        self.stalled_ops.lock().unwrap().insert(op.as_str(), delay);
    }

    pub fn fail_upserts(&self) {
        self.fail_upsert.store(true, Ordering::SeqCst);
    }

    fn filtered(&self, pred: impl Fn(&Slot) -> bool) -> Vec<Slot> {
        let mut out: Vec<Slot> = self
            .slots
            .lock()
            .unwrap()
            .values()
            .filter(|s| pred(s))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.start_time);
        out
    }
}

impl SlotRepository for MemorySlots {
    async fn get_by_id(&self, id: &SlotId) -> Result<Option<Slot>, RepositoryError> {
        Ok(self.slots.lock().unwrap().get(id).cloned())
    }

    async fn list_by_store_date(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        Ok(self.filtered(|s| s.store_id == *store_id && s.date == date))
    }

    async fn list_by_store_range(
        &self,
        store_id: &StoreId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        Ok(self.filtered(|s| s.store_id == *store_id && s.date >= start && s.date <= end))
    }

    async fn list_bookable(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        Ok(self.filtered(|s| {
            s.store_id == *store_id
                && s.date == date
                && s.status == SlotStatus::Available
                && s.remaining() > 0
        }))
    }

    async fn list_by_staff_range(
        &self,
        staff_id: &StaffId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        Ok(self.filtered(|s| s.staff_id == Some(*staff_id) && s.date >= start && s.date <= end))
    }

    async fn has_live_units(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        Ok(!self
            .filtered(|s| s.store_id == *store_id && s.date == date && !s.is_idle())
            .is_empty())
    }

    async fn upsert_batch(&self, slots: &[Slot], _chunk_size: usize) -> Result<u64, RepositoryError> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".into()));
        }
        let mut map = self.slots.lock().unwrap();
        let mut written = 0;
        for slot in slots {
            let existing = map
                .values()
                .find(|s| {
                    s.staff_id.is_none()
                        && slot.staff_id.is_none()
                        && s.store_id == slot.store_id
                        && s.start_time == slot.start_time
                        && s.end_time == slot.end_time
                })
                .map(|s| s.id);
            match existing.and_then(|id| map.get_mut(&id)) {
                Some(row) => {
                    if row.is_idle() && !row.status.is_terminal() {
                        row.capacity = slot.capacity;
                        row.status = SlotStatus::derive(row.capacity, 0, 0);
                        written += 1;
                    }
                }
                None => {
                    map.insert(slot.id, slot.clone());
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    async fn apply(
        &self,
        id: &SlotId,
        op: LedgerOp,
        n: i32,
    ) -> Result<LedgerOutcome, RepositoryError> {
        let stall = self.stalled_ops.lock().unwrap().get(op.as_str()).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.failing_ops.lock().unwrap().contains(op.as_str()) {
            return Err(RepositoryError::Query(format!("{} unavailable", op.as_str())));
        }
        let mut map = self.slots.lock().unwrap();
        let Some(slot) = map.get_mut(id) else {
            return Ok(LedgerOutcome::Missing);
        };
        if !op.permits(slot, n) {
            return Ok(LedgerOutcome::Rejected(slot.clone()));
        }
        let (locked, booked) = op.counts_after(slot, n);
        slot.locked_count = locked;
        slot.booked_count = booked;
        if !slot.status.is_terminal() {
            slot.status = SlotStatus::derive(slot.capacity, locked, booked);
        }
        Ok(LedgerOutcome::Applied(slot.clone()))
    }

    async fn recalculate_capacity(
        &self,
        store_id: &StoreId,
        from: NaiveDate,
        to: NaiveDate,
        headcount: i32,
    ) -> Result<CapacityRecalc, RepositoryError> {
        let mut map = self.slots.lock().unwrap();
        let mut result = CapacityRecalc::default();
        for slot in map.values_mut() {
            if slot.store_id != *store_id
                || slot.date < from
                || slot.date > to
                || !slot.accepts_capacity_change()
            {
                continue;
            }
            let capacity = headcount.max(slot.booked_count);
            if capacity == slot.capacity {
                continue;
            }
            let locked = slot.locked_count.min(capacity - slot.booked_count);
            result.clamped_locks += (slot.locked_count - locked) as u64;
            slot.capacity = capacity;
            slot.locked_count = locked;
            slot.status = SlotStatus::derive(capacity, locked, slot.booked_count);
            result.updated += 1;
        }
        Ok(result)
    }

    async fn purge_staff_slots(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
    ) -> Result<StaffPurge, RepositoryError> {
        let mut map = self.slots.lock().unwrap();
        let mut purge = StaffPurge::default();
        map.retain(|_, s| {
            if s.staff_id != Some(*staff_id) || s.date < from {
                return true;
            }
            if s.is_idle() {
                purge.deleted += 1;
                false
            } else {
                purge.retained += 1;
                true
            }
        });
        Ok(purge)
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryTemplates {
    templates: Arc<Mutex<Vec<Template>>>,
}

impl MemoryTemplates {
    pub fn with_template(self, template: Template) -> Self {
        self.templates.lock().unwrap().push(template);
        self
    }
}

impl TemplateRepository for MemoryTemplates {
    async fn create(&self, template: &Template) -> Result<Template, RepositoryError> {
        let mut all = self.templates.lock().unwrap();
        if all
            .iter()
            .any(|t| t.store_id == template.store_id && t.name == template.name)
        {
            return Err(RepositoryError::Conflict(template.name.clone()));
        }
        all.push(template.clone());
        Ok(template.clone())
    }

    async fn get_by_id(&self, id: &TemplateId) -> Result<Option<Template>, RepositoryError> {
        Ok(self.templates.lock().unwrap().iter().find(|t| t.id == *id).cloned())
    }

    async fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<Template>, RepositoryError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.store_id == *store_id)
            .cloned()
            .collect())
    }

    async fn get_active_by_store(
        &self,
        store_id: &StoreId,
    ) -> Result<Option<Template>, RepositoryError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.store_id == *store_id && t.is_active())
            .cloned())
    }

    async fn update(&self, template: &Template) -> Result<(), RepositoryError> {
        let mut all = self.templates.lock().unwrap();
        if all.iter().any(|t| {
            t.id != template.id && t.store_id == template.store_id && t.name == template.name
        }) {
            return Err(RepositoryError::Conflict(template.name.clone()));
        }
        let row = all
            .iter_mut()
            .find(|t| t.id == template.id)
            .ok_or(RepositoryError::NotFound)?;
        *row = template.clone();
        Ok(())
    }

    async fn delete(&self, id: &TemplateId) -> Result<(), RepositoryError> {
        let mut all = self.templates.lock().unwrap();
        let before = all.len();
        all.retain(|t| t.id != *id);
        if all.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn activate(&self, store_id: &StoreId, id: &TemplateId) -> Result<(), RepositoryError> {
        let mut all = self.templates.lock().unwrap();
        if !all.iter().any(|t| t.id == *id && t.store_id == *store_id) {
            return Err(RepositoryError::NotFound);
        }
        for t in all.iter_mut().filter(|t| t.store_id == *store_id) {
            t.status = if t.id == *id {
                TemplateStatus::Active
            } else {
                TemplateStatus::Inactive
            };
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryAppointments {
    rows: Arc<Mutex<HashMap<AppointmentId, Appointment>>>,
    fail_create: Arc<AtomicBool>,
    fail_next_update: Arc<AtomicBool>,
}

impl MemoryAppointments {
    pub fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Fail the next `update_if_status` with a storage error.
    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Overwrite the stored status, bypassing the compare-and-set.
    pub fn force_status(&self, id: &AppointmentId, status: AppointmentStatus) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(id) {
            row.status = status;
        }
    }

    fn filtered(&self, pred: impl Fn(&Appointment) -> bool) -> Vec<Appointment> {
        let mut out: Vec<Appointment> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|a| pred(a))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.appointment_time);
        out
    }
}

impl AppointmentRepository for MemoryAppointments {
    async fn create(&self, appointment: &Appointment) -> Result<Appointment, RepositoryError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("insert failed".into()));
        }
        self.rows
            .lock()
            .unwrap()
            .insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn get_by_id(&self, id: &AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn update_if_status(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<bool, RepositoryError> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&appointment.id) {
            Some(row) if row.status == expected => {
                *row = appointment.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let mut out = self.filtered(|a| a.customer_id == *customer_id);
        out.reverse();
        Ok(out)
    }

    async fn list_upcoming_by_customer(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self.filtered(|a| {
            a.customer_id == *customer_id && !a.status.is_terminal() && a.appointment_time >= now
        }))
    }

    async fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self.filtered(|a| a.store_id == *store_id))
    }

    async fn list_by_slot(&self, slot_id: &SlotId) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self.filtered(|a| a.slot_id == *slot_id))
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockGateway {
    decline_payments: Arc<AtomicBool>,
    decline_refunds: Arc<AtomicBool>,
    pub payments: Arc<Mutex<Vec<Payment>>>,
    pub refunds: Arc<Mutex<Vec<Refund>>>,
}

impl MockGateway {
    pub fn decline_payments(&self) {
        self.decline_payments.store(true, Ordering::SeqCst);
    }

    pub fn decline_refunds(&self, decline: bool) {
        self.decline_refunds.store(decline, Ordering::SeqCst);
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

impl PaymentGateway for MockGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<Payment, PaymentError> {
        if self.decline_payments.load(Ordering::SeqCst) {
            return Err(PaymentError::Declined("card declined".into()));
        }
        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::new(),
            appointment_id: request.appointment_id,
            order_no: "PAY-TEST".into(),
            payment_type: request.payment_type,
            amount: request.amount,
            payment_method: request.payment_method.clone(),
            status: PaymentStatus::Success,
            expires_at: now + Duration::minutes(30),
            paid_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.payments.lock().unwrap().push(payment.clone());
        Ok(payment)
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<Refund, PaymentError> {
        if self.decline_refunds.load(Ordering::SeqCst) {
            return Err(PaymentError::Declined("refund rejected".into()));
        }
        let payment = self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.appointment_id == request.appointment_id)
            .cloned()
            .ok_or(PaymentError::PaymentNotFound)?;
        let refunded: i64 = self
            .refunds
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.payment_id == payment.id)
            .map(|r| r.amount)
            .sum();
        if refunded >= payment.amount {
            return Err(PaymentError::FullyRefunded);
        }
        if refunded + request.amount > payment.amount {
            return Err(PaymentError::Declined("refund exceeds payment".into()));
        }
        let now = Utc::now();
        let refund = Refund {
            id: RefundId::new(),
            appointment_id: request.appointment_id,
            payment_id: payment.id,
            order_no: payment.order_no,
            refund_no: "REF-TEST".into(),
            refund_type: request.refund_type,
            amount: request.amount,
            status: RefundStatus::Success,
            refunded_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.refunds.lock().unwrap().push(refund.clone());
        Ok(refund)
    }
}

// ---------------------------------------------------------------------------
// Store directory
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryDirectory {
    stores: Arc<Mutex<Vec<Store>>>,
    technicians: Arc<Mutex<HashMap<StoreId, i32>>>,
    failing: Arc<Mutex<HashSet<StoreId>>>,
    delay: Arc<Mutex<Option<std::time::Duration>>>,
}

impl MemoryDirectory {
    pub fn with_store(self, store: &Store, working: i32) -> Self {
        self.stores.lock().unwrap().push(store.clone());
        self.technicians.lock().unwrap().insert(store.id, working);
        self
    }

    /// Make technician lookups for this store fail.
    pub fn fail_store(&self, store_id: StoreId) {
        self.failing.lock().unwrap().insert(store_id);
    }

    /// Stall store listing, to exercise run timeouts.
    pub fn stall(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl StoreDirectory for MemoryDirectory {
    async fn list_operating_stores(&self) -> Result<Vec<Store>, RepositoryError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .stores
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.status == StoreStatus::Operating)
            .cloned()
            .collect())
    }

    async fn count_working_technicians(&self, store_id: &StoreId) -> Result<i32, RepositoryError> {
        if self.failing.lock().unwrap().contains(store_id) {
            return Err(RepositoryError::Connection);
        }
        Ok(self
            .technicians
            .lock()
            .unwrap()
            .get(store_id)
            .copied()
            .unwrap_or(0))
    }
}
