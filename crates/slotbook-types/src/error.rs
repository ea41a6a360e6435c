use thiserror::Error;

/// Errors from repository operations (used by trait definitions in slotbook-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors related to slot ledger and template expansion operations.
#[derive(Debug, Error)]
pub enum SlotError {
    #[error("slot not found")]
    NotFound,

    #[error("invalid count: {0}")]
    InvalidCount(i32),

    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("invalid slot state: {0}")]
    InvalidState(String),

    #[error("invalid date range: end date {end} is before start date {start}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("store has no active template")]
    TemplateNotFound,

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<RepositoryError> for SlotError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => SlotError::NotFound,
            other => SlotError::StorageError(other.to_string()),
        }
    }
}

/// Errors related to slot template management.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found")]
    NotFound,

    #[error("invalid template: {0}")]
    Invalid(String),

    #[error("template '{0}' already exists for this store")]
    NameConflict(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<RepositoryError> for TemplateError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => TemplateError::NotFound,
            RepositoryError::Conflict(name) => TemplateError::NameConflict(name),
            other => TemplateError::StorageError(other.to_string()),
        }
    }
}

/// Errors from the payment collaborator.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("no successful payment found for appointment")]
    PaymentNotFound,

    #[error("invalid payment amount: {0}")]
    InvalidAmount(i64),

    /// Nothing left to refund on the appointment's payment.
    #[error("payment already fully refunded")]
    FullyRefunded,

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<RepositoryError> for PaymentError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => PaymentError::PaymentNotFound,
            other => PaymentError::StorageError(other.to_string()),
        }
    }
}

/// Errors related to appointment lifecycle operations.
#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("appointment not found")]
    NotFound,

    #[error("cannot {action} appointment in status '{status}'")]
    InvalidState { status: String, action: String },

    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("cancellation window closed: must cancel at least {window_hours}h before start")]
    CancelTooLate { window_hours: i64 },

    #[error("deposit already refunded")]
    AlreadyRefunded,

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("slot error: {0}")]
    Slot(SlotError),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<SlotError> for AppointmentError {
    fn from(e: SlotError) -> Self {
        match e {
            SlotError::InsufficientCapacity {
                requested,
                available,
            } => AppointmentError::InsufficientCapacity {
                requested,
                available,
            },
            other => AppointmentError::Slot(other),
        }
    }
}

impl From<PaymentError> for AppointmentError {
    fn from(e: PaymentError) -> Self {
        AppointmentError::PaymentFailed(e.to_string())
    }
}

impl From<RepositoryError> for AppointmentError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => AppointmentError::NotFound,
            other => AppointmentError::StorageError(other.to_string()),
        }
    }
}
