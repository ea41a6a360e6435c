//! Payment collaborator port.

use slotbook_types::error::PaymentError;
use slotbook_types::payment::{Payment, PaymentRequest, Refund, RefundRequest};

/// Charges and refunds deposits.
///
/// Calls are all-or-nothing from the caller's point of view: `Ok` means the
/// money moved, `Err` means it did not.
pub trait PaymentGateway: Send + Sync {
    fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> impl std::future::Future<Output = Result<Payment, PaymentError>> + Send;

    /// Refund against the appointment's successful payment.
    fn create_refund(
        &self,
        request: &RefundRequest,
    ) -> impl std::future::Future<Output = Result<Refund, PaymentError>> + Send;
}
