use async_trait::async_trait;

use crate::error::PaymentResult;
use crate::models::{NewPayment, Payment, PaymentStatus};

/// Repository trait for payment persistence
///
/// The backing store must enforce uniqueness of `order_id`; it is the last
/// line of defence against double processing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Find the record for an order
    async fn find_by_order_id(&self, order_id: &str) -> PaymentResult<Option<Payment>>;

    /// Insert a PROCESSING record and commit it
    ///
    /// Fails with `PaymentError::DuplicateOrder` when the order already exists.
    async fn create_processing(&self, input: NewPayment) -> PaymentResult<Payment>;

    /// Move a PROCESSING record to a terminal status and commit it
    ///
    /// Fails with `PaymentError::InvalidTransition` when the record has
    /// already left PROCESSING.
    async fn update_status(&self, order_id: &str, status: PaymentStatus)
    -> PaymentResult<Payment>;
}
