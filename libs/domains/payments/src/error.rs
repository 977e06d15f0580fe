use crate::models::PaymentStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment already recorded for order {0}")]
    DuplicateOrder(String),

    #[error("Payment not found for order {0}")]
    NotFound(String),

    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Database error: {0}")]
    Database(String),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Implement From for sea_orm::DbErr
impl From<sea_orm::DbErr> for PaymentError {
    fn from(err: sea_orm::DbErr) -> Self {
        PaymentError::Database(err.to_string())
    }
}
