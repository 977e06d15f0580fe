//! Payments Domain
//!
//! Everything the payment worker needs to turn a queued payment request into
//! a settled ledger row.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ PaymentProcessor │  ← Idempotency claim, Outcome → ack / dead-letter
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  PaymentService  │  ← PROCESSING → SUCCESS / FAILED, callback
//! └──┬──────┬──────┬─┘
//!    │      │      │
//!    ▼      ▼      ▼
//! Repository Bank  Notifier   ← traits; Postgres, simulated bank, HTTP
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_payments::{
//!     BankConfig, HttpCallbackNotifier, PaymentProcessor, PaymentService,
//!     PgPaymentRepository, RedisIdempotencyGuard, SimulatedBank,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = sea_orm::Database::connect("postgres://...").await?;
//! let redis = redis::aio::ConnectionManager::new(redis::Client::open("redis://...")?).await?;
//!
//! let repository = PgPaymentRepository::new(db);
//! repository.ensure_schema().await?;
//!
//! let service = PaymentService::new(
//!     repository,
//!     SimulatedBank::new(BankConfig::default()),
//!     HttpCallbackNotifier::new()?,
//! );
//! let processor = PaymentProcessor::new(RedisIdempotencyGuard::new(redis), service);
//! # Ok(())
//! # }
//! ```

pub mod bank;
pub mod callback;
pub mod entity;
pub mod error;
pub mod guard;
pub mod models;
pub mod postgres;
pub mod processor;
pub mod queues;
pub mod repository;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use bank::{BankConfig, BankError, PaymentGateway, SimulatedBank};
pub use callback::{CALLBACK_TIMEOUT, CallbackNotifier, HttpCallbackNotifier};
pub use error::{PaymentError, PaymentResult};
pub use guard::{CLAIM_TTL, IdempotencyGuard, RedisIdempotencyGuard, lock_key};
pub use models::{NewPayment, Outcome, Payment, PaymentEnvelope, PaymentStatus};
pub use postgres::PgPaymentRepository;
pub use processor::PaymentProcessor;
pub use queues::PaymentQueue;
pub use repository::PaymentRepository;
pub use service::PaymentService;
