//! In-memory collaborators for exercising the payment pipeline.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! integration tests and downstream crates. Each type is cheaply cloneable and
//! clones share state, so a test keeps one handle for assertions and moves
//! another into the service.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bank::{BankError, PaymentGateway};
use crate::callback::CallbackNotifier;
use crate::error::{PaymentError, PaymentResult};
use crate::guard::IdempotencyGuard;
use crate::models::{NewPayment, Payment, PaymentStatus};
use crate::repository::PaymentRepository;

#[derive(Default)]
struct LedgerState {
    rows: HashMap<String, Payment>,
    next_id: i32,
    unavailable: bool,
}

/// Repository enforcing the same uniqueness and transition rules as Postgres
#[derive(Clone, Default)]
pub struct MemoryPaymentRepository {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: &str) -> Option<Payment> {
        self.state.lock().await.rows.get(order_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    /// Make every call fail with a database error until switched back
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }
}

fn unavailable() -> PaymentError {
    PaymentError::Database("connection refused".to_string())
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepository {
    async fn find_by_order_id(&self, order_id: &str) -> PaymentResult<Option<Payment>> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(unavailable());
        }
        Ok(state.rows.get(order_id).cloned())
    }

    async fn create_processing(&self, input: NewPayment) -> PaymentResult<Payment> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(unavailable());
        }
        if state.rows.contains_key(&input.order_id) {
            return Err(PaymentError::DuplicateOrder(input.order_id));
        }

        state.next_id += 1;
        let payment = Payment {
            id: state.next_id,
            order_id: input.order_id,
            amount: input.amount,
            status: PaymentStatus::Processing,
            created_at: Utc::now(),
        };
        state.rows.insert(payment.order_id.clone(), payment.clone());
        Ok(payment)
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
    ) -> PaymentResult<Payment> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(unavailable());
        }
        let row = state
            .rows
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::NotFound(order_id.to_string()))?;

        if !row.status.can_transition_to(status) {
            return Err(PaymentError::InvalidTransition {
                order_id: order_id.to_string(),
                from: row.status,
                to: status,
            });
        }
        row.status = status;
        Ok(row.clone())
    }
}

/// Guard with `SET NX` semantics and no expiry
#[derive(Clone, Default)]
pub struct MemoryIdempotencyGuard {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl MemoryIdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_claimed(&self, order_id: &str) -> bool {
        self.claimed.lock().await.contains(order_id)
    }
}

#[async_trait]
impl IdempotencyGuard for MemoryIdempotencyGuard {
    async fn claim(&self, order_id: &str) -> bool {
        self.claimed.lock().await.insert(order_id.to_string())
    }
}

/// Bank answering from a script, then falling back to a default answer
#[derive(Clone)]
pub struct ScriptedBank {
    script: Arc<Mutex<VecDeque<Result<(), BankError>>>>,
    fallback: Result<(), BankError>,
    debits: Arc<Mutex<Vec<(String, i64)>>>,
}

impl ScriptedBank {
    /// Accept every debit of a non-negative amount
    pub fn approving() -> Self {
        Self::with_fallback(Ok(()))
    }

    /// Answer every debit with `error`
    pub fn failing(error: BankError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Result<(), BankError>) -> Self {
        Self {
            script: Arc::default(),
            fallback,
            debits: Arc::default(),
        }
    }

    /// Queue answers consumed before the fallback applies
    pub async fn then(self, answer: Result<(), BankError>) -> Self {
        self.script.lock().await.push_back(answer);
        self
    }

    pub async fn debits(&self) -> Vec<(String, i64)> {
        self.debits.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedBank {
    async fn debit(&self, order_id: &str, amount: i64) -> Result<(), BankError> {
        self.debits.lock().await.push((order_id.to_string(), amount));
        if amount < 0 {
            return Err(BankError::InvalidAmount(amount));
        }
        match self.script.lock().await.pop_front() {
            Some(answer) => answer,
            None => self.fallback.clone(),
        }
    }
}

/// One callback the notifier was asked to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCallback {
    pub url: String,
    pub order_id: String,
    pub status: PaymentStatus,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentCallback>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentCallback> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl CallbackNotifier for RecordingNotifier {
    async fn notify(&self, url: &str, order_id: &str, status: PaymentStatus) {
        self.sent.lock().await.push(SentCallback {
            url: url.to_string(),
            order_id: order_id.to_string(),
            status,
        });
    }
}
