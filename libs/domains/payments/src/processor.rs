//! Payment processor for the AMQP worker.
//!
//! Bridges [`QueueWorker`](amqp_worker::QueueWorker) and [`PaymentService`]:
//! claims the order, runs the payment and maps the [`Outcome`] onto the
//! worker's ack / dead-letter decision.

use amqp_worker::{JobOutcome, JobProcessor, WorkerError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bank::PaymentGateway;
use crate::callback::CallbackNotifier;
use crate::guard::IdempotencyGuard;
use crate::models::{Outcome, PaymentEnvelope};
use crate::repository::PaymentRepository;
use crate::service::PaymentService;

pub struct PaymentProcessor<G, R, B, N> {
    guard: Arc<G>,
    service: PaymentService<R, B, N>,
}

impl<G, R, B, N> PaymentProcessor<G, R, B, N>
where
    G: IdempotencyGuard,
    R: PaymentRepository,
    B: PaymentGateway,
    N: CallbackNotifier,
{
    pub fn new(guard: G, service: PaymentService<R, B, N>) -> Self {
        Self {
            guard: Arc::new(guard),
            service,
        }
    }

    pub fn service(&self) -> &PaymentService<R, B, N> {
        &self.service
    }
}

#[async_trait]
impl<G, R, B, N> JobProcessor<PaymentEnvelope> for PaymentProcessor<G, R, B, N>
where
    G: IdempotencyGuard,
    R: PaymentRepository,
    B: PaymentGateway,
    N: CallbackNotifier,
{
    async fn process(&self, envelope: &PaymentEnvelope) -> Result<JobOutcome, WorkerError> {
        envelope.validate().map_err(WorkerError::permanent)?;

        if !self.guard.claim(&envelope.order_id).await {
            info!(order_id = %envelope.order_id, "Order already claimed, skipping");
            return Ok(JobOutcome::Skipped);
        }

        match self.service.process_payment(envelope).await {
            Ok(outcome @ (Outcome::Success | Outcome::Duplicate | Outcome::PermanentFailure(_))) => {
                info!(
                    order_id = %envelope.order_id,
                    outcome = outcome.as_str(),
                    "Payment settled"
                );
                Ok(JobOutcome::Completed)
            }
            Ok(Outcome::TransientFailure(reason)) => Err(WorkerError::transient(reason)),
            Err(e) => {
                warn!(order_id = %envelope.order_id, error = %e, "Payment service failed");
                Err(WorkerError::transient(e.to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "PaymentProcessor"
    }
}

impl<G, R, B, N> Clone for PaymentProcessor<G, R, B, N> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
            service: self.service.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{BankError, MockPaymentGateway};
    use crate::callback::MockCallbackNotifier;
    use crate::error::PaymentError;
    use crate::guard::MockIdempotencyGuard;
    use crate::models::{Payment, PaymentStatus};
    use crate::repository::MockPaymentRepository;
    use amqp_worker::ErrorCategory;

    fn granting_guard() -> MockIdempotencyGuard {
        let mut guard = MockIdempotencyGuard::new();
        guard.expect_claim().times(1).returning(|_| true);
        guard
    }

    fn recording_repository() -> MockPaymentRepository {
        let mut repo = MockPaymentRepository::new();
        repo.expect_find_by_order_id().returning(|_| Ok(None));
        repo.expect_create_processing().returning(|input| {
            Ok(Payment {
                id: 1,
                order_id: input.order_id,
                amount: input.amount,
                status: PaymentStatus::Processing,
                created_at: chrono::Utc::now(),
            })
        });
        repo.expect_update_status().returning(|id, status| {
            Ok(Payment {
                id: 1,
                order_id: id.to_string(),
                amount: 100,
                status,
                created_at: chrono::Utc::now(),
            })
        });
        repo
    }

    fn bank_answering(result: Result<(), BankError>) -> MockPaymentGateway {
        let mut bank = MockPaymentGateway::new();
        bank.expect_debit().returning(move |_, _| result.clone());
        bank
    }

    fn processor(
        guard: MockIdempotencyGuard,
        repo: MockPaymentRepository,
        bank: MockPaymentGateway,
    ) -> PaymentProcessor<
        MockIdempotencyGuard,
        MockPaymentRepository,
        MockPaymentGateway,
        MockCallbackNotifier,
    > {
        let mut notifier = MockCallbackNotifier::new();
        notifier.expect_notify().returning(|_, _, _| ());
        PaymentProcessor::new(guard, PaymentService::new(repo, bank, notifier))
    }

    #[tokio::test]
    async fn test_success_completes() {
        let processor = processor(granting_guard(), recording_repository(), bank_answering(Ok(())));

        let outcome = processor.process(&PaymentEnvelope::new("ORD-1", 100)).await;
        assert_eq!(outcome.unwrap(), JobOutcome::Completed);
    }

    #[tokio::test]
    async fn test_claimed_order_is_skipped_without_service() {
        let mut guard = MockIdempotencyGuard::new();
        guard.expect_claim().returning(|_| false);
        let mut repo = MockPaymentRepository::new();
        repo.expect_find_by_order_id().never();
        let mut bank = MockPaymentGateway::new();
        bank.expect_debit().never();

        let outcome = processor(guard, repo, bank)
            .process(&PaymentEnvelope::new("ORD-1", 100))
            .await;
        assert_eq!(outcome.unwrap(), JobOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_permanent_failure_completes() {
        let processor = processor(
            granting_guard(),
            recording_repository(),
            bank_answering(Err(BankError::InvalidAmount(-1))),
        );

        let outcome = processor.process(&PaymentEnvelope::new("ORD-1", -1)).await;
        assert_eq!(outcome.unwrap(), JobOutcome::Completed);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retryable_error() {
        let processor = processor(
            granting_guard(),
            recording_repository(),
            bank_answering(Err(BankError::Timeout)),
        );

        let err = processor
            .process(&PaymentEnvelope::new("ORD-1", 100))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_service_error_is_dead_lettered() {
        let mut repo = MockPaymentRepository::new();
        repo.expect_find_by_order_id()
            .returning(|_| Err(PaymentError::Database("down".into())));

        let err = processor(granting_guard(), repo, MockPaymentGateway::new())
            .process(&PaymentEnvelope::new("ORD-1", 100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("down"));
    }

    #[tokio::test]
    async fn test_blank_order_id_is_rejected_before_claim() {
        let mut guard = MockIdempotencyGuard::new();
        guard.expect_claim().never();

        let err = processor(guard, MockPaymentRepository::new(), MockPaymentGateway::new())
            .process(&PaymentEnvelope::new("", 100))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_processor_name() {
        let processor = processor(
            MockIdempotencyGuard::new(),
            MockPaymentRepository::new(),
            MockPaymentGateway::new(),
        );
        assert_eq!(processor.name(), "PaymentProcessor");
    }
}
