//! End-to-end pipeline behaviour over the in-memory broker and fakes.

use amqp_worker::testing::MemoryBroker;
use amqp_worker::{
    DlqReplayer, InboundMessage, JobOutcome, MessageSource, QueueDef, QueueWorker, Settlement,
    WorkerConfig,
};
use domain_payments::testing::{
    MemoryIdempotencyGuard, MemoryPaymentRepository, RecordingNotifier, ScriptedBank,
};
use domain_payments::{
    BankError, PaymentEnvelope, PaymentProcessor, PaymentQueue, PaymentService, PaymentStatus,
};
use std::time::Duration;
use test_utils::TestDataBuilder;

type Worker = QueueWorker<
    PaymentEnvelope,
    PaymentProcessor<
        MemoryIdempotencyGuard,
        MemoryPaymentRepository,
        ScriptedBank,
        RecordingNotifier,
    >,
    amqp_worker::testing::MemoryConsumer,
>;

struct Pipeline {
    broker: MemoryBroker,
    ledger: MemoryPaymentRepository,
    notifier: RecordingNotifier,
    worker: Worker,
}

async fn pipeline(bank: ScriptedBank) -> Pipeline {
    pipeline_with_guard(bank, MemoryIdempotencyGuard::new(), MemoryPaymentRepository::new()).await
}

async fn pipeline_with_guard(
    bank: ScriptedBank,
    guard: MemoryIdempotencyGuard,
    ledger: MemoryPaymentRepository,
) -> Pipeline {
    let broker = MemoryBroker::new();
    broker.declare(&PaymentQueue::topology()).await;

    let notifier = RecordingNotifier::new();
    let service = PaymentService::new(ledger.clone(), bank, notifier.clone());
    let processor = PaymentProcessor::new(guard, service);

    let config = WorkerConfig::from_queue_def::<PaymentQueue>()
        .with_inactivity_timeout(Duration::from_millis(50));
    let worker = QueueWorker::new(broker.consumer(PaymentQueue::QUEUE_NAME), processor, config);

    Pipeline {
        broker,
        ledger,
        notifier,
        worker,
    }
}

impl Pipeline {
    async fn publish(&self, envelope: &PaymentEnvelope) {
        self.broker
            .enqueue_json(PaymentQueue::QUEUE_NAME, envelope)
            .await
            .unwrap();
    }

    async fn next(&mut self) -> InboundMessage {
        self.worker
            .source_mut()
            .next_message(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("message on the main queue")
    }

    async fn deliver_next(&mut self) -> Settlement {
        let message = self.next().await;
        self.worker.handle_message(message).await.unwrap()
    }

    async fn dlq_depth(&self) -> usize {
        self.broker.depth(PaymentQueue::DLQ_NAME).await
    }
}

#[tokio::test]
async fn test_successful_payment_is_acked_and_recorded() {
    let data = TestDataBuilder::from_test_name("successful_payment");
    let order_id = data.order_id("main");
    let mut p = pipeline(ScriptedBank::approving()).await;

    p.publish(&PaymentEnvelope::new(&order_id, data.amount()).with_callback("http://merchant/cb"))
        .await;

    assert_eq!(p.deliver_next().await, Settlement::Acked(JobOutcome::Completed));
    assert_eq!(
        p.ledger.get(&order_id).await.unwrap().status,
        PaymentStatus::Success
    );
    let sent = p.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, PaymentStatus::Success);
    assert_eq!(p.dlq_depth().await, 0);
}

#[tokio::test]
async fn test_duplicate_delivery_records_once_and_acks_both() {
    let data = TestDataBuilder::from_test_name("duplicate_delivery");
    let envelope = PaymentEnvelope::new(data.order_id("dup"), data.amount());
    let bank = ScriptedBank::approving();
    let mut p = pipeline(bank.clone()).await;

    p.publish(&envelope).await;
    p.publish(&envelope).await;

    assert_eq!(p.deliver_next().await, Settlement::Acked(JobOutcome::Completed));
    assert_eq!(p.deliver_next().await, Settlement::Acked(JobOutcome::Skipped));

    assert_eq!(p.ledger.count().await, 1);
    assert_eq!(bank.debits().await.len(), 1);
    assert_eq!(p.broker.acked_count().await, 2);
    assert_eq!(p.dlq_depth().await, 0);
}

#[tokio::test]
async fn test_expired_claim_falls_back_to_ledger_dedup() {
    let data = TestDataBuilder::from_test_name("expired_claim");
    let envelope = PaymentEnvelope::new(data.order_id("late"), data.amount());
    let ledger = MemoryPaymentRepository::new();
    let bank = ScriptedBank::approving();

    let mut first =
        pipeline_with_guard(bank.clone(), MemoryIdempotencyGuard::new(), ledger.clone()).await;
    first.publish(&envelope).await;
    assert_eq!(first.deliver_next().await, Settlement::Acked(JobOutcome::Completed));

    // A fresh guard stands in for a lock that aged out of Redis
    let mut second =
        pipeline_with_guard(bank.clone(), MemoryIdempotencyGuard::new(), ledger.clone()).await;
    second.publish(&envelope).await;
    assert_eq!(second.deliver_next().await, Settlement::Acked(JobOutcome::Completed));

    assert_eq!(ledger.count().await, 1);
    assert_eq!(bank.debits().await.len(), 1);
}

#[tokio::test]
async fn test_negative_amount_fails_permanently_and_is_acked() {
    let data = TestDataBuilder::from_test_name("negative_amount");
    let order_id = data.order_id("neg");
    let mut p = pipeline(ScriptedBank::approving()).await;

    p.publish(&PaymentEnvelope::new(&order_id, -100)).await;

    assert_eq!(p.deliver_next().await, Settlement::Acked(JobOutcome::Completed));
    assert_eq!(
        p.ledger.get(&order_id).await.unwrap().status,
        PaymentStatus::Failed
    );
    assert_eq!(p.dlq_depth().await, 0);
}

#[tokio::test]
async fn test_transient_failure_notifies_and_dead_letters() {
    let data = TestDataBuilder::from_test_name("transient_failure");
    let order_id = data.order_id("timeout");
    let mut p = pipeline(ScriptedBank::failing(BankError::Timeout)).await;

    p.publish(&PaymentEnvelope::new(&order_id, data.amount()).with_callback("http://merchant/cb"))
        .await;

    assert_eq!(p.deliver_next().await, Settlement::DeadLettered);
    assert_eq!(
        p.ledger.get(&order_id).await.unwrap().status,
        PaymentStatus::Failed
    );

    let sent = p.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].order_id, order_id);
    assert_eq!(sent[0].status, PaymentStatus::Failed);

    assert_eq!(p.dlq_depth().await, 1);
    assert_eq!(p.broker.depth(PaymentQueue::QUEUE_NAME).await, 0);
}

#[tokio::test]
async fn test_database_outage_dead_letters_without_debit() {
    let data = TestDataBuilder::from_test_name("database_outage");
    let bank = ScriptedBank::approving();
    let mut p = pipeline(bank.clone()).await;
    p.ledger.set_unavailable(true).await;

    p.publish(&PaymentEnvelope::new(data.order_id("db"), data.amount()))
        .await;

    assert_eq!(p.deliver_next().await, Settlement::DeadLettered);
    assert!(bank.debits().await.is_empty());
    assert_eq!(p.dlq_depth().await, 1);
}

#[tokio::test]
async fn test_malformed_envelope_is_dead_lettered() {
    let mut p = pipeline(ScriptedBank::approving()).await;
    p.broker
        .enqueue(PaymentQueue::QUEUE_NAME, br#"{"amount": 10}"#.to_vec())
        .await;

    assert_eq!(p.deliver_next().await, Settlement::DeadLettered);
    assert_eq!(p.ledger.count().await, 0);
    assert_eq!(p.dlq_depth().await, 1);
}

#[tokio::test]
async fn test_replayed_message_is_seen_as_already_claimed() {
    let data = TestDataBuilder::from_test_name("replay_after_timeout");
    let order_id = data.order_id("retry");
    let bank = ScriptedBank::approving().then(Err(BankError::Timeout)).await;
    let mut p = pipeline(bank.clone()).await;

    p.publish(&PaymentEnvelope::new(&order_id, data.amount())).await;
    assert_eq!(p.deliver_next().await, Settlement::DeadLettered);

    let summary = DlqReplayer::new(p.broker.clone(), &PaymentQueue::topology())
        .replay()
        .await
        .unwrap();
    assert_eq!(summary.replayed, 1);
    assert_eq!(p.dlq_depth().await, 0);

    // The claim outlives the failed attempt, so the replay is acknowledged untouched
    assert_eq!(p.deliver_next().await, Settlement::Acked(JobOutcome::Skipped));
    assert_eq!(bank.debits().await.len(), 1);
    assert_eq!(
        p.ledger.get(&order_id).await.unwrap().status,
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn test_worker_drains_queue_until_shutdown() {
    let data = TestDataBuilder::from_test_name("drain");
    let mut p = pipeline(ScriptedBank::approving()).await;
    for i in 0..3 {
        p.publish(&PaymentEnvelope::new(data.order_id(&i.to_string()), data.amount()))
            .await;
    }

    let (tx, rx) = tokio::sync::watch::channel(false);
    let ledger = p.ledger.clone();
    let stopper = tokio::spawn(async move {
        while ledger.count().await < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
    });

    p.worker.run(rx).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(p.broker.acked_count().await, 3);
    assert_eq!(p.broker.depth(PaymentQueue::QUEUE_NAME).await, 0);
}
