use amqp_worker::QueueDef;

/// Queue carrying payment envelopes, with its dead-letter pair
pub struct PaymentQueue;

impl QueueDef for PaymentQueue {
    const QUEUE_NAME: &'static str = "payment_events";
    const DLQ_NAME: &'static str = "payment_events.dlq";
    const DLX_NAME: &'static str = "dlx_payment";
}
