//! Payment Worker - Entry Point
//!
//! Background worker that settles payment events from RabbitMQ.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    flowpay_payment_worker::run().await
}
