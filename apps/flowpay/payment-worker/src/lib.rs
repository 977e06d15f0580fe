//! Payment Worker Service
//!
//! Consumes payment envelopes from RabbitMQ, one at a time, and settles each
//! against the Postgres ledger.
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ (payment_events, prefetch 1)
//!   ↓
//! QueueWorker<PaymentEnvelope, PaymentProcessor>
//!   ↓ (claim processed:{order_id} in Redis)
//! PaymentService<PgPaymentRepository, SimulatedBank, HttpCallbackNotifier>
//!   ↓
//! PostgreSQL (payment_events)      merchant callback (best effort)
//!
//! nack (no requeue) → dlx_payment → payment_events.dlq
//! ```
//!
//! ## Features
//!
//! - Dead-letter topology declared on every start
//! - Redis idempotency claim with a 24h expiry, backed by a unique order id
//! - Graceful shutdown: the message in hand is settled before exit
//! - Health check endpoint for Kubernetes probes

use amqp_worker::{
    AmqpConsumer, BrokerConfig, BrokerConnector, HealthState, QueueWorker, WorkerConfig,
    health_router,
};
use core_config::server::HealthServerConfig;
use core_config::{Environment, FromEnv, app_info};
use database::{
    postgres::{PostgresConfig, connect_from_config_with_retry},
    redis::RedisConfig,
};
use domain_payments::{
    BankConfig, HttpCallbackNotifier, PaymentProcessor, PaymentQueue, PaymentService,
    PgPaymentRepository, RedisIdempotencyGuard, SimulatedBank,
};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Default health port when neither `PAYMENT_WORKER_HEALTH_PORT` nor `HEALTH_PORT` is set
pub const DEFAULT_HEALTH_PORT: u16 = 8083;

/// Start the health HTTP server
///
/// Provides endpoints for:
/// - Liveness probes: `/health`, `/healthz`
/// - Readiness probes: `/ready`, `/readyz`
/// - Prometheus metrics: `/metrics`
pub async fn start_health_server(health_state: HealthState, address: String) -> Result<()> {
    let app = health_router(health_state);

    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", address))?;

    info!(address = %address, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the payment worker
///
/// 1. Sets up structured logging and metrics
/// 2. Connects to PostgreSQL and creates `payment_events` if missing
/// 3. Connects to Redis for idempotency claims
/// 4. Connects to RabbitMQ and declares the dead-letter topology
/// 5. Consumes until SIGINT/SIGTERM, then closes the broker connection
///
/// # Errors
///
/// Returns an error if configuration is invalid, a store is unreachable
/// after its retries, the broker refuses the credentials, or the consumer
/// stream fails.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    amqp_worker::init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting payment worker");
    info!("Environment: {:?}", environment);

    let health_config = HealthServerConfig::from_env_for("payment_worker", DEFAULT_HEALTH_PORT)
        .wrap_err("Failed to load health server configuration")?;

    // PostgreSQL: the ledger
    let pg_config =
        PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;
    info!("Connecting to PostgreSQL...");
    let db = connect_from_config_with_retry(pg_config, None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    let repository = PgPaymentRepository::new(db);
    repository
        .ensure_schema()
        .await
        .wrap_err("Failed to prepare payment_events table")?;

    // Redis: idempotency claims
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    info!("Connecting to Redis...");
    let redis = database::redis::connect_from_config_with_retry(redis_config, None)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let bank_config = BankConfig::from_env().wrap_err("Failed to load bank configuration")?;
    info!(
        latency_ms = bank_config.latency.as_millis() as u64,
        timeout_rate = bank_config.timeout_rate,
        "Simulated bank configured"
    );
    let notifier = HttpCallbackNotifier::new().wrap_err("Failed to build callback client")?;

    let service = PaymentService::new(repository, SimulatedBank::new(bank_config), notifier);
    let processor = PaymentProcessor::new(RedisIdempotencyGuard::new(redis), service);

    // RabbitMQ: fatal after the configured attempts, immediately on bad credentials
    let broker_config = BrokerConfig::from_env().wrap_err("Failed to load RabbitMQ configuration")?;
    let mut connector = BrokerConnector::from_queue_def::<PaymentQueue>(broker_config);
    let channel = connector
        .connect_with_config()
        .await
        .wrap_err("Failed to connect to RabbitMQ")?;

    let worker_config = WorkerConfig::from_queue_def::<PaymentQueue>()
        .with_env_overrides()
        .wrap_err("Failed to load worker configuration")?;
    info!(
        queue = %worker_config.queue_name,
        dlq = %worker_config.dlq_name,
        consumer_tag = %worker_config.consumer_tag,
        prefetch = worker_config.prefetch_count,
        inactivity_timeout_ms = worker_config.inactivity_timeout.as_millis() as u64,
        "Worker configuration loaded"
    );

    let consumer = AmqpConsumer::start(channel, &worker_config)
        .await
        .wrap_err("Failed to start consumer")?;

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        app_info.name,
        app_info.version,
        &worker_config.queue_name,
        &worker_config.dlq_name,
    );
    let ready = health_state.ready_flag();
    let address = health_config.address();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, address).await {
            error!(error = %e, "Health server failed");
        }
    });

    let mut worker = QueueWorker::new(consumer, processor, worker_config).with_ready_flag(ready);
    let result = worker.run(shutdown_rx).await;

    if let Err(e) = connector.close().await {
        error!(error = %e, "Failed to close RabbitMQ connection");
    }
    result.wrap_err("Payment worker stopped with an error")?;

    info!("Payment worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, initiating shutdown...");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
