//! Worker error types and error categorization
//!
//! The category decides what happens next:
//! - **Transient**: broker or downstream hiccup; connection setup retries it,
//!   a message that hits it is dead-lettered for later replay
//! - **Permanent**: retrying cannot help (bad credentials, malformed payload,
//!   mismatched topology)

use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use thiserror::Error;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure, worth another attempt
    Transient,
    /// Unrecoverable error
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Errors raised by the connector, consumers, workers and the replayer
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Protocol or I/O error from the AMQP client
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker refused the credentials; never retried
    #[error("Broker authentication failed: {0}")]
    Authentication(String),

    /// Connection setup failed on every attempt
    #[error("Could not connect to broker after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// Exchange/queue declaration or binding was rejected
    #[error("Topology declaration failed for '{name}': {reason}")]
    Topology { name: String, reason: String },

    /// Passive declare found no such queue
    #[error("Queue '{0}' does not exist")]
    QueueNotFound(String),

    /// Publish was nacked by the broker or could not be confirmed
    #[error("Publish to '{queue}' failed: {reason}")]
    Publish { queue: String, reason: String },

    /// Message body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Job processing failed
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        category: ErrorCategory,
    },

    /// The broker closed the consumer stream
    #[error("Consumer stream closed by broker")]
    ConsumerClosed,

    /// Channel-level misuse or failure (unknown delivery tag, closed channel)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    /// Create a transient processing error
    pub fn transient(message: impl Into<String>) -> Self {
        WorkerError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        WorkerError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    /// Classify a client error raised while opening a connection.
    ///
    /// RabbitMQ closes the connection with ACCESS_REFUSED (403) on bad
    /// credentials.
    pub fn from_connect_error(err: lapin::Error) -> Self {
        if soft_error(&err) == Some(AMQPSoftError::ACCESSREFUSED) {
            WorkerError::Authentication(err.to_string())
        } else {
            WorkerError::Amqp(err)
        }
    }

    /// Classify a client error raised by a passive declare of `queue`.
    pub fn from_passive_declare(queue: &str, err: lapin::Error) -> Self {
        if soft_error(&err) == Some(AMQPSoftError::NOTFOUND) {
            WorkerError::QueueNotFound(queue.to_string())
        } else {
            WorkerError::Amqp(err)
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkerError::Amqp(_) => ErrorCategory::Transient,
            WorkerError::Authentication(_) => ErrorCategory::Permanent,
            WorkerError::ConnectionExhausted { .. } => ErrorCategory::Permanent,
            WorkerError::Topology { .. } => ErrorCategory::Permanent,
            WorkerError::QueueNotFound(_) => ErrorCategory::Permanent,
            WorkerError::Publish { .. } => ErrorCategory::Transient,
            WorkerError::Serialization(_) => ErrorCategory::Permanent,
            WorkerError::Processing { category, .. } => *category,
            WorkerError::ConsumerClosed => ErrorCategory::Transient,
            WorkerError::Channel(_) => ErrorCategory::Transient,
            WorkerError::Config(_) => ErrorCategory::Permanent,
        }
    }

    /// Whether connection setup should try again after this error
    pub fn is_retryable_connect(&self) -> bool {
        matches!(self, WorkerError::Amqp(_))
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}

impl From<core_config::ConfigError> for WorkerError {
    fn from(err: core_config::ConfigError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

fn soft_error(err: &lapin::Error) -> Option<AMQPSoftError> {
    match err {
        lapin::Error::ProtocolError(e) => match e.kind() {
            AMQPErrorKind::Soft(kind) => Some(kind.clone()),
            AMQPErrorKind::Hard(_) => None,
        },
        _ => None,
    }
}

/// Result alias used throughout the crate
pub type WorkerResult<T> = Result<T, WorkerError>;
