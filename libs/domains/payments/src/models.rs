use amqp_worker::QueueJob;
use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a persisted payment
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Row created, bank not yet answered
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl PaymentStatus {
    /// Only PROCESSING moves, and only to a terminal status.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Processing, PaymentStatus::Success)
                | (PaymentStatus::Processing, PaymentStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Processing)
    }
}

/// Payment record as stored in `payment_events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i32,
    /// Business identifier, unique across the table
    pub order_id: String,
    /// Amount in minor units
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a PROCESSING record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: String,
    pub amount: i64,
}

impl NewPayment {
    pub fn new(order_id: impl Into<String>, amount: i64) -> Self {
        Self {
            order_id: order_id.into(),
            amount,
        }
    }
}

/// Payment request as published on the queue
///
/// `status` is whatever the caller sent and is only logged; the record's
/// status is owned by [`crate::PaymentService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEnvelope {
    pub order_id: String,
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl PaymentEnvelope {
    pub fn new(order_id: impl Into<String>, amount: i64) -> Self {
        Self {
            order_id: order_id.into(),
            amount,
            status: "PENDING".to_string(),
            callback_url: None,
        }
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.order_id.trim().is_empty() {
            return Err("order_id must not be empty".to_string());
        }
        Ok(())
    }
}

impl QueueJob for PaymentEnvelope {
    fn job_id(&self) -> String {
        self.order_id.clone()
    }
}

/// Result of one processing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Debit succeeded and SUCCESS was committed
    Success,
    /// A record for the order already exists
    Duplicate,
    /// Business rejection; FAILED was committed and retrying cannot help
    PermanentFailure(String),
    /// System failure; FAILED was committed and the message should be dead-lettered
    TransientFailure(String),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Duplicate => "duplicate",
            Outcome::PermanentFailure(_) => "permanent_failure",
            Outcome::TransientFailure(_) => "transient_failure",
        }
    }

    /// Everything but a transient failure settles the message.
    pub fn should_ack(&self) -> bool {
        !matches!(self, Outcome::TransientFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_transitions() {
        use PaymentStatus::*;

        assert!(Processing.can_transition_to(Success));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_string_forms() {
        assert_eq!(PaymentStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(
            PaymentStatus::from_str("FAILED").unwrap(),
            PaymentStatus::Failed
        );
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
    }

    #[test]
    fn test_envelope_from_wire() {
        let envelope: PaymentEnvelope = serde_json::from_str(
            r#"{"order_id":"ORD-1","amount":100,"status":"PENDING","callback_url":null}"#,
        )
        .unwrap();

        assert_eq!(envelope, PaymentEnvelope::new("ORD-1", 100));
        assert_eq!(envelope.job_id(), "ORD-1");
    }

    #[test]
    fn test_envelope_optional_fields_default() {
        let envelope: PaymentEnvelope =
            serde_json::from_str(r#"{"order_id":"ORD-2","amount":-5}"#).unwrap();

        assert_eq!(envelope.status, "");
        assert!(envelope.callback_url.is_none());
        assert_eq!(envelope.amount, -5);
    }

    #[test]
    fn test_envelope_requires_amount() {
        let result = serde_json::from_str::<PaymentEnvelope>(r#"{"order_id":"ORD-3"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_validate_rejects_blank_order() {
        assert!(PaymentEnvelope::new("  ", 1).validate().is_err());
        assert!(PaymentEnvelope::new("ORD-4", 1).validate().is_ok());
    }

    #[test]
    fn test_outcome_ack_policy() {
        assert!(Outcome::Success.should_ack());
        assert!(Outcome::Duplicate.should_ack());
        assert!(Outcome::PermanentFailure("invalid".into()).should_ack());
        assert!(!Outcome::TransientFailure("timeout".into()).should_ack());
    }
}
