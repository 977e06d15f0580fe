//! Merchant callback notification.
//!
//! Delivery is best effort: the outcome is logged and never propagated, so a
//! slow or broken merchant endpoint cannot change how a payment settles.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::PaymentStatus;

/// Upper bound on one callback request
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Body POSTed to the merchant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackPayload<'a> {
    pub order_id: &'a str,
    pub status: PaymentStatus,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    /// Tell the merchant at `url` the final status of `order_id`
    async fn notify(&self, url: &str, order_id: &str, status: PaymentStatus);
}

#[derive(Clone)]
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    /// Notifier whose requests give up after [`CALLBACK_TIMEOUT`]
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(CALLBACK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    async fn notify(&self, url: &str, order_id: &str, status: PaymentStatus) {
        info!(url = %url, order_id = %order_id, status = %status, "Sending callback");

        let payload = CallbackPayload { order_id, status };
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(order_id = %order_id, "Callback delivered");
            }
            Ok(response) => {
                warn!(
                    order_id = %order_id,
                    http_status = response.status().as_u16(),
                    "Merchant rejected callback"
                );
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Callback delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn spawn_merchant(reply: StatusCode, delay: Duration) -> (String, Received) {
        let received: Received = Arc::default();

        async fn handler(
            State((received, reply, delay)): State<(Received, StatusCode, Duration)>,
            Json(body): Json<Value>,
        ) -> StatusCode {
            received.lock().await.push(body);
            tokio::time::sleep(delay).await;
            reply
        }

        let app = Router::new()
            .route("/callback", post(handler))
            .with_state((received.clone(), reply, delay));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/callback", addr), received)
    }

    #[tokio::test]
    async fn test_posts_order_and_status() {
        let (url, received) = spawn_merchant(StatusCode::OK, Duration::ZERO).await;
        let notifier = HttpCallbackNotifier::new().unwrap();

        notifier.notify(&url, "ORD-1", PaymentStatus::Success).await;

        let bodies = received.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(
            bodies[0],
            serde_json::json!({"order_id": "ORD-1", "status": "SUCCESS"})
        );
    }

    #[tokio::test]
    async fn test_non_success_response_is_swallowed() {
        let (url, received) =
            spawn_merchant(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let notifier = HttpCallbackNotifier::new().unwrap();

        notifier.notify(&url, "ORD-2", PaymentStatus::Failed).await;

        assert_eq!(received.lock().await[0]["status"], "FAILED");
    }

    #[tokio::test]
    async fn test_unreachable_merchant_is_swallowed() {
        let notifier = HttpCallbackNotifier::new().unwrap();
        notifier
            .notify("http://127.0.0.1:1/callback", "ORD-3", PaymentStatus::Success)
            .await;
    }

    #[tokio::test]
    async fn test_slow_merchant_is_bounded_by_timeout() {
        let (url, _received) = spawn_merchant(StatusCode::OK, Duration::from_secs(30)).await;
        let notifier = HttpCallbackNotifier::with_timeout(Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        notifier.notify(&url, "ORD-4", PaymentStatus::Success).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
