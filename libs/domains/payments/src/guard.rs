//! Idempotency guard.
//!
//! A claim is a Redis key `processed:{order_id}` set with `NX` and a 24 hour
//! expiry. The key is never deleted; it simply ages out. Its presence means
//! another delivery of the same order got there first, its absence proves
//! nothing, and the unique constraint on `payment_events.order_id` remains the
//! authority.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a claim blocks redeliveries of the same order
pub const CLAIM_TTL: Duration = Duration::from_secs(86_400);

/// Redis key holding the claim for `order_id`
pub fn lock_key(order_id: &str) -> String {
    format!("processed:{}", order_id)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Atomically claim `order_id`. Exactly one concurrent caller sees `true`.
    async fn claim(&self, order_id: &str) -> bool;
}

/// Guard backed by `SET key 1 NX EX ttl`.
///
/// Fails open: when Redis cannot be reached the claim is granted with a
/// warning, so an outage degrades to database-level deduplication instead of
/// stalling the queue.
#[derive(Clone)]
pub struct RedisIdempotencyGuard {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisIdempotencyGuard {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl: CLAIM_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl IdempotencyGuard for RedisIdempotencyGuard {
    async fn claim(&self, order_id: &str) -> bool {
        let key = lock_key(order_id);
        let mut conn = self.conn.clone();

        // SET NX answers OK when the key was written and nil when it already existed
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => {
                debug!(order_id = %order_id, "Claimed order");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(
                    order_id = %order_id,
                    error = %e,
                    "Idempotency store unavailable, proceeding without claim"
                );
                true
            }
        }
    }
}
