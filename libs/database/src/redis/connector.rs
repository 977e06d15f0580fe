use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use super::RedisConfig;
use crate::common::{DatabaseError, DatabaseResult, RetryConfig, retry_with_backoff};

/// Open a [`ConnectionManager`] and verify it with `PING`.
///
/// The manager reconnects on its own after the initial handshake, so callers
/// clone it freely instead of pooling.
pub async fn connect(url: &str) -> DatabaseResult<ConnectionManager> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect with retries. `None` uses [`RetryConfig::default`].
pub async fn connect_with_retry(
    url: &str,
    retry_config: Option<RetryConfig>,
) -> DatabaseResult<ConnectionManager> {
    let retry_config = retry_config.unwrap_or_default();
    let attempts = retry_config.max_attempts;

    retry_with_backoff(|| connect(url), retry_config)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed {
            attempts,
            message: e.to_string(),
        })
}

pub async fn connect_from_config_with_retry(
    config: RedisConfig,
    retry_config: Option<RetryConfig>,
) -> DatabaseResult<ConnectionManager> {
    connect_with_retry(config.url(), retry_config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_network() {
        let err = connect("not-a-redis-url").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Redis(_)));
    }
}
