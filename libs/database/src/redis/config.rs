#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv};

/// Local development Redis used when neither `REDIS_URL` nor `REDIS_HOST` is set.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

/// Redis connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL; may already carry credentials and the database index
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REDIS_URL)
    }
}

/// Reads `REDIS_URL`, falling back to `REDIS_HOST` (compose files use that
/// name), then to [`DEFAULT_REDIS_URL`]. Values without a scheme are treated
/// as a bare host name.
#[cfg(feature = "config")]
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("REDIS_URL")
            .or_else(|_| std::env::var("REDIS_HOST"))
            .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        let url = if raw.contains("://") {
            raw
        } else if raw.trim().is_empty() {
            return Err(ConfigError::ParseError {
                key: "REDIS_URL".to_string(),
                details: "value is empty".to_string(),
            });
        } else {
            format!("redis://{}:6379/0", raw.trim())
        };

        Ok(Self { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        assert_eq!(RedisConfig::default().url(), "redis://localhost:6379/0");
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_prefers_redis_url() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://cache:6380/2")),
                ("REDIS_HOST", Some("ignored")),
            ],
            || {
                assert_eq!(RedisConfig::from_env().unwrap().url, "redis://cache:6380/2");
            },
        );
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_bare_host() {
        temp_env::with_vars(
            [("REDIS_URL", None::<&str>), ("REDIS_HOST", Some("redis"))],
            || {
                assert_eq!(RedisConfig::from_env().unwrap().url, "redis://redis:6379/0");
            },
        );
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_defaults_to_local() {
        temp_env::with_vars(
            [("REDIS_URL", None::<&str>), ("REDIS_HOST", None::<&str>)],
            || {
                assert_eq!(RedisConfig::from_env().unwrap().url, DEFAULT_REDIS_URL);
            },
        );
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_rejects_empty() {
        temp_env::with_vars(
            [("REDIS_URL", Some("  ")), ("REDIS_HOST", None::<&str>)],
            || {
                assert!(RedisConfig::from_env().is_err());
            },
        );
    }
}
