use crate::{env_or_default, ConfigError};
use std::net::Ipv4Addr;

/// Bind address for a worker's health/metrics listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
}

impl HealthServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve the port from `{service}_HEALTH_PORT`, then `HEALTH_PORT`, then `default_port`.
    ///
    /// `HEALTH_HOST` overrides the bind host (default: all interfaces).
    pub fn from_env_for(service: &str, default_port: u16) -> Result<Self, ConfigError> {
        let service_key = format!("{}_HEALTH_PORT", service.to_ascii_uppercase());
        let (key, raw) = match std::env::var(&service_key) {
            Ok(value) => (service_key, value),
            Err(_) => (
                "HEALTH_PORT".to_string(),
                env_or_default("HEALTH_PORT", &default_port.to_string()),
            ),
        };

        let port = raw.parse().map_err(|e| ConfigError::ParseError {
            key,
            details: format!("{}", e),
        })?;
        let host = env_or_default("HEALTH_HOST", &Ipv4Addr::UNSPECIFIED.to_string());

        Ok(Self { host, port })
    }

    /// Get the listener address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
