// src/utils/config.rs
//! Host configuration
//!
//! Layered loading: built-in defaults, then an optional `runhub.toml`
//! file, then `RUNHUB_*` environment variables (e.g. `RUNHUB_SERVER__PORT`).

use crate::utils::errors::Result;
use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration for the dispatch host
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Worker registration settings
    pub registry: RegistryConfig,

    /// Dispatch pipeline settings
    pub dispatch: DispatchConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0)
    pub host: String,

    /// Listen port (default: 5050)
    pub port: u16,
}

/// Worker registration settings
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Reachability probe timeout in seconds (default: 5)
    pub probe_timeout_secs: u64,
}

/// Dispatch pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// How long a dispatch waits for a free worker slot before giving up
    /// with an admission timeout, in milliseconds (default: 120000)
    pub admission_timeout_ms: u64,
}

impl RegistryConfig {
    /// Probe timeout as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl DispatchConfig {
    /// Admission timeout as a [`Duration`]
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5050,
            },
            registry: RegistryConfig {
                probe_timeout_secs: 5,
            },
            dispatch: DispatchConfig {
                admission_timeout_ms: 120_000,
            },
        }
    }
}

impl HostConfig {
    /// Load configuration from defaults, `runhub.toml` and `RUNHUB_*`
    /// environment variables, in increasing priority
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5050)?
            .set_default("registry.probe_timeout_secs", 5)?
            .set_default("dispatch.admission_timeout_ms", 120_000)?
            .add_source(config::File::with_name("runhub").required(false))
            .add_source(config::Environment::with_prefix("RUNHUB").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.registry.probe_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.dispatch.admission_timeout(),
            Duration::from_millis(120_000)
        );
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = HostConfig::load().unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.dispatch.admission_timeout_ms, 120_000);
    }
}
