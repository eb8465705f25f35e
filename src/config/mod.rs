//! Configuration module
//!
//! This module handles application configuration: a JSON file describing the
//! proxies to expose and the services behind them, with environment variable
//! overrides, plus a validation pass before anything is bound.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::common::{validate_port_number, Network, ProxyError, Result};
use crate::proxy::ProxySettings;

/// Prefix for environment variable overrides, e.g. `HIVEGATE_LOG_LEVEL`
pub const ENV_PREFIX: &str = "HIVEGATE";

mod defaults {
    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn connect_timeout_ms() -> u64 {
        1_000
    }

    pub fn buffer_size() -> usize {
        8192
    }

    pub fn max_relay_buffers() -> usize {
        1024
    }
}

/// Backend service behind one proxy
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    /// Name used in logs
    pub name: String,
    /// Host the service listens on; empty means loopback
    #[serde(default)]
    pub host: String,
    /// Port the service listens on
    pub port: u16,
    /// Whether the service may be deleted through the management layer
    #[serde(default)]
    pub locked: bool,
}

/// One listening endpoint and its backend
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySpec {
    /// Port the proxy listens on
    pub port: u16,
    /// Transport shared by the proxy and its service
    pub network: Network,
    /// The backend the proxy forwards to
    pub service: ServiceSpec,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Backend dial timeout in milliseconds
    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Size of each TCP relay buffer
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Cap on concurrently borrowed relay buffers per proxy
    #[serde(default = "defaults::max_relay_buffers")]
    pub max_relay_buffers: usize,

    /// Proxies to create and start at boot
    #[serde(default)]
    pub proxies: Vec<ProxySpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            connect_timeout_ms: defaults::connect_timeout_ms(),
            buffer_size: defaults::buffer_size(),
            max_relay_buffers: defaults::max_relay_buffers(),
            proxies: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional JSON file plus the environment
    ///
    /// Environment variables prefixed with `HIVEGATE_` override file values.
    /// The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let path = path
                .to_str()
                .ok_or_else(|| ProxyError::Config("non-utf8 config path".to_string()))?;
            builder = builder.add_source(File::new(path, FileFormat::Json));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config = builder
            .build()
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        let app: AppConfig = config
            .try_deserialize()
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        app.validate()?;
        Ok(app)
    }

    /// Check port numbers and reject duplicate (network, port) pairs
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<(Network, u16)> = HashSet::new();

        for spec in &self.proxies {
            validate_port_number(spec.port)?;
            validate_port_number(spec.service.port)?;

            if !seen.insert((spec.network, spec.port)) {
                return Err(ProxyError::Config(format!(
                    "duplicate proxy for {}:{}",
                    spec.network, spec.port
                )));
            }
        }

        if self.buffer_size == 0 {
            return Err(ProxyError::Config("buffer_size must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Proxy tuning derived from this configuration
    pub fn settings(&self) -> ProxySettings {
        ProxySettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            buffer_size: self.buffer_size,
            max_relay_buffers: self.max_relay_buffers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.connect_timeout_ms, 1_000);
        assert_eq!(config.buffer_size, 8192);
        assert!(config.proxies.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "log_level": "debug",
                "connect_timeout_ms": 500,
                "proxies": [
                    {{
                        "port": 2323,
                        "network": "tcp",
                        "service": {{ "name": "telnetd", "port": 12323, "locked": true }}
                    }},
                    {{
                        "port": 5683,
                        "network": "udp",
                        "service": {{ "name": "coapd", "host": "10.0.0.2", "port": 15683 }}
                    }}
                ]
            }}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.connect_timeout_ms, 500);
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.proxies.len(), 2);

        let telnet = &config.proxies[0];
        assert_eq!(telnet.network, Network::Tcp);
        assert_eq!(telnet.port, 2323);
        assert!(telnet.service.locked);
        assert_eq!(telnet.service.host, "");

        let coap = &config.proxies[1];
        assert_eq!(coap.network, Network::Udp);
        assert_eq!(coap.service.host, "10.0.0.2");
    }

    #[test]
    #[serial_test::serial]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "log_level": "info" }}"#).unwrap();

        std::env::set_var("HIVEGATE_LOG_LEVEL", "trace");
        let config = AppConfig::load(Some(file.path())).unwrap();
        std::env::remove_var("HIVEGATE_LOG_LEVEL");

        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_validate_rejects_duplicate_proxies() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "proxies": [
                    {{ "port": 1883, "network": "tcp", "service": {{ "name": "a", "port": 11883 }} }},
                    {{ "port": 1883, "network": "tcp", "service": {{ "name": "b", "port": 11884 }} }}
                ]
            }}"#
        )
        .unwrap();

        match AppConfig::load(Some(file.path())) {
            Err(ProxyError::Config(msg)) => assert!(msg.contains("duplicate proxy")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let config = AppConfig {
            proxies: vec![ProxySpec {
                port: 0,
                network: Network::Tcp,
                service: ServiceSpec {
                    name: "broken".to_string(),
                    host: String::new(),
                    port: 9000,
                    locked: false,
                },
            }],
            ..AppConfig::default()
        };

        assert!(matches!(config.validate(), Err(ProxyError::InvalidPort(0))));
    }

    #[test]
    fn test_settings_conversion() {
        let config = AppConfig {
            connect_timeout_ms: 250,
            buffer_size: 4096,
            ..AppConfig::default()
        };

        let settings = config.settings();
        assert_eq!(settings.connect_timeout, Duration::from_millis(250));
        assert_eq!(settings.buffer_size, 4096);
    }
}
