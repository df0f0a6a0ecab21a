use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use permessage_deflate::DeflateConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Server configuration (figment: struct defaults -> config.toml)
// =============================================================================
//
//   host = "0.0.0.0"
//   port = 8080
//   max_connections = 10000
//
//   [ssl]
//   enabled = false
//
//   [deflate]
//   server_no_context_takeover = true

/// Engine tunables. Construct via [`ServerConfig::load`] or
/// [`ServerConfig::from_toml_str`], or build one in code and call
/// [`ServerConfig::validate`] (the server does this on construction).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 lets the transport pick a port. Signed so bad values survive
    /// deserialization and are reported by `validate`.
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default = "default_max_connections")]
    pub max_connections: i64,
    /// Seconds between server pings (and timeout sweeps).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Seconds without a pong before a connection counts as timed out.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// Offer permessage-deflate and enable the fallback codec.
    #[serde(default = "default_true")]
    pub compression: bool,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
    /// Queue depth at which producers are paused.
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: usize,
    /// Reject unmasked client frames (RFC 6455 §5.1).
    #[serde(default = "default_true")]
    pub require_masked_frames: bool,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default)]
    pub deflate: DeflateConfig,
}

/// TLS material. Termination itself belongs to the transport.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SslConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            heartbeat_interval: default_heartbeat_interval(),
            ping_timeout: default_ping_timeout(),
            compression: true,
            max_frame_size: default_max_frame_size(),
            max_message_size: default_max_message_size(),
            outbound_queue_size: default_outbound_queue_size(),
            backpressure_threshold: default_backpressure_threshold(),
            require_masked_frames: true,
            ssl: SslConfig::default(),
            deflate: DeflateConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> i64 {
    8080
}

fn default_max_connections() -> i64 {
    10_000
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_max_frame_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_outbound_queue_size() -> usize {
    1000
}

fn default_backpressure_threshold() -> usize {
    800
}

impl ServerConfig {
    /// Layer a TOML file over the defaults. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path)))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the effective configuration as TOML.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let serialized = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, serialized)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if !(0..=i64::from(u16::MAX)).contains(&self.port) {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.max_connections <= 0 {
            return Err(ConfigError::InvalidMaxConnections(self.max_connections));
        }
        if self.ssl.enabled {
            if self.ssl.cert.is_none() {
                return Err(ConfigError::MissingTlsFile("ssl.cert"));
            }
            if self.ssl.key.is_none() {
                return Err(ConfigError::MissingTlsFile("ssl.key"));
            }
        }
        if !self.deflate.window_bits_valid() {
            return Err(ConfigError::InvalidWindowBits {
                server: self.deflate.server_max_window_bits,
                client: self.deflate.client_max_window_bits,
            });
        }
        if self.heartbeat_interval == 0 {
            return Err(ConfigError::Zero("heartbeat_interval"));
        }
        if self.ping_timeout == 0 {
            return Err(ConfigError::Zero("ping_timeout"));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Zero("max_frame_size"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Zero("max_message_size"));
        }
        if self.outbound_queue_size == 0 {
            return Err(ConfigError::Zero("outbound_queue_size"));
        }
        if self.backpressure_threshold > self.outbound_queue_size {
            return Err(ConfigError::BackpressureAboveQueue {
                threshold: self.backpressure_threshold,
                queue: self.outbound_queue_size,
            });
        }
        Ok(())
    }

    /// `host:port`, for handing to a listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout)
    }

    /// Registry capacity. Only meaningful after `validate`.
    pub(crate) fn capacity(&self) -> usize {
        usize::try_from(self.max_connections).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let c = ServerConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(c.ping_timeout(), Duration::from_secs(90));
        assert_eq!(c.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_empty_host_rejected() {
        let c = ServerConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::EmptyHost)));
    }

    #[test]
    fn test_port_range() {
        for port in [-1, 70_000] {
            let c = ServerConfig {
                port,
                ..Default::default()
            };
            assert!(matches!(c.validate(), Err(ConfigError::InvalidPort(p)) if p == port));
        }
        for port in [0, 65_535] {
            let c = ServerConfig {
                port,
                ..Default::default()
            };
            assert!(c.validate().is_ok());
        }
    }

    #[test]
    fn test_max_connections_must_be_positive() {
        let c = ServerConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
    }

    #[test]
    fn test_ssl_requires_cert_and_key() {
        let mut c = ServerConfig::default();
        c.ssl.enabled = true;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::MissingTlsFile("ssl.cert"))
        ));
        c.ssl.cert = Some("cert.pem".into());
        assert!(matches!(
            c.validate(),
            Err(ConfigError::MissingTlsFile("ssl.key"))
        ));
        c.ssl.key = Some("key.pem".into());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_backpressure_and_sizes() {
        let c = ServerConfig {
            backpressure_threshold: 2000,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::BackpressureAboveQueue { .. })
        ));
        let c = ServerConfig {
            max_frame_size: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Zero("max_frame_size"))));
    }

    #[test]
    fn test_window_bits_checked() {
        let mut c = ServerConfig::default();
        c.deflate.server_max_window_bits = 7;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidWindowBits { server: 7, .. })
        ));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let c = ServerConfig::from_toml_str(
            r#"
            host = "127.0.0.1"
            port = 0
            max_connections = 2

            [deflate]
            server_no_context_takeover = true
            "#,
        )
        .unwrap();
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.port, 0);
        assert_eq!(c.max_connections, 2);
        assert!(c.deflate.server_no_context_takeover);
        assert_eq!(c.heartbeat_interval, 30);
        assert_eq!(c.deflate.level, 6);
    }

    #[test]
    fn test_invalid_toml_values_rejected() {
        assert!(matches!(
            ServerConfig::from_toml_str("port = 70000"),
            Err(ConfigError::InvalidPort(70_000))
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("max_connections = \"lots\""),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("server.toml");

        // Missing file: defaults.
        let c = ServerConfig::load(&path).unwrap();
        assert_eq!(c.port, 8080);

        let custom = ServerConfig {
            port: 9001,
            compression: false,
            ..Default::default()
        };
        custom.save(&path).unwrap();
        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.port, 9001);
        assert!(!loaded.compression);
    }
}
