//! Configuration management
//!
//! Handles loading and validating server configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the SOCKS5 listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Number of worker threads (0 = auto)
    #[serde(default)]
    pub workers: usize,
    /// Accept queue depth
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl ServerConfig {
    /// Get effective worker count (auto-detect if 0)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            workers: 0,
            backlog: default_backlog(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Accepted username
    #[serde(default = "default_username")]
    pub username: String,
    /// Accepted password
    #[serde(default = "default_password")]
    pub password: String,
    /// Accept clients that only offer the no-authentication method
    #[serde(default)]
    pub allow_anonymous: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            allow_anonymous: false,
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Bytes per read in the TCP splice (minimum 4096)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upstream TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// TCP relay idle timeout in seconds (0 = disabled)
    #[serde(default)]
    pub tcp_idle_timeout_secs: u64,
    /// UDP association idle timeout in seconds (0 = disabled)
    #[serde(default)]
    pub udp_idle_timeout_secs: u64,
    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl RelayConfig {
    /// Upstream connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// TCP relay idle timeout, if enabled
    pub fn tcp_idle_timeout(&self) -> Option<Duration> {
        (self.tcp_idle_timeout_secs > 0).then(|| Duration::from_secs(self.tcp_idle_timeout_secs))
    }

    /// UDP association idle timeout, if enabled
    pub fn udp_idle_timeout(&self) -> Option<Duration> {
        (self.udp_idle_timeout_secs > 0).then(|| Duration::from_secs(self.udp_idle_timeout_secs))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout(),
            tcp_idle_timeout_secs: 0,
            udp_idle_timeout_secs: 0,
            max_sessions: default_max_sessions(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_bind_addr() -> SocketAddr { "0.0.0.0:1080".parse().unwrap() }
fn default_backlog() -> u32 { 128 }
fn default_username() -> String { "user".to_string() }
fn default_password() -> String { "password".to_string() }
fn default_chunk_size() -> usize { 16384 }
fn default_connect_timeout() -> u64 { 10 }
fn default_max_sessions() -> usize { 4096 }
fn default_metrics_addr() -> SocketAddr { "127.0.0.1:9090".parse().unwrap() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.relay.chunk_size < 4096 {
            anyhow::bail!("relay.chunk_size must be at least 4096");
        }
        if self.relay.max_sessions == 0 {
            anyhow::bail!("relay.max_sessions must be > 0");
        }
        if self.relay.connect_timeout_secs == 0 {
            anyhow::bail!("relay.connect_timeout_secs must be > 0");
        }
        if self.server.backlog < 5 {
            anyhow::bail!("server.backlog must be at least 5");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_addr.port(), 1080);
        assert_eq!(config.auth.username, "user");
        assert!(!config.auth.allow_anonymous);
        assert!(config.relay.tcp_idle_timeout().is_none());
    }

    #[test]
    fn default_workers_auto_detect() {
        let config = ServerConfig::default();
        assert!(config.effective_workers() > 0);
    }

    #[test]
    fn undersized_chunk_is_rejected() {
        let mut config = Config::default();
        config.relay.chunk_size = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind_addr = "127.0.0.1:1081"

            [auth]
            username = "alice"
            password = "secret"

            [relay]
            udp_idle_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr.port(), 1081);
        assert_eq!(config.auth.username, "alice");
        assert_eq!(
            config.relay.udp_idle_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.relay.chunk_size, 16384);
    }
}
