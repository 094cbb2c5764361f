//! Bridge and agent configuration.
//!
//! Provides type-safe option structs for the server side ([`BridgeConfig`])
//! and the agent side ([`AgentConfig`]). Defaults match the wire protocol's
//! conventions; every value can be overridden with a `with_*` builder method
//! or a `BROWSER_BRIDGE_*` environment variable.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use browser_bridge::BridgeConfig;
//!
//! let config = BridgeConfig::new()
//!     .with_port(9009)
//!     .with_request_timeout(Duration::from_secs(10));
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BROWSER_BRIDGE_PORT` | [`BridgeConfig::port`] |
//! | `BROWSER_BRIDGE_REQUEST_TIMEOUT_MS` | both `request_timeout` |
//! | `BROWSER_BRIDGE_CONNECT_TIMEOUT_MS` | both `connect_timeout` |
//! | `BROWSER_BRIDGE_PORT_POLL_INTERVAL_MS` | [`BridgeConfig::poll_interval`] |
//! | `BROWSER_BRIDGE_PORT_POLL_ATTEMPTS` | [`BridgeConfig::max_poll_attempts`] |
//! | `BROWSER_BRIDGE_HEARTBEAT_MS` | [`BridgeConfig::heartbeat_interval`] (0 disables) |
//! | `BROWSER_BRIDGE_URL` | [`AgentConfig::url`] |
//! | `BROWSER_BRIDGE_MAX_RECONNECT_ATTEMPTS` | [`AgentConfig::max_reconnect_attempts`] |
//! | `BROWSER_BRIDGE_RECONNECT_DELAY_MS` | [`AgentConfig::base_reconnect_delay`] |

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default request timeout (30s).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default limit for a WebSocket handshake (10s).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default interval between port availability polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of port availability polls.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 50;

/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay for reconnect backoff.
pub const DEFAULT_BASE_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Environment variable prefix.
const ENV_PREFIX: &str = "BROWSER_BRIDGE_";

// ============================================================================
// BridgeConfig
// ============================================================================

/// Server-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address to bind the WebSocket listener to.
    pub bind_ip: IpAddr,

    /// Listening port (0 for an ephemeral port).
    pub port: u16,

    /// Time to wait for a matching response.
    pub request_timeout: Duration,

    /// Time allowed for an accepted socket to finish the WebSocket upgrade.
    pub connect_timeout: Duration,

    /// Interval between port availability polls.
    pub poll_interval: Duration,

    /// Maximum number of port availability polls.
    pub max_poll_attempts: u32,

    /// Terminate a stale process holding the port before binding.
    pub reclaim_port: bool,

    /// Interval between heartbeat probes, if any.
    pub heartbeat_interval: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            reclaim_port: true,
            heartbeat_interval: None,
        }
    }

    /// Creates a config from defaults overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Some(port) = env_parse("PORT")? {
            config.port = port;
        }
        if let Some(ms) = env_parse("REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("PORT_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse("PORT_POLL_ATTEMPTS")? {
            config.max_poll_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("HEARTBEAT_MS")? {
            config.heartbeat_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Returns the WebSocket URL agents connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.bind_ip, self.port)
    }
}

// ============================================================================
// BridgeConfig - Builder Methods
// ============================================================================

impl BridgeConfig {
    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the listening port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the WebSocket upgrade timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the port poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum number of port polls.
    #[inline]
    #[must_use]
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    /// Enables or disables stale port reclamation.
    #[inline]
    #[must_use]
    pub fn with_port_reclaim(mut self, enabled: bool) -> Self {
        self.reclaim_port = enabled;
        self
    }

    /// Enables heartbeat probes on the given interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }
}

// ============================================================================
// AgentConfig
// ============================================================================

/// Agent-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Server WebSocket URL.
    pub url: String,

    /// Time to wait for a matching response to agent-originated requests.
    pub request_timeout: Duration,

    /// Time allowed for one dial, TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,

    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Base delay for reconnect backoff.
    pub base_reconnect_delay: Duration,

    /// Name reported in the hello frame.
    pub agent_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentConfig {
    /// Creates a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: format!("ws://localhost:{DEFAULT_PORT}"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_reconnect_delay: DEFAULT_BASE_RECONNECT_DELAY,
            agent_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    /// Creates a config from defaults overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Some(url) = env_var("URL") {
            config.url = url;
        }
        if let Some(ms) = env_parse("REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse("MAX_RECONNECT_ATTEMPTS")? {
            config.max_reconnect_attempts = attempts;
        }
        if let Some(ms) = env_parse("RECONNECT_DELAY_MS")? {
            config.base_reconnect_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the URL is a WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is malformed or not `ws`/`wss`.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("Invalid server URL '{}': {e}", self.url)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(()),
            scheme => Err(Error::config(format!(
                "Server URL must use ws:// or wss://, got {scheme}://"
            ))),
        }
    }
}

// ============================================================================
// AgentConfig - Builder Methods
// ============================================================================

impl AgentConfig {
    /// Sets the server URL.
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the dial timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the automatic reconnect budget.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_base_reconnect_delay(mut self, delay: Duration) -> Self {
        self.base_reconnect_delay = delay;
        self
    }

    /// Sets the name reported in the hello frame.
    #[inline]
    #[must_use]
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }
}

// ============================================================================
// Environment Helpers
// ============================================================================

/// Reads a prefixed environment variable.
fn env_var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Reads and parses a prefixed environment variable.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| {
                Error::config(format!("{ENV_PREFIX}{name}={value} is invalid: {e}"))
            })
        })
        .transpose()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_millis(30_000));
        assert_eq!(config.connect_timeout, Duration::from_millis(10_000));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_poll_attempts, 50);
        assert!(config.reclaim_port);
        assert_eq!(config.heartbeat_interval, None);
        assert_eq!(config.ws_url(), "ws://127.0.0.1:8080");
    }

    #[test]
    fn test_bridge_builder_chain() {
        let config = BridgeConfig::new()
            .with_port(0)
            .with_request_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(10))
            .with_max_poll_attempts(3)
            .with_port_reclaim(false)
            .with_heartbeat(Duration::from_secs(15));

        assert_eq!(config.port, 0);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.max_poll_attempts, 3);
        assert!(!config.reclaim_port);
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_agent_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.url, "ws://localhost:8080");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.base_reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_millis(30_000));
        assert_eq!(config.connect_timeout, Duration::from_millis(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_agent_validate_rejects_http() {
        let err = AgentConfig::new()
            .with_url("http://localhost:8080")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_agent_validate_rejects_garbage() {
        assert!(AgentConfig::new().with_url("not a url").validate().is_err());
    }

    #[test]
    fn test_env_parse_missing_is_none() {
        let parsed: Option<u16> = env_parse("SURELY_UNSET_IN_TESTS").expect("parse");
        assert_eq!(parsed, None);
    }
}
