//! Listening port acquisition.
//!
//! The agent dials a fixed port, so the server cannot fall back to another
//! one. [`ListenerBootstrap`] reclaims the port from a stale holder and then
//! polls until the bind succeeds or the poll budget runs out.
//!
//! # Acquisition Flow
//!
//! 1. Port 0 - Bind an ephemeral port directly, no reclamation
//! 2. `PortReclaimer::reclaim` - Best effort, failures are logged
//! 3. Bind poll - Retry `AddrInUse` every `poll_interval`
//! 4. `PortUnavailable` - After `max_poll_attempts` failed polls

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};

use super::reclaim::{NoopReclaimer, PortReclaimer, ProcessPortReclaimer};

// ============================================================================
// ListenerBootstrap
// ============================================================================

/// Acquires the server's listening port.
#[derive(Clone)]
pub struct ListenerBootstrap {
    bind_ip: IpAddr,
    poll_interval: Duration,
    max_poll_attempts: u32,
    reclaimer: Arc<dyn PortReclaimer>,
}

impl ListenerBootstrap {
    /// Creates a bootstrap from server configuration.
    ///
    /// Uses [`ProcessPortReclaimer`] when `reclaim_port` is set, otherwise
    /// [`NoopReclaimer`].
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        let reclaimer: Arc<dyn PortReclaimer> = if config.reclaim_port {
            Arc::new(ProcessPortReclaimer)
        } else {
            Arc::new(NoopReclaimer)
        };

        Self {
            bind_ip: config.bind_ip,
            poll_interval: config.poll_interval,
            max_poll_attempts: config.max_poll_attempts,
            reclaimer,
        }
    }

    /// Replaces the reclaimer.
    #[inline]
    #[must_use]
    pub fn with_reclaimer(mut self, reclaimer: impl PortReclaimer) -> Self {
        self.reclaimer = Arc::new(reclaimer);
        self
    }

    /// Binds `port`, reclaiming it first if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::PortUnavailable`] if the port stays in use past the poll budget
    /// - [`Error::Io`] for any other bind failure
    pub async fn acquire(&self, port: u16) -> Result<TcpListener> {
        let addr = SocketAddr::new(self.bind_ip, port);

        if port == 0 {
            let listener = TcpListener::bind(addr).await?;
            debug!(port = listener.local_addr()?.port(), "Bound ephemeral port");
            return Ok(listener);
        }

        match self.reclaimer.reclaim(port).await {
            Ok(0) => {}
            Ok(killed) => info!(port, killed, "Reclaimed port from stale holders"),
            Err(e) => warn!(port, error = %e, "Port reclamation failed"),
        }

        let mut attempts = 0u32;
        loop {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!(port, attempts, "WebSocket listener bound");
                    return Ok(listener);
                }

                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    attempts += 1;
                    if attempts > self.max_poll_attempts {
                        error!(port, attempts, "Failed to free up port");
                        return Err(Error::port_unavailable(port));
                    }

                    debug!(port, attempt = attempts, "Port still in use, waiting");
                    sleep(self.poll_interval).await;
                }

                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
