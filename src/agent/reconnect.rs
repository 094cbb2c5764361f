//! Client-side reconnect state machine.
//!
//! [`ReconnectManager`] decides *whether* and *when* to dial again. It owns
//! no socket and no timer; the agent loop feeds it transitions and sleeps
//! for the delay it returns.
//!
//! # Transitions
//!
//! | From | Event | To |
//! |------|-------|----|
//! | `Disconnected` | `start` | `Connecting` |
//! | `Connecting` | `on_open` | `Connected` (attempt reset) |
//! | `Connecting` / `Connected` | `on_closed`, budget left | `Reconnecting` |
//! | `Connecting` / `Connected` | `on_closed`, budget spent | `GivenUp` |
//! | `Reconnecting` | `on_timer_fired` | `Connecting` |
//! | any | `manual_reconnect` | `Connecting` (attempt reset) |
//! | any | `stop` | `Disconnected` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::backoff::backoff_delay;

// ============================================================================
// ReconnectState
// ============================================================================

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// Not started, or stopped.
    Disconnected,
    /// Dialing.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting for the backoff timer.
    Reconnecting,
    /// Retry budget spent. Only a manual reconnect leaves this state.
    GivenUp,
}

// ============================================================================
// ReconnectManager
// ============================================================================

/// Source of uniform samples in `[0.0, 1.0)` for jitter.
pub type RandomSource = Box<dyn FnMut() -> f64 + Send>;

/// Tracks consecutive failures and computes reconnect delays.
pub struct ReconnectManager {
    state: ReconnectState,
    attempt: u32,
    max_attempts: u32,
    base_delay: Duration,
    random: RandomSource,
}

impl fmt::Debug for ReconnectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectManager")
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

impl ReconnectManager {
    /// Creates a manager using thread-local randomness for jitter.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            state: ReconnectState::Disconnected,
            attempt: 0,
            max_attempts,
            base_delay,
            random: Box::new(rand::random::<f64>),
        }
    }

    /// Replaces the jitter source.
    #[inline]
    #[must_use]
    pub fn with_random(mut self, random: impl FnMut() -> f64 + Send + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// Returns the number of consecutive failed attempts.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Starts the first dial. No-op unless `Disconnected`.
    pub fn start(&mut self) {
        if self.state == ReconnectState::Disconnected {
            self.state = ReconnectState::Connecting;
        }
    }

    /// Records a successful open and resets the failure count.
    pub fn on_open(&mut self) {
        if self.attempt > 0 {
            info!(after_attempts = self.attempt, "Reconnected");
        }
        self.state = ReconnectState::Connected;
        self.attempt = 0;
    }

    /// Records a close or failed dial.
    ///
    /// Returns the delay before the next dial, or `None` when no retry should
    /// be scheduled (budget spent, or not currently connecting/connected).
    pub fn on_closed(&mut self) -> Option<Duration> {
        if !matches!(
            self.state,
            ReconnectState::Connecting | ReconnectState::Connected
        ) {
            return None;
        }

        if self.attempt >= self.max_attempts {
            warn!(attempts = self.attempt, "Max reconnection attempts reached");
            self.state = ReconnectState::GivenUp;
            return None;
        }

        let retry = self.attempt + 1;
        let delay = backoff_delay(retry, self.base_delay, (self.random)());
        self.attempt = retry;
        self.state = ReconnectState::Reconnecting;

        debug!(
            attempt = retry,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        Some(delay)
    }

    /// Records that the backoff timer fired.
    ///
    /// Returns `true` if the caller should dial now.
    pub fn on_timer_fired(&mut self) -> bool {
        if self.state != ReconnectState::Reconnecting {
            return false;
        }
        self.state = ReconnectState::Connecting;
        true
    }

    /// Resets the failure count and dials immediately, from any state.
    ///
    /// Any pending timer is obsolete afterwards.
    pub fn manual_reconnect(&mut self) {
        info!(previous = ?self.state, "Manual reconnect");
        self.attempt = 0;
        self.state = ReconnectState::Connecting;
    }

    /// Stops reconnecting.
    pub fn stop(&mut self) {
        self.state = ReconnectState::Disconnected;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);

    fn manager(max_attempts: u32) -> ReconnectManager {
        ReconnectManager::new(max_attempts, BASE).with_random(|| 0.0)
    }

    #[test]
    fn test_initial_state() {
        let mut manager = manager(5);
        assert_eq!(manager.state(), ReconnectState::Disconnected);
        assert_eq!(manager.on_closed(), None);

        manager.start();
        assert_eq!(manager.state(), ReconnectState::Connecting);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let mut manager = manager(5);
        manager.start();

        let expected = [1000, 1500, 2250, 3375, 5062];
        for (i, millis) in expected.into_iter().enumerate() {
            let delay = manager.on_closed().expect("retry scheduled");
            assert_eq!(delay.as_millis() as u64, millis, "retry {}", i + 1);
            assert_eq!(manager.state(), ReconnectState::Reconnecting);
            assert_eq!(manager.attempt(), i as u32 + 1);
            assert!(manager.on_timer_fired());
        }

        assert_eq!(manager.on_closed(), None);
        assert_eq!(manager.state(), ReconnectState::GivenUp);
        assert!(!manager.on_timer_fired());
    }

    #[test]
    fn test_manual_reconnect_from_given_up() {
        let mut manager = manager(1);
        manager.start();
        manager.on_closed();
        manager.on_timer_fired();
        manager.on_closed();
        assert_eq!(manager.state(), ReconnectState::GivenUp);

        manager.manual_reconnect();
        assert_eq!(manager.state(), ReconnectState::Connecting);
        assert_eq!(manager.attempt(), 0);
        assert_eq!(manager.on_closed(), Some(BASE));
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut manager = manager(5);
        manager.start();
        manager.on_closed();
        manager.on_timer_fired();
        manager.on_closed();
        manager.on_timer_fired();
        assert_eq!(manager.attempt(), 2);

        manager.on_open();
        assert_eq!(manager.state(), ReconnectState::Connected);
        assert_eq!(manager.attempt(), 0);
        assert_eq!(manager.on_closed(), Some(BASE));
    }

    #[test]
    fn test_duplicate_close_schedules_one_timer() {
        let mut manager = manager(5);
        manager.start();
        manager.on_open();

        assert!(manager.on_closed().is_some());
        assert_eq!(manager.on_closed(), None);
        assert_eq!(manager.attempt(), 1);
    }

    #[test]
    fn test_jitter_uses_random_source() {
        let mut manager = ReconnectManager::new(5, BASE).with_random(|| 0.5);
        manager.start();
        assert_eq!(manager.on_closed(), Some(Duration::from_millis(1250)));
    }

    #[test]
    fn test_stop() {
        let mut manager = manager(5);
        manager.start();
        manager.stop();
        assert_eq!(manager.state(), ReconnectState::Disconnected);
        assert!(!manager.on_timer_fired());
    }
}
