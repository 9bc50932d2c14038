//! Hang detection for active sessions
//!
//! The staleness signal is the session's last interaction timestamp. A
//! session that has been active without any interaction for longer than the
//! inactivity timeout is declared hung. Only one reconnect may be in flight.

use std::time::Duration;

use tokio::time::Instant;

use super::Session;

/// Interval between liveness samples
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Inactivity after which an active session is considered hung
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause between tearing a hung session down and starting it again
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(2);

/// Decides when an active session has stalled
#[derive(Debug)]
pub struct LivenessMonitor {
    timeout: Duration,
    reconnecting: bool,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_INACTIVITY_TIMEOUT)
    }
}

impl LivenessMonitor {
    /// Create a monitor with the given inactivity timeout
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            reconnecting: false,
        }
    }

    /// Sample the session at `now`
    ///
    /// Returns true when the session is hung. The monitor then stays in the
    /// reconnecting state until [`Self::reconnected`] is called, and reports
    /// nothing further in the meantime.
    pub fn check(&mut self, session: &Session, now: Instant) -> bool {
        if self.reconnecting || !session.is_active() {
            return false;
        }

        let idle = now.saturating_duration_since(session.last_interaction());
        if idle > self.timeout {
            self.reconnecting = true;
            return true;
        }

        false
    }

    /// Whether a reconnect is in progress
    #[must_use]
    pub const fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Mark the pending reconnect as handled
    pub fn reconnected(&mut self) {
        self.reconnecting = false;
    }
}
