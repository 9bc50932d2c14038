//! Session lifecycle state machine
//!
//! `Idle → Starting → Active → Stopping → Idle`, with `Starting → Idle` when
//! establishing the session fails.

use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

use crate::{Error, Result};

/// Lifecycle state of an avatar session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session
    Idle,
    /// Establishing the avatar session
    Starting,
    /// Session is live
    Active,
    /// Releasing resources
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// One avatar session's lifecycle
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    user_closed: bool,
    last_interaction: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an idle session
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            user_closed: false,
            last_interaction: Instant::now(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is live
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Whether the user closed the session
    #[must_use]
    pub const fn user_closed(&self) -> bool {
        self.user_closed
    }

    /// Time of the last user or assistant interaction
    #[must_use]
    pub const fn last_interaction(&self) -> Instant {
        self.last_interaction
    }

    /// Record an interaction
    pub fn touch(&mut self) {
        self.last_interaction = Instant::now();
    }

    /// Record that the user asked for the session to end
    pub fn mark_user_closed(&mut self) {
        self.user_closed = true;
    }

    /// `Idle → Starting`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is idle
    pub fn begin_start(&mut self) -> Result<()> {
        self.expect(SessionState::Idle, "start")?;
        self.user_closed = false;
        self.touch();
        self.state = SessionState::Starting;
        Ok(())
    }

    /// `Starting → Active`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is starting
    pub fn activate(&mut self) -> Result<()> {
        self.expect(SessionState::Starting, "activate")?;
        self.touch();
        self.state = SessionState::Active;
        Ok(())
    }

    /// `Starting → Idle` after a failed start
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is starting
    pub fn fail_start(&mut self) -> Result<()> {
        self.expect(SessionState::Starting, "abandon start")?;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// `Starting | Active → Stopping`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when idle or already stopping
    pub fn begin_stop(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::Idle | SessionState::Stopping) {
            return Err(Error::InvalidTransition {
                state: self.state,
                action: "stop",
            });
        }
        self.touch();
        self.state = SessionState::Stopping;
        Ok(())
    }

    /// `Stopping → Idle`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is stopping
    pub fn finish_stop(&mut self) -> Result<()> {
        self.expect(SessionState::Stopping, "finish stop")?;
        self.state = SessionState::Idle;
        Ok(())
    }

    fn expect(&self, state: SessionState, action: &'static str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }
}
