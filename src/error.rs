//! Error types for the avatar client

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for avatar client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving an avatar session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    ConfigLoad(String),

    /// The speech/avatar SDK is not usable
    #[error("avatar SDK unavailable: {0}")]
    SdkUnavailable(String),

    /// The avatar session handshake failed
    #[error("failed to establish session: {0}")]
    SessionEstablish(String),

    /// Microphone could not be opened
    #[error("microphone unavailable: {0}")]
    MicrophonePermissionDenied(String),

    /// The remote chat endpoint failed
    #[error("chat error: {0}")]
    RemoteChat(String),

    /// Speech synthesis or playback failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Operation not allowed in the current session state
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        /// State the session was in
        state: SessionState,
        /// Attempted action
        action: &'static str,
    },

    /// The session driver has shut down
    #[error("session driver closed")]
    Closed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this failure happened while setting up a session
    ///
    /// Setup failures are shown as a blocking alert rather than an inline
    /// system message
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_) | Self::SdkUnavailable(_) | Self::SessionEstablish(_)
        )
    }

    /// Short message suitable for the transcript area
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ConfigLoad(_) => "Failed to load configuration.".to_string(),
            Self::SdkUnavailable(_) => "Avatar SDK not loaded. Check network.".to_string(),
            Self::SessionEstablish(_) => "Failed to start session.".to_string(),
            Self::MicrophonePermissionDenied(_) => {
                "Microphone unavailable. Check permissions.".to_string()
            }
            Self::RemoteChat(_) => "The assistant could not be reached.".to_string(),
            Self::Synthesis(_) | Self::Audio(_) => "Speech playback failed.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failures_are_classified() {
        assert!(Error::ConfigLoad("x".into()).is_setup_failure());
        assert!(Error::SdkUnavailable("x".into()).is_setup_failure());
        assert!(Error::SessionEstablish("x".into()).is_setup_failure());
        assert!(!Error::RemoteChat("x".into()).is_setup_failure());
        assert!(!Error::Synthesis("x".into()).is_setup_failure());
    }

    #[test]
    fn invalid_transition_message() {
        let err = Error::InvalidTransition {
            state: SessionState::Active,
            action: "start",
        };
        assert_eq!(err.to_string(), "cannot start while session is active");
    }
}
