//! External collaborators of the session driver
//!
//! Each collaborator hides a vendor SDK or remote service behind a narrow
//! async interface. Close and stop calls must be idempotent.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::AvatarConfig;
use crate::speech::SpeechChunk;

/// Supplies avatar settings when a session starts
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Load the settings
    async fn load(&self) -> Result<AvatarConfig>;
}

/// Speech/avatar SDK session, recognizer and media transport
#[async_trait]
pub trait AvatarSdk: Send + Sync {
    /// Whether the SDK is loaded and usable
    fn is_available(&self) -> bool {
        true
    }

    /// Establish the avatar session and its media transport
    ///
    /// Resolves once media is ready. Implementations should abandon the
    /// handshake when `cancel` fires.
    async fn start_session(&self, config: &AvatarConfig, cancel: CancellationToken)
    -> Result<()>;

    /// Close the session and its transport
    async fn close(&self);

    /// Start continuous recognition from the microphone
    async fn start_listening(&self, locales: &[String]) -> Result<()>;

    /// Stop continuous recognition
    async fn stop_listening(&self);
}

/// Text-to-speech output
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak one chunk, resolving when playback completes
    async fn speak(&self, chunk: &SpeechChunk, cancel: CancellationToken) -> Result<()>;

    /// Cut off any utterance in progress
    async fn stop_speaking(&self);
}

/// Remote chat agent
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a user message and return the assistant's reply text
    async fn ask(&self, session_id: &str, message: &str) -> Result<String>;
}
