//! Audio-free collaborators for running in a terminal

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::AvatarConfig;
use crate::sdk::{AvatarSdk, Synthesizer};
use crate::speech::SpeechChunk;
use crate::{Error, Result};

/// Rough speaking rate used to pace silent playback
const MS_PER_WORD: u64 = 320;

/// Estimated time to speak `chunk` aloud
#[must_use]
pub fn estimated_duration(chunk: &SpeechChunk) -> Duration {
    let words = chunk.text.split_whitespace().count() as u64;
    Duration::from_millis(words * MS_PER_WORD + u64::from(chunk.ending_silence_ms))
}

/// Synthesizer that produces no audio but takes as long as speech would
#[derive(Debug, Default, Clone, Copy)]
pub struct PacedSynthesizer;

#[async_trait]
impl Synthesizer for PacedSynthesizer {
    async fn speak(&self, chunk: &SpeechChunk, cancel: CancellationToken) -> Result<()> {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(estimated_duration(chunk)) => {}
        }
        Ok(())
    }

    async fn stop_speaking(&self) {}
}

/// Avatar stand-in with no video transport or recognizer
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAvatar;

#[async_trait]
impl AvatarSdk for LocalAvatar {
    async fn start_session(&self, config: &AvatarConfig, _cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            character = %config.avatar_character,
            style = %config.avatar_style,
            voice = %config.voice,
            "local avatar session ready"
        );
        Ok(())
    }

    async fn close(&self) {
        tracing::debug!("local avatar session closed");
    }

    async fn start_listening(&self, _locales: &[String]) -> Result<()> {
        Err(Error::MicrophonePermissionDenied(
            "speech recognition is not available in the terminal".to_string(),
        ))
    }

    async fn stop_listening(&self) {}
}
