//! Assistant speech output
//!
//! Replies are split into sentence-sized chunks so playback can begin before
//! the whole reply is rendered, then played one at a time through the queue.

mod queue;
mod segment;
pub mod ssml;

pub use queue::{Advance, Playback, SpeechQueue};
pub use segment::{SENTENCE_TERMINATORS, Segment, Segments, segment};

use serde::Serialize;

/// A piece of assistant text queued for vocalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechChunk {
    /// Text to speak
    pub text: String,
    /// Silence appended after the text, in milliseconds
    pub ending_silence_ms: u32,
}

impl SpeechChunk {
    /// Create a chunk with no trailing silence
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ending_silence_ms: 0,
        }
    }

    /// Return this chunk with the given trailing silence
    #[must_use]
    pub const fn with_ending_silence(mut self, ms: u32) -> Self {
        self.ending_silence_ms = ms;
        self
    }
}
