//! Speech output backends
//!
//! Synthesis goes through the speech service REST API and plays on the
//! local output device. The console backends stand in for the avatar SDK
//! when no audio is wanted.

mod console;
mod playback;
mod tts;

pub use console::{LocalAvatar, PacedSynthesizer, estimated_duration};
pub use playback::{PLAYBACK_SAMPLE_RATE, play_mp3};
pub use tts::SpeechServiceSynthesizer;
