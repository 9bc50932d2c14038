//! Beacon Avatar - Session orchestration for a talking avatar client
//!
//! This library drives a conversational avatar:
//! - Session lifecycle (start, stop, hang detection and reconnect)
//! - Query buffering while the session is still coming up
//! - Sentence segmentation and single-speaker playback of replies
//! - Remote chat agent and speech service clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        CLI  │  SessionHandle  │  SessionEvent        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Session Driver                       │
//! │   State  │  Query Buffer  │  Speech Queue  │  Liveness│
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Collaborators                        │
//! │   Config  │  Avatar SDK  │  Synthesizer  │  Agent    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod sdk;
pub mod session;
pub mod speech;
pub mod voice;

pub use agent::AgentClient;
pub use config::{AvatarConfig, Config, FileConfigProvider, SessionSettings};
pub use error::{Error, Result};
pub use sdk::{AvatarSdk, ChatClient, ConfigProvider, Synthesizer};
pub use session::{
    Collaborators, Controls, Role, SessionEvent, SessionHandle, SessionSnapshot, SessionState,
    Utterance,
};
pub use speech::{SpeechChunk, segment};
