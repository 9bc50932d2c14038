//! Session orchestration
//!
//! A single driver task owns the session state, the query buffer, the speech
//! queue and the liveness monitor. External calls run in spawned tasks that
//! report back through the driver's command channel, so all of that state is
//! mutated by one task, one command at a time.

mod buffer;
mod driver;
mod events;
pub mod liveness;
mod state;

pub use buffer::QueryBuffer;
pub use driver::{Collaborators, SessionHandle, SessionSnapshot};
pub use events::{Controls, Role, SessionEvent, Transcript, Utterance};
pub use liveness::LivenessMonitor;
pub use state::{Session, SessionState};
