//! Events published by the session driver
//!
//! Renderers subscribe to these instead of the core touching any UI.

use serde::Serialize;

use super::SessionState;

/// Speaker of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person talking to the avatar
    User,
    /// The avatar
    Assistant,
    /// Instructions given to the agent
    System,
}

/// A line of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl Utterance {
    /// User utterance
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant utterance
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// System utterance
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Ordered conversation log
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Utterance>,
    seeded: bool,
}

impl Transcript {
    /// Seed the log with the system prompt the first time only
    ///
    /// Returns false if it was already seeded
    pub fn seed(&mut self, system_prompt: &str) -> bool {
        if self.seeded {
            return false;
        }
        self.seeded = true;
        self.entries.insert(0, Utterance::system(system_prompt));
        true
    }

    /// Append an utterance, returning a copy for publication
    pub fn push(&mut self, utterance: Utterance) -> Utterance {
        self.entries.push(utterance.clone());
        utterance
    }

    /// All utterances in insertion order
    #[must_use]
    pub fn entries(&self) -> &[Utterance] {
        &self.entries
    }
}

/// Enabled state of the user-facing controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Controls {
    /// Start button
    pub start: bool,
    /// Start button label
    pub start_label: &'static str,
    /// Stop button
    pub stop: bool,
    /// Microphone toggle
    pub microphone: bool,
    /// Microphone toggle label
    pub microphone_label: &'static str,
    /// Free-text message input
    pub message_input: bool,
    /// Stop-speaking button
    pub stop_speaking: bool,
}

impl Controls {
    /// Controls for the given session condition
    #[must_use]
    pub fn for_state(state: SessionState, listening: bool, mic_busy: bool, speaking: bool) -> Self {
        let active = state == SessionState::Active;
        Self {
            start: state == SessionState::Idle,
            start_label: if state == SessionState::Starting {
                "Starting..."
            } else {
                "Start Session"
            },
            stop: active,
            microphone: active && !mic_busy,
            microphone_label: if listening { "Stop Microphone" } else { "Microphone" },
            message_input: active,
            stop_speaking: active && speaking,
        }
    }
}

/// Something the user surface should render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Lifecycle state changed
    StateChanged {
        /// New state
        state: SessionState,
    },
    /// Controls should be enabled/disabled
    Controls {
        /// Desired control state
        controls: Controls,
    },
    /// Append a line to the transcript
    Transcript {
        /// The new line
        utterance: Utterance,
    },
    /// Show a live caption for the sentence being spoken
    Caption {
        /// Caption text
        text: String,
    },
    /// Inline status or error message
    System {
        /// Message text
        message: String,
    },
    /// Blocking alert for setup failures
    Alert {
        /// Message text
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_seeds_once_at_front() {
        let mut transcript = Transcript::default();
        transcript.push(Utterance::user("early"));
        assert!(transcript.seed("be nice"));
        assert!(!transcript.seed("ignored"));

        assert_eq!(transcript.entries()[0], Utterance::system("be nice"));
        assert_eq!(transcript.entries()[1], Utterance::user("early"));
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn idle_controls_only_allow_start() {
        let controls = Controls::for_state(SessionState::Idle, false, false, false);
        assert!(controls.start);
        assert!(!controls.stop);
        assert!(!controls.microphone);
        assert!(!controls.message_input);
        assert_eq!(controls.start_label, "Start Session");
    }

    #[test]
    fn starting_controls_are_locked() {
        let controls = Controls::for_state(SessionState::Starting, false, false, false);
        assert!(!controls.start);
        assert_eq!(controls.start_label, "Starting...");
        assert!(!controls.message_input);
    }

    #[test]
    fn active_controls_follow_microphone_and_speech() {
        let controls = Controls::for_state(SessionState::Active, true, false, true);
        assert!(controls.stop);
        assert!(controls.microphone);
        assert_eq!(controls.microphone_label, "Stop Microphone");
        assert!(controls.stop_speaking);

        let busy = Controls::for_state(SessionState::Active, false, true, false);
        assert!(!busy.microphone);
        assert!(!busy.stop_speaking);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SessionEvent::Transcript {
            utterance: Utterance::user("hi"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transcript");
        assert_eq!(json["utterance"]["role"], "user");
        assert_eq!(json["utterance"]["content"], "hi");
    }
}
