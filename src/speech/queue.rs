//! FIFO speech playback queue
//!
//! The queue only tracks what should be playing; the session driver performs
//! the actual synthesis. Every playback gets a fresh generation number and a
//! completion is honoured only if it carries the current generation, so
//! completions from cancelled playback can never advance the queue.

use std::collections::VecDeque;

use super::SpeechChunk;

/// A chunk that should start playing now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playback {
    /// Generation to report back on completion
    pub generation: u64,
    /// Conversation turn the chunk belongs to
    pub turn: u64,
    /// Chunk to vocalize
    pub chunk: SpeechChunk,
    /// Text to show while the chunk plays
    pub display: String,
}

/// Outcome of reporting a playback completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The next queued chunk should start playing
    Next(Playback),
    /// Nothing left to say
    Idle,
    /// The completion belonged to playback that was already cancelled
    Stale,
}

#[derive(Debug, Clone)]
struct Queued {
    turn: u64,
    chunk: SpeechChunk,
    display: String,
}

/// Serializes speech so at most one chunk is vocalized at a time
#[derive(Debug, Default)]
pub struct SpeechQueue {
    pending: VecDeque<Queued>,
    current: Option<Playback>,
    generation: u64,
}

impl SpeechQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk
    ///
    /// Returns the playback to start when nothing is currently speaking
    pub fn enqueue(&mut self, turn: u64, chunk: SpeechChunk, display: String) -> Option<Playback> {
        let queued = Queued {
            turn,
            chunk,
            display,
        };

        if self.current.is_some() {
            self.pending.push_back(queued);
            return None;
        }

        Some(self.begin(queued))
    }

    /// Report that the playback with `generation` finished, successfully or not
    pub fn complete(&mut self, generation: u64) -> Advance {
        match &self.current {
            Some(current) if current.generation == generation => {}
            _ => return Advance::Stale,
        }

        self.current = None;
        match self.pending.pop_front() {
            Some(next) => Advance::Next(self.begin(next)),
            None => Advance::Idle,
        }
    }

    /// Drop everything queued and forget the chunk in progress
    ///
    /// Returns true if a chunk was being spoken
    pub fn stop_all(&mut self) -> bool {
        self.pending.clear();
        // Invalidate the in-flight completion
        self.generation += 1;
        self.current.take().is_some()
    }

    /// Whether a chunk is being vocalized
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    /// Text of the chunk being vocalized
    #[must_use]
    pub fn speaking_text(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.chunk.text.as_str())
    }

    /// Turn of the chunk being vocalized
    #[must_use]
    pub fn speaking_turn(&self) -> Option<u64> {
        self.current.as_ref().map(|p| p.turn)
    }

    /// Number of chunks waiting behind the current one
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn begin(&mut self, queued: Queued) -> Playback {
        self.generation += 1;
        let playback = Playback {
            generation: self.generation,
            turn: queued.turn,
            chunk: queued.chunk,
            display: queued.display,
        };
        self.current = Some(playback.clone());
        playback
    }
}
