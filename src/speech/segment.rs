//! Sentence-level segmentation of assistant replies
//!
//! A reply is cut after every sentence-terminal symbol, ASCII or CJK. The
//! symbol stays with the sentence it ends, and leading whitespace stays with
//! the sentence that follows, so the chunks concatenate back to the reply.

use super::SpeechChunk;

/// Symbols that end a speakable chunk
pub const SENTENCE_TERMINATORS: [char; 10] =
    ['.', '?', '!', ':', ';', '。', '？', '！', '：', '；'];

/// One chunk of a reply along with the text to display while it plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Chunk handed to the synthesizer
    pub chunk: SpeechChunk,
    /// Display form of the chunk (surrounding whitespace removed)
    pub display: String,
}

impl Segment {
    fn new(text: &str) -> Self {
        Self {
            chunk: SpeechChunk::new(text),
            display: text.trim().to_string(),
        }
    }
}

/// Lazy iterator over the segments of a reply
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rest: &'a str,
}

/// Split `reply` into speakable segments
///
/// # Examples
///
/// ```
/// use beacon_avatar::speech::segment;
///
/// let chunks: Vec<String> = segment("Hello there! How are you?")
///     .map(|s| s.chunk.text)
///     .collect();
/// assert_eq!(chunks, vec!["Hello there!", " How are you?"]);
/// ```
#[must_use]
pub const fn segment(reply: &str) -> Segments<'_> {
    Segments { rest: reply }
}

fn is_terminator(c: char) -> bool {
    SENTENCE_TERMINATORS.contains(&c)
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.rest.trim().is_empty() {
            self.rest = "";
            return None;
        }

        let mut end = self
            .rest
            .char_indices()
            .find(|&(_, c)| is_terminator(c))
            .map_or(self.rest.len(), |(i, c)| i + c.len_utf8());

        // A whitespace-only tail rides along with the last sentence
        if self.rest[end..].trim().is_empty() {
            end = self.rest.len();
        }

        let (text, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Segment::new(text))
    }
}
