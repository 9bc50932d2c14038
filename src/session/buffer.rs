//! Queries submitted before the session is ready

use std::collections::VecDeque;

/// FIFO of user queries waiting for an active session
#[derive(Debug, Default)]
pub struct QueryBuffer {
    queries: VecDeque<String>,
}

impl QueryBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query
    pub fn push(&mut self, query: impl Into<String>) {
        self.queries.push_back(query.into());
    }

    /// Take every buffered query in arrival order, leaving the buffer empty
    pub fn flush(&mut self) -> Vec<String> {
        self.queries.drain(..).collect()
    }

    /// Discard buffered queries without processing them
    pub fn clear(&mut self) {
        self.queries.clear();
    }

    /// Number of buffered queries
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_preserves_arrival_order() {
        let mut buffer = QueryBuffer::new();
        for q in ["first", "second", "third"] {
            buffer.push(q);
        }

        assert_eq!(buffer.flush(), vec!["first", "second", "third"]);
        assert!(buffer.is_empty());
        assert!(buffer.flush().is_empty());
    }

    #[test]
    fn clear_discards() {
        let mut buffer = QueryBuffer::new();
        buffer.push("dropped");
        assert_eq!(buffer.len(), 1);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
