//! Fixed-capacity buffer of the most recent capture-process stderr lines.

use std::collections::VecDeque;

/// Default number of lines kept
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct DiagnosticRing {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticRing {
    /// A zero capacity is bumped to one so the last line is always kept
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines in arrival order, oldest first
    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Take every line out, oldest first
    pub fn drain(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }
}

impl Default for DiagnosticRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
