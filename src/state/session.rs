use std::ops::Range;

/// Sequence bookkeeping for one live session
///
/// `expected` is the next sequence number a gap-free stream would deliver;
/// `current` is the sequence of the last reply accepted. Both start at 0.
/// Written only by the event consumer, read by the interactive statistics
/// handler through a shared lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    expected: u64,
    current: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number a gap-free stream would deliver
    pub fn expected_sequence(&self) -> u64 {
        self.expected
    }

    /// Sequence number of the last accepted reply
    pub fn current_sequence(&self) -> u64 {
        self.current
    }

    /// Account for a reply and return the sequence numbers it skipped over
    ///
    /// A reply below `expected` (a late arrival the engine did not classify as
    /// a duplicate) never moves the state backwards and reports no gap.
    pub fn observe(&mut self, sequence: u64) -> Range<u64> {
        if sequence < self.expected {
            return self.expected..self.expected;
        }

        let gap = self.expected..sequence;
        self.expected = sequence + 1;
        self.current = sequence;
        gap
    }

    /// Sequence numbers still owed when the session ends after `count` probes
    pub fn trailing_gap(&self, count: u64) -> Range<u64> {
        self.expected..count.max(self.expected)
    }

    /// Whether the reply for the last of `count` probes has been accepted
    pub fn reached(&self, count: u64) -> bool {
        count > 0 && self.expected >= count
    }
}
