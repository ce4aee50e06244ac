//! Contiguous completion tracking
//!
//! Items finish out of order under concurrency. The checkpoint may only name
//! an item once every item before it has finished too, otherwise a crash
//! followed by a resume would skip the unfinished ones.

use std::collections::BTreeSet;

/// Tracks the highest position `p` such that every position in `start..=p` has completed
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    next_expected: usize,
    pending: BTreeSet<usize>,
}

impl CompletionTracker {
    /// Creates a tracker for a run whose first item sits at `start`
    pub fn new(start: usize) -> Self {
        Self {
            next_expected: start,
            pending: BTreeSet::new(),
        }
    }

    /// Records the completion of `position`
    ///
    /// # Returns
    ///
    /// The new high-water position if it advanced, otherwise `None`
    pub fn record(&mut self, position: usize) -> Option<usize> {
        if position < self.next_expected || !self.pending.insert(position) {
            tracing::debug!("Ignoring repeated completion of position {}", position);
            return None;
        }

        let before = self.next_expected;
        while self.pending.remove(&self.next_expected) {
            self.next_expected += 1;
        }

        (self.next_expected > before).then(|| self.next_expected - 1)
    }

    /// Completions waiting on an earlier position
    pub fn waiting(&self) -> usize {
        self.pending.len()
    }
}
