//! Majority vote over the labels seen during a dwell window

use std::collections::HashMap;

use crate::alphabet::Label;

/// Labels collected while a dwell window is open, in arrival order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteBuffer {
    votes: Vec<Label>,
}

impl VoteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. Duplicates are kept.
    pub fn push(&mut self, label: Label) {
        self.votes.push(label);
    }

    /// Label with the most votes.
    ///
    /// On a tie the label that reached the winning count first wins, so
    /// `[A, B, A, B]` yields `A`. Returns `None` for an empty buffer.
    pub fn majority(&self) -> Option<Label> {
        let mut counts: HashMap<Label, usize> = HashMap::new();
        let mut best: Option<(Label, usize)> = None;

        for &label in &self.votes {
            let count = counts.entry(label).or_insert(0);
            *count += 1;
            // Strictly greater: a later label only wins by overtaking.
            if best.map_or(true, |(_, max)| *count > max) {
                best = Some((label, *count));
            }
        }

        best.map(|(label, _)| label)
    }

    /// Number of votes for `label`
    pub fn count(&self, label: Label) -> usize {
        self.votes.iter().filter(|&&l| l == label).count()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Drop all votes, keeping the allocation
    pub fn clear(&mut self) {
        self.votes.clear();
    }
}
