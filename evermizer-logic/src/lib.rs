pub mod logic_graph;

use evermizer_game::{Capacity, Progress, NUM_PROGRESS};
use serde::{Deserialize, Serialize};

pub use logic_graph::{LogicCheck, LogicGraph, LogicGraphBuilder, LogicGraphError, LogicItem};

/// A validated (pieces, progress) pair: `pieces` is positive and `progress` is never `None`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressPair {
    pub pieces: Capacity,
    pub progress: Progress,
}

impl ProgressPair {
    pub fn new(pieces: Capacity, progress: Progress) -> Self {
        ProgressPair { pieces, progress }
    }
}

/// An unmet requirement pair, together with how much of the resource was held.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub progress: Progress,
    pub needed: Capacity,
    pub held: Capacity,
}

/// Accumulated pieces of each progression resource, indexed by `Progress as usize`.
/// The `None` slot is never written. Counts saturate at `Capacity::MAX`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub counts: [Capacity; NUM_PROGRESS],
}

impl ProgressCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, progress: Progress) -> Capacity {
        self.counts[progress as usize]
    }

    pub fn add(&mut self, pair: ProgressPair) {
        if pair.progress == Progress::None {
            return;
        }
        let i = pair.progress as usize;
        self.counts[i] = self.counts[i].saturating_add(pair.pieces);
    }

    /// Contributions accumulate: two sources of the same resource both count.
    pub fn collect(&mut self, provides: &[ProgressPair]) {
        for &pair in provides {
            self.add(pair);
        }
    }

    pub fn collect_counts(&mut self, other: &ProgressCounts) {
        for i in 0..NUM_PROGRESS {
            self.counts[i] = self.counts[i].saturating_add(other.counts[i]);
        }
    }

    /// All pairs are ANDed; an empty list is always met.
    pub fn meets(&self, requires: &[ProgressPair]) -> bool {
        requires.iter().all(|r| self.get(r.progress) >= r.pieces)
    }

    pub fn shortfall(&self, requires: &[ProgressPair]) -> Vec<Shortfall> {
        requires
            .iter()
            .filter(|r| self.get(r.progress) < r.pieces)
            .map(|r| Shortfall {
                progress: r.progress,
                needed: r.pieces,
                held: self.get(r.progress),
            })
            .collect()
    }

    /// True if every count is at least the corresponding count in `other`.
    pub fn dominates(&self, other: &ProgressCounts) -> bool {
        (0..NUM_PROGRESS).all(|i| self.counts[i] >= other.counts[i])
    }
}
