//! Priority-ranked, concurrency-bounded request admission.

use std::cmp::Ordering;

use crate::node::NodeId;

/// Request power for a node at `level` when the region wants `desired` level.
///
/// Finer desire ranks higher; ancestors further from the desired level rank
/// higher still so coarse coverage arrives before fine detail.
pub fn request_priority(desired: f64, level: u8) -> f64 {
    desired + (desired - f64::from(level)).max(0.0)
}

/// A node traversal wants loaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// The node.
    pub node: NodeId,
    /// Its request power this frame.
    pub priority: f64,
}

impl Candidate {
    /// Descending priority, ties by ascending node id.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Collects candidates during traversal and admits the best of them once it finishes.
#[derive(Debug)]
pub struct RequestScheduler {
    bound: usize,
    candidates: Vec<Candidate>,
}

impl RequestScheduler {
    /// A scheduler allowing at most `bound` requests in flight.
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            candidates: Vec::new(),
        }
    }

    /// The concurrency bound.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Candidates queued this frame, possibly with duplicates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Queue a candidate. A node queued more than once keeps its highest priority.
    pub fn push(&mut self, node: NodeId, priority: f64) {
        self.candidates.push(Candidate { node, priority });
    }

    /// Drop everything queued this frame.
    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    /// Rank the queued candidates and return the ones that fit in the free
    /// slots, best first. Clears the queue; the rest are retried next frame
    /// if traversal still wants them.
    pub fn admit(&mut self, in_flight: usize) -> Vec<Candidate> {
        // Highest priority per node first, then keep the first of each run.
        self.candidates.sort_by(|a, b| {
            a.node
                .cmp(&b.node)
                .then_with(|| b.priority.total_cmp(&a.priority))
        });
        self.candidates.dedup_by_key(|c| c.node);
        self.candidates.sort_by(Candidate::rank);

        let free = self.bound.saturating_sub(in_flight);
        let take = free.min(self.candidates.len());
        let admitted = self.candidates[..take].to_vec();
        self.candidates.clear();
        admitted
    }
}
