//! Access tracking and LRU eviction with hysteresis.
//!
//! Residency is compared against the largest number of nodes touched in any
//! of the last few frames, not against a fixed budget, so the cache grows and
//! shrinks with the view's working set. Eviction starts above
//! `upper * recent_max` and trims down to `lower * recent_max`.

use std::collections::VecDeque;

use tracing::debug;

use crate::node::{LoadState, NodeId, TileNode};
use crate::tree::TileTree;

/// Rolling window of per-frame touched counts.
#[derive(Debug)]
pub struct AccessTracker {
    history: VecDeque<usize>,
    capacity: usize,
}

impl AccessTracker {
    /// A window over the last `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the number of nodes touched in the frame just finished.
    pub fn record(&mut self, touched: usize) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(touched);
    }

    /// Largest touched count in the window.
    pub fn recent_max(&self) -> usize {
        self.history.iter().copied().max().unwrap_or(0)
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Counts from one eviction pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// `Loaded` nodes before the pass.
    pub resident: usize,
    /// Whether the upper bound was crossed.
    pub triggered: bool,
    /// `Loaded`/`Failed` nodes reset to `NeedRequest`.
    pub evicted: usize,
    /// Untouched nodes that held render resources but no fetch outcome.
    pub released: usize,
    /// Nodes removed from the tree.
    pub pruned: usize,
}

/// Chooses which resident nodes to drop.
#[derive(Clone, Copy, Debug)]
pub struct Evictor {
    lower: f64,
    upper: f64,
}

impl Evictor {
    /// `lower <= upper`, both at least 1.0.
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower >= 1.0 && upper >= lower, "invalid eviction bounds");
        Self { lower, upper }
    }

    /// Whether `resident` nodes exceed the upper bound for this working set.
    pub fn should_evict(&self, resident: usize, recent_max_touched: usize) -> bool {
        resident as f64 > self.upper * recent_max_touched as f64
    }

    /// How many candidates survive a triggered pass.
    pub fn keep_count(&self, recent_max_touched: usize) -> usize {
        (self.lower * recent_max_touched as f64).floor() as usize
    }

    /// Run one end-of-frame pass over `tree`.
    ///
    /// Candidates are `Loaded` and `Failed` nodes. They are ranked most
    /// recently touched first, shallower first on ties; the tail past
    /// [`Self::keep_count`] is evicted deepest first. Nodes holding only
    /// render resources do not count against the budget: theirs are released
    /// once the node goes a frame untouched. Afterwards idle childless nodes
    /// with nothing left to hold are pruned bottom-up.
    pub fn run<const D: usize, const B: usize, P, R>(
        &self,
        tree: &mut TileTree<D, B, P, R>,
        frame: u64,
        recent_max_touched: usize,
    ) -> EvictionOutcome {
        let resident = tree
            .iter()
            .filter(|(_, n)| n.load_state() == LoadState::Loaded)
            .count();
        let mut outcome = EvictionOutcome {
            resident,
            ..EvictionOutcome::default()
        };
        if !self.should_evict(resident, recent_max_touched) {
            return outcome;
        }
        outcome.triggered = true;

        let mut candidates: Vec<(NodeId, u64, u8)> = tree
            .iter()
            .filter(|(_, n)| n.is_settled())
            .map(|(id, n)| (id, n.last_touched_frame(), n.level()))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));

        let keep = self.keep_count(recent_max_touched).min(candidates.len());
        let mut victims = candidates.split_off(keep);
        victims.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        for (id, _, _) in &victims {
            if tree.node_mut(*id).evict() {
                outcome.evicted += 1;
            }
        }

        let render_only: Vec<NodeId> = tree
            .iter()
            .filter(|(_, n)| {
                !n.is_settled()
                    && n.last_touched_frame() < frame
                    && (n.renderable().is_some() || n.fallback().is_some())
            })
            .map(|(id, _)| id)
            .collect();
        for id in render_only {
            tree.node_mut(id).release_renderables();
            outcome.released += 1;
        }

        outcome.pruned = prune_idle(tree, frame);
        debug!(
            resident,
            kept = keep,
            evicted = outcome.evicted,
            released = outcome.released,
            pruned = outcome.pruned,
            "eviction pass"
        );
        outcome
    }
}

/// Remove childless, dataless nodes not touched in `frame`, walking upward
/// from each so whole idle branches collapse. Returns the number removed.
fn prune_idle<const D: usize, const B: usize, P, R>(
    tree: &mut TileTree<D, B, P, R>,
    frame: u64,
) -> usize {
    let root = tree.root();
    let idle = |n: &TileNode<D, B, P, R>| n.is_prunable() && n.last_touched_frame() < frame;

    let mut leaves: Vec<(NodeId, u8)> = tree
        .iter()
        .filter(|(id, n)| *id != root && idle(*n))
        .map(|(id, n)| (id, n.level()))
        .collect();
    leaves.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut pruned = 0;
    for (leaf, _) in leaves {
        let mut current = Some(leaf);
        while let Some(id) = current {
            if id == root {
                break;
            }
            let Some(node) = tree.get(id) else { break };
            if !idle(node) {
                break;
            }
            current = node.parent();
            if tree.remove_leaf(id).is_some() {
                pruned += 1;
            }
        }
    }
    pruned
}
