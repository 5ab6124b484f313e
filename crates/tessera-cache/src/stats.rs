//! Per-frame and cumulative counters.

/// What happened during one [`TileCache::update`](crate::TileCache::update).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Nodes visited (and touched) by traversal.
    pub visited: usize,
    /// Nodes or child slots rejected by the clip volume.
    pub culled: usize,
    /// Tiles handed to the renderer.
    pub selected: usize,
    /// Requests admitted.
    pub requested: usize,
    /// Completions applied as loaded.
    pub completed: usize,
    /// Completions applied as failed.
    pub failed: usize,
    /// Completions discarded because their handle was no longer tracked.
    pub stale: usize,
    /// Requests cancelled because their node went untouched.
    pub cancelled: usize,
    /// `Loaded` nodes at end of frame.
    pub resident: usize,
    /// Payload bytes held by `Loaded` nodes at end of frame.
    pub resident_bytes: usize,
    /// Largest touched count in the recent window.
    pub recent_max_touched: usize,
    /// Requests outstanding at end of frame.
    pub in_flight: usize,
    /// `Loaded`/`Failed` nodes evicted.
    pub evicted: usize,
    /// Render-only nodes whose resources were released.
    pub released: usize,
    /// Nodes removed from the tree.
    pub pruned: usize,
    /// Nodes in the tree at end of frame.
    pub nodes: usize,
}

/// Running totals since the cache was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Frames updated.
    pub frames: u64,
    /// Requests issued.
    pub requests: u64,
    /// Payloads loaded.
    pub loads: u64,
    /// Fetches that failed.
    pub failures: u64,
    /// Completions discarded as stale.
    pub stale_completions: u64,
    /// Requests cancelled by the cache.
    pub cancellations: u64,
    /// Payloads that needed clamping.
    pub sanitized: u64,
    /// Nodes evicted.
    pub evictions: u64,
    /// Nodes pruned.
    pub pruned: u64,
}

impl CacheStats {
    pub(crate) fn accumulate(&mut self, frame: &FrameStats) {
        self.frames += 1;
        self.requests += frame.requested as u64;
        self.evictions += frame.evicted as u64;
        self.pruned += frame.pruned as u64;
    }
}
