//! The tile cache: one traversal, one scheduling step and one eviction pass per frame.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::address::{TileAddress, TileLayout};
use crate::config::CacheConfig;
use crate::error::{CacheError, FetchError};
use crate::eviction::{AccessTracker, Evictor};
use crate::lod::{LodConfig, LodSelector};
use crate::node::{Built, LoadState, NodeId, TileNode};
use crate::payload::TilePayload;
use crate::provider::{Completion, RequestHandle, TileProvider};
use crate::render::{RenderableBuilder, SelectedTile, TileTransform};
use crate::resolve::{ResolvePolicy, ResolvedAncestors, resolve_ancestors};
use crate::scheduler::{RequestScheduler, request_priority};
use crate::stats::{CacheStats, FrameStats};
use crate::tree::TileTree;
use crate::view::ViewDescriptor;

/// Highest tile format version this build reads.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// A leaf chosen by traversal together with what stands in for it.
#[derive(Clone, Copy, Debug)]
struct Selection {
    node: NodeId,
    ancestors: ResolvedAncestors,
}

/// Hierarchical tile cache over a `D`-dimensional tree with fan-out `B`.
///
/// Owns the tree, the provider and the renderable builder. Call
/// [`TileCache::update`] once per frame, then draw [`TileCache::selected`].
pub struct TileCache<const D: usize, const B: usize, T, Bd>
where
    T: TileProvider<D>,
    Bd: RenderableBuilder<D, T::Payload>,
{
    config: CacheConfig,
    layout: TileLayout,
    provider: T,
    builder: Bd,
    tree: TileTree<D, B, T::Payload, Bd::Resource>,
    min_level: u8,
    max_level: u8,
    frame: u64,
    in_flight: HashMap<RequestHandle, NodeId>,
    scheduler: RequestScheduler,
    tracker: AccessTracker,
    evictor: Evictor,
    selections: Vec<Selection>,
    completions: Vec<Completion<T::Payload>>,
    missing: Vec<NodeId>,
    current: FrameStats,
    last: FrameStats,
    totals: CacheStats,
}

/// Quadtree cache for image tiles.
pub type QuadtreeCache<T, Bd> = TileCache<2, 4, T, Bd>;
/// Octree cache for volumetric tiles.
pub type OctreeCache<T, Bd> = TileCache<3, 8, T, Bd>;

/// Validate a provider's metadata, returning its `(min, max)` levels.
fn check_provider<const D: usize, T: TileProvider<D>>(provider: &T) -> Result<(u8, u8), CacheError> {
    let metadata = provider.metadata()?;
    if metadata.format_version == 0 || metadata.format_version > SUPPORTED_FORMAT_VERSION {
        return Err(CacheError::UnsupportedFormatVersion {
            found: metadata.format_version,
            supported: SUPPORTED_FORMAT_VERSION,
        });
    }
    let (min, max) = (metadata.min_level, metadata.max_level);
    if min > max || max > TileAddress::<D>::MAX_LEVEL {
        return Err(CacheError::InvalidZoomRange { min, max });
    }
    debug!(
        format_version = metadata.format_version,
        min_level = min,
        max_level = max,
        "provider metadata accepted"
    );
    Ok((min, max))
}

impl<const D: usize, const B: usize, T, Bd> TileCache<D, B, T, Bd>
where
    T: TileProvider<D>,
    T::Payload: TilePayload,
    Bd: RenderableBuilder<D, T::Payload>,
{
    /// Create a cache over `provider`.
    ///
    /// Fails if the config is out of range or the provider's metadata is
    /// unavailable, of an unsupported format version, or has an invalid zoom range.
    pub fn new(config: CacheConfig, layout: TileLayout, provider: T, builder: Bd) -> Result<Self, CacheError> {
        config.validate()?;
        let (min_level, max_level) = check_provider(&provider)?;
        Ok(Self {
            scheduler: RequestScheduler::new(config.max_concurrent_requests),
            tracker: AccessTracker::new(config.touch_history_frames),
            evictor: Evictor::new(config.eviction_lower_bound, config.eviction_upper_bound),
            config,
            layout,
            provider,
            builder,
            tree: TileTree::new(),
            min_level,
            max_level,
            frame: 0,
            in_flight: HashMap::new(),
            selections: Vec::new(),
            completions: Vec::new(),
            missing: Vec::new(),
            current: FrameStats::default(),
            last: FrameStats::default(),
            totals: CacheStats::default(),
        })
    }

    /// Run one frame: apply completions, traverse, schedule, evict.
    pub fn update(&mut self, view: &ViewDescriptor) -> &FrameStats {
        self.frame += 1;
        self.current.frame = self.frame;
        self.apply_completions();

        self.selections.clear();
        self.traverse(view);
        self.schedule();
        self.end_frame();

        self.last = std::mem::take(&mut self.current);
        self.totals.accumulate(&self.last);
        &self.last
    }

    /// Drain the provider's completions and apply those still awaited.
    ///
    /// A completion counts only if its handle is tracked and the node is
    /// still `Requested` with that handle; anything else is dropped.
    pub fn apply_completions(&mut self) {
        let mut completions = std::mem::take(&mut self.completions);
        self.provider.poll_completions(&mut completions);

        for Completion { handle, result } in completions.drain(..) {
            let node = self
                .in_flight
                .get(&handle)
                .copied()
                .and_then(|id| self.tree.get_mut(id))
                .filter(|node| node.awaits(handle));
            let Some(node) = node else {
                trace!(handle = handle.0, "stale completion dropped");
                self.current.stale += 1;
                self.totals.stale_completions += 1;
                continue;
            };
            self.in_flight.remove(&handle);
            let address = node.address();

            match result {
                Ok(mut payload) => {
                    if payload.sanitize() {
                        warn!(%address, "payload counts clamped");
                        self.totals.sanitized += 1;
                    }
                    node.finish_loaded(payload);
                    trace!(%address, handle = handle.0, "completion applied");
                    self.current.completed += 1;
                    self.totals.loads += 1;
                }
                Err(FetchError::Cancelled) => {
                    node.cancel_request();
                    trace!(%address, handle = handle.0, "request cancelled by provider");
                }
                Err(err) => {
                    node.finish_failed();
                    debug!(%address, handle = handle.0, error = %err, "fetch failed");
                    self.current.failed += 1;
                    self.totals.failures += 1;
                }
            }
        }
        self.completions = completions;
    }

    fn lod_selector(&self, view: &ViewDescriptor) -> LodSelector {
        let config = LodConfig {
            tile_pixels: self.config.tile_pixels,
            tolerance: self.config.lod_tolerance,
            min_depth: self.config.min_depth,
            min_level: self.min_level,
            max_level: self.max_level,
        };
        LodSelector::new(config, self.layout.tile_size::<D>(0), view.pixels_per_unit)
    }

    /// Top-down traversal. Invisible nodes are neither touched nor created.
    fn traverse(&mut self, view: &ViewDescriptor) {
        let lod = self.lod_selector(view);
        let root = self.tree.root();
        if !view.clip.is_visible(&self.layout.bounds(&self.tree.node(root).address())) {
            self.current.culled += 1;
            return;
        }

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.tree.node_mut(id);
            node.touch(self.frame);
            let address = node.address();
            self.current.visited += 1;

            let bounds = self.layout.bounds(&address);
            let decision = lod.evaluate(address.level, &bounds, view.camera_position);
            if !decision.refines() {
                self.select(id, decision.desired_level);
                continue;
            }
            // Reverse so slot 0 is visited first.
            for slot in (0..B).rev() {
                if view.clip.is_visible(&self.layout.bounds(&address.child(slot))) {
                    stack.push(self.tree.child_or_create(id, slot));
                } else {
                    self.current.culled += 1;
                }
            }
        }
    }

    /// Record `target` as a leaf selection: queue what it lacks and build its renderables.
    fn select(&mut self, target: NodeId, desired: f64) {
        let policy = ResolvePolicy {
            min_level: self.min_level,
            skip_beneath_failed: self.config.skip_beneath_failed,
        };
        let mut missing = std::mem::take(&mut self.missing);
        let ancestors = resolve_ancestors(&self.tree, target, policy, |id, _| missing.push(id));

        for id in missing.drain(..) {
            let node = self.tree.node_mut(id);
            let priority = request_priority(desired, node.level());
            match node.load_state() {
                LoadState::NeedRequest => self.scheduler.push(id, priority),
                LoadState::Requested => node.raise_priority(priority),
                LoadState::Loaded | LoadState::Failed => {}
            }
        }
        self.missing = missing;

        let Some(hi) = ancestors.hi else {
            return;
        };
        self.ensure_renderable(target, hi, false);
        if self.config.build_fallback
            && let Some(lo) = ancestors.lo
        {
            self.ensure_renderable(target, lo, true);
        }
        self.selections.push(Selection {
            node: target,
            ancestors,
        });
        self.current.selected += 1;
    }

    /// Build `target`'s renderable (or fallback) from `source`'s payload unless
    /// the existing one already comes from a level at least as fine.
    fn ensure_renderable(&mut self, target: NodeId, source: NodeId, fallback: bool) {
        let source_node = self.tree.node(source);
        let source_level = source_node.level();
        let target_node = self.tree.node(target);
        let current = if fallback {
            target_node.fallback()
        } else {
            target_node.renderable()
        };
        let stale = match current {
            None => true,
            Some(built) if fallback => built.source_level != source_level,
            Some(built) => built.source_level < source_level,
        };
        if !stale {
            return;
        }

        let target_address = target_node.address();
        let Some(payload) = source_node.payload() else {
            return;
        };
        let Some(resource) = self
            .builder
            .build(payload, &source_node.address(), &target_address)
        else {
            return;
        };

        let built = Some(Built {
            resource,
            source_level,
        });
        let node = self.tree.node_mut(target);
        if fallback {
            node.fallback = built;
        } else {
            node.renderable = built;
        }
    }

    /// Admit the best candidates into the free request slots.
    fn schedule(&mut self) {
        for candidate in self.scheduler.admit(self.in_flight.len()) {
            let node = self.tree.node_mut(candidate.node);
            if node.load_state() != LoadState::NeedRequest {
                continue;
            }
            let address = node.address();
            let handle = self.provider.request(address);
            node.begin_request(handle, candidate.priority);
            self.in_flight.insert(handle, candidate.node);
            trace!(
                %address,
                handle = handle.0,
                priority = candidate.priority,
                "request admitted"
            );
            self.current.requested += 1;
        }
    }

    fn end_frame(&mut self) {
        if let Some(limit) = self.config.cancel_untouched_after {
            let frame = self.frame;
            let mut stale: Vec<NodeId> = self
                .in_flight
                .values()
                .copied()
                .filter(|id| {
                    self.tree
                        .get(*id)
                        .is_some_and(|n| frame.saturating_sub(n.last_touched_frame()) > limit)
                })
                .collect();
            stale.sort();
            for id in stale {
                if self.cancel(id) {
                    self.current.cancelled += 1;
                }
            }
        }

        let touched = self.current.visited;
        self.tracker.record(touched);
        let recent_max = self.tracker.recent_max();
        let outcome = self.evictor.run(&mut self.tree, self.frame, recent_max);

        let (resident, resident_bytes) = self
            .tree
            .iter()
            .filter_map(|(_, n)| n.payload())
            .fold((0, 0), |(count, bytes), p| (count + 1, bytes + p.byte_size()));

        self.current.recent_max_touched = recent_max;
        self.current.evicted = outcome.evicted;
        self.current.released = outcome.released;
        self.current.pruned = outcome.pruned;
        self.current.resident = resident;
        self.current.resident_bytes = resident_bytes;
        self.current.in_flight = self.in_flight.len();
        self.current.nodes = self.tree.len();
    }

    /// Cancel `id`'s outstanding request. Returns whether there was one.
    pub fn cancel(&mut self, id: NodeId) -> bool {
        let Some(handle) = self.tree.get_mut(id).and_then(TileNode::cancel_request) else {
            return false;
        };
        self.in_flight.remove(&handle);
        self.provider.cancel(handle);
        self.totals.cancellations += 1;
        trace!(handle = handle.0, "request cancelled");
        true
    }

    /// Drop `id`'s payload or failure so it can be requested again. Returns
    /// whether anything was evicted.
    pub fn evict(&mut self, id: NodeId) -> bool {
        self.tree.get_mut(id).is_some_and(TileNode::evict)
    }

    /// Drop every render resource, keeping payloads. They are rebuilt on next selection.
    pub fn release_renderables(&mut self) {
        for (_, node) in self.tree.iter_mut() {
            node.release_renderables();
        }
    }

    /// Dispose every node below the root and reset the root, cancelling all requests.
    pub fn clear(&mut self) {
        let root = self.tree.root();
        let provider = &mut self.provider;
        let mut cancelled = 0;
        let removed = self.tree.dispose_subtree(root, |handle| {
            provider.cancel(handle);
            cancelled += 1;
        });
        self.totals.cancellations += cancelled;
        self.in_flight.clear();
        self.selections.clear();
        self.scheduler.clear();
        self.tracker.clear();
        debug!(removed, cancelled, "cache cleared");
    }

    /// Replace the provider, returning the old one.
    ///
    /// The new provider is validated first; on error nothing changes. On
    /// success every request of the old provider is cancelled and the tree is
    /// disposed, since its payloads belong to the old tile set.
    pub fn swap_provider(&mut self, provider: T) -> Result<T, CacheError> {
        let (min_level, max_level) = check_provider(&provider)?;
        self.clear();
        self.min_level = min_level;
        self.max_level = max_level;
        debug!(min_level, max_level, "provider swapped");
        Ok(std::mem::replace(&mut self.provider, provider))
    }

    /// Tiles selected by the last update, with their renderables.
    pub fn selected(&self) -> impl Iterator<Item = SelectedTile<'_, D, Bd::Resource>> + '_ {
        self.selections.iter().filter_map(|selection| {
            let node = self.tree.get(selection.node)?;
            let address = node.address();
            Some(SelectedTile {
                node: selection.node,
                address,
                renderable: node.renderable(),
                fallback: node.fallback(),
                transform: TileTransform::from_bounds(&self.layout.bounds(&address)),
            })
        })
    }

    /// Resolved hi/lo ancestors of the last update's selections.
    pub fn selected_sources(&self) -> impl Iterator<Item = (NodeId, ResolvedAncestors)> + '_ {
        self.selections.iter().map(|s| (s.node, s.ancestors))
    }

    /// The node at `address`, if the tree has grown that far.
    pub fn node_at(&self, address: &TileAddress<D>) -> Option<&TileNode<D, B, T::Payload, Bd::Resource>> {
        self.tree.find(address).map(|id| self.tree.node(id))
    }

    /// The load state at `address`, if a node exists there.
    pub fn state_at(&self, address: &TileAddress<D>) -> Option<LoadState> {
        self.node_at(address).map(TileNode::load_state)
    }

    /// hi/lo ancestors for the node at `address` without queueing anything.
    pub fn resolve_ancestors_at(&self, address: &TileAddress<D>) -> Option<ResolvedAncestors> {
        let id = self.tree.find(address)?;
        let policy = ResolvePolicy {
            min_level: self.min_level,
            skip_beneath_failed: self.config.skip_beneath_failed,
        };
        Some(resolve_ancestors(&self.tree, id, policy, |_, _| {}))
    }

    /// The spatial tree.
    pub fn tree(&self) -> &TileTree<D, B, T::Payload, Bd::Resource> {
        &self.tree
    }

    /// The provider.
    pub fn provider(&self) -> &T {
        &self.provider
    }

    /// The provider, mutably. Requests must only be issued through the cache.
    pub fn provider_mut(&mut self) -> &mut T {
        &mut self.provider
    }

    /// Cache policy.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// World mapping of tile addresses.
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Provider zoom range `(min, max)`.
    pub fn level_range(&self) -> (u8, u8) {
        (self.min_level, self.max_level)
    }

    /// Frames updated so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Requests currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Counters from the last update.
    pub fn frame_stats(&self) -> &FrameStats {
        &self.last
    }

    /// Running totals.
    pub fn stats(&self) -> &CacheStats {
        &self.totals
    }
}
