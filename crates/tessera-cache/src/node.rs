//! Tree nodes and their load state machine.
//!
//! ```text
//! NeedRequest --request--> Requested --success--> Loaded
//!      ^                       |  \---failure--> Failed
//!      |------- cancel --------+                   |
//!      \------------- evict (Loaded | Failed) -----/
//! ```

use crate::address::TileAddress;
use crate::provider::RequestHandle;

/// Stable index of a node in the tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Raw arena index. Indices of removed nodes are reused.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Load state of a node. The payload lives inside `Loaded`, so a node can
/// never hold data in any other state.
#[derive(Debug)]
pub enum NodeState<P> {
    /// No data and no fetch in flight.
    NeedRequest,
    /// Exactly one fetch in flight.
    Requested {
        /// The provider's handle for that fetch.
        handle: RequestHandle,
        /// Request power; only ever raised while requested.
        priority: f64,
    },
    /// The fetch succeeded.
    Loaded(P),
    /// The fetch failed. Not retried until evicted.
    Failed,
}

/// Coarse view of [`NodeState`] without the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// See [`NodeState::NeedRequest`].
    NeedRequest,
    /// See [`NodeState::Requested`].
    Requested,
    /// See [`NodeState::Loaded`].
    Loaded,
    /// See [`NodeState::Failed`].
    Failed,
}

impl<P> NodeState<P> {
    /// The state's kind.
    #[must_use]
    pub fn kind(&self) -> LoadState {
        match self {
            Self::NeedRequest => LoadState::NeedRequest,
            Self::Requested { .. } => LoadState::Requested,
            Self::Loaded(_) => LoadState::Loaded,
            Self::Failed => LoadState::Failed,
        }
    }
}

/// A render resource together with the level of the payload it was built from.
#[derive(Debug)]
pub struct Built<R> {
    /// The draw-ready resource.
    pub resource: R,
    /// Level of the node whose payload produced it.
    pub source_level: u8,
}

/// One region of the tile hierarchy.
#[derive(Debug)]
pub struct TileNode<const D: usize, const B: usize, P, R> {
    pub(crate) address: TileAddress<D>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: [Option<NodeId>; B],
    pub(crate) state: NodeState<P>,
    pub(crate) last_touched_frame: u64,
    pub(crate) renderable: Option<Built<R>>,
    pub(crate) fallback: Option<Built<R>>,
}

impl<const D: usize, const B: usize, P, R> TileNode<D, B, P, R> {
    pub(crate) fn new(address: TileAddress<D>, parent: Option<NodeId>) -> Self {
        Self {
            address,
            parent,
            children: [None; B],
            state: NodeState::NeedRequest,
            last_touched_frame: 0,
            renderable: None,
            fallback: None,
        }
    }

    /// Address of the region this node covers.
    #[must_use]
    pub fn address(&self) -> TileAddress<D> {
        self.address
    }

    /// Subdivision level.
    #[must_use]
    pub fn level(&self) -> u8 {
        self.address.level
    }

    /// The parent node, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child slots; `None` where traversal never descended.
    #[must_use]
    pub fn children(&self) -> &[Option<NodeId>; B] {
        &self.children
    }

    /// Whether any child slot is occupied.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// Current load state.
    #[must_use]
    pub fn state(&self) -> &NodeState<P> {
        &self.state
    }

    /// Current load state without the payload.
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.state.kind()
    }

    /// The payload, present only while loaded.
    #[must_use]
    pub fn payload(&self) -> Option<&P> {
        match &self.state {
            NodeState::Loaded(p) => Some(p),
            _ => None,
        }
    }

    /// Handle of the in-flight fetch, present only while requested.
    #[must_use]
    pub fn pending_request(&self) -> Option<RequestHandle> {
        match self.state {
            NodeState::Requested { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// Request power of the in-flight fetch.
    #[must_use]
    pub fn priority(&self) -> Option<f64> {
        match self.state {
            NodeState::Requested { priority, .. } => Some(priority),
            _ => None,
        }
    }

    /// Whether the node holds a fetch outcome (`Loaded` or `Failed`), i.e. is an eviction candidate.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.state, NodeState::Loaded(_) | NodeState::Failed)
    }

    /// Frame in which traversal last visited this node.
    #[must_use]
    pub fn last_touched_frame(&self) -> u64 {
        self.last_touched_frame
    }

    /// Render resource for this cell, if built.
    #[must_use]
    pub fn renderable(&self) -> Option<&Built<R>> {
        self.renderable.as_ref()
    }

    /// Coarser render resource for blending, if built.
    #[must_use]
    pub fn fallback(&self) -> Option<&Built<R>> {
        self.fallback.as_ref()
    }

    pub(crate) fn touch(&mut self, frame: u64) {
        self.last_touched_frame = frame;
    }

    /// `NeedRequest -> Requested`.
    pub(crate) fn begin_request(&mut self, handle: RequestHandle, priority: f64) {
        debug_assert!(
            matches!(self.state, NodeState::NeedRequest),
            "request issued for node {} in state {:?}",
            self.address,
            self.state.kind()
        );
        self.state = NodeState::Requested { handle, priority };
    }

    /// Raise the stored priority of an in-flight request; never lowers it.
    pub(crate) fn raise_priority(&mut self, desired: f64) {
        if let NodeState::Requested { priority, .. } = &mut self.state
            && desired > *priority
        {
            *priority = desired;
        }
    }

    /// Whether `handle` is the fetch this node is waiting for.
    pub(crate) fn awaits(&self, handle: RequestHandle) -> bool {
        self.pending_request() == Some(handle)
    }

    /// `Requested -> Loaded`.
    pub(crate) fn finish_loaded(&mut self, payload: P) {
        self.state = NodeState::Loaded(payload);
        // Renderables built from an ancestor are superseded.
        self.renderable = None;
        self.fallback = None;
    }

    /// `Requested -> Failed`.
    pub(crate) fn finish_failed(&mut self) {
        self.state = NodeState::Failed;
    }

    /// `Requested -> NeedRequest`, returning the handle to cancel.
    pub(crate) fn cancel_request(&mut self) -> Option<RequestHandle> {
        let handle = self.pending_request()?;
        self.state = NodeState::NeedRequest;
        Some(handle)
    }

    /// `Loaded | Failed -> NeedRequest`, dropping payload and render resources.
    pub(crate) fn evict(&mut self) -> bool {
        if !self.is_settled() {
            return false;
        }
        self.state = NodeState::NeedRequest;
        self.release_renderables();
        true
    }

    pub(crate) fn release_renderables(&mut self) {
        self.renderable = None;
        self.fallback = None;
    }

    /// Dataless, request-free, render-free leaf: safe to remove from the tree.
    pub(crate) fn is_prunable(&self) -> bool {
        matches!(self.state, NodeState::NeedRequest)
            && !self.has_children()
            && self.renderable.is_none()
            && self.fallback.is_none()
    }
}
