//! Hierarchical spatial tile cache with LOD-driven streaming and bounded eviction.
//!
//! One engine serves both quadtrees of image tiles ([`QuadtreeCache`]) and
//! octrees of volumetric surface tiles ([`OctreeCache`]). Each frame,
//! [`TileCache::update`] applies finished fetches, walks the tree top-down
//! (culling invisible branches and refining where resolution is too coarse),
//! admits the most urgent requests up to the concurrency bound, and evicts
//! least-recently-touched tiles once residency outgrows the working set.
//! Tiles still streaming are drawn from their nearest loaded ancestor.

mod address;
mod cache;
mod config;
mod culling;
mod error;
mod eviction;
mod lod;
mod node;
mod payload;
pub mod provider;
mod render;
mod resolve;
mod scheduler;
mod stats;
mod tree;
mod view;

pub use address::{OctAddress, QuadAddress, SubRegion, TileAddress, TileLayout};
pub use cache::{OctreeCache, QuadtreeCache, SUPPORTED_FORMAT_VERSION, TileCache};
pub use config::CacheConfig;
pub use culling::{Aabb, ClipVolume, Plane, Visibility};
pub use error::{CacheError, FetchError, ProviderError};
pub use eviction::{AccessTracker, EvictionOutcome, Evictor};
pub use lod::{LodAction, LodConfig, LodDecision, LodSelector};
pub use node::{Built, LoadState, NodeId, NodeState, TileNode};
pub use payload::{FORMAT_VERSION, ImageTile, PayloadError, SurfaceTile, TilePayload};
pub use provider::{
    Completion, ManualProvider, ProviderMetadata, RequestHandle, TileProvider, TileSource,
    WorkerProvider,
};
pub use render::{
    ImageTextureBuilder, NoopBuilder, RenderableBuilder, SelectedTile, SurfaceMesh,
    SurfaceMeshBuilder, TEXTURE_ROW_ALIGNMENT, TextureData, TileTransform,
};
pub use resolve::{ResolvePolicy, ResolvedAncestors, resolve_ancestors};
pub use scheduler::{Candidate, RequestScheduler, request_priority};
pub use stats::{CacheStats, FrameStats};
pub use tree::{Ancestors, OctTree, QuadTree, TileTree};
pub use view::ViewDescriptor;
