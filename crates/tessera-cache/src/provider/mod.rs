//! The tile provider contract and bundled implementations.
//!
//! A provider turns tile addresses into payloads asynchronously. The cache
//! calls [`TileProvider::request`] during scheduling and collects results once
//! per frame through [`TileProvider::poll_completions`]; nothing a provider does
//! on its own threads ever touches the tree directly.

mod manual;
mod worker;

pub use manual::ManualProvider;
pub use worker::{TileSource, WorkerProvider};

use crate::address::TileAddress;
use crate::error::{FetchError, ProviderError};

/// Opaque token identifying one fetch.
///
/// Providers must never reuse a handle value for their lifetime; the cache
/// relies on this to recognise completions for requests it has since cancelled
/// or re-issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub u64);

/// The outcome of a fetch, delivered on the cache's thread.
#[derive(Debug)]
pub struct Completion<P> {
    /// Handle returned by the matching [`TileProvider::request`] call.
    pub handle: RequestHandle,
    /// The payload, or why there is none.
    pub result: Result<P, FetchError>,
}

/// Top-level description of a tile set, read once at cache initialisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Tile format version served by the provider.
    pub format_version: u32,
    /// Coarsest level with data.
    pub min_level: u8,
    /// Finest level with data.
    pub max_level: u8,
}

/// Source of tile payloads for a `D`-dimensional tree.
pub trait TileProvider<const D: usize> {
    /// Decoded tile data.
    type Payload;

    /// Read the tile set's metadata. An error here is fatal to cache initialisation.
    fn metadata(&self) -> Result<ProviderMetadata, ProviderError>;

    /// Start fetching `address`. The result arrives later via [`Self::poll_completions`].
    fn request(&mut self, address: TileAddress<D>) -> RequestHandle;

    /// Best-effort cancellation. Safe to call for handles that already completed.
    fn cancel(&mut self, handle: RequestHandle);

    /// Move every completion that arrived since the last call into `out`.
    fn poll_completions(&mut self, out: &mut Vec<Completion<Self::Payload>>);

    /// Supported `(min, max)` zoom levels.
    fn zoom_level_range(&self) -> Option<(u8, u8)> {
        self.metadata().ok().map(|m| (m.min_level, m.max_level))
    }
}
