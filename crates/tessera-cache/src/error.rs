//! Error types for cache initialisation, providers and tile fetches.

use crate::payload::PayloadError;

/// Errors that make a cache unusable. Raised only at construction or provider swap;
/// per-tile problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A configuration value is out of range.
    #[error("invalid cache config: {0}")]
    InvalidConfig(String),

    /// The provider serves a tile format this build cannot read.
    #[error("unsupported tile format version {found} (supported: {supported})")]
    UnsupportedFormatVersion {
        /// Version reported by the provider.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// The provider reported a zoom range with `min > max` or beyond the addressable depth.
    #[error("invalid zoom level range {min}..={max}")]
    InvalidZoomRange {
        /// Reported minimum level.
        min: u8,
        /// Reported maximum level.
        max: u8,
    },

    /// The provider could not produce its top-level metadata.
    #[error("provider metadata unavailable: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors reading a provider's top-level metadata.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The metadata document could not be fetched.
    #[error("metadata fetch failed: {0}")]
    Unavailable(String),

    /// The metadata document was fetched but could not be parsed.
    #[error("malformed metadata: {0}")]
    Malformed(String),
}

/// Why a single tile fetch did not produce a payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The provider has no tile at this address.
    #[error("tile not found")]
    NotFound,

    /// The transport failed (I/O, network, worker crash).
    #[error("transport error: {0}")]
    Transport(String),

    /// The bytes arrived but could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] PayloadError),

    /// The request was cancelled before completing. Not a failure: the node
    /// returns to `NeedRequest` and may be requested again.
    #[error("request cancelled")]
    Cancelled,
}
