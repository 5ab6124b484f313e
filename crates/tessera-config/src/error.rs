//! Configuration error types.

use std::path::PathBuf;

/// Errors loading, saving or validating a session config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file or its directory could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File that was being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Parser error with line and column.
        #[source]
        source: ron::error::SpannedError,
    },

    /// The config could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] ron::Error),

    /// The cache section holds out-of-range values.
    #[error("invalid cache settings: {0}")]
    Invalid(#[from] tessera_cache::CacheError),
}
