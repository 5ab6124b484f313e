//! Configuration for Tessera streaming sessions.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Unknown fields are ignored and missing ones take their
//! defaults, so older and newer files both load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CameraConfig, Config, DebugConfig, ProviderConfig, SessionConfig, TreeKind};
pub use error::ConfigError;
pub use tessera_cache::CacheConfig;
