//! Command-line argument parsing for the streaming demo.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, TreeKind};

/// Tessera streaming session arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tessera", about = "Stream a tiled world along a camera path")]
pub struct CliArgs {
    /// Frames to simulate.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Maximum fetches in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Tree to drive.
    #[arg(long, value_enum)]
    pub tree: Option<TreeKind>,

    /// Seed for the procedural tile source.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(frames) = args.frames {
            self.session.frames = frames;
        }
        if let Some(bound) = args.concurrency {
            self.cache.max_concurrent_requests = bound;
        }
        if let Some(tree) = args.tree {
            self.session.tree = tree;
        }
        if let Some(seed) = args.seed {
            self.session.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            frames: Some(10),
            concurrency: Some(3),
            tree: Some(TreeKind::Oct),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.session.frames, 10);
        assert_eq!(config.cache.max_concurrent_requests, 3);
        assert_eq!(config.session.tree, TreeKind::Oct);
        // Non-overridden fields retain defaults
        assert_eq!(config.session.seed, Config::default().session.seed);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "tessera",
            "--tree",
            "oct",
            "--seed",
            "7",
            "--log-level",
            "debug",
            "--config",
            "/tmp/tessera",
        ])
        .unwrap();
        assert_eq!(args.tree, Some(TreeKind::Oct));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/tessera")));
        assert!(args.frames.is_none());
    }

    #[test]
    fn test_unknown_tree_rejected() {
        assert!(CliArgs::try_parse_from(["tessera", "--tree", "hex"]).is_err());
    }
}
