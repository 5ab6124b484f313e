//! Session configuration with defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_cache::CacheConfig;

use crate::error::ConfigError;

const FILE_NAME: &str = "config.ron";

/// Top-level configuration for a streaming session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Cache policy.
    pub cache: CacheConfig,
    /// Tile source settings.
    pub provider: ProviderConfig,
    /// Camera path.
    pub camera: CameraConfig,
    /// What to run.
    pub session: SessionConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Which tree instance to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum TreeKind {
    /// Quadtree of image tiles.
    #[default]
    Quad,
    /// Octree of surface tiles.
    Oct,
}

/// Procedural tile source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Fetch worker threads (0 = one less than the CPU count).
    pub worker_threads: usize,
    /// Jobs that may wait in the fetch queue.
    pub queue_capacity: usize,
    /// Base simulated fetch latency in milliseconds.
    pub latency_ms: u64,
    /// Extra random latency, uniformly up to this many milliseconds.
    pub latency_jitter_ms: u64,
    /// Probability that a fetch fails.
    pub failure_rate: f64,
    /// Edge length of generated image tiles in texels.
    pub tile_pixels: u32,
    /// Tile format version the source reports.
    pub format_version: u32,
    /// Coarsest level served.
    pub min_level: u8,
    /// Finest level served.
    pub max_level: u8,
    /// Size of the root tile in world units.
    pub world_extent: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: 256,
            latency_ms: 4,
            latency_jitter_ms: 12,
            failure_rate: 0.01,
            tile_pixels: 64,
            format_version: 1,
            min_level: 0,
            max_level: 12,
            world_extent: 8192.0,
        }
    }
}

/// Camera fly-through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Points visited in order; the camera moves linearly between them.
    pub waypoints: Vec<[f64; 3]>,
    /// Point the camera looks at.
    pub target: [f64; 3],
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f64,
    /// Viewport size in pixels.
    pub viewport: [u32; 2],
    /// Near clip distance.
    pub near: f64,
    /// Far clip distance.
    pub far: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            waypoints: vec![
                [4096.0, 4096.0, 6000.0],
                [3000.0, 3500.0, 800.0],
                [5200.0, 3000.0, 200.0],
                [6500.0, 6000.0, 1500.0],
            ],
            target: [4096.0, 4096.0, 0.0],
            fov_y_degrees: 60.0,
            viewport: [1920, 1080],
            near: 0.5,
            far: 50_000.0,
        }
    }
}

/// Length and shape of the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Tree instance to drive.
    pub tree: TreeKind,
    /// Frames to simulate.
    pub frames: u64,
    /// Simulated frame time in milliseconds (0 = as fast as possible).
    pub frame_time_ms: u64,
    /// Seed for the procedural source.
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tree: TreeKind::Quad,
            frames: 600,
            frame_time_ms: 16,
            seed: 0x7e55_e7a,
        }
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter (e.g., "debug", "info,tessera_cache=trace").
    pub log_level: String,
    /// Log frame statistics every this many frames (0 = never).
    pub stats_interval: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stats_interval: 60,
        }
    }
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(FILE_NAME);
        if !config_path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            return Ok(config);
        }

        let config = Self::read(&config_path)?;
        config.cache.validate()?;
        log::info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(FILE_NAME);
        let write_err = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(write_err)
    }

    /// Re-read the file. Returns `Some(new_config)` if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(FILE_NAME))?;
        if &new_config == self {
            return Ok(None);
        }
        new_config.cache.validate()?;
        log::info!("Config reloaded with changes");
        Ok(Some(new_config))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_concurrent_requests: 8"));
        assert!(ron_str.contains("tree: Quad"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.cache.cancel_untouched_after = Some(30);
        config.session.tree = TreeKind::Oct;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    /// Sections left out of the file take their defaults.
    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(cache: (max_concurrent_requests: 2))").unwrap();
        assert_eq!(config.cache.max_concurrent_requests, 2);
        assert_eq!(config.cache.eviction_upper_bound, 1.5);
        assert_eq!(config.provider, ProviderConfig::default());
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.provider.max_level = 9;
        config.camera.waypoints = vec![[0.0, 0.0, 10.0]];
        config.debug.log_level = "debug".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(FILE_NAME).exists());
    }

    /// A file whose cache bounds are inverted is rejected at load.
    #[test]
    fn test_invalid_cache_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FILE_NAME),
            "(cache: (eviction_lower_bound: 3.0, eviction_upper_bound: 2.0))",
        )
        .unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.session.frames = 42;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.session.frames), Some(42));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// session file\n(\n  // nothing overridden\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
