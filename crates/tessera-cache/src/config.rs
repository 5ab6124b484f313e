//! Tunables for a [`TileCache`](crate::TileCache).

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Cache policy. Serialized as part of the application config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of outstanding provider requests.
    pub max_concurrent_requests: usize,
    /// Eviction keeps `floor(lower * recent_max_touched)` nodes.
    pub eviction_lower_bound: f64,
    /// Eviction runs once residency exceeds `upper * recent_max_touched`.
    pub eviction_upper_bound: f64,
    /// Frames in the rolling touched-count window.
    pub touch_history_frames: usize,
    /// Levels of slack before a node's own resolution counts as too coarse.
    pub lod_tolerance: f64,
    /// Distance below which a box is treated as straddling the viewer.
    pub min_depth: f64,
    /// Edge length of one tile in texels.
    pub tile_pixels: f64,
    /// Never request tiles strictly beneath a failed node.
    pub skip_beneath_failed: bool,
    /// Cancel requests whose node has gone untouched for more than this many frames.
    pub cancel_untouched_after: Option<u64>,
    /// Build the coarser "lo" renderable for cross-fading.
    pub build_fallback: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8,
            eviction_lower_bound: 1.25,
            eviction_upper_bound: 1.5,
            touch_history_frames: 8,
            lod_tolerance: 0.5,
            min_depth: 1.0e-3,
            tile_pixels: 256.0,
            skip_beneath_failed: true,
            cancel_untouched_after: None,
            build_fallback: true,
        }
    }
}

impl CacheConfig {
    /// Check every value is in range.
    pub fn validate(&self) -> Result<(), CacheError> {
        let invalid = |msg: String| Err(CacheError::InvalidConfig(msg));
        if self.max_concurrent_requests == 0 {
            return invalid("max_concurrent_requests must be at least 1".into());
        }
        if self.touch_history_frames == 0 {
            return invalid("touch_history_frames must be at least 1".into());
        }
        if !(self.eviction_lower_bound >= 1.0) {
            return invalid(format!(
                "eviction_lower_bound {} must be >= 1.0",
                self.eviction_lower_bound
            ));
        }
        if !(self.eviction_upper_bound >= self.eviction_lower_bound) {
            return invalid(format!(
                "eviction_upper_bound {} must be >= eviction_lower_bound {}",
                self.eviction_upper_bound, self.eviction_lower_bound
            ));
        }
        if !(self.tile_pixels > 0.0) {
            return invalid(format!("tile_pixels {} must be positive", self.tile_pixels));
        }
        if !(self.min_depth >= 0.0) || !self.lod_tolerance.is_finite() {
            return invalid("min_depth and lod_tolerance must be finite, min_depth >= 0".into());
        }
        Ok(())
    }
}
