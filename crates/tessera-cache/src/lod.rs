//! Screen-space level-of-detail decisions.
//!
//! A node at distance `d` from the viewer wants level
//! `log2(reference_scale / d)`, where `reference_scale` is the distance at
//! which the root tile is displayed at one texel per pixel. Each level finer
//! halves that distance.

use glam::DVec3;

use crate::culling::Aabb;

/// Frame-independent LOD parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodConfig {
    /// Edge length of one tile in texels.
    pub tile_pixels: f64,
    /// Levels of slack before refining.
    pub tolerance: f64,
    /// Distances at or below this count as straddling the viewer.
    pub min_depth: f64,
    /// Coarsest level that may be drawn.
    pub min_level: u8,
    /// Finest level the provider serves.
    pub max_level: u8,
}

/// What traversal should do with a visible node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LodAction {
    /// The node's own resolution is adequate; select it.
    Select,
    /// Recurse into the children.
    Refine,
}

/// Outcome of evaluating one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodDecision {
    /// Continuous desired level, clamped to the provider's range.
    pub desired_level: f64,
    /// Whether the box contains or nearly touches the viewer.
    pub straddles: bool,
    /// Select or refine.
    pub action: LodAction,
}

impl LodDecision {
    /// Shorthand for `action == Refine`.
    pub fn refines(&self) -> bool {
        self.action == LodAction::Refine
    }
}

/// Evaluates nodes against one frame's view.
#[derive(Clone, Copy, Debug)]
pub struct LodSelector {
    config: LodConfig,
    reference_scale: f64,
}

impl LodSelector {
    /// Build a selector for a tiling whose root spans `root_extent` world units.
    pub fn new(config: LodConfig, root_extent: f64, pixels_per_unit: f64) -> Self {
        Self {
            config,
            reference_scale: root_extent * pixels_per_unit / config.tile_pixels,
        }
    }

    /// Distance at which the root is drawn at one texel per pixel.
    pub fn reference_scale(&self) -> f64 {
        self.reference_scale
    }

    /// Unclamped desired level at `distance`. Infinite at zero distance.
    pub fn desired_level(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        (self.reference_scale / distance).log2()
    }

    /// Decide whether a node at `level` with world bounds `bounds` is fine enough.
    pub fn evaluate(&self, level: u8, bounds: &Aabb, camera: DVec3) -> LodDecision {
        let max = f64::from(self.config.max_level);
        let distance = bounds.distance_to_point(camera);
        let straddles = distance <= self.config.min_depth;
        let desired_level = if straddles {
            max
        } else {
            self.desired_level(distance).clamp(0.0, max)
        };

        let action = if level >= self.config.max_level {
            LodAction::Select
        } else if level < self.config.min_level || straddles {
            LodAction::Refine
        } else if f64::from(level) + self.config.tolerance >= desired_level {
            LodAction::Select
        } else {
            LodAction::Refine
        };

        LodDecision {
            desired_level,
            straddles,
            action,
        }
    }
}
