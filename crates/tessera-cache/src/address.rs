//! Tile addressing: integer `(level, x, y[, z])` coordinates and their mapping to world space.

use glam::DVec3;

use crate::culling::Aabb;

/// Uniquely identifies a tile region in a `D`-dimensional hierarchy.
///
/// - `level`: subdivision depth. Level 0 is the root and covers the whole
///   tiled extent; every level halves the region along each axis.
/// - `coords`: grid coordinates at this level, each in `0..2^level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress<const D: usize> {
    /// Subdivision level (0 = root, coarsest).
    pub level: u8,
    /// Grid coordinates along each axis at this level.
    pub coords: [u32; D],
}

/// Address of an image tile in a quadtree.
pub type QuadAddress = TileAddress<2>;
/// Address of a volumetric tile in an octree.
pub type OctAddress = TileAddress<3>;

impl<const D: usize> TileAddress<D> {
    /// Deepest level representable with `u32` coordinates.
    pub const MAX_LEVEL: u8 = 31;

    /// Number of children of every node, `2^D`.
    pub const FANOUT: usize = 1 << D;

    /// The root address covering the whole extent.
    #[must_use]
    pub fn root() -> Self {
        Self {
            level: 0,
            coords: [0; D],
        }
    }

    /// Construct an address, validating that every coordinate is in range for `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`Self::MAX_LEVEL`] or a coordinate is out of range.
    #[must_use]
    pub fn new(level: u8, coords: [u32; D]) -> Self {
        assert!(
            level <= Self::MAX_LEVEL,
            "level {level} exceeds MAX_LEVEL {}",
            Self::MAX_LEVEL
        );
        let size = Self::grid_size(level);
        for (axis, &c) in coords.iter().enumerate() {
            assert!(
                u64::from(c) < size,
                "coordinate {c} on axis {axis} out of range for level {level} (max {size})"
            );
        }
        Self { level, coords }
    }

    /// Number of tiles along one axis at the given level.
    #[must_use]
    pub fn grid_size(level: u8) -> u64 {
        1_u64 << level
    }

    /// The child in slot `index`. Bit `k` of `index` selects the upper half along axis `k`.
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        debug_assert!(index < Self::FANOUT, "child index {index} out of range");
        let mut coords = self.coords;
        for (axis, c) in coords.iter_mut().enumerate() {
            *c = (*c << 1) | ((index >> axis) & 1) as u32;
        }
        Self {
            level: self.level + 1,
            coords,
        }
    }

    /// Slot index this address occupies in its parent.
    #[must_use]
    pub fn child_slot(&self) -> usize {
        self.coords
            .iter()
            .enumerate()
            .fold(0, |slot, (axis, &c)| slot | (((c & 1) as usize) << axis))
    }

    /// The parent address one level coarser, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        Some(Self {
            level: self.level - 1,
            coords: self.coords.map(|c| c >> 1),
        })
    }

    /// The ancestor at `level`, or `None` if `level` is finer than this address.
    #[must_use]
    pub fn ancestor_at(&self, level: u8) -> Option<Self> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(Self {
            level,
            coords: self.coords.map(|c| c >> shift),
        })
    }

    /// Whether `self` is `other` or one of its ancestors.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.ancestor_at(self.level) == Some(*self)
    }

    /// Where this address lies inside an ancestor's region, in the ancestor's
    /// normalized `[0, 1]` space. Returns `None` if `ancestor` does not contain `self`.
    #[must_use]
    pub fn sub_region_in(&self, ancestor: &Self) -> Option<SubRegion<D>> {
        if !ancestor.contains(self) {
            return None;
        }
        let depth = self.level - ancestor.level;
        let scale = 1.0 / Self::grid_size(depth) as f64;
        let mut offset = [0.0; D];
        for (axis, o) in offset.iter_mut().enumerate() {
            let base = u64::from(ancestor.coords[axis]) << depth;
            *o = (u64::from(self.coords[axis]) - base) as f64 * scale;
        }
        Some(SubRegion { offset, scale })
    }
}

impl<const D: usize> std::fmt::Display for TileAddress<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(level={}", self.level)?;
        for (axis, c) in self.coords.iter().enumerate() {
            let name = ["x", "y", "z"].get(axis).copied().unwrap_or("w");
            write!(f, ", {name}={c}")?;
        }
        write!(f, ")")
    }
}

/// A square sub-rectangle of an ancestor region in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubRegion<const D: usize> {
    /// Minimum corner, each component in `[0, 1)`.
    pub offset: [f64; D],
    /// Edge length relative to the ancestor (`1 / 2^depth`).
    pub scale: f64,
}

impl<const D: usize> SubRegion<D> {
    /// The whole region.
    #[must_use]
    pub fn full() -> Self {
        Self {
            offset: [0.0; D],
            scale: 1.0,
        }
    }
}

/// Maps tile addresses onto world space.
///
/// The root covers `origin .. origin + extent`. Address axis `k` maps to world
/// axis `k`; for quadtrees (`D = 2`) the world `z` range is the fixed band
/// `origin.z .. origin.z + extent.z` (e.g. the elevation range of the imagery).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileLayout {
    /// Minimum corner of the root region.
    pub origin: DVec3,
    /// Size of the root region along each world axis.
    pub extent: DVec3,
}

impl TileLayout {
    /// Create a layout from the root's minimum corner and size.
    #[must_use]
    pub fn new(origin: DVec3, extent: DVec3) -> Self {
        Self { origin, extent }
    }

    /// World-space bounds of the region addressed by `address`.
    ///
    /// Computed directly from the integer coordinates (one multiply and one
    /// power-of-two divide per axis) so neighbouring tiles share bit-identical edges.
    #[must_use]
    pub fn bounds<const D: usize>(&self, address: &TileAddress<D>) -> Aabb {
        let cells = TileAddress::<D>::grid_size(address.level) as f64;
        let mut min = self.origin;
        let mut max = self.origin + self.extent;
        for axis in 0..D.min(3) {
            let c = f64::from(address.coords[axis]);
            min[axis] = self.origin[axis] + self.extent[axis] * c / cells;
            max[axis] = self.origin[axis] + self.extent[axis] * (c + 1.0) / cells;
        }
        Aabb::new(min, max)
    }

    /// Edge length of the region along the largest tiled axis at `level`.
    #[must_use]
    pub fn tile_size<const D: usize>(&self, level: u8) -> f64 {
        let root = (0..D.min(3))
            .map(|axis| self.extent[axis])
            .fold(0.0_f64, f64::max);
        root / TileAddress::<D>::grid_size(level) as f64
    }
}

impl Default for TileLayout {
    fn default() -> Self {
        Self::new(DVec3::ZERO, DVec3::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The child in slot 3 of a quadtree root is the upper-right quadrant.
    #[test]
    fn test_quad_child_slots() {
        let root = QuadAddress::root();
        assert_eq!(root.child(0), QuadAddress::new(1, [0, 0]));
        assert_eq!(root.child(1), QuadAddress::new(1, [1, 0]));
        assert_eq!(root.child(2), QuadAddress::new(1, [0, 1]));
        assert_eq!(root.child(3), QuadAddress::new(1, [1, 1]));
    }

    /// Every octree child maps back to its parent and slot.
    #[test]
    fn test_oct_child_parent_roundtrip() {
        let node = OctAddress::new(3, [5, 2, 7]);
        for slot in 0..OctAddress::FANOUT {
            let child = node.child(slot);
            assert_eq!(child.level, 4);
            assert_eq!(child.parent(), Some(node));
            assert_eq!(child.child_slot(), slot);
        }
    }

    #[test]
    fn test_root_has_no_parent() {
        assert_eq!(QuadAddress::root().parent(), None);
    }

    #[test]
    fn test_ancestor_and_contains() {
        let target = QuadAddress::new(10, [700, 300]);
        let anc = target.ancestor_at(6).expect("level 6 is coarser");
        assert_eq!(anc, QuadAddress::new(6, [43, 18]));
        assert!(anc.contains(&target));
        assert!(target.contains(&target));
        assert!(!target.contains(&anc));
        assert_eq!(target.ancestor_at(11), None);
    }

    /// A grandchild in the upper-right corner occupies the last quarter of both axes.
    #[test]
    fn test_sub_region_of_grandchild() {
        let anc = QuadAddress::new(1, [0, 0]);
        let target = QuadAddress::new(3, [3, 2]);
        let sub = target.sub_region_in(&anc).expect("contained");
        assert_eq!(sub.scale, 0.25);
        assert_eq!(sub.offset, [0.75, 0.5]);
        assert!(QuadAddress::new(3, [4, 0]).sub_region_in(&anc).is_none());
    }

    /// Adjacent tiles share exactly the same boundary coordinate.
    #[test]
    fn test_bounds_are_exact_at_depth() {
        let layout = TileLayout::new(DVec3::new(-1000.0, -1000.0, 0.0), DVec3::new(3000.0, 3000.0, 10.0));
        let level = 20;
        let a = layout.bounds(&QuadAddress::new(level, [12345, 777]));
        let b = layout.bounds(&QuadAddress::new(level, [12346, 777]));
        assert_eq!(a.max.x, b.min.x);
        assert_eq!(a.min.z, 0.0);
        assert_eq!(a.max.z, 10.0);
    }

    #[test]
    fn test_root_bounds_cover_layout() {
        let layout = TileLayout::new(DVec3::splat(2.0), DVec3::splat(8.0));
        let b = layout.bounds(&OctAddress::root());
        assert_eq!(b.min, DVec3::splat(2.0));
        assert_eq!(b.max, DVec3::splat(10.0));
        assert_eq!(layout.tile_size::<3>(2), 2.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_coordinate_panics() {
        let _ = QuadAddress::new(2, [4, 0]);
    }

    #[test]
    fn test_display() {
        assert_eq!(OctAddress::new(1, [1, 0, 1]).to_string(), "(level=1, x=1, y=0, z=1)");
    }
}
