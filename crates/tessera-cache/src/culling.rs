//! Clip-volume culling of tile bounds against the view's half-spaces.
//!
//! Tiles are tested in f64 world space. The view supplies an arbitrary set of
//! inward-facing planes (usually the six frustum planes extracted from the
//! view-projection matrix); a tile is rejected only when it is provably outside.

use glam::{DMat4, DVec3, DVec4};

/// Plane indices into an extracted frustum.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// An axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: DVec3,
    /// Maximum corner of the bounding box.
    pub max: DVec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners.
    #[must_use]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Returns the center point of the AABB.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the full size along each axis.
    #[must_use]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Returns true if the point lies inside or on the boundary.
    #[must_use]
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Euclidean distance from `p` to the closest point of the box (0 inside).
    #[must_use]
    pub fn distance_to_point(&self, p: DVec3) -> f64 {
        let clamped = p.clamp(self.min, self.max);
        (p - clamped).length()
    }

    /// The corner furthest along `normal` (the "positive vertex").
    #[must_use]
    pub fn positive_vertex(&self, normal: DVec3) -> DVec3 {
        DVec3::new(
            if normal.x >= 0.0 { self.max.x } else { self.min.x },
            if normal.y >= 0.0 { self.max.y } else { self.min.y },
            if normal.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }

    /// The corner furthest against `normal` (the "negative vertex").
    #[must_use]
    pub fn negative_vertex(&self, normal: DVec3) -> DVec3 {
        DVec3::new(
            if normal.x >= 0.0 { self.min.x } else { self.max.x },
            if normal.y >= 0.0 { self.min.y } else { self.max.y },
            if normal.z >= 0.0 { self.min.z } else { self.max.z },
        )
    }
}

/// A half-space `normal · p + distance >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Inward-facing normal. Need not be unit length for culling, but
    /// [`Plane::new`] normalizes so signed distances are metric.
    pub normal: DVec3,
    /// Signed distance term.
    pub distance: f64,
}

impl Plane {
    /// Create a plane, normalizing `normal` when it is non-zero.
    #[must_use]
    pub fn new(normal: DVec3, distance: f64) -> Self {
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                distance: distance / len,
            }
        } else {
            Self { normal, distance }
        }
    }

    /// Plane through `point` facing `normal`.
    #[must_use]
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: -n.dot(point),
        }
    }

    fn from_vec4(v: DVec4) -> Self {
        Self::new(v.truncate(), v.w)
    }

    /// Signed distance of `p`: positive inside, negative outside.
    #[must_use]
    pub fn signed_distance(&self, p: DVec3) -> f64 {
        self.normal.dot(p) + self.distance
    }
}

/// Result of testing a box against a clip volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Entirely on the positive side of every plane.
    Inside,
    /// Straddles at least one plane and is outside none.
    Intersecting,
    /// Entirely on the negative side of at least one plane.
    Outside,
}

/// The set of clip half-spaces active this frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipVolume {
    planes: Vec<Plane>,
}

impl ClipVolume {
    /// A clip volume from an arbitrary set of half-spaces. No planes means nothing is culled.
    #[must_use]
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a combined view-projection matrix
    /// using the Griggs-Hartmann method (OpenGL-style `-w..w` depth range).
    #[must_use]
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Plane::new(DVec3::ZERO, 0.0); 6];
        planes[LEFT] = Plane::from_vec4(rows[3] + rows[0]);
        planes[RIGHT] = Plane::from_vec4(rows[3] - rows[0]);
        planes[BOTTOM] = Plane::from_vec4(rows[3] + rows[1]);
        planes[TOP] = Plane::from_vec4(rows[3] - rows[1]);
        planes[NEAR] = Plane::from_vec4(rows[3] + rows[2]);
        planes[FAR] = Plane::from_vec4(rows[3] - rows[2]);

        Self {
            planes: planes.to_vec(),
        }
    }

    /// The half-spaces, in the order they were supplied.
    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Classify a box against every plane.
    ///
    /// For each plane, the positive vertex (the corner furthest along the
    /// normal) is the box's best chance of being inside: if even that corner is
    /// behind the plane, all eight corners are, and the box is outside.
    #[must_use]
    pub fn classify(&self, aabb: &Aabb) -> Visibility {
        let mut result = Visibility::Inside;
        for plane in &self.planes {
            if plane.signed_distance(aabb.positive_vertex(plane.normal)) < 0.0 {
                return Visibility::Outside;
            }
            if plane.signed_distance(aabb.negative_vertex(plane.normal)) < 0.0 {
                result = Visibility::Intersecting;
            }
        }
        result
    }

    /// Returns `true` unless the box is provably outside.
    #[must_use]
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.classify(aabb) != Visibility::Outside
    }
}
