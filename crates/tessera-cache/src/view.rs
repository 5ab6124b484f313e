//! Per-frame view descriptor.

use glam::{DMat4, DVec3};

use crate::culling::ClipVolume;

/// Everything traversal needs to know about the camera for one frame.
#[derive(Clone, Debug)]
pub struct ViewDescriptor {
    /// Active clip half-spaces.
    pub clip: ClipVolume,
    /// Viewer position in world space.
    pub camera_position: DVec3,
    /// Screen pixels covered by one world unit at unit distance.
    pub pixels_per_unit: f64,
    /// The matrix the clip planes were extracted from, if any.
    pub view_projection: Option<DMat4>,
}

impl ViewDescriptor {
    /// A view over an explicit set of clip planes.
    pub fn new(clip: ClipVolume, camera_position: DVec3, pixels_per_unit: f64) -> Self {
        Self {
            clip,
            camera_position,
            pixels_per_unit,
            view_projection: None,
        }
    }

    /// A view whose clip planes are the frustum of `view_projection`.
    pub fn from_view_projection(
        view_projection: DMat4,
        camera_position: DVec3,
        pixels_per_unit: f64,
    ) -> Self {
        Self {
            clip: ClipVolume::from_view_projection(&view_projection),
            camera_position,
            pixels_per_unit,
            view_projection: Some(view_projection),
        }
    }

    /// Pixels per world unit at unit distance for a perspective camera.
    pub fn perspective_pixels_per_unit(viewport_height: f64, fov_y: f64) -> f64 {
        viewport_height / (2.0 * (fov_y * 0.5).tan())
    }
}
