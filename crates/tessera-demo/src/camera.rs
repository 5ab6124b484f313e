//! Camera fly-through along configured waypoints.

use glam::{DMat4, DVec3};
use tessera_cache::ViewDescriptor;
use tessera_config::CameraConfig;

/// A piecewise-linear camera path covering `frames` frames.
pub struct FlyPath {
    waypoints: Vec<DVec3>,
    target: DVec3,
    frames: u64,
    projection: DMat4,
    pixels_per_unit: f64,
}

impl FlyPath {
    pub fn new(config: &CameraConfig, frames: u64) -> Self {
        let mut waypoints: Vec<DVec3> = config.waypoints.iter().copied().map(DVec3::from).collect();
        if waypoints.is_empty() {
            waypoints.push(DVec3::from(config.target) + DVec3::Z * 1000.0);
        }
        let fov = config.fov_y_degrees.to_radians();
        let [width, height] = config.viewport.map(|v| f64::from(v.max(1)));
        Self {
            waypoints,
            target: DVec3::from(config.target),
            frames: frames.max(1),
            projection: DMat4::perspective_rh_gl(fov, width / height, config.near, config.far),
            pixels_per_unit: ViewDescriptor::perspective_pixels_per_unit(height, fov),
        }
    }

    /// Camera position at `frame`; the last waypoint is reached on the final frame.
    pub fn position(&self, frame: u64) -> DVec3 {
        let segments = self.waypoints.len() - 1;
        if segments == 0 {
            return self.waypoints[0];
        }
        let t = (frame.min(self.frames - 1) as f64 / (self.frames - 1).max(1) as f64) * segments as f64;
        let index = (t.floor() as usize).min(segments - 1);
        self.waypoints[index].lerp(self.waypoints[index + 1], t - index as f64)
    }

    /// The view at `frame`, looking at the configured target.
    pub fn view(&self, frame: u64) -> ViewDescriptor {
        let eye = self.position(frame);
        // Y as up keeps look_at well defined when the camera is straight above the target.
        let view = DMat4::look_at_rh(eye, self.target, DVec3::Y);
        ViewDescriptor::from_view_projection(self.projection * view, eye, self.pixels_per_unit)
    }
}
