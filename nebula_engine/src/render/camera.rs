/// Scene camera: position and projection parameters
///
/// The camera stores parameters only. View and projection matrices are
/// computed on demand for the extent being rendered.

use glam::{Mat4, Vec3};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self { position: config.camera_position, ..Self::default() }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Perspective projection for Vulkan clip space (Y down, depth 0..1)
    pub fn projection(&self, aspect_ratio: f32) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov_y.to_radians(), aspect_ratio, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
