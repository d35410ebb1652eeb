/// Scene lights and their light-space transforms

use glam::{Mat4, Vec3};

use crate::render::render_info::LightView;

/// Multiview mask covering the six faces of a cube shadow map
pub const CUBE_VIEW_MASK: u32 = 0b111111;

const SHADOW_NEAR: f32 = 0.1;

/// Omnidirectional light; shadows go to a cube map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub cast_shadows: bool,
    pub shadow_map_size: u32,
}

impl PointLight {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 25.0,
            cast_shadows: false,
            shadow_map_size: 1024,
        }
    }

    pub fn with_shadows(mut self, shadow_map_size: u32) -> Self {
        self.cast_shadows = true;
        self.shadow_map_size = shadow_map_size;
        self
    }
}

/// Cone light; shadows go to a single 2D map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// Half angle of the cone in radians
    pub outer_angle: f32,
    pub cast_shadows: bool,
    pub shadow_map_size: u32,
}

impl SpotLight {
    pub fn new(position: Vec3, direction: Vec3) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            color: Vec3::ONE,
            intensity: 1.0,
            range: 25.0,
            outer_angle: 30f32.to_radians(),
            cast_shadows: false,
            shadow_map_size: 1024,
        }
    }

    pub fn with_shadows(mut self, shadow_map_size: u32) -> Self {
        self.cast_shadows = true;
        self.shadow_map_size = shadow_map_size;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    pub fn casts_shadows(&self) -> bool {
        match self {
            Light::Point(light) => light.cast_shadows,
            Light::Spot(light) => light.cast_shadows,
        }
    }

    pub fn shadow_map_size(&self) -> u32 {
        match self {
            Light::Point(light) => light.shadow_map_size,
            Light::Spot(light) => light.shadow_map_size,
        }
    }

    /// True if shadows need a six-face cube map
    pub fn is_cube(&self) -> bool {
        matches!(self, Light::Point(_))
    }

    pub fn position(&self) -> Vec3 {
        match self {
            Light::Point(light) => light.position,
            Light::Spot(light) => light.position,
        }
    }

    pub fn range(&self) -> f32 {
        match self {
            Light::Point(light) => light.range,
            Light::Spot(light) => light.range,
        }
    }

    pub fn face_count(&self) -> u32 {
        if self.is_cube() {
            6
        } else {
            1
        }
    }

    pub fn view_mask(&self) -> u32 {
        if self.is_cube() {
            CUBE_VIEW_MASK
        } else {
            0
        }
    }

    /// Light-space view-projection per face; unused faces are identity
    pub fn view_projections(&self) -> [Mat4; 6] {
        let mut matrices = [Mat4::IDENTITY; 6];
        match self {
            Light::Point(light) => {
                let projection = vulkan_perspective(90f32.to_radians(), light.range);
                // Face order +X -X +Y -Y +Z -Z
                let faces = [
                    (Vec3::X, Vec3::NEG_Y),
                    (Vec3::NEG_X, Vec3::NEG_Y),
                    (Vec3::Y, Vec3::Z),
                    (Vec3::NEG_Y, Vec3::NEG_Z),
                    (Vec3::Z, Vec3::NEG_Y),
                    (Vec3::NEG_Z, Vec3::NEG_Y),
                ];
                for (matrix, (direction, up)) in matrices.iter_mut().zip(faces) {
                    *matrix = projection * Mat4::look_at_rh(light.position, light.position + direction, up);
                }
            }
            Light::Spot(light) => {
                let up = if light.direction.cross(Vec3::Y).length_squared() < 1e-6 { Vec3::Z } else { Vec3::Y };
                let view = Mat4::look_at_rh(light.position, light.position + light.direction, up);
                matrices[0] = vulkan_perspective(light.outer_angle * 2.0, light.range) * view;
            }
        }
        matrices
    }

    /// Shadow pass parameters for this light at shadow uniform `slot`
    pub fn light_view(&self, slot: usize) -> LightView {
        LightView {
            slot,
            view_projections: self.view_projections(),
            position: self.position(),
            far: self.range(),
            face_count: self.face_count(),
            view_mask: self.view_mask(),
        }
    }
}

fn vulkan_perspective(fov_y: f32, far: f32) -> Mat4 {
    let mut projection = Mat4::perspective_rh(fov_y, 1.0, SHADOW_NEAR, far);
    projection.y_axis.y *= -1.0;
    projection
}

#[cfg(test)]
#[path = "light_tests.rs"]
mod tests;
