/// Transient per-draw context handed to pipelines
///
/// A `RenderInfo` lives for one recording call and is never stored past the
/// frame. The projection is computed the first time a pipeline asks for it.

use std::cell::OnceCell;

use glam::{Mat4, Vec3};

use crate::device::{BufferHandle, CommandBufferHandle, Extent2D};
use crate::render::camera::Camera;

/// Light-space matrices of the light being rendered into a shadow map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightView {
    /// Index of the light's entry in the shadow uniform
    pub slot: usize,
    /// One per cube face; spot lights use the first only
    pub view_projections: [Mat4; 6],
    pub position: Vec3,
    pub far: f32,
    pub face_count: u32,
    pub view_mask: u32,
}

/// Line vertices written for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBatch {
    pub buffer: BufferHandle,
    pub vertex_count: u32,
}

#[derive(Debug, Clone)]
pub struct RenderInfo {
    pub command_buffer: CommandBufferHandle,
    pub frame: usize,
    pub camera: Camera,
    pub view: Mat4,
    pub extent: Extent2D,
    pub light: Option<LightView>,
    pub lines: Option<LineBatch>,
    projection: OnceCell<Mat4>,
}

impl RenderInfo {
    pub fn new(command_buffer: CommandBufferHandle, frame: usize, camera: &Camera, extent: Extent2D) -> Self {
        Self {
            command_buffer,
            frame,
            camera: *camera,
            view: camera.view_matrix(),
            extent,
            light: None,
            lines: None,
            projection: OnceCell::new(),
        }
    }

    pub fn with_light(mut self, light: LightView) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_lines(mut self, lines: Option<LineBatch>) -> Self {
        self.lines = lines;
        self
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera.position
    }

    pub fn projection(&self) -> Mat4 {
        *self
            .projection
            .get_or_init(|| self.camera.projection(self.extent.aspect_ratio()))
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view
    }
}
