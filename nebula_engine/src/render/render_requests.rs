/// Per-frame render requests: objects per pipeline type, lights and lines
///
/// Requests persist across frames until `clear` is called.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::device::{VertexFormat, VertexLayout};
use crate::pipeline::PipelineType;
use crate::render::light::Light;
use crate::render::render_object::ObjectKey;

/// Debug line segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec4,
}

impl Line {
    pub fn new(start: Vec3, end: Vec3, color: Vec4) -> Self {
        Self { start, end, color }
    }
}

/// Line vertex as uploaded to the line buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(&[VertexFormat::Float3, VertexFormat::Float4])
    }

    /// The two vertices of `line`
    pub fn pair(line: &Line) -> [LineVertex; 2] {
        let color = line.color.to_array();
        [
            LineVertex { position: line.start.to_array(), color },
            LineVertex { position: line.end.to_array(), color },
        ]
    }
}

#[derive(Debug, Default)]
pub struct RenderRequests {
    objects: FxHashMap<PipelineType, Vec<ObjectKey>>,
    /// Pipeline types in first-registration order
    order: Vec<PipelineType>,
    lights: Vec<Light>,
    lines: Vec<Line>,
}

impl RenderRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `object` with the pipeline registered under `tag`
    pub fn register_object(&mut self, tag: PipelineType, object: ObjectKey) {
        let objects = self.objects.entry(tag).or_insert_with(|| {
            self.order.push(tag);
            Vec::new()
        });
        if !objects.contains(&object) {
            objects.push(object);
        }
    }

    pub fn register_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn register_line(&mut self, line: Line) {
        self.lines.push(line);
    }

    /// Drop `object` from every pipeline type
    pub fn remove_object(&mut self, object: ObjectKey) {
        for objects in self.objects.values_mut() {
            objects.retain(|o| *o != object);
        }
    }

    /// Drop every object request for `tag`
    pub fn remove_pipeline_type(&mut self, tag: PipelineType) {
        if self.objects.remove(&tag).is_some() {
            self.order.retain(|t| *t != tag);
        }
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.order.clear();
        self.lights.clear();
        self.lines.clear();
    }

    pub fn pipeline_types(&self) -> &[PipelineType] {
        &self.order
    }

    pub fn objects(&self, tag: PipelineType) -> &[ObjectKey] {
        self.objects.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every requested object once, in registration order
    pub fn unique_objects(&self) -> Vec<ObjectKey> {
        let mut unique = Vec::new();
        for tag in &self.order {
            for object in self.objects(*tag) {
                if !unique.contains(object) {
                    unique.push(*object);
                }
            }
        }
        unique
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Lights that cast shadows, in registration order
    pub fn shadow_casting_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().filter(|l| l.casts_shadows())
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty() && self.lights.is_empty() && self.lines.is_empty()
    }
}

#[cfg(test)]
#[path = "render_requests_tests.rs"]
mod tests;
