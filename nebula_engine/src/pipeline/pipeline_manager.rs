/// Pipeline registry keyed by `PipelineType`
///
/// Filled at startup with the engine pipelines and the application's own.
/// Every lookup of an unregistered tag fails with `UnknownPipelineType`;
/// using a pipeline through a capability its kind lacks fails with
/// `PipelineTypeMismatch`.

use rustc_hash::FxHashMap;

use crate::device::{CommandBufferHandle, DescriptorSetHandle, GraphicsDevice};
use crate::engine_debug;
use crate::error::{Error, Result};
use crate::pipeline::pipeline::{Pipeline, PipelineKind, PipelineType};
use crate::render::{RenderInfo, RenderObject};

#[derive(Default)]
pub struct PipelineManager {
    pipelines: FxHashMap<PipelineType, Box<dyn Pipeline>>,
    /// Registration order, used for deterministic compute dispatch
    order: Vec<PipelineType>,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pipeline` under `tag`; a pipeline already registered there is destroyed
    pub fn register(&mut self, device: &mut dyn GraphicsDevice, tag: PipelineType, pipeline: Box<dyn Pipeline>) {
        engine_debug!(
            "nebula::PipelineManager",
            "Registered {} pipeline '{}' as {}",
            pipeline.kind().name(),
            pipeline.name(),
            tag
        );
        if let Some(mut previous) = self.pipelines.insert(tag, pipeline) {
            previous.destroy(device);
        } else {
            self.order.push(tag);
        }
    }

    /// Remove and destroy the pipeline under `tag`
    pub fn unregister(&mut self, device: &mut dyn GraphicsDevice, tag: PipelineType) -> Result<()> {
        let mut pipeline = self
            .pipelines
            .remove(&tag)
            .ok_or_else(|| Error::UnknownPipelineType(tag.to_string()))?;
        self.order.retain(|t| *t != tag);
        pipeline.destroy(device);
        Ok(())
    }

    pub fn contains(&self, tag: PipelineType) -> bool {
        self.pipelines.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Registered tags in registration order
    pub fn types(&self) -> &[PipelineType] {
        &self.order
    }

    pub fn get(&self, tag: PipelineType) -> Result<&dyn Pipeline> {
        self.pipelines
            .get(&tag)
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::UnknownPipelineType(tag.to_string()))
    }

    pub fn get_mut(&mut self, tag: PipelineType) -> Result<&mut Box<dyn Pipeline>> {
        self.pipelines
            .get_mut(&tag)
            .ok_or_else(|| Error::UnknownPipelineType(tag.to_string()))
    }

    pub fn kind(&self, tag: PipelineType) -> Result<PipelineKind> {
        Ok(self.get(tag)?.kind())
    }

    /// Registered tags whose pipelines can dispatch compute work
    pub fn compute_types(&self) -> Vec<PipelineType> {
        self.order
            .iter()
            .copied()
            .filter(|tag| self.pipelines.get(tag).is_some_and(|p| p.kind().supports_compute()))
            .collect()
    }

    /// Registered tags whose pipelines trace rays
    pub fn ray_tracing_types(&self) -> Vec<PipelineType> {
        self.order
            .iter()
            .copied()
            .filter(|tag| self.pipelines.get(tag).is_some_and(|p| p.kind().supports_ray_tracing()))
            .collect()
    }

    fn checked(
        &self,
        tag: PipelineType,
        supported: fn(PipelineKind) -> bool,
        expected: &'static str,
    ) -> Result<&dyn Pipeline> {
        let pipeline = self.get(tag)?;
        if !supported(pipeline.kind()) {
            return Err(Error::PipelineTypeMismatch { pipeline: tag.to_string(), expected });
        }
        Ok(pipeline)
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice, tag: PipelineType, command_buffer: CommandBufferHandle) -> Result<()> {
        self.get(tag)?.bind(device, command_buffer)
    }

    pub fn push_constants(
        &self,
        device: &mut dyn GraphicsDevice,
        tag: PipelineType,
        command_buffer: CommandBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.get(tag)?.push_constants(device, command_buffer, offset, data)
    }

    pub fn bind_descriptor_set(
        &self,
        device: &mut dyn GraphicsDevice,
        tag: PipelineType,
        command_buffer: CommandBufferHandle,
        set_index: u32,
        set: DescriptorSetHandle,
    ) -> Result<()> {
        self.get(tag)?.bind_descriptor_set(device, command_buffer, set_index, set)
    }

    /// Draw `objects` with the graphics pipeline under `tag`
    pub fn render(
        &self,
        device: &mut dyn GraphicsDevice,
        tag: PipelineType,
        info: &RenderInfo,
        objects: &[&RenderObject],
    ) -> Result<()> {
        self.checked(tag, PipelineKind::supports_graphics, "graphics")?
            .render(device, info, objects)
    }

    /// Record the compute dispatch of the pipeline under `tag`
    pub fn compute(
        &self,
        device: &mut dyn GraphicsDevice,
        tag: PipelineType,
        command_buffer: CommandBufferHandle,
        frame: usize,
    ) -> Result<()> {
        self.checked(tag, PipelineKind::supports_compute, "compute")?
            .compute(device, command_buffer, frame)
    }

    pub fn trace_rays(&self, device: &mut dyn GraphicsDevice, tag: PipelineType, info: &RenderInfo) -> Result<()> {
        self.checked(tag, PipelineKind::supports_ray_tracing, "ray tracing")?
            .trace_rays(device, info)
    }

    /// Destroy every pipeline
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for tag in self.order.drain(..) {
            if let Some(mut pipeline) = self.pipelines.remove(&tag) {
                pipeline.destroy(device);
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_manager_tests.rs"]
mod tests;
