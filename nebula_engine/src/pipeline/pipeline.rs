/// Pipeline capability trait and the core every pipeline is composed of
///
/// A pipeline is built once from an options value and never mutated.
/// `PipelineCore` owns the native handles (set layouts, pipeline layout,
/// pipeline); concrete pipelines wrap a core and add their own per-frame
/// resources. Capabilities are declared by `PipelineKind`: calling an
/// entry point the kind does not support yields `PipelineTypeMismatch`.

use std::fmt;

use crate::device::*;
use crate::engine_debug;
use crate::error::{Error, Result};
use crate::pipeline::options::GraphicsPipelineOptions;
use crate::pipeline::shader::ShaderSource;
use crate::render::{RenderInfo, RenderObject};

/// What a pipeline can be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
    /// Compute dispatch feeding a graphics pipeline (particles)
    GraphicsCompute,
    RayTracing,
}

impl PipelineKind {
    pub fn supports_graphics(self) -> bool {
        matches!(self, PipelineKind::Graphics | PipelineKind::GraphicsCompute)
    }

    pub fn supports_compute(self) -> bool {
        matches!(self, PipelineKind::Compute | PipelineKind::GraphicsCompute)
    }

    pub fn supports_ray_tracing(self) -> bool {
        self == PipelineKind::RayTracing
    }

    /// Bind point of the pipeline handle owned by the core
    pub fn bind_point(self) -> BindPoint {
        match self {
            PipelineKind::Graphics | PipelineKind::GraphicsCompute => BindPoint::Graphics,
            PipelineKind::Compute => BindPoint::Compute,
            PipelineKind::RayTracing => BindPoint::RayTracing,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PipelineKind::Graphics => "graphics",
            PipelineKind::Compute => "compute",
            PipelineKind::GraphicsCompute => "graphics+compute",
            PipelineKind::RayTracing => "ray tracing",
        }
    }
}

/// Registry key of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineType {
    /// Depth-only single-view shadow pass (spot lights)
    Shadow,
    /// Depth-only multiview shadow pass (point lights, six cube faces)
    ShadowCube,
    /// Object id pass read back by mouse picking
    MousePicking,
    /// Debug lines
    Lines,
    /// Application pipeline
    Custom(&'static str),
}

impl PipelineType {
    /// Engine pipelines driven by dedicated passes, never by scene requests
    pub fn is_builtin(self) -> bool {
        !matches!(self, PipelineType::Custom(_))
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineType::Shadow => write!(f, "shadow"),
            PipelineType::ShadowCube => write!(f, "shadow_cube"),
            PipelineType::MousePicking => write!(f, "mouse_picking"),
            PipelineType::Lines => write!(f, "lines"),
            PipelineType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Part of the offscreen pass a graphics pipeline draws in
///
/// Overlay pipelines are drawn after the depth attachment is cleared, so
/// they are never hidden by scene geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderLayer {
    #[default]
    Scene,
    Overlay,
}

/// Native handles shared by every pipeline kind
#[derive(Debug)]
pub struct PipelineCore {
    label: String,
    kind: PipelineKind,
    layout: PipelineLayoutHandle,
    handle: PipelineHandle,
    set_layouts: Vec<DescriptorSetLayoutHandle>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineCore {
    /// Create the set layouts and the pipeline layout, then the pipeline via `create`
    ///
    /// Everything created so far is released if a step fails.
    pub fn build<F>(
        device: &mut dyn GraphicsDevice,
        label: &str,
        kind: PipelineKind,
        set_bindings: &[Vec<DescriptorBinding>],
        push_constant_ranges: &[PushConstantRange],
        create: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut dyn GraphicsDevice, PipelineLayoutHandle) -> Result<PipelineHandle>,
    {
        let mut core = Self {
            label: label.to_string(),
            kind,
            layout: PipelineLayoutHandle::default(),
            handle: PipelineHandle::default(),
            set_layouts: Vec::with_capacity(set_bindings.len()),
            push_constant_ranges: push_constant_ranges.to_vec(),
        };
        if let Err(e) = core.create_handles(device, set_bindings, create) {
            core.destroy(device);
            return Err(e);
        }
        engine_debug!(
            "nebula::pipeline",
            "Created {} pipeline '{}' ({} sets, {} push constant ranges)",
            kind.name(),
            label,
            core.set_layouts.len(),
            core.push_constant_ranges.len()
        );
        Ok(core)
    }

    fn create_handles<F>(
        &mut self,
        device: &mut dyn GraphicsDevice,
        set_bindings: &[Vec<DescriptorBinding>],
        create: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut dyn GraphicsDevice, PipelineLayoutHandle) -> Result<PipelineHandle>,
    {
        for bindings in set_bindings {
            self.set_layouts.push(device.create_descriptor_set_layout(bindings)?);
        }
        self.layout = device.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: self.set_layouts.clone(),
            push_constant_ranges: self.push_constant_ranges.clone(),
        })?;
        self.handle = create(&mut *device, self.layout)?;
        Ok(())
    }

    /// Graphics pipeline from `options`, with `set_bindings` as the full set list
    pub fn graphics(
        device: &mut dyn GraphicsDevice,
        kind: PipelineKind,
        options: &GraphicsPipelineOptions,
        set_bindings: &[Vec<DescriptorBinding>],
    ) -> Result<Self> {
        Self::build(
            device,
            &options.label,
            kind,
            set_bindings,
            &options.push_constant_ranges,
            |device, layout| {
                with_shader_modules(device, &options.shaders, |device, stages| {
                    device.create_graphics_pipeline(&GraphicsPipelineDesc {
                        stages: stages.to_vec(),
                        vertex_layout: options.vertex_layout.clone(),
                        topology: options.topology,
                        rasterization: options.rasterization,
                        depth_stencil: options.depth_stencil,
                        blend: options.blend.clone(),
                        samples: options.samples,
                        layout,
                        render: options.render.clone(),
                    })
                })
            },
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn set_layout(&self, index: usize) -> Option<DescriptorSetLayoutHandle> {
        self.set_layouts.get(index).copied()
    }

    pub fn set_count(&self) -> usize {
        self.set_layouts.len()
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle) -> Result<()> {
        device.cmd_bind_pipeline(command_buffer, self.kind.bind_point(), self.handle)
    }

    /// Push `data` at `offset`; the range must lie inside the declared ranges
    pub fn push_constants(
        &self,
        device: &mut dyn GraphicsDevice,
        command_buffer: CommandBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        let end = u32::try_from(data.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .ok_or_else(|| {
                Error::InvalidResource(format!(
                    "pipeline '{}': {} push constant bytes at offset {} overflow",
                    self.label,
                    data.len(),
                    offset
                ))
            })?;
        let range_end = |r: &PushConstantRange| u64::from(r.offset) + u64::from(r.size);
        let stages = self
            .push_constant_ranges
            .iter()
            .filter(|r| u64::from(offset) < range_end(r) && r.offset < end)
            .fold(ShaderStageFlags::empty(), |acc, r| acc | r.stages);
        let covered = self
            .push_constant_ranges
            .iter()
            .any(|r| r.offset <= offset && u64::from(end) <= range_end(r));
        if !covered || stages.is_empty() {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}' has no push constant range covering {}..{}",
                self.label, offset, end
            )));
        }
        device.cmd_push_constants(command_buffer, self.layout, stages, offset, data)
    }

    pub fn bind_descriptor_set(
        &self,
        device: &mut dyn GraphicsDevice,
        command_buffer: CommandBufferHandle,
        set_index: u32,
        set: DescriptorSetHandle,
    ) -> Result<()> {
        if set_index as usize >= self.set_layouts.len() {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}' has no descriptor set {}",
                self.label, set_index
            )));
        }
        device.cmd_bind_descriptor_sets(command_buffer, self.kind.bind_point(), self.layout, set_index, &[set])
    }

    /// Release pipeline, layout and set layouts (in that order)
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        device.destroy_pipeline(&mut self.handle);
        device.destroy_pipeline_layout(&mut self.layout);
        for layout in &mut self.set_layouts {
            device.destroy_descriptor_set_layout(layout);
        }
        self.set_layouts.clear();
    }
}

/// Load and create one module per stage, run `f`, then destroy the modules
///
/// Modules are only needed while the pipeline is created.
pub fn with_shader_modules<T, F>(
    device: &mut dyn GraphicsDevice,
    shaders: &[(ShaderStage, ShaderSource)],
    f: F,
) -> Result<T>
where
    F: FnOnce(&mut dyn GraphicsDevice, &[(ShaderStage, ShaderModuleHandle)]) -> Result<T>,
{
    let mut modules = Vec::with_capacity(shaders.len());
    let mut created = Ok(());
    for (stage, source) in shaders {
        match source.load().and_then(|code| device.create_shader_module(&code)) {
            Ok(module) => modules.push((*stage, module)),
            Err(e) => {
                created = Err(e);
                break;
            }
        }
    }
    let result = created.and_then(|_| f(&mut *device, &modules));
    for (_, module) in &mut modules {
        device.destroy_shader_module(module);
    }
    result
}

/// Uniform contract over graphics, compute and ray tracing pipelines
///
/// Entry points a pipeline's kind does not support default to
/// `Error::PipelineTypeMismatch`.
pub trait Pipeline {
    fn core(&self) -> &PipelineCore;

    fn core_mut(&mut self) -> &mut PipelineCore;

    fn name(&self) -> &str {
        self.core().label()
    }

    fn kind(&self) -> PipelineKind {
        self.core().kind()
    }

    fn render_layer(&self) -> RenderLayer {
        RenderLayer::Scene
    }

    fn bind(&self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle) -> Result<()> {
        self.core().bind(device, command_buffer)
    }

    fn push_constants(
        &self,
        device: &mut dyn GraphicsDevice,
        command_buffer: CommandBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.core().push_constants(device, command_buffer, offset, data)
    }

    fn bind_descriptor_set(
        &self,
        device: &mut dyn GraphicsDevice,
        command_buffer: CommandBufferHandle,
        set_index: u32,
        set: DescriptorSetHandle,
    ) -> Result<()> {
        self.core().bind_descriptor_set(device, command_buffer, set_index, set)
    }

    /// Record draws of `objects` into `info.command_buffer`
    fn render(&self, _device: &mut dyn GraphicsDevice, _info: &RenderInfo, _objects: &[&RenderObject]) -> Result<()> {
        Err(Error::PipelineTypeMismatch { pipeline: self.name().to_string(), expected: "graphics" })
    }

    /// Record the compute dispatch of frame slot `frame`
    fn compute(
        &self,
        _device: &mut dyn GraphicsDevice,
        _command_buffer: CommandBufferHandle,
        _frame: usize,
    ) -> Result<()> {
        Err(Error::PipelineTypeMismatch { pipeline: self.name().to_string(), expected: "compute" })
    }

    fn trace_rays(&self, _device: &mut dyn GraphicsDevice, _info: &RenderInfo) -> Result<()> {
        Err(Error::PipelineTypeMismatch { pipeline: self.name().to_string(), expected: "ray tracing" })
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.core_mut().destroy(device);
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
