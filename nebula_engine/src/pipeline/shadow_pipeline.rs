/// Depth-only shadow pipeline
///
/// Set 0 is the shadow uniform: light-space matrices for up to
/// `MAX_SHADOW_CASTERS` lights, one buffer per frame slot. Each draw pushes
/// the object's model matrix and the light slot. The cube variant renders
/// all six faces in one multiview pass and selects the matrix with the
/// view index.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::descriptor::DescriptorSet;
use crate::device::*;
use crate::error::{Error, Result};
use crate::pipeline::options::GraphicsPipelineOptions;
use crate::pipeline::pipeline::{Pipeline, PipelineCore, PipelineKind};
use crate::pipeline::shader::ShaderSource;
use crate::render::{LightView, RenderInfo, RenderObject, CUBE_VIEW_MASK};

/// Lights that can cast shadows in one frame
pub const MAX_SHADOW_CASTERS: usize = 8;

const SHADOW_BINDINGS: [DescriptorBinding; 1] = [DescriptorBinding {
    binding: 0,
    descriptor_type: DescriptorType::UniformBuffer,
    count: 1,
    stages: ShaderStageFlags::VERTEX,
}];

/// One light's entry in the shadow uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightSlot {
    pub view_projections: [Mat4; 6],
    /// xyz = light position, w = far plane
    pub position: Vec4,
}

impl From<&LightView> for LightSlot {
    fn from(light: &LightView) -> Self {
        Self { view_projections: light.view_projections, position: light.position.extend(light.far) }
    }
}

/// Shadow uniform (set 0, binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowUniform {
    pub lights: [LightSlot; MAX_SHADOW_CASTERS],
}

/// Per-draw push constant
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowPushConstants {
    pub model: Mat4,
    pub light_slot: u32,
    pub _pad: [u32; 3],
}

#[derive(Debug)]
pub struct ShadowPipeline {
    core: PipelineCore,
    cube: bool,
    uniform_buffers: Vec<BufferHandle>,
    set: DescriptorSet,
}

impl ShadowPipeline {
    /// Shadow pipeline rendering into `depth_format`; `cube` selects the multiview variant
    pub fn new(device: &mut dyn GraphicsDevice, shader: ShaderSource, depth_format: Format, cube: bool) -> Result<Self> {
        let label = if cube { "shadow_cube" } else { "shadow" };
        let options = Self::options(label, shader, depth_format, cube);
        let mut core = PipelineCore::graphics(device, PipelineKind::Graphics, &options, &[SHADOW_BINDINGS.to_vec()])?;

        let mut uniform_buffers = Vec::new();
        match Self::create_uniforms(device, &core, &mut uniform_buffers) {
            Ok(set) => Ok(Self { core, cube, uniform_buffers, set }),
            Err(e) => {
                for buffer in &mut uniform_buffers {
                    device.destroy_buffer(buffer);
                }
                core.destroy(device);
                Err(e)
            }
        }
    }

    fn options(label: &str, shader: ShaderSource, depth_format: Format, cube: bool) -> GraphicsPipelineOptions {
        let render = RenderDescription::Dynamic {
            color_formats: Vec::new(),
            depth_format,
            view_mask: if cube { CUBE_VIEW_MASK } else { 0 },
        };
        GraphicsPipelineOptions::new(label, render)
            .with_shader(ShaderStage::Vertex, shader)
            .with_vertex_layout(VertexLayout {
                stride: std::mem::size_of::<crate::render::Vertex>() as u32,
                attributes: vec![VertexAttribute { location: 0, format: VertexFormat::Float3, offset: 0 }],
            })
            .with_rasterization(RasterizationState {
                cull_mode: CullMode::None,
                depth_bias: Some((1.25, 1.75)),
                ..RasterizationState::default()
            })
            .with_depth_stencil(DepthStencilState {
                depth_test: true,
                depth_write: true,
                compare_op: CompareOp::LessOrEqual,
            })
            .with_push_constants(ShaderStageFlags::VERTEX, std::mem::size_of::<ShadowPushConstants>() as u32)
    }

    fn create_uniforms(
        device: &mut dyn GraphicsDevice,
        core: &PipelineCore,
        buffers: &mut Vec<BufferHandle>,
    ) -> Result<DescriptorSet> {
        let size = std::mem::size_of::<ShadowUniform>() as u64;
        for frame in 0..device.max_frames_in_flight() {
            buffers.push(device.create_buffer(&BufferDesc {
                size,
                usage: BufferUsage::UNIFORM,
                location: MemoryLocation::CpuToGpu,
                label: format!("shadow uniform #{}", frame),
            })?);
        }
        let layout = core
            .set_layout(0)
            .ok_or_else(|| Error::InvalidResource("shadow set layout missing".to_string()))?;
        let mut set = DescriptorSet::with_layout(device, layout, &SHADOW_BINDINGS)?;
        let update = set.update(device, |frame| {
            vec![DescriptorWrite {
                binding: 0,
                resource: DescriptorResource::Buffer { buffer: buffers[frame], offset: 0, range: size },
            }]
        });
        if let Err(e) = update {
            set.destroy(device);
            return Err(e);
        }
        Ok(set)
    }

    pub fn is_cube(&self) -> bool {
        self.cube
    }

    /// Uniform buffer of frame slot `frame` (fragment shaders sample shadows with it)
    pub fn uniform_buffer(&self, frame: usize) -> Option<BufferHandle> {
        self.uniform_buffers.get(frame).copied()
    }

    fn write_light(&self, device: &mut dyn GraphicsDevice, frame: usize, light: &LightView) -> Result<()> {
        if light.slot >= MAX_SHADOW_CASTERS {
            return Err(Error::InvalidResource(format!(
                "light slot {} exceeds {} shadow casters",
                light.slot, MAX_SHADOW_CASTERS
            )));
        }
        let buffer = self
            .uniform_buffer(frame)
            .ok_or_else(|| Error::InvalidResource(format!("no shadow uniform for frame {}", frame)))?;
        let slot = LightSlot::from(light);
        let offset = light.slot * std::mem::size_of::<LightSlot>();
        with_mapped_memory(device, buffer, |bytes| {
            let src = bytemuck::bytes_of(&slot);
            let dst = bytes
                .get_mut(offset..offset + src.len())
                .ok_or_else(|| Error::InvalidResource("shadow uniform too small".to_string()))?;
            dst.copy_from_slice(src);
            Ok(())
        })
    }
}

impl Pipeline for ShadowPipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        &mut self.core
    }

    /// Draw every shadow-casting object from `info.light`
    fn render(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo, objects: &[&RenderObject]) -> Result<()> {
        let light = info
            .light
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("shadow pass without a light".to_string()))?;
        self.write_light(device, info.frame, light)?;

        let command_buffer = info.command_buffer;
        self.core.bind(device, command_buffer)?;
        self.core.bind_descriptor_set(device, command_buffer, 0, self.set.set(info.frame)?)?;
        for object in objects.iter().filter(|o| o.casts_shadows()) {
            let push = ShadowPushConstants {
                model: object.transform(),
                light_slot: light.slot as u32,
                _pad: [0; 3],
            };
            self.core.push_constants(device, command_buffer, 0, bytemuck::bytes_of(&push))?;
            object.draw(device, command_buffer)?;
        }
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.set.destroy(device);
        for buffer in &mut self.uniform_buffers {
            device.destroy_buffer(buffer);
        }
        self.uniform_buffers.clear();
        self.core.destroy(device);
    }
}
