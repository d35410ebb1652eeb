/// Scene graphics pipeline with a per-pass and a per-object uniform
///
/// Set 0 holds the pass uniform (camera and viewport), owned by the
/// pipeline with one buffer per frame slot. Set 1 is the per-object
/// uniform owned by each `RenderObject`. Sets declared in the options
/// follow from set 2.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::descriptor::DescriptorSet;
use crate::device::*;
use crate::error::{Error, Result};
use crate::pipeline::options::GraphicsPipelineOptions;
use crate::pipeline::pipeline::{Pipeline, PipelineCore, PipelineKind, RenderLayer};
use crate::render::{RenderInfo, RenderObject, OBJECT_BINDINGS, OBJECT_SET};

/// Descriptor set index of the pass uniform
pub const PASS_SET: u32 = 0;

/// Layout of the pass descriptor set
pub const PASS_BINDINGS: [DescriptorBinding; 1] = [DescriptorBinding {
    binding: 0,
    descriptor_type: DescriptorType::UniformBuffer,
    count: 1,
    stages: ShaderStageFlags::VERTEX.union(ShaderStageFlags::FRAGMENT),
}];

/// Per-pass uniform (set 0, binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PassUniform {
    pub view: Mat4,
    pub projection: Mat4,
    /// xyz = camera position
    pub camera_position: Vec4,
    /// xy = viewport size in pixels, zw = 1 / size
    pub viewport: Vec4,
}

impl PassUniform {
    pub fn from_info(info: &RenderInfo) -> Self {
        let width = info.extent.width.max(1) as f32;
        let height = info.extent.height.max(1) as f32;
        Self {
            view: info.view,
            projection: info.projection(),
            camera_position: info.camera_position().extend(1.0),
            viewport: Vec4::new(width, height, 1.0 / width, 1.0 / height),
        }
    }
}

#[derive(Debug)]
pub struct GraphicsPipeline {
    core: PipelineCore,
    layer: RenderLayer,
    pass_buffers: Vec<BufferHandle>,
    pass_set: DescriptorSet,
}

impl GraphicsPipeline {
    pub fn new(device: &mut dyn GraphicsDevice, options: &GraphicsPipelineOptions) -> Result<Self> {
        Self::with_kind(device, PipelineKind::Graphics, options)
    }

    pub(crate) fn with_kind(
        device: &mut dyn GraphicsDevice,
        kind: PipelineKind,
        options: &GraphicsPipelineOptions,
    ) -> Result<Self> {
        let mut set_bindings = vec![PASS_BINDINGS.to_vec(), OBJECT_BINDINGS.to_vec()];
        set_bindings.extend(options.set_layouts.iter().cloned());
        let mut core = PipelineCore::graphics(device, kind, options, &set_bindings)?;

        let mut pass_buffers = Vec::new();
        let pass_set = match Self::create_pass_resources(device, &core, &options.label, &mut pass_buffers) {
            Ok(set) => set,
            Err(e) => {
                for buffer in &mut pass_buffers {
                    device.destroy_buffer(buffer);
                }
                core.destroy(device);
                return Err(e);
            }
        };

        Ok(Self { core, layer: options.layer, pass_buffers, pass_set })
    }

    fn create_pass_resources(
        device: &mut dyn GraphicsDevice,
        core: &PipelineCore,
        label: &str,
        buffers: &mut Vec<BufferHandle>,
    ) -> Result<DescriptorSet> {
        for frame in 0..device.max_frames_in_flight() {
            buffers.push(device.create_buffer(&BufferDesc {
                size: std::mem::size_of::<PassUniform>() as u64,
                usage: BufferUsage::UNIFORM,
                location: MemoryLocation::CpuToGpu,
                label: format!("{} pass uniform #{}", label, frame),
            })?);
        }
        let layout = core
            .set_layout(PASS_SET as usize)
            .ok_or_else(|| Error::InvalidResource("pass set layout missing".to_string()))?;
        let mut set = DescriptorSet::with_layout(device, layout, &PASS_BINDINGS)?;
        let update = set.update(device, |frame| {
            vec![DescriptorWrite {
                binding: 0,
                resource: DescriptorResource::Buffer {
                    buffer: buffers[frame],
                    offset: 0,
                    range: std::mem::size_of::<PassUniform>() as u64,
                },
            }]
        });
        if let Err(e) = update {
            set.destroy(device);
            return Err(e);
        }
        Ok(set)
    }

    /// Set of frame slot `frame` for set index `PASS_SET`
    pub fn pass_set(&self, frame: usize) -> Result<DescriptorSetHandle> {
        self.pass_set.set(frame)
    }
}

impl Pipeline for GraphicsPipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        &mut self.core
    }

    fn render_layer(&self) -> RenderLayer {
        self.layer
    }

    fn render(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo, objects: &[&RenderObject]) -> Result<()> {
        let command_buffer = info.command_buffer;
        let buffer = self
            .pass_buffers
            .get(info.frame)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("no pass uniform for frame {}", info.frame)))?;
        write_buffer(device, buffer, &PassUniform::from_info(info))?;

        self.core.bind(device, command_buffer)?;
        self.core
            .bind_descriptor_set(device, command_buffer, PASS_SET, self.pass_set.set(info.frame)?)?;

        let projection = info.projection();
        for object in objects {
            object.update_uniform(device, info.frame, info.view, projection)?;
            self.core
                .bind_descriptor_set(device, command_buffer, OBJECT_SET, object.descriptor_set(info.frame)?)?;
            object.draw(device, command_buffer)?;
        }
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.pass_set.destroy(device);
        for buffer in &mut self.pass_buffers {
            device.destroy_buffer(buffer);
        }
        self.pass_buffers.clear();
        self.core.destroy(device);
    }
}
