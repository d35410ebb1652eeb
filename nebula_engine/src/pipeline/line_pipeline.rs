/// Debug line pipeline
///
/// Draws the line batch written for the current frame. Lines are depth
/// tested against the scene but never write depth.

use glam::Mat4;

use crate::device::*;
use crate::error::Result;
use crate::pipeline::options::GraphicsPipelineOptions;
use crate::pipeline::pipeline::{Pipeline, PipelineCore, PipelineKind};
use crate::pipeline::shader::ShaderSource;
use crate::render::{LineVertex, RenderInfo, RenderObject};

#[derive(Debug)]
pub struct LinePipeline {
    core: PipelineCore,
}

impl LinePipeline {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        vertex: ShaderSource,
        fragment: ShaderSource,
        render: RenderDescription,
        samples: SampleCount,
    ) -> Result<Self> {
        let options = GraphicsPipelineOptions::new("lines", render)
            .with_shader(ShaderStage::Vertex, vertex)
            .with_shader(ShaderStage::Fragment, fragment)
            .with_vertex_layout(LineVertex::layout())
            .with_topology(PrimitiveTopology::LineList)
            .with_rasterization(RasterizationState { cull_mode: CullMode::None, ..RasterizationState::default() })
            .with_depth_stencil(DepthStencilState { depth_test: true, depth_write: false, compare_op: CompareOp::LessOrEqual })
            .with_blend(BlendState::ALPHA)
            .with_samples(samples)
            .with_push_constants(ShaderStageFlags::VERTEX, std::mem::size_of::<Mat4>() as u32);
        let core = PipelineCore::graphics(device, PipelineKind::Graphics, &options, &[])?;
        Ok(Self { core })
    }
}

impl Pipeline for LinePipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        &mut self.core
    }

    /// Draw `info.lines`; objects are ignored
    fn render(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo, _objects: &[&RenderObject]) -> Result<()> {
        let Some(lines) = info.lines else {
            return Ok(());
        };
        if lines.vertex_count == 0 {
            return Ok(());
        }
        let command_buffer = info.command_buffer;
        self.core.bind(device, command_buffer)?;
        self.core
            .push_constants(device, command_buffer, 0, bytemuck::bytes_of(&info.view_projection()))?;
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[(lines.buffer, 0)])?;
        device.cmd_draw(command_buffer, lines.vertex_count, 1, 0, 0)
    }
}
