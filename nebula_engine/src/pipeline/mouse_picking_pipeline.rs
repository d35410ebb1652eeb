/// Object-id pipeline used by mouse picking
///
/// Writes each object's id into an R32_UINT color attachment. Everything
/// the shaders need travels in one push constant, so the pipeline has no
/// descriptor sets.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::device::*;
use crate::error::Result;
use crate::pipeline::options::GraphicsPipelineOptions;
use crate::pipeline::pipeline::{Pipeline, PipelineCore, PipelineKind};
use crate::pipeline::shader::ShaderSource;
use crate::render::{RenderInfo, RenderObject, Vertex};

/// Per-draw push constant
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PickingPushConstants {
    pub mvp: Mat4,
    pub object_id: u32,
    pub _pad: [u32; 3],
}

#[derive(Debug)]
pub struct MousePickingPipeline {
    core: PipelineCore,
}

impl MousePickingPipeline {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        vertex: ShaderSource,
        fragment: ShaderSource,
        depth_format: Format,
    ) -> Result<Self> {
        let render = RenderDescription::Dynamic {
            color_formats: vec![MOUSE_PICKING_FORMAT],
            depth_format,
            view_mask: 0,
        };
        let options = GraphicsPipelineOptions::new("mouse_picking", render)
            .with_shader(ShaderStage::Vertex, vertex)
            .with_shader(ShaderStage::Fragment, fragment)
            .with_vertex_layout(Vertex::layout())
            .with_push_constants(
                ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
                std::mem::size_of::<PickingPushConstants>() as u32,
            );
        let core = PipelineCore::graphics(device, PipelineKind::Graphics, &options, &[])?;
        Ok(Self { core })
    }
}

impl Pipeline for MousePickingPipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        &mut self.core
    }

    fn render(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo, objects: &[&RenderObject]) -> Result<()> {
        let command_buffer = info.command_buffer;
        let view_projection = info.view_projection();
        self.core.bind(device, command_buffer)?;
        for object in objects {
            let push = PickingPushConstants {
                mvp: view_projection * object.transform(),
                object_id: object.id(),
                _pad: [0; 3],
            };
            self.core.push_constants(device, command_buffer, 0, bytemuck::bytes_of(&push))?;
            object.draw(device, command_buffer)?;
        }
        Ok(())
    }
}
