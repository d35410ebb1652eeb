/// Compute pipelines and the compute + graphics composition

use crate::descriptor::DescriptorSet;
use crate::device::*;
use crate::error::{Error, Result};
use crate::pipeline::graphics_pipeline::GraphicsPipeline;
use crate::pipeline::options::{ComputePipelineOptions, GraphicsPipelineOptions};
use crate::pipeline::pipeline::{with_shader_modules, Pipeline, PipelineCore, PipelineKind, RenderLayer};
use crate::render::{RenderInfo, RenderObject};

/// Compute pipeline with one descriptor set per declared set layout
///
/// The sets are allocated per frame slot; callers fill them through
/// `descriptor_set` and `compute` binds them all before dispatching.
#[derive(Debug)]
pub struct ComputePipeline {
    core: PipelineCore,
    workgroups: [u32; 3],
    sets: Vec<DescriptorSet>,
}

impl ComputePipeline {
    pub fn new(device: &mut dyn GraphicsDevice, options: &ComputePipelineOptions) -> Result<Self> {
        let shaders = [(ShaderStage::Compute, options.shader.clone())];
        let mut core = PipelineCore::build(
            device,
            &options.label,
            PipelineKind::Compute,
            &options.set_layouts,
            &options.push_constant_ranges,
            |device, layout| {
                with_shader_modules(device, &shaders, |device, modules| {
                    device.create_compute_pipeline(&ComputePipelineDesc { module: modules[0].1, layout })
                })
            },
        )?;

        let mut sets = Vec::with_capacity(options.set_layouts.len());
        for (index, bindings) in options.set_layouts.iter().enumerate() {
            let allocated = core
                .set_layout(index)
                .ok_or_else(|| Error::InvalidResource(format!("set layout {} missing", index)))
                .and_then(|layout| DescriptorSet::with_layout(device, layout, bindings));
            match allocated {
                Ok(set) => sets.push(set),
                Err(e) => {
                    for set in &mut sets {
                        set.destroy(device);
                    }
                    core.destroy(device);
                    return Err(e);
                }
            }
        }

        Ok(Self { core, workgroups: options.workgroups, sets })
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    pub fn descriptor_set(&self, index: usize) -> Option<&DescriptorSet> {
        self.sets.get(index)
    }
}

impl Pipeline for ComputePipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        &mut self.core
    }

    fn compute(&self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle, frame: usize) -> Result<()> {
        self.core.bind(device, command_buffer)?;
        for (index, set) in self.sets.iter().enumerate() {
            self.core
                .bind_descriptor_set(device, command_buffer, index as u32, set.set(frame)?)?;
        }
        let [x, y, z] = self.workgroups;
        device.cmd_dispatch(command_buffer, x, y, z)
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for set in &mut self.sets {
            set.destroy(device);
        }
        self.sets.clear();
        self.core.destroy(device);
    }
}

/// A compute pass producing data drawn by a graphics pipeline (particles)
///
/// The compute half is dispatched on the compute queue before the
/// offscreen pass; the graphics half draws in the offscreen pass.
#[derive(Debug)]
pub struct ComputeGraphicsPipeline {
    graphics: GraphicsPipeline,
    compute: ComputePipeline,
}

impl ComputeGraphicsPipeline {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        graphics: &GraphicsPipelineOptions,
        compute: &ComputePipelineOptions,
    ) -> Result<Self> {
        let mut compute = ComputePipeline::new(device, compute)?;
        match GraphicsPipeline::with_kind(device, PipelineKind::GraphicsCompute, graphics) {
            Ok(graphics) => Ok(Self { graphics, compute }),
            Err(e) => {
                compute.destroy(device);
                Err(e)
            }
        }
    }

    pub fn compute_pipeline(&self) -> &ComputePipeline {
        &self.compute
    }

    pub fn graphics_pipeline(&self) -> &GraphicsPipeline {
        &self.graphics
    }
}

impl Pipeline for ComputeGraphicsPipeline {
    fn core(&self) -> &PipelineCore {
        self.graphics.core()
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        self.graphics.core_mut()
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::GraphicsCompute
    }

    fn render_layer(&self) -> RenderLayer {
        self.graphics.render_layer()
    }

    fn render(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo, objects: &[&RenderObject]) -> Result<()> {
        self.graphics.render(device, info, objects)
    }

    fn compute(&self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle, frame: usize) -> Result<()> {
        self.compute.compute(device, command_buffer, frame)
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.graphics.destroy(device);
        self.compute.destroy(device);
    }
}
