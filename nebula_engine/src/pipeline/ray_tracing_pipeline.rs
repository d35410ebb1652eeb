/// Ray tracing pipeline writing into its own storage image
///
/// Between traces the output rests in `ShaderReadOnly` so later passes can
/// sample it; each trace moves it to `General` and back.

use crate::descriptor::DescriptorSet;
use crate::device::*;
use crate::error::{Error, Result};
use crate::image::{ImageResource, ImageResourceConfig, ImageRole};
use crate::pipeline::options::RayTracingPipelineOptions;
use crate::pipeline::pipeline::{with_shader_modules, Pipeline, PipelineCore, PipelineKind};
use crate::render::RenderInfo;

/// Layout of set 0: the output storage image
pub const OUTPUT_BINDINGS: [DescriptorBinding; 1] = [DescriptorBinding {
    binding: 0,
    descriptor_type: DescriptorType::StorageImage,
    count: 1,
    stages: ShaderStageFlags::RAYGEN,
}];

#[derive(Debug)]
pub struct RayTracingPipeline {
    core: PipelineCore,
    output: ImageResource,
    output_set: DescriptorSet,
}

impl RayTracingPipeline {
    pub fn new(device: &mut dyn GraphicsDevice, options: &RayTracingPipelineOptions) -> Result<Self> {
        if !device.supports_ray_tracing() {
            return Err(Error::InitializationFailed(format!(
                "ray tracing pipeline '{}' requires ray tracing support",
                options.label
            )));
        }

        let mut shaders = vec![(ShaderStage::RayGen, options.raygen.clone())];
        shaders.extend(options.miss.iter().map(|s| (ShaderStage::Miss, s.clone())));
        shaders.extend(options.closest_hit.iter().map(|s| (ShaderStage::ClosestHit, s.clone())));

        let mut set_bindings = vec![OUTPUT_BINDINGS.to_vec()];
        set_bindings.extend(options.set_layouts.iter().cloned());

        let mut core = PipelineCore::build(
            device,
            &options.label,
            PipelineKind::RayTracing,
            &set_bindings,
            &options.push_constant_ranges,
            |device, layout| {
                with_shader_modules(device, &shaders, |device, modules| {
                    let of_stage = |stage| {
                        modules
                            .iter()
                            .filter(move |(s, _)| *s == stage)
                            .map(|(_, module)| *module)
                            .collect::<Vec<_>>()
                    };
                    device.create_ray_tracing_pipeline(&RayTracingPipelineDesc {
                        raygen: modules[0].1,
                        miss: of_stage(ShaderStage::Miss),
                        closest_hit: of_stage(ShaderStage::ClosestHit),
                        layout,
                        max_recursion_depth: options.max_recursion_depth.max(1),
                    })
                })
            },
        )?;

        let output = ImageResource::new(
            device,
            &ImageResourceConfig {
                role: ImageRole::RayTracingOutput,
                extent: options.output_extent,
                color_format: options.output_format,
                depth_format: Format::Undefined,
                resolve_format: Format::Undefined,
                samples: SampleCount::S1,
                create_sampler: true,
                cube_map: false,
                layers: 1,
                label: format!("{} output", options.label),
            },
        );
        let mut output = match output {
            Ok(output) => output,
            Err(e) => {
                core.destroy(device);
                return Err(e);
            }
        };
        if let Err(e) = output.transition_to(device, ImageLayout::ShaderReadOnly) {
            output.destroy(device);
            core.destroy(device);
            return Err(e);
        }

        let output_set = core
            .set_layout(0)
            .ok_or_else(|| Error::InvalidResource("output set layout missing".to_string()))
            .and_then(|layout| DescriptorSet::with_layout(device, layout, &OUTPUT_BINDINGS))
            .and_then(|mut set| {
                let view = output.view();
                match set.update(device, |_| {
                    vec![DescriptorWrite { binding: 0, resource: DescriptorResource::StorageImage { view } }]
                }) {
                    Ok(()) => Ok(set),
                    Err(e) => {
                        set.destroy(device);
                        Err(e)
                    }
                }
            });
        match output_set {
            Ok(output_set) => Ok(Self { core, output, output_set }),
            Err(e) => {
                output.destroy(device);
                core.destroy(device);
                Err(e)
            }
        }
    }

    /// Storage image the raygen shader writes to
    pub fn output(&self) -> &ImageResource {
        &self.output
    }

    fn output_barrier(&self, from: ImageLayout, to: ImageLayout) -> BarrierBatch {
        ImageBarrier::transition(self.output.image(), self.output.format(), from, to)
            .layers(0, self.output.layer_count())
            .into()
    }
}

impl Pipeline for RayTracingPipeline {
    fn core(&self) -> &PipelineCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipelineCore {
        &mut self.core
    }

    fn trace_rays(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo) -> Result<()> {
        let command_buffer = info.command_buffer;
        let set = self.output_set.set(info.frame)?;
        device.cmd_pipeline_barrier(
            command_buffer,
            &self.output_barrier(ImageLayout::ShaderReadOnly, ImageLayout::General),
        )?;
        self.core.bind(device, command_buffer)?;
        self.core.bind_descriptor_set(device, command_buffer, 0, set)?;
        device.cmd_trace_rays(command_buffer, self.core.handle(), self.output.extent())?;
        device.cmd_pipeline_barrier(
            command_buffer,
            &self.output_barrier(ImageLayout::General, ImageLayout::ShaderReadOnly),
        )
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.output_set.destroy(device);
        self.output.destroy(device);
        self.core.destroy(device);
    }
}
