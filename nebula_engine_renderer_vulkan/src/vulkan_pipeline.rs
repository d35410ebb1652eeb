/// Pipeline and render pass creation
///
/// Graphics pipelines target either a legacy render pass or dynamic
/// rendering (with an optional multiview mask); viewport and scissor are
/// always dynamic. Ray tracing pipelines get a shader binding table built
/// right after creation and owned by the pipeline record.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use nebula_engine::engine_warn;
use nebula_engine::nebula::device::*;
use nebula_engine::nebula::{Error, Result};

use crate::vulkan_conversions::*;
use crate::vulkan_physical_device::RayTracingProperties;
use crate::vulkan_resources::{create_buffer_with_memory, creation_error, ResourceTables};

const SOURCE: &str = "nebula::vulkan::Pipeline";

const ENTRY_POINT: &std::ffi::CStr = c"main";

// ===== RENDER PASS =====

/// Single-subpass render pass
pub(crate) fn create_render_pass(device: &ash::Device, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
    let describe = |attachment: &AttachmentDesc| {
        let initial_layout = match attachment.load {
            LoadOp::Load => image_layout_to_vk(attachment.final_layout),
            LoadOp::Clear(_) | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
        };
        vk::AttachmentDescription::default()
            .format(format_to_vk(attachment.format))
            .samples(sample_count_to_vk(attachment.samples))
            .load_op(load_op_to_vk(attachment.load))
            .store_op(store_op_to_vk(attachment.store))
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(initial_layout)
            .final_layout(image_layout_to_vk(attachment.final_layout))
    };

    let mut attachments: Vec<vk::AttachmentDescription> = desc.color_attachments.iter().map(describe).collect();
    let color_refs: Vec<vk::AttachmentReference> = (0..desc.color_attachments.len() as u32)
        .map(|index| vk::AttachmentReference { attachment: index, layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL })
        .collect();
    let depth_ref = desc.depth_attachment.as_ref().map(|depth| {
        attachments.push(describe(depth));
        vk::AttachmentReference {
            attachment: attachments.len() as u32 - 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    });

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    unsafe { device.create_render_pass(&create_info, None) }.map_err(|e| creation_error("render pass", e))
}

// ===== GRAPHICS / COMPUTE =====

fn stage_info(
    tables: &ResourceTables,
    stage: ShaderStage,
    module: ShaderModuleHandle,
) -> Result<vk::PipelineShaderStageCreateInfo<'static>> {
    Ok(vk::PipelineShaderStageCreateInfo::default()
        .stage(shader_stage_to_vk(stage))
        .module(tables.shader_module(module)?)
        .name(ENTRY_POINT))
}

fn blend_attachment(blend: BlendState) -> vk::PipelineColorBlendAttachmentState {
    let attachment = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
    match blend {
        BlendState::Opaque => attachment.blend_enable(false),
        BlendState::Blend { src, dst, op } => attachment
            .blend_enable(true)
            .src_color_blend_factor(blend_factor_to_vk(src))
            .dst_color_blend_factor(blend_factor_to_vk(dst))
            .color_blend_op(blend_op_to_vk(op))
            .src_alpha_blend_factor(blend_factor_to_vk(src))
            .dst_alpha_blend_factor(blend_factor_to_vk(dst))
            .alpha_blend_op(blend_op_to_vk(op)),
    }
}

pub(crate) fn create_graphics_pipeline(
    device: &ash::Device,
    tables: &ResourceTables,
    desc: &GraphicsPipelineDesc,
) -> Result<vk::Pipeline> {
    let stages = desc
        .stages
        .iter()
        .map(|&(stage, module)| stage_info(tables, stage, module))
        .collect::<Result<Vec<_>>>()?;
    let layout = tables.pipeline_layout(desc.layout)?;

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: desc.vertex_layout.stride,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_layout
        .attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: 0,
            format: vertex_format_to_vk(attribute.format),
            offset: attribute.offset,
        })
        .collect();
    let vertex_input_state = if attributes.is_empty() {
        vk::PipelineVertexInputStateCreateInfo::default()
    } else {
        vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(std::slice::from_ref(&binding))
            .vertex_attribute_descriptions(&attributes)
    };

    let input_assembly_state =
        vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology_to_vk(desc.topology));

    let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

    let rasterization = &desc.rasterization;
    let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(polygon_mode_to_vk(rasterization.polygon_mode))
        .cull_mode(cull_mode_to_vk(rasterization.cull_mode))
        .front_face(front_face_to_vk(rasterization.front_face))
        .line_width(rasterization.line_width);
    if let Some((constant, slope)) = rasterization.depth_bias {
        rasterization_state = rasterization_state
            .depth_bias_enable(true)
            .depth_bias_constant_factor(constant)
            .depth_bias_slope_factor(slope);
    }

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_stencil.depth_test)
        .depth_write_enable(desc.depth_stencil.depth_write)
        .depth_compare_op(compare_op_to_vk(desc.depth_stencil.compare_op));

    let multisample_state =
        vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(sample_count_to_vk(desc.samples));

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> =
        desc.blend.iter().map(|&blend| blend_attachment(blend)).collect();
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let (color_formats, depth_format, view_mask) = match &desc.render {
        RenderDescription::Dynamic { color_formats, depth_format, view_mask } => {
            (color_formats.iter().map(|&format| format_to_vk(format)).collect(), *depth_format, *view_mask)
        }
        RenderDescription::RenderPass(_) => (Vec::new(), Format::Undefined, 0),
    };
    let stencil_format = if depth_format.has_stencil() { format_to_vk(depth_format) } else { vk::Format::UNDEFINED };
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .view_mask(view_mask)
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(format_to_vk(depth_format))
        .stencil_attachment_format(stencil_format);

    let mut create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .depth_stencil_state(&depth_stencil_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout);
    create_info = match &desc.render {
        RenderDescription::RenderPass(render_pass) => {
            create_info.render_pass(tables.render_pass(*render_pass)?).subpass(0)
        }
        RenderDescription::Dynamic { .. } => create_info.push_next(&mut rendering_info),
    };

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&create_info), None)
    }
    .map_err(|(_, e)| creation_error("graphics pipeline", e))?;
    first_pipeline(pipelines, "graphics pipeline")
}

pub(crate) fn create_compute_pipeline(
    device: &ash::Device,
    tables: &ResourceTables,
    desc: &ComputePipelineDesc,
) -> Result<vk::Pipeline> {
    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info(tables, ShaderStage::Compute, desc.module)?)
        .layout(tables.pipeline_layout(desc.layout)?);
    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&create_info), None)
    }
    .map_err(|(_, e)| creation_error("compute pipeline", e))?;
    first_pipeline(pipelines, "compute pipeline")
}

fn first_pipeline(pipelines: Vec<vk::Pipeline>, object: &'static str) -> Result<vk::Pipeline> {
    pipelines.into_iter().next().ok_or_else(|| Error::DeviceObjectCreation {
        object,
        reason: "driver returned no pipeline".to_string(),
    })
}

// ===== RAY TRACING =====

/// Shader binding table of one ray tracing pipeline
pub(crate) struct ShaderBindingTable {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
}

impl ShaderBindingTable {
    /// # Safety
    /// No trace command referencing the table may still be in flight.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut Allocator) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = allocator.free(allocation) {
                engine_warn!(SOURCE, "Failed to free shader binding table memory: {}", e);
            }
        }
        if self.buffer != vk::Buffer::null() {
            device.destroy_buffer(self.buffer, None);
            self.buffer = vk::Buffer::null();
        }
    }
}

/// Byte layout of a shader binding table: raygen, then miss, then hit regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SbtLayout {
    /// Stride between handles inside the miss and hit regions
    pub handle_stride: u64,
    pub raygen_size: u64,
    pub miss_offset: u64,
    pub miss_size: u64,
    pub hit_offset: u64,
    pub hit_size: u64,
}

impl SbtLayout {
    pub(crate) fn total_size(&self) -> u64 {
        self.hit_offset + self.hit_size
    }
}

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

pub(crate) fn sbt_layout(props: &RayTracingProperties, miss_count: u32, hit_count: u32) -> SbtLayout {
    let base = u64::from(props.base_alignment);
    let handle_stride = align_up(u64::from(props.handle_size), u64::from(props.handle_alignment));
    let raygen_size = align_up(handle_stride, base);
    let miss_size = align_up(handle_stride * u64::from(miss_count), base);
    let hit_size = align_up(handle_stride * u64::from(hit_count), base);
    SbtLayout {
        handle_stride,
        raygen_size,
        miss_offset: raygen_size,
        miss_size,
        hit_offset: raygen_size + miss_size,
        hit_size,
    }
}

/// Shader groups: one raygen, one per miss shader, one triangle hit group per closest-hit shader
fn shader_groups(miss_count: u32, hit_count: u32) -> Vec<vk::RayTracingShaderGroupCreateInfoKHR<'static>> {
    let general = |shader: u32| {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(shader)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
    };
    let mut groups = vec![general(0)];
    groups.extend((1..=miss_count).map(general));
    groups.extend((0..hit_count).map(|index| {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(1 + miss_count + index)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
    }));
    groups
}

pub(crate) fn create_ray_tracing_pipeline(
    device: &ash::Device,
    loader: &ash::khr::ray_tracing_pipeline::Device,
    allocator: &mut Allocator,
    tables: &ResourceTables,
    props: &RayTracingProperties,
    desc: &RayTracingPipelineDesc,
) -> Result<(vk::Pipeline, ShaderBindingTable)> {
    let mut stages = vec![stage_info(tables, ShaderStage::RayGen, desc.raygen)?];
    for &module in &desc.miss {
        stages.push(stage_info(tables, ShaderStage::Miss, module)?);
    }
    for &module in &desc.closest_hit {
        stages.push(stage_info(tables, ShaderStage::ClosestHit, module)?);
    }
    let miss_count = desc.miss.len() as u32;
    let hit_count = desc.closest_hit.len() as u32;
    let groups = shader_groups(miss_count, hit_count);

    let create_info = vk::RayTracingPipelineCreateInfoKHR::default()
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(desc.max_recursion_depth.clamp(1, props.max_recursion_depth.max(1)))
        .layout(tables.pipeline_layout(desc.layout)?);
    let pipelines = unsafe {
        loader.create_ray_tracing_pipelines(
            vk::DeferredOperationKHR::null(),
            vk::PipelineCache::null(),
            std::slice::from_ref(&create_info),
            None,
        )
    }
    .map_err(|(_, e)| creation_error("ray tracing pipeline", e))?;
    let pipeline = first_pipeline(pipelines, "ray tracing pipeline")?;

    match build_shader_binding_table(device, loader, allocator, props, pipeline, miss_count, hit_count) {
        Ok(sbt) => Ok((pipeline, sbt)),
        Err(e) => {
            unsafe { device.destroy_pipeline(pipeline, None) };
            Err(e)
        }
    }
}

fn build_shader_binding_table(
    device: &ash::Device,
    loader: &ash::khr::ray_tracing_pipeline::Device,
    allocator: &mut Allocator,
    props: &RayTracingProperties,
    pipeline: vk::Pipeline,
    miss_count: u32,
    hit_count: u32,
) -> Result<ShaderBindingTable> {
    let group_count = 1 + miss_count + hit_count;
    let handle_size = props.handle_size as usize;
    let handles = unsafe {
        loader.get_ray_tracing_shader_group_handles(pipeline, 0, group_count, group_count as usize * handle_size)
    }
    .map_err(|e| creation_error("shader group handles", e))?;

    let layout = sbt_layout(props, miss_count, hit_count);
    let buffer_info = vk::BufferCreateInfo::default()
        .size(layout.total_size())
        .usage(
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::TRANSFER_SRC,
        )
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let (buffer, mut allocation) = create_buffer_with_memory(
        device,
        allocator,
        &buffer_info,
        gpu_allocator::MemoryLocation::CpuToGpu,
        "shader binding table",
        u64::from(props.base_alignment),
    )?;
    let mut sbt = ShaderBindingTable {
        buffer,
        allocation: None,
        raygen: vk::StridedDeviceAddressRegionKHR::default(),
        miss: vk::StridedDeviceAddressRegionKHR::default(),
        hit: vk::StridedDeviceAddressRegionKHR::default(),
    };

    let written = match allocation.mapped_slice_mut() {
        Some(bytes) => {
            let mut write_handle = |group: usize, offset: u64| {
                let src = &handles[group * handle_size..(group + 1) * handle_size];
                let offset = offset as usize;
                bytes[offset..offset + handle_size].copy_from_slice(src);
            };
            write_handle(0, 0);
            for index in 0..miss_count as usize {
                write_handle(1 + index, layout.miss_offset + index as u64 * layout.handle_stride);
            }
            for index in 0..hit_count as usize {
                write_handle(1 + miss_count as usize + index, layout.hit_offset + index as u64 * layout.handle_stride);
            }
            true
        }
        None => false,
    };
    sbt.allocation = Some(allocation);
    if !written {
        unsafe { sbt.destroy(device, allocator) };
        return Err(Error::DeviceObjectCreation {
            object: "shader binding table",
            reason: "memory is not host visible".to_string(),
        });
    }

    let address = unsafe { device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer)) };
    sbt.raygen = vk::StridedDeviceAddressRegionKHR {
        device_address: address,
        stride: layout.raygen_size,
        size: layout.raygen_size,
    };
    sbt.miss = vk::StridedDeviceAddressRegionKHR {
        device_address: address + layout.miss_offset,
        stride: layout.handle_stride,
        size: layout.miss_size,
    };
    sbt.hit = vk::StridedDeviceAddressRegionKHR {
        device_address: address + layout.hit_offset,
        stride: layout.handle_stride,
        size: layout.hit_size,
    };
    Ok(sbt)
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
