//! Unit tests for the concrete pipeline kinds

use glam::{Mat4, Vec3};

use crate::device::mock_device::{MockCall, MockDevice};
use crate::device::*;
use crate::error::Error;
use crate::pipeline::*;
use crate::render::*;

fn code() -> ShaderSource {
    ShaderSource::Code(vec![SPIRV_MAGIC, 0x0001_0600, 0, 1, 0])
}

fn device() -> MockDevice {
    MockDevice::new(2, Extent2D::new(640, 480))
}

fn scene_render() -> RenderDescription {
    RenderDescription::Dynamic { color_formats: vec![Format::R8G8B8A8_UNORM], depth_format: Format::D32_SFLOAT, view_mask: 0 }
}

fn mesh_options(label: &str) -> GraphicsPipelineOptions {
    GraphicsPipelineOptions::new(label, scene_render())
        .with_shader(ShaderStage::Vertex, code())
        .with_shader(ShaderStage::Fragment, code())
        .with_vertex_layout(Vertex::layout())
}

fn storage_binding() -> Vec<DescriptorBinding> {
    vec![DescriptorBinding {
        binding: 0,
        descriptor_type: DescriptorType::StorageBuffer,
        count: 1,
        stages: ShaderStageFlags::COMPUTE,
    }]
}

fn object(device: &mut MockDevice, id: u32) -> RenderObject {
    let vertex = |x: f32, y: f32| Vertex { position: [x, y, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0] };
    let mesh = Mesh::upload(device, &[vertex(0.0, 0.5), vertex(-0.5, -0.5), vertex(0.5, -0.5)], &[0, 1, 2]).unwrap();
    RenderObject::new(device, id, mesh, Mat4::from_translation(Vec3::new(id as f32, 0.0, 0.0))).unwrap()
}

fn recording(device: &mut MockDevice) -> CommandBufferHandle {
    let cmd = device.allocate_command_buffers(QueueKind::Graphics, 1).unwrap()[0];
    device.begin_command_buffer(cmd, CommandBufferUsage::OneTimeSubmit).unwrap();
    cmd
}

fn info(cmd: CommandBufferHandle, frame: usize) -> RenderInfo {
    RenderInfo::new(cmd, frame, &Camera::default(), Extent2D::new(640, 480))
}

// ============================================================================
// GraphicsPipeline
// ============================================================================

#[test]
fn test_graphics_pipeline_draws_each_object_with_its_set() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = GraphicsPipeline::new(&mut device, &mesh_options("mesh")).unwrap();
    let a = object(&mut device, 1);
    let b = object(&mut device, 2);
    let cmd = recording(&mut device);
    probe.clear_calls();

    pipeline.render(&mut device, &info(cmd, 1), &[&a, &b]).unwrap();

    assert_eq!(probe.count(|c| matches!(c, MockCall::BindPipeline(BindPoint::Graphics, _))), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::BindDescriptorSets { first_set: 0, count: 1 })), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::BindDescriptorSets { first_set: 1, count: 1 })), 2);
    assert_eq!(probe.count(|c| matches!(c, MockCall::DrawIndexed { index_count: 3 })), 2);
}

#[test]
fn test_graphics_pipeline_writes_pass_uniform_of_frame() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = GraphicsPipeline::new(&mut device, &mesh_options("mesh")).unwrap();
    let cmd = recording(&mut device);
    let info = info(cmd, 1);

    pipeline.render(&mut device, &info, &[]).unwrap();

    let writes = probe.descriptor_writes(pipeline.pass_set(1).unwrap());
    let DescriptorResource::Buffer { buffer, .. } = writes[0].resource else {
        panic!("pass set must hold a uniform buffer");
    };
    let bytes = probe.buffer_bytes(buffer).unwrap();
    let uniform: PassUniform = bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<PassUniform>()]);
    assert_eq!(uniform.view, info.view);
    assert_eq!(uniform.viewport.x, 640.0);
    assert_eq!(uniform.viewport.y, 480.0);
}

#[test]
fn test_graphics_pipeline_appends_caller_sets() {
    let mut device = device();
    let options = mesh_options("mesh").with_set_layout(storage_binding());
    let pipeline = GraphicsPipeline::new(&mut device, &options).unwrap();
    assert_eq!(pipeline.core().set_count(), 3);
}

#[test]
fn test_graphics_pipeline_cannot_dispatch() {
    let mut device = device();
    let pipeline = GraphicsPipeline::new(&mut device, &mesh_options("mesh")).unwrap();
    let cmd = recording(&mut device);
    assert!(matches!(
        pipeline.compute(&mut device, cmd, 0),
        Err(Error::PipelineTypeMismatch { expected: "compute", .. })
    ));
}

#[test]
fn test_graphics_pipeline_destroy_releases_everything() {
    let mut device = device();
    let probe = device.probe();
    let mut pipeline = GraphicsPipeline::new(&mut device, &mesh_options("mesh")).unwrap();
    assert_eq!(probe.live_buffers(), 2);

    pipeline.destroy(&mut device);

    assert_eq!(probe.live_buffers(), 0);
    assert_eq!(probe.live_descriptor_pools(), 0);
    assert_eq!(probe.live_pipelines(), 0);
}

#[test]
fn test_graphics_pipeline_failure_after_core_releases_core() {
    let mut device = device();
    let probe = device.probe();
    probe.fail_next_create("descriptor pool");

    assert!(GraphicsPipeline::new(&mut device, &mesh_options("mesh")).is_err());
    assert_eq!(probe.live_pipelines(), 0);
    assert_eq!(probe.live_buffers(), 0);
}

// ============================================================================
// ComputePipeline / ComputeGraphicsPipeline
// ============================================================================

#[test]
fn test_compute_pipeline_binds_sets_and_dispatches() {
    let mut device = device();
    let probe = device.probe();
    let options = ComputePipelineOptions::new("particles", code(), [16, 4, 1]).with_set_layout(storage_binding());
    let pipeline = ComputePipeline::new(&mut device, &options).unwrap();
    let cmd = recording(&mut device);

    pipeline.compute(&mut device, cmd, 0).unwrap();

    assert_eq!(pipeline.kind(), PipelineKind::Compute);
    assert_eq!(pipeline.workgroups(), [16, 4, 1]);
    assert!(pipeline.descriptor_set(0).is_some());
    assert_eq!(probe.count(|c| matches!(c, MockCall::BindPipeline(BindPoint::Compute, _))), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::BindDescriptorSets { first_set: 0, .. })), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::Dispatch(16, 4, 1))), 1);
}

#[test]
fn test_compute_pipeline_cannot_render() {
    let mut device = device();
    let pipeline = ComputePipeline::new(&mut device, &ComputePipelineOptions::new("c", code(), [1, 1, 1])).unwrap();
    let cmd = recording(&mut device);
    assert!(matches!(
        pipeline.render(&mut device, &info(cmd, 0), &[]),
        Err(Error::PipelineTypeMismatch { expected: "graphics", .. })
    ));
}

#[test]
fn test_compute_graphics_pipeline_does_both() {
    let mut device = device();
    let probe = device.probe();
    let compute = ComputePipelineOptions::new("particles sim", code(), [8, 1, 1]);
    let pipeline = ComputeGraphicsPipeline::new(&mut device, &mesh_options("particles"), &compute).unwrap();
    let item = object(&mut device, 1);
    let cmd = recording(&mut device);

    pipeline.compute(&mut device, cmd, 0).unwrap();
    pipeline.render(&mut device, &info(cmd, 0), &[&item]).unwrap();

    assert_eq!(pipeline.kind(), PipelineKind::GraphicsCompute);
    assert_eq!(pipeline.name(), "particles");
    assert_eq!(probe.count(|c| matches!(c, MockCall::Dispatch(8, 1, 1))), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::DrawIndexed { .. })), 1);
}

#[test]
fn test_compute_graphics_failure_releases_compute_half() {
    let mut device = device();
    let probe = device.probe();
    probe.fail_next_create("graphics pipeline");
    let compute = ComputePipelineOptions::new("sim", code(), [1, 1, 1]);

    assert!(ComputeGraphicsPipeline::new(&mut device, &mesh_options("particles"), &compute).is_err());
    assert_eq!(probe.live_pipelines(), 0);
}

// ============================================================================
// RayTracingPipeline
// ============================================================================

fn ray_tracing_options() -> RayTracingPipelineOptions {
    RayTracingPipelineOptions {
        label: "rt".to_string(),
        raygen: code(),
        miss: vec![code()],
        closest_hit: vec![code(), code()],
        set_layouts: Vec::new(),
        push_constant_ranges: Vec::new(),
        max_recursion_depth: 0,
        output_extent: Extent2D::new(320, 240),
        output_format: Format::R8G8B8A8_UNORM,
    }
}

#[test]
fn test_ray_tracing_pipeline_traces_into_output() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = RayTracingPipeline::new(&mut device, &ray_tracing_options()).unwrap();
    let cmd = recording(&mut device);

    pipeline.trace_rays(&mut device, &info(cmd, 0)).unwrap();

    assert_eq!(pipeline.output().extent(), Extent2D::new(320, 240));
    assert_eq!(probe.count(|c| matches!(c, MockCall::BindPipeline(BindPoint::RayTracing, _))), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::TraceRays(e) if *e == Extent2D::new(320, 240))), 1);
}

#[test]
fn test_ray_tracing_output_is_sampled_between_traces() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = RayTracingPipeline::new(&mut device, &ray_tracing_options()).unwrap();
    assert_eq!(pipeline.output().layout(), ImageLayout::ShaderReadOnly);
    let output = pipeline.output().image();
    let cmd = recording(&mut device);
    probe.clear_calls();

    pipeline.trace_rays(&mut device, &info(cmd, 1)).unwrap();

    let transitions: Vec<(usize, ImageLayout, ImageLayout)> = probe
        .calls()
        .iter()
        .enumerate()
        .filter_map(|(i, call)| match call {
            MockCall::Barrier(batch) => batch
                .barriers()
                .iter()
                .find(|b| b.image == output)
                .map(|b| (i, b.old_layout, b.new_layout)),
            _ => None,
        })
        .collect();
    let trace = probe.calls().iter().position(|c| matches!(c, MockCall::TraceRays(_))).unwrap();
    assert_eq!(transitions.len(), 2);
    assert_eq!((transitions[0].1, transitions[0].2), (ImageLayout::ShaderReadOnly, ImageLayout::General));
    assert_eq!((transitions[1].1, transitions[1].2), (ImageLayout::General, ImageLayout::ShaderReadOnly));
    assert!(transitions[0].0 < trace && trace < transitions[1].0);
}

#[test]
fn test_ray_tracing_requires_device_support() {
    let mut device = device();
    let probe = device.probe();
    probe.set_ray_tracing(false);

    let err = RayTracingPipeline::new(&mut device, &ray_tracing_options()).unwrap_err();

    assert!(matches!(err, Error::InitializationFailed(_)));
    assert_eq!(probe.live_pipelines(), 0);
}

#[test]
fn test_ray_tracing_destroy_releases_output() {
    let mut device = device();
    let probe = device.probe();
    let mut pipeline = RayTracingPipeline::new(&mut device, &ray_tracing_options()).unwrap();

    pipeline.destroy(&mut device);

    assert_eq!(probe.live_images(), 0);
    assert_eq!(probe.live_samplers(), 0);
    assert_eq!(probe.live_pipelines(), 0);
}

// ============================================================================
// ShadowPipeline
// ============================================================================

#[test]
fn test_shadow_pipeline_pushes_model_for_casters_only() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = ShadowPipeline::new(&mut device, code(), Format::D32_SFLOAT, true).unwrap();
    let caster = object(&mut device, 1);
    let mut receiver = object(&mut device, 2);
    receiver.set_casts_shadows(false);
    let light = Light::Point(PointLight::new(Vec3::Y).with_shadows(256));
    let cmd = recording(&mut device);

    let info = info(cmd, 0).with_light(light.light_view(3));
    pipeline.render(&mut device, &info, &[&caster, &receiver]).unwrap();

    assert!(pipeline.is_cube());
    let push = std::mem::size_of::<ShadowPushConstants>();
    assert_eq!(probe.count(|c| matches!(c, MockCall::PushConstants { offset: 0, size } if *size == push)), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::DrawIndexed { .. })), 1);

    // The light lands in its slot of the frame's uniform
    let bytes = probe.buffer_bytes(pipeline.uniform_buffer(0).unwrap()).unwrap();
    let offset = 3 * std::mem::size_of::<LightSlot>();
    let slot: LightSlot = bytemuck::pod_read_unaligned(&bytes[offset..offset + std::mem::size_of::<LightSlot>()]);
    assert_eq!(slot.position.truncate(), Vec3::Y);
}

#[test]
fn test_shadow_pipeline_needs_a_light() {
    let mut device = device();
    let pipeline = ShadowPipeline::new(&mut device, code(), Format::D16_UNORM, false).unwrap();
    let cmd = recording(&mut device);
    assert!(matches!(pipeline.render(&mut device, &info(cmd, 0), &[]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_shadow_pipeline_rejects_slot_beyond_casters() {
    let mut device = device();
    let pipeline = ShadowPipeline::new(&mut device, code(), Format::D32_SFLOAT, false).unwrap();
    let light = Light::Spot(SpotLight::new(Vec3::Y, Vec3::NEG_Y).with_shadows(256));
    let cmd = recording(&mut device);
    let info = info(cmd, 0).with_light(light.light_view(MAX_SHADOW_CASTERS));
    assert!(pipeline.render(&mut device, &info, &[]).is_err());
}

// ============================================================================
// MousePickingPipeline / LinePipeline
// ============================================================================

#[test]
fn test_mouse_picking_pushes_object_ids() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = MousePickingPipeline::new(&mut device, code(), code(), Format::D32_SFLOAT).unwrap();
    let a = object(&mut device, 5);
    let b = object(&mut device, 9);
    let cmd = recording(&mut device);

    pipeline.render(&mut device, &info(cmd, 0), &[&a, &b]).unwrap();

    assert_eq!(pipeline.core().set_count(), 0);
    let push = std::mem::size_of::<PickingPushConstants>();
    assert_eq!(probe.count(|c| matches!(c, MockCall::PushConstants { size, .. } if *size == push)), 2);
    assert_eq!(probe.count(|c| matches!(c, MockCall::DrawIndexed { .. })), 2);
}

#[test]
fn test_line_pipeline_draws_batch() {
    let mut device = device();
    let probe = device.probe();
    let pipeline = LinePipeline::new(&mut device, code(), code(), scene_render(), SampleCount::S4).unwrap();
    let buffer = device
        .create_buffer(&BufferDesc {
            size: 1024,
            usage: BufferUsage::VERTEX,
            location: MemoryLocation::CpuToGpu,
            label: "lines".to_string(),
        })
        .unwrap();
    let cmd = recording(&mut device);

    pipeline.render(&mut device, &info(cmd, 0), &[]).unwrap();
    assert_eq!(probe.count(|c| matches!(c, MockCall::Draw { .. })), 0);

    let batch = LineBatch { buffer, vertex_count: 6 };
    pipeline.render(&mut device, &info(cmd, 0).with_lines(Some(batch)), &[]).unwrap();
    assert_eq!(probe.count(|c| matches!(c, MockCall::BindVertexBuffers(1))), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::Draw { vertex_count: 6 })), 1);
}
