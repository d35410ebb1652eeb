//! Unit tests for pipeline_manager.rs

use crate::device::mock_device::{MockCall, MockDevice};
use crate::device::*;
use crate::error::Error;
use crate::pipeline::*;
use crate::render::{Camera, RenderInfo};

fn code() -> ShaderSource {
    ShaderSource::Code(vec![SPIRV_MAGIC, 0x0001_0600, 0, 1, 0])
}

fn graphics(device: &mut MockDevice, label: &str) -> Box<dyn Pipeline> {
    let render = RenderDescription::Dynamic {
        color_formats: vec![Format::R8G8B8A8_UNORM],
        depth_format: Format::D32_SFLOAT,
        view_mask: 0,
    };
    let options = GraphicsPipelineOptions::new(label, render)
        .with_shader(ShaderStage::Vertex, code())
        .with_shader(ShaderStage::Fragment, code())
        .with_push_constants(ShaderStageFlags::VERTEX, 16);
    Box::new(GraphicsPipeline::new(device, &options).unwrap())
}

fn compute(device: &mut MockDevice, label: &str, workgroups: [u32; 3]) -> Box<dyn Pipeline> {
    Box::new(ComputePipeline::new(device, &ComputePipelineOptions::new(label, code(), workgroups)).unwrap())
}

fn recording(device: &mut MockDevice) -> CommandBufferHandle {
    let cmd = device.allocate_command_buffers(QueueKind::Graphics, 1).unwrap()[0];
    device.begin_command_buffer(cmd, CommandBufferUsage::OneTimeSubmit).unwrap();
    cmd
}

const MESH: PipelineType = PipelineType::Custom("mesh");
const PARTICLES: PipelineType = PipelineType::Custom("particles");
const FLUID: PipelineType = PipelineType::Custom("fluid");

#[test]
fn test_register_and_lookup() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let mut manager = PipelineManager::new();
    let pipeline = graphics(&mut device, "mesh");
    manager.register(&mut device, MESH, pipeline);

    assert!(manager.contains(MESH));
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.get(MESH).unwrap().name(), "mesh");
    assert_eq!(manager.kind(MESH).unwrap(), PipelineKind::Graphics);
}

#[test]
fn test_unknown_tag_is_reported() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let mut manager = PipelineManager::new();

    assert_eq!(manager.get(MESH).err(), Some(Error::UnknownPipelineType("mesh".to_string())));
    assert_eq!(manager.unregister(&mut device, MESH), Err(Error::UnknownPipelineType("mesh".to_string())));
    assert!(manager.is_empty());
}

#[test]
fn test_reregistering_replaces_and_destroys_previous() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let probe = device.probe();
    let mut manager = PipelineManager::new();
    let first = graphics(&mut device, "mesh v1");
    manager.register(&mut device, MESH, first);
    let second = graphics(&mut device, "mesh v2");
    manager.register(&mut device, MESH, second);

    assert_eq!(manager.len(), 1);
    assert_eq!(manager.types(), &[MESH]);
    assert_eq!(manager.get(MESH).unwrap().name(), "mesh v2");
    assert_eq!(probe.live_pipelines(), 1);
}

#[test]
fn test_unregister_destroys_pipeline() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let probe = device.probe();
    let mut manager = PipelineManager::new();
    let pipeline = graphics(&mut device, "mesh");
    manager.register(&mut device, MESH, pipeline);

    manager.unregister(&mut device, MESH).unwrap();

    assert!(!manager.contains(MESH));
    assert!(manager.types().is_empty());
    assert_eq!(probe.live_pipelines(), 0);
    assert_eq!(probe.live_buffers(), 0);
}

#[test]
fn test_compute_types_in_registration_order() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let mut manager = PipelineManager::new();
    let fluid = compute(&mut device, "fluid", [1, 1, 1]);
    manager.register(&mut device, FLUID, fluid);
    let mesh = graphics(&mut device, "mesh");
    manager.register(&mut device, MESH, mesh);
    let particles = compute(&mut device, "particles", [2, 1, 1]);
    manager.register(&mut device, PARTICLES, particles);

    assert_eq!(manager.compute_types(), vec![FLUID, PARTICLES]);
}

#[test]
fn test_capability_checks() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let probe = device.probe();
    let mut manager = PipelineManager::new();
    let mesh = graphics(&mut device, "mesh");
    manager.register(&mut device, MESH, mesh);
    let particles = compute(&mut device, "particles", [4, 2, 1]);
    manager.register(&mut device, PARTICLES, particles);
    let cmd = recording(&mut device);
    let info = RenderInfo::new(cmd, 0, &Camera::default(), Extent2D::new(640, 480));

    manager.render(&mut device, MESH, &info, &[]).unwrap();
    manager.compute(&mut device, PARTICLES, cmd, 0).unwrap();

    assert_eq!(
        manager.compute(&mut device, MESH, cmd, 0),
        Err(Error::PipelineTypeMismatch { pipeline: "mesh".to_string(), expected: "compute" })
    );
    assert_eq!(
        manager.render(&mut device, PARTICLES, &info, &[]),
        Err(Error::PipelineTypeMismatch { pipeline: "particles".to_string(), expected: "graphics" })
    );
    assert_eq!(
        manager.trace_rays(&mut device, MESH, &info),
        Err(Error::PipelineTypeMismatch { pipeline: "mesh".to_string(), expected: "ray tracing" })
    );
    assert_eq!(probe.count(|c| matches!(c, MockCall::Dispatch(4, 2, 1))), 1);
}

#[test]
fn test_bind_and_push_through_registry() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let probe = device.probe();
    let mut manager = PipelineManager::new();
    let mesh = graphics(&mut device, "mesh");
    manager.register(&mut device, MESH, mesh);
    let cmd = recording(&mut device);

    manager.bind(&mut device, MESH, cmd).unwrap();
    manager.push_constants(&mut device, MESH, cmd, 0, &[0u8; 16]).unwrap();

    assert_eq!(probe.count(|c| matches!(c, MockCall::BindPipeline(BindPoint::Graphics, _))), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::PushConstants { offset: 0, size: 16 })), 1);
    assert!(manager.bind(&mut device, PARTICLES, cmd).is_err());
}

#[test]
fn test_destroy_empties_registry() {
    let mut device = MockDevice::new(2, Extent2D::new(640, 480));
    let probe = device.probe();
    let mut manager = PipelineManager::new();
    let mesh = graphics(&mut device, "mesh");
    manager.register(&mut device, MESH, mesh);
    let particles = compute(&mut device, "particles", [1, 1, 1]);
    manager.register(&mut device, PARTICLES, particles);

    manager.destroy(&mut device);

    assert!(manager.is_empty());
    assert_eq!(probe.live_pipelines(), 0);
    assert_eq!(probe.live_descriptor_pools(), 0);
}
