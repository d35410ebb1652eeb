//! Unit tests for render_object.rs

use glam::{Mat4, Vec3};

use crate::device::mock_device::{MockCall, MockDevice};
use crate::device::*;
use crate::render::{Mesh, ObjectUniform, RenderObject, Vertex};

fn triangle() -> [Vertex; 3] {
    let vertex = |x: f32, y: f32| Vertex { position: [x, y, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0] };
    [vertex(0.0, 0.5), vertex(-0.5, -0.5), vertex(0.5, -0.5)]
}

#[test]
fn test_vertex_layout_is_packed() {
    let layout = Vertex::layout();
    assert_eq!(layout.stride as usize, std::mem::size_of::<Vertex>());
    assert_eq!(layout.attributes[2].offset, 24);
}

#[test]
fn test_indexed_mesh_draws_indexed() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let probe = device.probe();
    let mesh = Mesh::upload(&mut device, &triangle(), &[0, 1, 2]).unwrap();
    let cmd = device.allocate_command_buffers(QueueKind::Graphics, 1).unwrap()[0];

    device.begin_command_buffer(cmd, CommandBufferUsage::OneTimeSubmit).unwrap();
    mesh.draw(&mut device, cmd).unwrap();

    assert_eq!(probe.count(|c| matches!(c, MockCall::DrawIndexed { index_count: 3 })), 1);
    assert_eq!(probe.count(|c| matches!(c, MockCall::Draw { .. })), 0);
}

#[test]
fn test_non_indexed_mesh_draws_vertices() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let probe = device.probe();
    let mesh = Mesh::upload(&mut device, &triangle(), &[]).unwrap();
    let cmd = device.allocate_command_buffers(QueueKind::Graphics, 1).unwrap()[0];

    device.begin_command_buffer(cmd, CommandBufferUsage::OneTimeSubmit).unwrap();
    mesh.draw(&mut device, cmd).unwrap();

    assert_eq!(probe.count(|c| matches!(c, MockCall::Draw { vertex_count: 3 })), 1);
    assert_eq!(probe.live_buffers(), 1);
}

#[test]
fn test_empty_mesh_is_rejected() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    assert!(Mesh::upload::<Vertex>(&mut device, &[], &[]).is_err());
}

#[test]
fn test_object_uniform_per_frame_slot() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let probe = device.probe();
    let mesh = Mesh::upload(&mut device, &triangle(), &[]).unwrap();
    let model = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
    let object = RenderObject::new(&mut device, 7, mesh, model).unwrap();

    object.update_uniform(&mut device, 1, Mat4::IDENTITY, Mat4::IDENTITY).unwrap();

    let writes = probe.descriptor_writes(object.descriptor_set(1).unwrap());
    let DescriptorResource::Buffer { buffer, .. } = writes[0].resource else {
        panic!("object set must hold a uniform buffer");
    };
    let bytes = probe.buffer_bytes(buffer).unwrap();
    let uniform: ObjectUniform = bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<ObjectUniform>()]);
    assert_eq!(uniform.model, model);
    assert!(object.update_uniform(&mut device, 2, Mat4::IDENTITY, Mat4::IDENTITY).is_err());
}

#[test]
fn test_destroy_releases_everything() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let probe = device.probe();
    let mesh = Mesh::upload(&mut device, &triangle(), &[0, 1, 2]).unwrap();
    let mut object = RenderObject::new(&mut device, 1, mesh, Mat4::IDENTITY).unwrap();

    object.destroy(&mut device);
    object.destroy(&mut device);

    assert_eq!(probe.live_buffers(), 0);
    assert_eq!(probe.live_descriptor_pools(), 0);
}
