/// Render objects: uploaded meshes with per-frame object uniforms
///
/// Objects are created and owned by the renderer and referred to by
/// `ObjectKey`. Render requests only store keys.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use slotmap::new_key_type;

use crate::descriptor::DescriptorSet;
use crate::device::*;
use crate::error::{Error, Result};

new_key_type! {
    /// Renderer-owned render object
    pub struct ObjectKey;
}

/// Descriptor set index of the per-object uniform in scene pipelines
pub const OBJECT_SET: u32 = 1;

/// Layout of the per-object descriptor set
pub const OBJECT_BINDINGS: [DescriptorBinding; 1] = [DescriptorBinding {
    binding: 0,
    descriptor_type: DescriptorType::UniformBuffer,
    count: 1,
    stages: ShaderStageFlags::VERTEX,
}];

/// Interleaved position / normal / uv vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(&[VertexFormat::Float3, VertexFormat::Float3, VertexFormat::Float2])
    }
}

/// Per-object uniform (set 1, binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

/// Vertex buffer plus optional index buffer
#[derive(Debug)]
pub struct Mesh {
    vertex_buffer: BufferHandle,
    vertex_count: u32,
    index_buffer: Option<(BufferHandle, IndexType)>,
    index_count: u32,
}

impl Mesh {
    /// Upload vertices and (if non-empty) 32-bit indices to host-visible buffers
    pub fn upload<V: Pod>(device: &mut dyn GraphicsDevice, vertices: &[V], indices: &[u32]) -> Result<Self> {
        if vertices.is_empty() {
            return Err(Error::InvalidResource("mesh has no vertices".to_string()));
        }
        let mut vertex_buffer = upload_buffer(device, vertices, BufferUsage::VERTEX, "mesh vertices")?;
        let index_buffer = if indices.is_empty() {
            None
        } else {
            match upload_buffer(device, indices, BufferUsage::INDEX, "mesh indices") {
                Ok(buffer) => Some((buffer, IndexType::U32)),
                Err(e) => {
                    device.destroy_buffer(&mut vertex_buffer);
                    return Err(e);
                }
            }
        };
        Ok(Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn draw(&self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle) -> Result<()> {
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[(self.vertex_buffer, 0)])?;
        match self.index_buffer {
            Some((buffer, index_type)) => {
                device.cmd_bind_index_buffer(command_buffer, buffer, 0, index_type)?;
                device.cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0)
            }
            None => device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0),
        }
    }

    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        device.destroy_buffer(&mut self.vertex_buffer);
        if let Some((buffer, _)) = &mut self.index_buffer {
            device.destroy_buffer(buffer);
        }
        self.index_buffer = None;
    }
}

fn upload_buffer<T: Pod>(
    device: &mut dyn GraphicsDevice,
    data: &[T],
    usage: BufferUsage,
    label: &str,
) -> Result<BufferHandle> {
    let mut buffer = device.create_buffer(&BufferDesc {
        size: std::mem::size_of_val(data) as u64,
        usage,
        location: MemoryLocation::CpuToGpu,
        label: label.to_string(),
    })?;
    if let Err(e) = write_buffer_slice(device, buffer, data) {
        device.destroy_buffer(&mut buffer);
        return Err(e);
    }
    Ok(buffer)
}

/// A mesh placed in the scene
#[derive(Debug)]
pub struct RenderObject {
    id: u32,
    mesh: Mesh,
    transform: Mat4,
    casts_shadows: bool,
    uniform_buffers: Vec<BufferHandle>,
    descriptor_set: DescriptorSet,
}

impl RenderObject {
    /// Take ownership of `mesh` and allocate one object uniform per frame slot
    ///
    /// `id` is the nonzero value written by mouse picking.
    pub fn new(device: &mut dyn GraphicsDevice, id: u32, mut mesh: Mesh, transform: Mat4) -> Result<Self> {
        let mut uniform_buffers = Vec::new();
        let created = Self::create_uniforms(device, &mut uniform_buffers);
        let descriptor_set = match created.and_then(|_| DescriptorSet::new(device, &OBJECT_BINDINGS)) {
            Ok(set) => set,
            Err(e) => {
                for buffer in &mut uniform_buffers {
                    device.destroy_buffer(buffer);
                }
                mesh.destroy(device);
                return Err(e);
            }
        };

        let mut object = Self {
            id,
            mesh,
            transform,
            casts_shadows: true,
            uniform_buffers,
            descriptor_set,
        };
        let buffers = object.uniform_buffers.clone();
        if let Err(e) = object.descriptor_set.update(device, |frame| {
            vec![DescriptorWrite {
                binding: 0,
                resource: DescriptorResource::Buffer {
                    buffer: buffers[frame],
                    offset: 0,
                    range: std::mem::size_of::<ObjectUniform>() as u64,
                },
            }]
        }) {
            object.destroy(device);
            return Err(e);
        }
        Ok(object)
    }

    fn create_uniforms(device: &mut dyn GraphicsDevice, buffers: &mut Vec<BufferHandle>) -> Result<()> {
        for frame in 0..device.max_frames_in_flight() {
            buffers.push(device.create_buffer(&BufferDesc {
                size: std::mem::size_of::<ObjectUniform>() as u64,
                usage: BufferUsage::UNIFORM,
                location: MemoryLocation::CpuToGpu,
                label: format!("object uniform #{}", frame),
            })?);
        }
        Ok(())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn casts_shadows(&self) -> bool {
        self.casts_shadows
    }

    pub fn set_casts_shadows(&mut self, casts_shadows: bool) {
        self.casts_shadows = casts_shadows;
    }

    pub fn descriptor_set(&self, frame: usize) -> Result<DescriptorSetHandle> {
        self.descriptor_set.set(frame)
    }

    /// Write model/view/projection into the uniform of frame slot `frame`
    pub fn update_uniform(&self, device: &mut dyn GraphicsDevice, frame: usize, view: Mat4, projection: Mat4) -> Result<()> {
        let buffer = self
            .uniform_buffers
            .get(frame)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("object {} has no uniform for frame {}", self.id, frame)))?;
        write_buffer(device, buffer, &ObjectUniform { model: self.transform, view, projection })
    }

    pub fn draw(&self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle) -> Result<()> {
        self.mesh.draw(device, command_buffer)
    }

    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        self.descriptor_set.destroy(device);
        for buffer in &mut self.uniform_buffers {
            device.destroy_buffer(buffer);
        }
        self.uniform_buffers.clear();
        self.mesh.destroy(device);
    }
}

#[cfg(test)]
#[path = "render_object_tests.rs"]
mod tests;
