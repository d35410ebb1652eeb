/// GraphicsDevice trait - the logical device contract
///
/// Sole owner of the native device, its queues and per-frame sync objects,
/// and the only entry point for creating, destroying and recording against
/// GPU objects. The renderer owns exactly one `Box<dyn GraphicsDevice>` and
/// lends it as `&mut dyn GraphicsDevice` to everything else.
///
/// Conventions:
/// - `create_*` returns a handle or `Error::DeviceObjectCreation`
/// - `destroy_*` takes `&mut Handle`, is a no-op on null handles and nulls
///   the handle, so destroying twice is safe
/// - fence waits use an infinite timeout
/// - out-of-date and suboptimal swapchains are reported through
///   `AcquireResult` / `PresentStatus`, never as errors

use bytemuck::Pod;

use super::barrier::BarrierBatch;
use super::desc::*;
use super::handles::*;
use super::sync::SemaphoreRole;
use super::types::*;
use crate::error::{Error, Result};

pub trait GraphicsDevice {
    // ===== DEVICE INFO =====

    /// Number of frame slots (N)
    fn max_frames_in_flight(&self) -> usize;

    fn swapchain_format(&self) -> Format;

    fn swapchain_extent(&self) -> Extent2D;

    fn swapchain_image_count(&self) -> usize;

    /// Swapchain image and view for an acquired image index
    fn swapchain_image(&self, index: u32) -> Result<(ImageHandle, ImageViewHandle)>;

    /// Highest MSAA count supported for both color and depth attachments
    fn max_usable_sample_count(&self) -> SampleCount;

    /// True if `format` can be used as a depth attachment and sampled
    fn supports_sampled_depth(&self, format: Format) -> bool;

    fn supports_ray_tracing(&self) -> bool;

    // ===== OBJECT CREATION / DESTRUCTION =====

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle>;
    fn destroy_image(&mut self, image: &mut ImageHandle);

    fn create_image_view(&mut self, desc: &ImageViewDesc) -> Result<ImageViewHandle>;
    fn destroy_image_view(&mut self, view: &mut ImageViewHandle);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle>;
    fn destroy_sampler(&mut self, sampler: &mut SamplerHandle);

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle>;
    fn destroy_buffer(&mut self, buffer: &mut BufferHandle);

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle>;
    /// Also releases every set allocated from the pool
    fn destroy_descriptor_pool(&mut self, pool: &mut DescriptorPoolHandle);

    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle>;
    fn destroy_descriptor_set_layout(&mut self, layout: &mut DescriptorSetLayoutHandle);

    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: usize,
    ) -> Result<Vec<DescriptorSetHandle>>;
    fn update_descriptor_set(&mut self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) -> Result<()>;

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;
    fn destroy_render_pass(&mut self, render_pass: &mut RenderPassHandle);

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle>;
    fn destroy_pipeline_layout(&mut self, layout: &mut PipelineLayoutHandle);

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&mut self, code: &[u32]) -> Result<ShaderModuleHandle>;
    fn destroy_shader_module(&mut self, module: &mut ShaderModuleHandle);

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle>;
    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> Result<PipelineHandle>;
    fn create_ray_tracing_pipeline(&mut self, desc: &RayTracingPipelineDesc) -> Result<PipelineHandle>;
    fn destroy_pipeline(&mut self, pipeline: &mut PipelineHandle);

    fn allocate_command_buffers(&mut self, queue: QueueKind, count: usize) -> Result<Vec<CommandBufferHandle>>;
    fn free_command_buffer(&mut self, command_buffer: &mut CommandBufferHandle);

    /// Map `buffer`, run `op` on its bytes and unmap, even if `op` fails or panics
    fn do_mapped_memory_operation(
        &mut self,
        buffer: BufferHandle,
        op: &mut dyn FnMut(&mut [u8]) -> Result<()>,
    ) -> Result<()>;

    // ===== SYNCHRONIZATION =====

    /// Wait for the graphics fence pair (swapchain + offscreen) of `frame`
    fn wait_for_graphics_fences(&mut self, frame: usize) -> Result<()>;
    /// Reset the swapchain graphics fence of `frame`
    ///
    /// The offscreen fence is reset by `submit_offscreen_graphics_queue`,
    /// so a frame that skips the offscreen pass leaves it signalled.
    fn reset_graphics_fences(&mut self, frame: usize) -> Result<()>;

    fn wait_for_compute_fences(&mut self, frame: usize) -> Result<()>;
    fn reset_compute_fences(&mut self, frame: usize) -> Result<()>;

    fn wait_for_mouse_picking_fences(&mut self, frame: usize) -> Result<()>;
    fn reset_mouse_picking_fences(&mut self, frame: usize) -> Result<()>;

    /// Swapchain pass: waits ImageAvailable, signals RenderFinished
    fn submit_graphics_queue(&mut self, frame: usize, command_buffer: CommandBufferHandle) -> Result<()>;
    /// Offscreen pass: optionally waits ComputeFinished, signals OffscreenRenderFinished
    fn submit_offscreen_graphics_queue(
        &mut self,
        frame: usize,
        command_buffer: CommandBufferHandle,
        wait_compute: bool,
    ) -> Result<()>;
    /// Compute dispatch: signals ComputeFinished
    fn submit_compute_queue(&mut self, frame: usize, command_buffer: CommandBufferHandle) -> Result<()>;
    /// Mouse picking: fence only
    fn submit_mouse_picking_graphics_queue(
        &mut self,
        frame: usize,
        command_buffer: CommandBufferHandle,
    ) -> Result<()>;

    /// Submit without semaphores or fence (single-use command buffers)
    fn submit_immediate(&mut self, queue: QueueKind, command_buffer: CommandBufferHandle) -> Result<()>;

    fn acquire_next_image(&mut self, frame: usize) -> Result<AcquireResult>;

    /// Present `image_index`, waiting on the given per-frame semaphores
    fn queue_present(
        &mut self,
        frame: usize,
        image_index: u32,
        wait: &[SemaphoreRole],
    ) -> Result<PresentStatus>;

    fn wait_idle(&mut self) -> Result<()>;

    fn queue_wait_idle(&mut self, queue: QueueKind) -> Result<()>;

    /// Rebuild the swapchain for `extent` (clamped to the surface limits)
    fn recreate_swapchain(&mut self, extent: Extent2D) -> Result<()>;

    // ===== COMMAND RECORDING =====

    fn begin_command_buffer(&mut self, command_buffer: CommandBufferHandle, usage: CommandBufferUsage) -> Result<()>;
    fn end_command_buffer(&mut self, command_buffer: CommandBufferHandle) -> Result<()>;
    fn reset_command_buffer(&mut self, command_buffer: CommandBufferHandle) -> Result<()>;

    fn cmd_pipeline_barrier(&mut self, command_buffer: CommandBufferHandle, batch: &BarrierBatch) -> Result<()>;

    fn cmd_begin_rendering(&mut self, command_buffer: CommandBufferHandle, info: &RenderingInfo) -> Result<()>;
    fn cmd_end_rendering(&mut self, command_buffer: CommandBufferHandle) -> Result<()>;

    fn cmd_set_viewport(&mut self, command_buffer: CommandBufferHandle, viewport: Viewport) -> Result<()>;
    fn cmd_set_scissor(&mut self, command_buffer: CommandBufferHandle, scissor: Rect2D) -> Result<()>;

    fn cmd_bind_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        bind_point: BindPoint,
        pipeline: PipelineHandle,
    ) -> Result<()>;

    fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: CommandBufferHandle,
        bind_point: BindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()>;

    fn cmd_push_constants(
        &mut self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;

    fn cmd_bind_vertex_buffers(
        &mut self,
        command_buffer: CommandBufferHandle,
        first_binding: u32,
        buffers: &[(BufferHandle, u64)],
    ) -> Result<()>;

    fn cmd_bind_index_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()>;

    fn cmd_draw(
        &mut self,
        command_buffer: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;

    fn cmd_draw_indexed(
        &mut self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()>;

    fn cmd_dispatch(&mut self, command_buffer: CommandBufferHandle, x: u32, y: u32, z: u32) -> Result<()>;

    /// Trace rays with the shader binding table built for `pipeline`
    fn cmd_trace_rays(
        &mut self,
        command_buffer: CommandBufferHandle,
        pipeline: PipelineHandle,
        extent: Extent2D,
    ) -> Result<()>;

    /// Clear the bound depth attachment inside an active rendering pass
    fn cmd_clear_depth_attachment(
        &mut self,
        command_buffer: CommandBufferHandle,
        rect: Rect2D,
        layer_count: u32,
        depth: f32,
    ) -> Result<()>;

    fn cmd_copy_image_to_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        layout: ImageLayout,
        buffer: BufferHandle,
        region: BufferImageCopy,
    ) -> Result<()>;

    fn cmd_copy_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> Result<()>;
}

/// Pipeline bind point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
    RayTracing,
}

/// Run `f` over the mapped bytes of `buffer` and return its result
pub fn with_mapped_memory<T>(
    device: &mut dyn GraphicsDevice,
    buffer: BufferHandle,
    f: impl FnOnce(&mut [u8]) -> Result<T>,
) -> Result<T> {
    let mut f = Some(f);
    let mut output = None;
    device.do_mapped_memory_operation(buffer, &mut |bytes| {
        if let Some(f) = f.take() {
            output = Some(f(bytes)?);
        }
        Ok(())
    })?;
    output.ok_or_else(|| Error::BackendError("mapped memory operation was not invoked".to_string()))
}

/// Copy a POD value to the start of a host-visible buffer
pub fn write_buffer<T: Pod>(device: &mut dyn GraphicsDevice, buffer: BufferHandle, value: &T) -> Result<()> {
    write_buffer_slice(device, buffer, std::slice::from_ref(value))
}

/// Copy a POD slice to the start of a host-visible buffer
pub fn write_buffer_slice<T: Pod>(
    device: &mut dyn GraphicsDevice,
    buffer: BufferHandle,
    values: &[T],
) -> Result<()> {
    let src: &[u8] = bytemuck::cast_slice(values);
    with_mapped_memory(device, buffer, |dst| {
        if dst.len() < src.len() {
            return Err(Error::InvalidResource(format!(
                "buffer too small: {} bytes mapped, {} bytes written",
                dst.len(),
                src.len()
            )));
        }
        dst[..src.len()].copy_from_slice(src);
        Ok(())
    })
}

/// Read a POD value from the start of a host-visible buffer
pub fn read_buffer<T: Pod>(device: &mut dyn GraphicsDevice, buffer: BufferHandle) -> Result<T> {
    with_mapped_memory(device, buffer, |bytes| {
        let size = std::mem::size_of::<T>();
        if bytes.len() < size {
            return Err(Error::InvalidResource(format!(
                "buffer too small: {} bytes mapped, {} bytes read",
                bytes.len(),
                size
            )));
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    })
}
