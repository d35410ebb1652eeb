/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Objects live in slotmaps, every interesting call is appended to a shared
/// call log, and acquire/present results can be scripted. Tests keep a
/// `MockProbe` to inspect the device after moving it into a renderer.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use slotmap::SlotMap;

use crate::device::barrier::BarrierBatch;
use crate::device::desc::*;
use crate::device::graphics_device::{BindPoint, GraphicsDevice};
use crate::device::handles::*;
use crate::device::sync::SemaphoreRole;
use crate::device::types::*;
use crate::error::{Error, Result};

pub const MOCK_SWAPCHAIN_IMAGES: usize = 3;

/// Calls recorded by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateImage(ImageDesc),
    DestroyImage,
    CreateBuffer(BufferDesc),
    DestroyBuffer,
    CreatePipeline(BindPoint),
    DestroyPipeline,
    WaitGraphicsFences(usize),
    ResetGraphicsFences(usize),
    WaitComputeFences(usize),
    ResetComputeFences(usize),
    WaitMousePickingFences(usize),
    ResetMousePickingFences(usize),
    SubmitGraphics { frame: usize, command_buffer: CommandBufferHandle },
    SubmitOffscreen { frame: usize, command_buffer: CommandBufferHandle, wait_compute: bool },
    SubmitCompute { frame: usize, command_buffer: CommandBufferHandle },
    SubmitMousePicking { frame: usize, command_buffer: CommandBufferHandle },
    SubmitImmediate(QueueKind),
    Acquire(usize),
    Present { frame: usize, image_index: u32, wait: Vec<SemaphoreRole> },
    WaitIdle,
    QueueWaitIdle(QueueKind),
    RecreateSwapchain(Extent2D),
    Begin(CommandBufferHandle),
    End(CommandBufferHandle),
    Reset(CommandBufferHandle),
    Barrier(BarrierBatch),
    BeginRendering(RenderingInfo),
    EndRendering,
    SetViewport(Viewport),
    SetScissor(Rect2D),
    BindPipeline(BindPoint, PipelineHandle),
    BindDescriptorSets { first_set: u32, count: usize },
    PushConstants { offset: u32, size: usize },
    BindVertexBuffers(usize),
    BindIndexBuffer,
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    Dispatch(u32, u32, u32),
    TraceRays(Extent2D),
    ClearDepthAttachment(f32),
    CopyImageToBuffer(BufferImageCopy),
    CopyBuffer(u64),
}

#[derive(Debug, Default)]
struct MockBuffer {
    desc: Option<BufferDesc>,
    bytes: Vec<u8>,
    mapped: bool,
}

#[derive(Debug, Default)]
struct MockCommandBuffer {
    recording: bool,
    executable: bool,
}

/// Shared mock state
pub struct MockState {
    frames: usize,
    calls: Vec<MockCall>,
    images: SlotMap<ImageHandle, Option<ImageDesc>>,
    views: SlotMap<ImageViewHandle, ImageViewDesc>,
    samplers: SlotMap<SamplerHandle, SamplerDesc>,
    buffers: SlotMap<BufferHandle, MockBuffer>,
    pools: SlotMap<DescriptorPoolHandle, Vec<DescriptorSetHandle>>,
    set_layouts: SlotMap<DescriptorSetLayoutHandle, Vec<DescriptorBinding>>,
    sets: SlotMap<DescriptorSetHandle, Vec<DescriptorWrite>>,
    render_passes: SlotMap<RenderPassHandle, RenderPassDesc>,
    pipeline_layouts: SlotMap<PipelineLayoutHandle, PipelineLayoutDesc>,
    shader_modules: SlotMap<ShaderModuleHandle, usize>,
    pipelines: SlotMap<PipelineHandle, BindPoint>,
    command_buffers: SlotMap<CommandBufferHandle, MockCommandBuffer>,
    swapchain: Vec<(ImageHandle, ImageViewHandle)>,
    swapchain_extent: Extent2D,
    acquire_script: VecDeque<AcquireResult>,
    present_script: VecDeque<PresentStatus>,
    fail_create: Option<&'static str>,
    fail_begin: bool,
    readback_value: u32,
    ray_tracing: bool,
}

impl MockState {
    fn register_swapchain(&mut self) {
        self.swapchain.clear();
        for _ in 0..MOCK_SWAPCHAIN_IMAGES {
            let image = self.images.insert(None);
            let view = self.views.insert(ImageViewDesc {
                image,
                format: Format::B8G8R8A8_SRGB,
                view_type: ImageViewType::D2,
                aspect: ImageAspect::COLOR,
                base_layer: 0,
                layer_count: 1,
            });
            self.swapchain.push((image, view));
        }
    }

    fn check_create(&mut self, object: &'static str) -> Result<()> {
        if self.fail_create == Some(object) {
            self.fail_create = None;
            return Err(Error::DeviceObjectCreation {
                object,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn recording(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        match self.command_buffers.get(command_buffer) {
            Some(cb) if cb.recording => Ok(()),
            Some(_) => Err(Error::CommandRecording("command buffer is not recording".to_string())),
            None => Err(Error::InvalidResource("unknown command buffer".to_string())),
        }
    }

    fn executable(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        match self.command_buffers.get(command_buffer) {
            Some(cb) if cb.executable => Ok(()),
            Some(_) => Err(Error::BackendError("submitted command buffer was not ended".to_string())),
            None => Err(Error::InvalidResource("unknown command buffer".to_string())),
        }
    }

    fn check_frame(&self, frame: usize) -> Result<()> {
        if frame >= self.frames {
            return Err(Error::InvalidResource(format!("frame {} out of range", frame)));
        }
        Ok(())
    }

    fn record(&mut self, command_buffer: CommandBufferHandle, call: MockCall) -> Result<()> {
        self.recording(command_buffer)?;
        self.calls.push(call);
        Ok(())
    }
}

/// Test-side view of a mock device's shared state
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn push_acquire(&self, result: AcquireResult) {
        self.state().acquire_script.push_back(result);
    }

    pub fn push_present(&self, status: PresentStatus) {
        self.state().present_script.push_back(status);
    }

    pub fn fail_next_create(&self, object: &'static str) {
        self.state().fail_create = Some(object);
    }

    pub fn fail_begin(&self, fail: bool) {
        self.state().fail_begin = fail;
    }

    pub fn set_readback_value(&self, value: u32) {
        self.state().readback_value = value;
    }

    pub fn set_swapchain_extent(&self, extent: Extent2D) {
        self.state().swapchain_extent = extent;
    }

    pub fn set_ray_tracing(&self, supported: bool) {
        self.state().ray_tracing = supported;
    }

    /// Owned images alive (swapchain images excluded)
    pub fn live_images(&self) -> usize {
        self.state().images.values().filter(|d| d.is_some()).count()
    }

    pub fn live_image_views(&self) -> usize {
        let state = self.state();
        state.views.len() - state.swapchain.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_samplers(&self) -> usize {
        self.state().samplers.len()
    }

    pub fn live_descriptor_pools(&self) -> usize {
        self.state().pools.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state().pipelines.len()
    }

    pub fn live_shader_modules(&self) -> usize {
        self.state().shader_modules.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        self.state().command_buffers.len()
    }

    pub fn image_desc(&self, image: ImageHandle) -> Option<ImageDesc> {
        self.state().images.get(image).cloned().flatten()
    }

    pub fn buffer_bytes(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state().buffers.get(buffer).map(|b| b.bytes.clone())
    }

    pub fn is_mapped(&self, buffer: BufferHandle) -> bool {
        self.state().buffers.get(buffer).map(|b| b.mapped).unwrap_or(false)
    }

    pub fn descriptor_writes(&self, set: DescriptorSetHandle) -> Vec<DescriptorWrite> {
        self.state().sets.get(set).cloned().unwrap_or_default()
    }
}

/// Mock device
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new(frames: usize, extent: Extent2D) -> Self {
        let mut state = MockState {
            frames,
            calls: Vec::new(),
            images: SlotMap::with_key(),
            views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            pools: SlotMap::with_key(),
            set_layouts: SlotMap::with_key(),
            sets: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
            pipeline_layouts: SlotMap::with_key(),
            shader_modules: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            swapchain: Vec::new(),
            swapchain_extent: extent,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_create: None,
            fail_begin: false,
            readback_value: 0,
            ray_tracing: true,
        };
        state.register_swapchain();
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe { state: Arc::clone(&self.state) }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Restores mapped bytes and clears the mapped flag on drop
struct UnmapGuard {
    state: Arc<Mutex<MockState>>,
    buffer: BufferHandle,
    bytes: Vec<u8>,
}

impl Drop for UnmapGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(buffer) = state.buffers.get_mut(self.buffer) {
            buffer.bytes = std::mem::take(&mut self.bytes);
            buffer.mapped = false;
        }
    }
}

impl GraphicsDevice for MockDevice {
    fn max_frames_in_flight(&self) -> usize {
        self.state().frames
    }

    fn swapchain_format(&self) -> Format {
        Format::B8G8R8A8_SRGB
    }

    fn swapchain_extent(&self) -> Extent2D {
        self.state().swapchain_extent
    }

    fn swapchain_image_count(&self) -> usize {
        self.state().swapchain.len()
    }

    fn swapchain_image(&self, index: u32) -> Result<(ImageHandle, ImageViewHandle)> {
        self.state()
            .swapchain
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("swapchain image {} out of range", index)))
    }

    fn max_usable_sample_count(&self) -> SampleCount {
        SampleCount::S8
    }

    fn supports_sampled_depth(&self, format: Format) -> bool {
        format.is_samplable_depth()
    }

    fn supports_ray_tracing(&self) -> bool {
        self.state().ray_tracing
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle> {
        let mut state = self.state();
        state.check_create("image")?;
        if desc.extent.is_zero_area() {
            return Err(Error::DeviceObjectCreation { object: "image", reason: "zero extent".to_string() });
        }
        state.calls.push(MockCall::CreateImage(desc.clone()));
        Ok(state.images.insert(Some(desc.clone())))
    }

    fn destroy_image(&mut self, image: &mut ImageHandle) {
        if let Some(handle) = take_handle(image) {
            let mut state = self.state();
            if state.images.remove(handle).is_some() {
                state.calls.push(MockCall::DestroyImage);
            }
        }
    }

    fn create_image_view(&mut self, desc: &ImageViewDesc) -> Result<ImageViewHandle> {
        let mut state = self.state();
        state.check_create("image view")?;
        if !state.images.contains_key(desc.image) {
            return Err(Error::InvalidResource("image view of unknown image".to_string()));
        }
        Ok(state.views.insert(desc.clone()))
    }

    fn destroy_image_view(&mut self, view: &mut ImageViewHandle) {
        if let Some(handle) = take_handle(view) {
            self.state().views.remove(handle);
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let mut state = self.state();
        state.check_create("sampler")?;
        Ok(state.samplers.insert(*desc))
    }

    fn destroy_sampler(&mut self, sampler: &mut SamplerHandle) {
        if let Some(handle) = take_handle(sampler) {
            self.state().samplers.remove(handle);
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        let mut state = self.state();
        state.check_create("buffer")?;
        state.calls.push(MockCall::CreateBuffer(desc.clone()));
        Ok(state.buffers.insert(MockBuffer {
            desc: Some(desc.clone()),
            bytes: vec![0; desc.size as usize],
            mapped: false,
        }))
    }

    fn destroy_buffer(&mut self, buffer: &mut BufferHandle) {
        if let Some(handle) = take_handle(buffer) {
            let mut state = self.state();
            if state.buffers.remove(handle).is_some() {
                state.calls.push(MockCall::DestroyBuffer);
            }
        }
    }

    fn create_descriptor_pool(&mut self, _desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let mut state = self.state();
        state.check_create("descriptor pool")?;
        Ok(state.pools.insert(Vec::new()))
    }

    fn destroy_descriptor_pool(&mut self, pool: &mut DescriptorPoolHandle) {
        if let Some(handle) = take_handle(pool) {
            let mut state = self.state();
            if let Some(sets) = state.pools.remove(handle) {
                for set in sets {
                    state.sets.remove(set);
                }
            }
        }
    }

    fn create_descriptor_set_layout(&mut self, bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle> {
        let mut state = self.state();
        state.check_create("descriptor set layout")?;
        Ok(state.set_layouts.insert(bindings.to_vec()))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: &mut DescriptorSetLayoutHandle) {
        if let Some(handle) = take_handle(layout) {
            self.state().set_layouts.remove(handle);
        }
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: usize,
    ) -> Result<Vec<DescriptorSetHandle>> {
        let mut state = self.state();
        state.check_create("descriptor set")?;
        if !state.set_layouts.contains_key(layout) {
            return Err(Error::InvalidResource("unknown descriptor set layout".to_string()));
        }
        if !state.pools.contains_key(pool) {
            return Err(Error::InvalidResource("unknown descriptor pool".to_string()));
        }
        let sets: Vec<_> = (0..count).map(|_| state.sets.insert(Vec::new())).collect();
        if let Some(owned) = state.pools.get_mut(pool) {
            owned.extend(sets.iter().copied());
        }
        Ok(sets)
    }

    fn update_descriptor_set(&mut self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .sets
            .get_mut(set)
            .ok_or_else(|| Error::InvalidResource("unknown descriptor set".to_string()))?;
        for write in writes {
            entry.retain(|w| w.binding != write.binding);
            entry.push(*write);
        }
        Ok(())
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let mut state = self.state();
        state.check_create("render pass")?;
        Ok(state.render_passes.insert(desc.clone()))
    }

    fn destroy_render_pass(&mut self, render_pass: &mut RenderPassHandle) {
        if let Some(handle) = take_handle(render_pass) {
            self.state().render_passes.remove(handle);
        }
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let mut state = self.state();
        state.check_create("pipeline layout")?;
        Ok(state.pipeline_layouts.insert(desc.clone()))
    }

    fn destroy_pipeline_layout(&mut self, layout: &mut PipelineLayoutHandle) {
        if let Some(handle) = take_handle(layout) {
            self.state().pipeline_layouts.remove(handle);
        }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<ShaderModuleHandle> {
        let mut state = self.state();
        state.check_create("shader module")?;
        Ok(state.shader_modules.insert(code.len()))
    }

    fn destroy_shader_module(&mut self, module: &mut ShaderModuleHandle) {
        if let Some(handle) = take_handle(module) {
            self.state().shader_modules.remove(handle);
        }
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        let mut state = self.state();
        state.check_create("graphics pipeline")?;
        if !state.pipeline_layouts.contains_key(desc.layout) {
            return Err(Error::InvalidResource("unknown pipeline layout".to_string()));
        }
        state.calls.push(MockCall::CreatePipeline(BindPoint::Graphics));
        Ok(state.pipelines.insert(BindPoint::Graphics))
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        let mut state = self.state();
        state.check_create("compute pipeline")?;
        if !state.pipeline_layouts.contains_key(desc.layout) {
            return Err(Error::InvalidResource("unknown pipeline layout".to_string()));
        }
        state.calls.push(MockCall::CreatePipeline(BindPoint::Compute));
        Ok(state.pipelines.insert(BindPoint::Compute))
    }

    fn create_ray_tracing_pipeline(&mut self, desc: &RayTracingPipelineDesc) -> Result<PipelineHandle> {
        let mut state = self.state();
        state.check_create("ray tracing pipeline")?;
        if !state.ray_tracing {
            return Err(Error::DeviceObjectCreation {
                object: "ray tracing pipeline",
                reason: "ray tracing not supported".to_string(),
            });
        }
        if !state.pipeline_layouts.contains_key(desc.layout) {
            return Err(Error::InvalidResource("unknown pipeline layout".to_string()));
        }
        state.calls.push(MockCall::CreatePipeline(BindPoint::RayTracing));
        Ok(state.pipelines.insert(BindPoint::RayTracing))
    }

    fn destroy_pipeline(&mut self, pipeline: &mut PipelineHandle) {
        if let Some(handle) = take_handle(pipeline) {
            let mut state = self.state();
            if state.pipelines.remove(handle).is_some() {
                state.calls.push(MockCall::DestroyPipeline);
            }
        }
    }

    fn allocate_command_buffers(&mut self, _queue: QueueKind, count: usize) -> Result<Vec<CommandBufferHandle>> {
        let mut state = self.state();
        state.check_create("command buffer")?;
        Ok((0..count)
            .map(|_| state.command_buffers.insert(MockCommandBuffer::default()))
            .collect())
    }

    fn free_command_buffer(&mut self, command_buffer: &mut CommandBufferHandle) {
        if let Some(handle) = take_handle(command_buffer) {
            self.state().command_buffers.remove(handle);
        }
    }

    fn do_mapped_memory_operation(
        &mut self,
        buffer: BufferHandle,
        op: &mut dyn FnMut(&mut [u8]) -> Result<()>,
    ) -> Result<()> {
        let bytes = {
            let mut state = self.state();
            let entry = state
                .buffers
                .get_mut(buffer)
                .ok_or_else(|| Error::InvalidResource("map of unknown buffer".to_string()))?;
            let host_visible = entry
                .desc
                .as_ref()
                .map(|d| d.location != MemoryLocation::GpuOnly)
                .unwrap_or(false);
            if !host_visible {
                return Err(Error::InvalidResource("buffer is not host visible".to_string()));
            }
            entry.mapped = true;
            std::mem::take(&mut entry.bytes)
        };
        let mut guard = UnmapGuard { state: Arc::clone(&self.state), buffer, bytes };
        match panic::catch_unwind(AssertUnwindSafe(|| op(&mut guard.bytes))) {
            Ok(result) => result,
            Err(payload) => {
                drop(guard);
                panic::resume_unwind(payload)
            }
        }
    }

    fn wait_for_graphics_fences(&mut self, frame: usize) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::WaitGraphicsFences(frame));
        Ok(())
    }

    fn reset_graphics_fences(&mut self, frame: usize) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::ResetGraphicsFences(frame));
        Ok(())
    }

    fn wait_for_compute_fences(&mut self, frame: usize) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::WaitComputeFences(frame));
        Ok(())
    }

    fn reset_compute_fences(&mut self, frame: usize) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::ResetComputeFences(frame));
        Ok(())
    }

    fn wait_for_mouse_picking_fences(&mut self, frame: usize) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::WaitMousePickingFences(frame));
        Ok(())
    }

    fn reset_mouse_picking_fences(&mut self, frame: usize) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::ResetMousePickingFences(frame));
        Ok(())
    }

    fn submit_graphics_queue(&mut self, frame: usize, command_buffer: CommandBufferHandle) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.executable(command_buffer)?;
        state.calls.push(MockCall::SubmitGraphics { frame, command_buffer });
        Ok(())
    }

    fn submit_offscreen_graphics_queue(
        &mut self,
        frame: usize,
        command_buffer: CommandBufferHandle,
        wait_compute: bool,
    ) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.executable(command_buffer)?;
        state.calls.push(MockCall::SubmitOffscreen { frame, command_buffer, wait_compute });
        Ok(())
    }

    fn submit_compute_queue(&mut self, frame: usize, command_buffer: CommandBufferHandle) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.executable(command_buffer)?;
        state.calls.push(MockCall::SubmitCompute { frame, command_buffer });
        Ok(())
    }

    fn submit_mouse_picking_graphics_queue(
        &mut self,
        frame: usize,
        command_buffer: CommandBufferHandle,
    ) -> Result<()> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.executable(command_buffer)?;
        state.calls.push(MockCall::SubmitMousePicking { frame, command_buffer });
        Ok(())
    }

    fn submit_immediate(&mut self, queue: QueueKind, command_buffer: CommandBufferHandle) -> Result<()> {
        let mut state = self.state();
        state.executable(command_buffer)?;
        state.calls.push(MockCall::SubmitImmediate(queue));
        Ok(())
    }

    fn acquire_next_image(&mut self, frame: usize) -> Result<AcquireResult> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::Acquire(frame));
        let image_count = state.swapchain.len() as u32;
        Ok(state.acquire_script.pop_front().unwrap_or(AcquireResult::Acquired {
            image_index: frame as u32 % image_count,
            suboptimal: false,
        }))
    }

    fn queue_present(&mut self, frame: usize, image_index: u32, wait: &[SemaphoreRole]) -> Result<PresentStatus> {
        let mut state = self.state();
        state.check_frame(frame)?;
        state.calls.push(MockCall::Present { frame, image_index, wait: wait.to_vec() });
        Ok(state.present_script.pop_front().unwrap_or(PresentStatus::Success))
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.state().calls.push(MockCall::WaitIdle);
        Ok(())
    }

    fn queue_wait_idle(&mut self, queue: QueueKind) -> Result<()> {
        self.state().calls.push(MockCall::QueueWaitIdle(queue));
        Ok(())
    }

    fn recreate_swapchain(&mut self, extent: Extent2D) -> Result<()> {
        let mut state = self.state();
        let old: Vec<_> = state.swapchain.drain(..).collect();
        for (image, view) in old {
            state.views.remove(view);
            state.images.remove(image);
        }
        state.swapchain_extent = extent;
        state.register_swapchain();
        state.calls.push(MockCall::RecreateSwapchain(extent));
        Ok(())
    }

    fn begin_command_buffer(&mut self, command_buffer: CommandBufferHandle, _usage: CommandBufferUsage) -> Result<()> {
        let mut state = self.state();
        if state.fail_begin {
            return Err(Error::CommandRecording("scripted begin failure".to_string()));
        }
        let entry = state
            .command_buffers
            .get_mut(command_buffer)
            .ok_or_else(|| Error::InvalidResource("unknown command buffer".to_string()))?;
        if entry.recording {
            return Err(Error::CommandRecording("command buffer already recording".to_string()));
        }
        entry.recording = true;
        entry.executable = false;
        state.calls.push(MockCall::Begin(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&mut self, command_buffer: CommandBufferHandle) -> Result<()> {
        let mut state = self.state();
        state.recording(command_buffer)?;
        if let Some(entry) = state.command_buffers.get_mut(command_buffer) {
            entry.recording = false;
            entry.executable = true;
        }
        state.calls.push(MockCall::End(command_buffer));
        Ok(())
    }

    fn reset_command_buffer(&mut self, command_buffer: CommandBufferHandle) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .command_buffers
            .get_mut(command_buffer)
            .ok_or_else(|| Error::InvalidResource("unknown command buffer".to_string()))?;
        entry.recording = false;
        entry.executable = false;
        state.calls.push(MockCall::Reset(command_buffer));
        Ok(())
    }

    fn cmd_pipeline_barrier(&mut self, command_buffer: CommandBufferHandle, batch: &BarrierBatch) -> Result<()> {
        self.state().record(command_buffer, MockCall::Barrier(batch.clone()))
    }

    fn cmd_begin_rendering(&mut self, command_buffer: CommandBufferHandle, info: &RenderingInfo) -> Result<()> {
        self.state().record(command_buffer, MockCall::BeginRendering(info.clone()))
    }

    fn cmd_end_rendering(&mut self, command_buffer: CommandBufferHandle) -> Result<()> {
        self.state().record(command_buffer, MockCall::EndRendering)
    }

    fn cmd_set_viewport(&mut self, command_buffer: CommandBufferHandle, viewport: Viewport) -> Result<()> {
        self.state().record(command_buffer, MockCall::SetViewport(viewport))
    }

    fn cmd_set_scissor(&mut self, command_buffer: CommandBufferHandle, scissor: Rect2D) -> Result<()> {
        self.state().record(command_buffer, MockCall::SetScissor(scissor))
    }

    fn cmd_bind_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        bind_point: BindPoint,
        pipeline: PipelineHandle,
    ) -> Result<()> {
        let mut state = self.state();
        match state.pipelines.get(pipeline) {
            Some(&created) if created == bind_point => {}
            Some(_) => return Err(Error::BackendError("pipeline bound at the wrong bind point".to_string())),
            None => return Err(Error::InvalidResource("unknown pipeline".to_string())),
        }
        state.record(command_buffer, MockCall::BindPipeline(bind_point, pipeline))
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: CommandBufferHandle,
        _bind_point: BindPoint,
        _layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        let mut state = self.state();
        if sets.iter().any(|s| !state.sets.contains_key(*s)) {
            return Err(Error::InvalidResource("unknown descriptor set".to_string()));
        }
        state.record(command_buffer, MockCall::BindDescriptorSets { first_set, count: sets.len() })
    }

    fn cmd_push_constants(
        &mut self,
        command_buffer: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        _stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.state()
            .record(command_buffer, MockCall::PushConstants { offset, size: data.len() })
    }

    fn cmd_bind_vertex_buffers(
        &mut self,
        command_buffer: CommandBufferHandle,
        _first_binding: u32,
        buffers: &[(BufferHandle, u64)],
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::BindVertexBuffers(buffers.len()))
    }

    fn cmd_bind_index_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        _buffer: BufferHandle,
        _offset: u64,
        _index_type: IndexType,
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::BindIndexBuffer)
    }

    fn cmd_draw(
        &mut self,
        command_buffer: CommandBufferHandle,
        vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::Draw { vertex_count })
    }

    fn cmd_draw_indexed(
        &mut self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::DrawIndexed { index_count })
    }

    fn cmd_dispatch(&mut self, command_buffer: CommandBufferHandle, x: u32, y: u32, z: u32) -> Result<()> {
        self.state().record(command_buffer, MockCall::Dispatch(x, y, z))
    }

    fn cmd_trace_rays(
        &mut self,
        command_buffer: CommandBufferHandle,
        _pipeline: PipelineHandle,
        extent: Extent2D,
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::TraceRays(extent))
    }

    fn cmd_clear_depth_attachment(
        &mut self,
        command_buffer: CommandBufferHandle,
        _rect: Rect2D,
        _layer_count: u32,
        depth: f32,
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::ClearDepthAttachment(depth))
    }

    fn cmd_copy_image_to_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        _layout: ImageLayout,
        buffer: BufferHandle,
        region: BufferImageCopy,
    ) -> Result<()> {
        let mut state = self.state();
        if !state.images.contains_key(image) {
            return Err(Error::InvalidResource("copy from unknown image".to_string()));
        }
        state.record(command_buffer, MockCall::CopyImageToBuffer(region))?;
        let value = state.readback_value.to_le_bytes();
        let offset = region.buffer_offset as usize;
        if let Some(dst) = state.buffers.get_mut(buffer) {
            if dst.bytes.len() >= offset + value.len() {
                dst.bytes[offset..offset + value.len()].copy_from_slice(&value);
            }
        }
        Ok(())
    }

    fn cmd_copy_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        _src: BufferHandle,
        _dst: BufferHandle,
        size: u64,
    ) -> Result<()> {
        self.state().record(command_buffer, MockCall::CopyBuffer(size))
    }
}
