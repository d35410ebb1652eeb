/// Frame orchestrator
///
/// The renderer owns the device, the render targets (swapchain, offscreen
/// viewport, mouse picking, shadow maps), one command buffer per submission
/// kind and frame slot, the pipeline registry and the registered scene
/// content. `render` drives one frame slot through
///
/// ```text
/// wait fences -> acquire -> reset fences -> compute -> shadow passes
///     -> ray tracing -> offscreen pass -> swapchain pass (+ GUI) -> present
/// ```
///
/// Out-of-date or suboptimal swapchains and window resizes are recovered by
/// recreating the swapchain and every render target sized from it. Any other
/// error after acquisition leaves the slot where it failed: its fence is
/// unsignalled and its acquire semaphore pending, so the renderer refuses
/// further frames and has to be rebuilt.

use glam::Mat4;
use slotmap::SlotMap;

use crate::command::CommandBuffer;
use crate::config::EngineConfig;
use crate::device::*;
use crate::error::{Error, Result};
use crate::image::{AttachmentLoads, RenderTarget, RenderTargetConfig, IMAGE_COUNT};
use crate::pipeline::{
    LinePipeline, MousePickingPipeline, Pipeline, PipelineManager, PipelineType, RenderLayer, ShaderSource,
    ShadowPipeline, MAX_SHADOW_CASTERS,
};
use crate::render::camera::Camera;
use crate::render::frame_state::{FrameState, FrameStates};
use crate::render::gui::GuiRenderer;
use crate::render::light::Light;
use crate::render::line_buffer::LineBuffer;
use crate::render::render_info::RenderInfo;
use crate::render::render_object::{Mesh, ObjectKey, RenderObject};
use crate::render::render_requests::{Line, RenderRequests};
use crate::render::shadow_map::{shadow_depth_format, ShadowMap};
use crate::render::window::WindowSurface;
use crate::{engine_debug, engine_error, engine_info, engine_warn};

/// Depth format of the swapchain, offscreen and mouse picking targets
pub const SCENE_DEPTH_FORMAT: Format = Format::D32_SFLOAT;

/// Color format of the offscreen viewport
pub const OFFSCREEN_COLOR_FORMAT: Format = Format::R8G8B8A8_UNORM;

/// Debug lines drawn per frame
pub const LINE_CAPACITY: usize = 4096;

/// Counters accumulated over the renderer's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub frames_presented: u64,
    /// Objects drawn plus line batches, over every pass
    pub draw_calls: u64,
    pub shadow_passes: u64,
    pub offscreen_passes: u64,
    pub compute_dispatches: u64,
    pub ray_traces: u64,
    pub swapchain_recreations: u64,
}

pub struct Renderer {
    config: EngineConfig,
    camera: Camera,
    samples: SampleCount,
    shadow_format: Format,
    swapchain_target: RenderTarget,
    offscreen_target: Option<RenderTarget>,
    offscreen_extent: Extent2D,
    picking_target: Option<RenderTarget>,
    picking_readback: BufferHandle,
    shadow_maps: Vec<Option<ShadowMap>>,
    graphics_commands: CommandBuffer,
    offscreen_commands: CommandBuffer,
    compute_commands: CommandBuffer,
    picking_commands: CommandBuffer,
    pipelines: PipelineManager,
    objects: SlotMap<ObjectKey, RenderObject>,
    next_object_id: u32,
    requests: RenderRequests,
    line_buffer: LineBuffer,
    frame_states: FrameStates,
    current_frame: usize,
    stats: RendererStats,
    gui: Option<Box<dyn GuiRenderer>>,
    /// Dropped last, after `Drop` released everything created from it
    device: Box<dyn GraphicsDevice>,
}

impl Renderer {
    /// Build the render targets, command buffers and engine pipelines on `device`
    ///
    /// Engine shaders are loaded from `config.shader_dir`.
    pub fn new(config: EngineConfig, mut device: Box<dyn GraphicsDevice>, gui: Option<Box<dyn GuiRenderer>>) -> Result<Self> {
        config.validate()?;
        let frames = device.max_frames_in_flight();
        if frames == 0 || frames > IMAGE_COUNT {
            return Err(Error::InitializationFailed(format!(
                "{} frames in flight, the render targets hold {}",
                frames, IMAGE_COUNT
            )));
        }

        let samples = config.sample_count(device.max_usable_sample_count());
        let shadow_format = shadow_depth_format(device.as_ref());
        let swapchain_extent = device.swapchain_extent();
        let swapchain_config = swapchain_target_config(device.as_ref(), samples);

        let dev = device.as_mut();
        let swapchain_target = RenderTarget::new(dev, &swapchain_config)?;
        let graphics_commands = CommandBuffer::new(dev, QueueKind::Graphics)?;
        let offscreen_commands = CommandBuffer::new(dev, QueueKind::Graphics)?;
        let compute_commands = CommandBuffer::new(dev, QueueKind::Compute)?;
        let picking_commands = CommandBuffer::new(dev, QueueKind::Graphics)?;
        let line_buffer = LineBuffer::new(dev, LINE_CAPACITY)?;
        let picking_readback = dev.create_buffer(&BufferDesc {
            size: MOUSE_PICKING_FORMAT.bytes_per_texel() as u64,
            usage: BufferUsage::TRANSFER_DST,
            location: MemoryLocation::GpuToCpu,
            label: "mouse picking readback".to_string(),
        })?;

        let mut renderer = Self {
            camera: Camera::from_config(&config),
            config,
            samples,
            shadow_format,
            swapchain_target,
            offscreen_target: None,
            offscreen_extent: Extent2D::default(),
            picking_target: None,
            picking_readback,
            shadow_maps: Vec::new(),
            graphics_commands,
            offscreen_commands,
            compute_commands,
            picking_commands,
            pipelines: PipelineManager::new(),
            objects: SlotMap::with_key(),
            next_object_id: 1,
            requests: RenderRequests::new(),
            line_buffer,
            frame_states: FrameStates::new(frames),
            current_frame: 0,
            stats: RendererStats::default(),
            gui,
            device,
        };

        let viewport = renderer.viewport_extent(swapchain_extent);
        renderer.reset_offscreen_image_resources(viewport)?;
        renderer.reset_mouse_picking_image_resources(viewport)?;
        renderer.register_engine_pipelines()?;

        engine_info!(
            "nebula::renderer",
            "Renderer ready: {}x{} swapchain, {:?} samples, {} frames in flight, offscreen viewport {}x{}",
            swapchain_extent.width,
            swapchain_extent.height,
            samples,
            frames,
            viewport.width,
            viewport.height
        );
        Ok(renderer)
    }

    fn register_engine_pipelines(&mut self) -> Result<()> {
        let scene_render = self.scene_render_description();
        let config = &self.config;
        let device = self.device.as_mut();

        let shadow = ShadowPipeline::new(
            device,
            ShaderSource::Path(config.shader_path("shadow.vert.spv")),
            self.shadow_format,
            false,
        )?;
        self.pipelines.register(device, PipelineType::Shadow, Box::new(shadow));

        let shadow_cube = ShadowPipeline::new(
            device,
            ShaderSource::Path(config.shader_path("shadow_cube.vert.spv")),
            self.shadow_format,
            true,
        )?;
        self.pipelines.register(device, PipelineType::ShadowCube, Box::new(shadow_cube));

        let lines = LinePipeline::new(
            device,
            ShaderSource::Path(config.shader_path("lines.vert.spv")),
            ShaderSource::Path(config.shader_path("lines.frag.spv")),
            scene_render,
            self.samples,
        )?;
        self.pipelines.register(device, PipelineType::Lines, Box::new(lines));

        if config.mouse_picking {
            let picking = MousePickingPipeline::new(
                device,
                ShaderSource::Path(config.shader_path("mouse_picking.vert.spv")),
                ShaderSource::Path(config.shader_path("mouse_picking.frag.spv")),
                SCENE_DEPTH_FORMAT,
            )?;
            self.pipelines.register(device, PipelineType::MousePicking, Box::new(picking));
        }
        Ok(())
    }

    // ===== FRAME =====

    /// Record, submit and present one frame on the current frame slot
    pub fn render(&mut self, window: &dyn WindowSurface) -> Result<()> {
        let frame = self.current_frame;
        if self.frame_states.get(frame) != Some(FrameState::Idle) {
            return Err(Error::InvalidFrameState(format!(
                "frame slot {} is {:?}, expected Idle",
                frame,
                self.frame_states.get(frame)
            )));
        }

        self.device.wait_for_graphics_fences(frame)?;
        let (image_index, suboptimal) = match self.device.acquire_next_image(frame)? {
            AcquireResult::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireResult::OutOfDate => {
                engine_debug!("nebula::renderer", "Swapchain out of date on acquire, frame {} aborted", frame);
                return self.recreate_swapchain(window);
            }
        };
        self.frame_states.advance(frame, FrameState::Acquired)?;

        let status = match self.record_and_submit(frame, image_index) {
            Ok(status) => status,
            Err(e) => {
                engine_error!(
                    "nebula::renderer",
                    "Frame slot {} failed in state {:?}, no further frames can be rendered: {}",
                    frame,
                    self.frame_states.get(frame),
                    e
                );
                return Err(e);
            }
        };
        self.frame_states.advance(frame, FrameState::Presented)?;
        self.stats.frames_presented += 1;
        self.frame_states.advance(frame, FrameState::Idle)?;
        self.current_frame = (frame + 1) % self.frame_states.len();

        let resized = window.take_resized();
        if suboptimal || resized || status != PresentStatus::Success {
            engine_debug!(
                "nebula::renderer",
                "Recreating swapchain (present {:?}, suboptimal acquire {}, resized {})",
                status,
                suboptimal,
                resized
            );
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    /// Steps after acquisition, up to and including present
    fn record_and_submit(&mut self, frame: usize, image_index: u32) -> Result<PresentStatus> {
        self.device.reset_graphics_fences(frame)?;

        let Self {
            config,
            camera,
            shadow_format,
            swapchain_target,
            offscreen_target,
            shadow_maps,
            graphics_commands,
            offscreen_commands,
            compute_commands,
            pipelines,
            objects,
            requests,
            line_buffer,
            frame_states,
            stats,
            gui,
            device,
            ..
        } = self;
        let device = device.as_mut();

        prepare_shadow_maps(device, requests, shadow_maps, *shadow_format)?;
        let lines = line_buffer.write(device, frame, requests.lines())?;
        let scene = Scene { pipelines, objects, requests, camera };
        let offscreen_active = offscreen_target.is_some();
        let clear = AttachmentLoads::clear(config.clear_color, 1.0);

        // Compute work only feeds the offscreen pass
        let compute_types = scene.pipelines.compute_types();
        let wait_compute = offscreen_active && !compute_types.is_empty();
        if wait_compute {
            device.wait_for_compute_fences(frame)?;
            device.reset_compute_fences(frame)?;
            compute_commands.set_current_frame(frame)?;
            compute_commands.reset(device)?;
            compute_commands.record(device, |device, cmd| {
                for tag in &compute_types {
                    scene.pipelines.compute(device, *tag, cmd, frame)?;
                }
                Ok(())
            })?;
            device.submit_compute_queue(frame, compute_commands.handle())?;
            stats.compute_dispatches += compute_types.len() as u64;
        }

        if let Some(target) = offscreen_target.as_mut() {
            offscreen_commands.set_current_frame(frame)?;
            offscreen_commands.reset(device)?;
            offscreen_commands.record(device, |device, cmd| {
                scene.record_shadow_passes(device, cmd, frame, shadow_maps, stats)?;
                let extent = target.extent();
                scene.record_ray_tracing(device, cmd, frame, extent, stats)?;
                apply_barriers(device, cmd, target.begin_pass_barriers(frame))?;
                device.cmd_begin_rendering(cmd, &target.rendering_info(frame, clear, 0, None)?)?;
                set_full_viewport(device, cmd, extent)?;
                let info = RenderInfo::new(cmd, frame, scene.camera, extent).with_lines(lines);
                scene.record_content(device, &info, stats)?;
                device.cmd_end_rendering(cmd)?;
                apply_barriers(device, cmd, target.end_pass_barriers(frame))
            })?;
            frame_states.advance(frame, FrameState::ShadowRecorded)?;
            device.submit_offscreen_graphics_queue(frame, offscreen_commands.handle(), wait_compute)?;
            frame_states.advance(frame, FrameState::OffscreenSubmitted)?;
            stats.offscreen_passes += 1;
        }

        if let Some(gui) = gui.as_mut() {
            let texture = offscreen_target
                .as_ref()
                .and_then(|target| target.resolve(frame))
                .and_then(|resolve| resolve.gui_texture());
            gui.set_viewport_texture(texture);
            gui.prepare_draw_data()?;
        }

        let (swapchain_image, swapchain_view) = device.swapchain_image(image_index)?;
        let swapchain_format = device.swapchain_format();
        let draw_scene = !config.offscreen_viewport;
        graphics_commands.set_current_frame(frame)?;
        graphics_commands.reset(device)?;
        graphics_commands.record(device, |device, cmd| {
            let extent = swapchain_target.extent();
            if !offscreen_active {
                scene.record_shadow_passes(device, cmd, frame, shadow_maps, stats)?;
                scene.record_ray_tracing(device, cmd, frame, extent, stats)?;
            }
            let to_attachment = ImageBarrier::transition(
                swapchain_image,
                swapchain_format,
                ImageLayout::Undefined,
                ImageLayout::ColorAttachment,
            );
            apply_barriers(device, cmd, swapchain_target.begin_pass_barriers(frame).with(to_attachment))?;
            device.cmd_begin_rendering(cmd, &swapchain_target.rendering_info(frame, clear, 0, Some(swapchain_view))?)?;
            set_full_viewport(device, cmd, extent)?;
            if draw_scene {
                let info = RenderInfo::new(cmd, frame, scene.camera, extent).with_lines(lines);
                scene.record_content(device, &info, stats)?;
            }
            if let Some(gui) = gui.as_mut() {
                gui.render_draw_data(device, cmd)?;
            }
            device.cmd_end_rendering(cmd)?;
            let to_present = ImageBarrier::transition(
                swapchain_image,
                swapchain_format,
                ImageLayout::ColorAttachment,
                ImageLayout::PresentSrc,
            );
            apply_barriers(device, cmd, to_present.into())
        })?;
        if !offscreen_active {
            frame_states.advance(frame, FrameState::ShadowRecorded)?;
            frame_states.advance(frame, FrameState::OffscreenSubmitted)?;
        }
        device.submit_graphics_queue(frame, graphics_commands.handle())?;
        frame_states.advance(frame, FrameState::SwapchainSubmitted)?;

        let waits = present_wait_semaphores(offscreen_active);
        device.queue_present(frame, image_index, &waits)
    }

    /// Rebuild the swapchain and every target sized from it
    ///
    /// Blocks while the window is minimized.
    pub fn recreate_swapchain(&mut self, window: &dyn WindowSurface) -> Result<()> {
        let mut extent = window.framebuffer_size();
        while extent.is_zero_area() {
            window.wait_events();
            extent = window.framebuffer_size();
        }

        self.device.wait_idle()?;
        self.device.recreate_swapchain(extent)?;
        let swapchain_extent = self.device.swapchain_extent();
        self.swapchain_target.recreate(self.device.as_mut(), swapchain_extent)?;

        let viewport = self.viewport_extent(swapchain_extent);
        if self.config.offscreen_viewport {
            self.reset_offscreen_image_resources(viewport)?;
        }
        if self.config.mouse_picking {
            self.reset_mouse_picking_image_resources(viewport)?;
        }
        self.stats.swapchain_recreations += 1;
        engine_info!(
            "nebula::renderer",
            "Swapchain recreated at {}x{}",
            swapchain_extent.width,
            swapchain_extent.height
        );
        Ok(())
    }

    /// Extent the scene is rendered at for a swapchain of `swapchain_extent`
    fn viewport_extent(&self, swapchain_extent: Extent2D) -> Extent2D {
        if self.config.offscreen_viewport {
            self.config.docking.viewport_extent(swapchain_extent)
        } else {
            swapchain_extent
        }
    }

    // ===== RENDER TARGETS =====

    /// Replace the offscreen viewport target with one of `extent`
    ///
    /// A zero extent leaves no target, and the offscreen pass is skipped
    /// until a nonzero extent is set.
    pub fn reset_offscreen_image_resources(&mut self, extent: Extent2D) -> Result<()> {
        let device = self.device.as_mut();
        if let Some(mut target) = self.offscreen_target.take() {
            unregister_viewport_textures(device, &mut self.gui, &mut target);
            target.destroy(device)?;
        }
        self.offscreen_extent = extent;
        if !self.config.offscreen_viewport || extent.is_zero_area() {
            return Ok(());
        }

        let mut target = RenderTarget::new(device, &offscreen_target_config(extent, self.samples))?;
        if let Err(e) = register_viewport_textures(device, &mut self.gui, &mut target) {
            unregister_viewport_textures(device, &mut self.gui, &mut target);
            target.destroy(device)?;
            return Err(e);
        }
        self.offscreen_target = Some(target);
        Ok(())
    }

    /// Replace the mouse picking target with one of `extent` (none for a zero extent)
    pub fn reset_mouse_picking_image_resources(&mut self, extent: Extent2D) -> Result<()> {
        let device = self.device.as_mut();
        if let Some(mut target) = self.picking_target.take() {
            target.destroy(device)?;
        }
        if !self.config.mouse_picking || extent.is_zero_area() {
            return Ok(());
        }
        self.picking_target = Some(RenderTarget::new(device, &picking_target_config(extent))?);
        Ok(())
    }

    // ===== MOUSE PICKING =====

    /// Object under pixel (`x`, `y`) of the scene viewport
    ///
    /// Renders object ids into the picking target, copies the pixel to a
    /// host-visible buffer and waits for the result. Id 0 is background.
    pub fn pick_object(&mut self, x: u32, y: u32) -> Result<Option<ObjectKey>> {
        let frame = self.current_frame;
        let Self {
            camera,
            picking_target,
            picking_readback,
            picking_commands,
            pipelines,
            objects,
            requests,
            stats,
            device,
            ..
        } = self;
        let device = device.as_mut();
        let target = picking_target
            .as_mut()
            .ok_or_else(|| Error::InvalidResource("mouse picking target is not available".to_string()))?;
        let extent = target.extent();
        if x >= extent.width || y >= extent.height {
            return Ok(None);
        }

        let scene = Scene { pipelines, objects, requests, camera };
        let candidates = scene.unique_objects();
        let readback = *picking_readback;
        let loads = AttachmentLoads::clear([0.0; 4], 1.0);

        device.wait_for_mouse_picking_fences(frame)?;
        device.reset_mouse_picking_fences(frame)?;
        picking_commands.set_current_frame(frame)?;
        picking_commands.reset(device)?;
        picking_commands.record(device, |device, cmd| {
            device.cmd_begin_rendering(cmd, &target.rendering_info(frame, loads, 0, None)?)?;
            set_full_viewport(device, cmd, extent)?;
            let info = RenderInfo::new(cmd, frame, scene.camera, extent);
            scene.pipelines.render(device, PipelineType::MousePicking, &info, &candidates)?;
            device.cmd_end_rendering(cmd)?;

            let ids = target
                .color_mut(frame)
                .ok_or_else(|| Error::InvalidResource(format!("mouse picking target has no slot {}", frame)))?;
            let image = ids.image();
            apply_barriers(device, cmd, ids.barrier_to(ImageLayout::TransferSrc).into())?;
            device.cmd_copy_image_to_buffer(
                cmd,
                image,
                ImageLayout::TransferSrc,
                readback,
                BufferImageCopy {
                    buffer_offset: 0,
                    image_offset: (x as i32, y as i32),
                    extent: Extent2D::new(1, 1),
                    aspect: ImageAspect::COLOR,
                    layer: 0,
                },
            )?;
            apply_barriers(device, cmd, ids.barrier_to(ImageLayout::ColorAttachment).into())
        })?;
        device.submit_mouse_picking_graphics_queue(frame, picking_commands.handle())?;
        device.wait_for_mouse_picking_fences(frame)?;
        stats.draw_calls += candidates.len() as u64;

        let id: u32 = read_buffer(device, readback)?;
        if id == 0 {
            return Ok(None);
        }
        Ok(objects.iter().find(|(_, object)| object.id() == id).map(|(key, _)| key))
    }

    // ===== SCENE CONTENT =====

    /// Register `pipeline` under `tag`, replacing any previous one
    ///
    /// A replaced pipeline is destroyed once the device is idle. Object
    /// requests for `tag` are dropped if the new pipeline cannot draw.
    pub fn register_pipeline(&mut self, tag: PipelineType, mut pipeline: Box<dyn Pipeline>) -> Result<()> {
        if self.pipelines.contains(tag) {
            if let Err(e) = self.device.wait_idle() {
                pipeline.destroy(self.device.as_mut());
                return Err(e);
            }
        }
        if !pipeline.kind().supports_graphics() && !self.requests.objects(tag).is_empty() {
            engine_warn!(
                "nebula::renderer",
                "{} pipeline '{}' cannot draw, dropping the objects requested for {}",
                pipeline.kind().name(),
                pipeline.name(),
                tag
            );
            self.requests.remove_pipeline_type(tag);
        }
        self.pipelines.register(self.device.as_mut(), tag, pipeline);
        Ok(())
    }

    /// Destroy the pipeline under `tag` and drop the object requests that use it
    pub fn unregister_pipeline(&mut self, tag: PipelineType) -> Result<()> {
        self.device.wait_idle()?;
        self.pipelines.unregister(self.device.as_mut(), tag)?;
        self.requests.remove_pipeline_type(tag);
        Ok(())
    }

    /// Place `mesh` in the scene; it is drawn once registered with a pipeline type
    pub fn add_render_object(&mut self, mesh: Mesh, transform: Mat4) -> Result<ObjectKey> {
        let id = self.next_object_id;
        let object = RenderObject::new(self.device.as_mut(), id, mesh, transform)?;
        self.next_object_id += 1;
        Ok(self.objects.insert(object))
    }

    /// Destroy `object` and drop it from every render request
    pub fn remove_render_object(&mut self, object: ObjectKey) -> Result<()> {
        let mut removed = self
            .objects
            .remove(object)
            .ok_or_else(|| Error::InvalidResource("unknown render object".to_string()))?;
        self.requests.remove_object(object);
        self.device.wait_idle()?;
        removed.destroy(self.device.as_mut());
        Ok(())
    }

    pub fn render_object(&self, object: ObjectKey) -> Option<&RenderObject> {
        self.objects.get(object)
    }

    pub fn render_object_mut(&mut self, object: ObjectKey) -> Option<&mut RenderObject> {
        self.objects.get_mut(object)
    }

    /// Draw `object` with the pipeline registered under `tag` until requests are cleared
    pub fn register_render_object(&mut self, tag: PipelineType, object: ObjectKey) -> Result<()> {
        if tag.is_builtin() {
            return Err(Error::InvalidResource(format!("{} pipeline is driven by its own pass", tag)));
        }
        if !self.pipelines.kind(tag)?.supports_graphics() {
            return Err(Error::PipelineTypeMismatch { pipeline: tag.to_string(), expected: "graphics" });
        }
        if !self.objects.contains_key(object) {
            return Err(Error::InvalidResource("unknown render object".to_string()));
        }
        self.requests.register_object(tag, object);
        Ok(())
    }

    /// Light the scene with `light`; shadow casters need a nonzero shadow map size
    pub fn register_light(&mut self, light: Light) -> Result<()> {
        if light.casts_shadows() && light.shadow_map_size() == 0 {
            return Err(Error::InvalidResource("shadow casting light has a zero shadow map size".to_string()));
        }
        if light.casts_shadows() && self.requests.shadow_casting_lights().count() >= MAX_SHADOW_CASTERS {
            engine_warn!(
                "nebula::renderer",
                "More than {} shadow casting lights, extra lights render without shadows",
                MAX_SHADOW_CASTERS
            );
        }
        self.requests.register_light(light);
        Ok(())
    }

    pub fn register_line(&mut self, line: Line) {
        self.requests.register_line(line);
    }

    /// Drop every object, light and line request
    pub fn clear_render_requests(&mut self) {
        self.requests.clear();
    }

    pub fn render_requests(&self) -> &RenderRequests {
        &self.requests
    }

    // ===== ACCESSORS =====

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Device for creating meshes and application pipelines
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    pub fn samples(&self) -> SampleCount {
        self.samples
    }

    /// Attachment formats of the pass scene pipelines draw in
    pub fn scene_render_description(&self) -> RenderDescription {
        let color = if self.config.offscreen_viewport {
            OFFSCREEN_COLOR_FORMAT
        } else {
            self.device.swapchain_format()
        };
        RenderDescription::Dynamic {
            color_formats: vec![color],
            depth_format: SCENE_DEPTH_FORMAT,
            view_mask: 0,
        }
    }

    pub fn frame_state(&self, frame: usize) -> Option<FrameState> {
        self.frame_states.get(frame)
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    pub fn swapchain_target(&self) -> &RenderTarget {
        &self.swapchain_target
    }

    pub fn offscreen_target(&self) -> Option<&RenderTarget> {
        self.offscreen_target.as_ref()
    }

    pub fn offscreen_extent(&self) -> Extent2D {
        self.offscreen_extent
    }

    pub fn mouse_picking_target(&self) -> Option<&RenderTarget> {
        self.picking_target.as_ref()
    }

    /// Shadow map of the `slot`-th shadow casting light
    pub fn shadow_map(&self, slot: usize) -> Option<&ShadowMap> {
        self.shadow_maps.get(slot).and_then(Option::as_ref)
    }

    pub fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            engine_error!("nebula::renderer", "wait_idle failed during shutdown: {}", e);
        }
        let device = self.device.as_mut();

        self.pipelines.destroy(device);
        for (_, mut object) in self.objects.drain() {
            object.destroy(device);
        }
        self.line_buffer.destroy(device);
        device.destroy_buffer(&mut self.picking_readback);

        for map in self.shadow_maps.iter_mut().flatten() {
            log_release_failure(map.destroy(device));
        }
        self.shadow_maps.clear();
        if let Some(mut offscreen) = self.offscreen_target.take() {
            unregister_viewport_textures(device, &mut self.gui, &mut offscreen);
            log_release_failure(offscreen.destroy(device));
        }
        if let Some(mut picking) = self.picking_target.take() {
            log_release_failure(picking.destroy(device));
        }
        log_release_failure(self.swapchain_target.destroy(device));

        self.graphics_commands.destroy(device);
        self.offscreen_commands.destroy(device);
        self.compute_commands.destroy(device);
        self.picking_commands.destroy(device);
        if let Some(gui) = self.gui.as_mut() {
            gui.destroy(device);
        }
        engine_debug!("nebula::renderer", "Renderer resources released");
    }
}

fn log_release_failure(result: Result<()>) {
    if let Err(e) = result {
        engine_error!("nebula::renderer", "Failed to release render target: {}", e);
    }
}

// ===== RECORDING HELPERS =====

/// Read-only view of the registered scene used while recording
struct Scene<'a> {
    pipelines: &'a PipelineManager,
    objects: &'a SlotMap<ObjectKey, RenderObject>,
    requests: &'a RenderRequests,
    camera: &'a Camera,
}

impl<'a> Scene<'a> {
    fn requested(&self, tag: PipelineType) -> Vec<&'a RenderObject> {
        self.requests
            .objects(tag)
            .iter()
            .filter_map(|key| self.objects.get(*key))
            .collect()
    }

    fn unique_objects(&self) -> Vec<&'a RenderObject> {
        self.requests
            .unique_objects()
            .into_iter()
            .filter_map(|key| self.objects.get(key))
            .collect()
    }

    fn shadow_casters(&self) -> Vec<&'a RenderObject> {
        self.unique_objects().into_iter().filter(|o| o.casts_shadows()).collect()
    }

    /// Requested application pipeline types drawn in `layer`, in request order
    fn layer_types(&self, layer: RenderLayer) -> Result<Vec<PipelineType>> {
        let mut types = Vec::new();
        for tag in self.requests.pipeline_types() {
            if !tag.is_builtin() && self.pipelines.get(*tag)?.render_layer() == layer {
                types.push(*tag);
            }
        }
        Ok(types)
    }

    fn record_layer(
        &self,
        device: &mut dyn GraphicsDevice,
        info: &RenderInfo,
        layer: RenderLayer,
        stats: &mut RendererStats,
    ) -> Result<()> {
        for tag in self.layer_types(layer)? {
            let objects = self.requested(tag);
            self.pipelines.render(device, tag, info, &objects)?;
            stats.draw_calls += objects.len() as u64;
        }
        Ok(())
    }

    /// Scene pipelines, lines, depth clear, then overlay pipelines
    fn record_content(&self, device: &mut dyn GraphicsDevice, info: &RenderInfo, stats: &mut RendererStats) -> Result<()> {
        self.record_layer(device, info, RenderLayer::Scene, stats)?;
        if info.lines.is_some() && self.pipelines.contains(PipelineType::Lines) {
            self.pipelines.render(device, PipelineType::Lines, info, &[])?;
            stats.draw_calls += 1;
        }
        device.cmd_clear_depth_attachment(info.command_buffer, Rect2D::full(info.extent), 1, 1.0)?;
        self.record_layer(device, info, RenderLayer::Overlay, stats)
    }

    /// Trace every registered ray tracing pipeline, outside any rendering pass
    fn record_ray_tracing(
        &self,
        device: &mut dyn GraphicsDevice,
        cmd: CommandBufferHandle,
        frame: usize,
        extent: Extent2D,
        stats: &mut RendererStats,
    ) -> Result<()> {
        for tag in self.pipelines.ray_tracing_types() {
            let info = RenderInfo::new(cmd, frame, self.camera, extent);
            self.pipelines.trace_rays(device, tag, &info)?;
            stats.ray_traces += 1;
        }
        Ok(())
    }

    /// One depth-only pass per shadow casting light that has a shadow map
    fn record_shadow_passes(
        &self,
        device: &mut dyn GraphicsDevice,
        cmd: CommandBufferHandle,
        frame: usize,
        shadow_maps: &mut [Option<ShadowMap>],
        stats: &mut RendererStats,
    ) -> Result<()> {
        let casters = self.shadow_casters();
        let lights = self.requests.shadow_casting_lights().take(MAX_SHADOW_CASTERS);
        for (slot, light) in lights.enumerate() {
            let Some(map) = shadow_maps.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };
            let tag = if light.is_cube() { PipelineType::ShadowCube } else { PipelineType::Shadow };
            let view = light.light_view(slot);
            let extent = map.extent();

            apply_barriers(device, cmd, map.begin_pass_barriers(frame))?;
            device.cmd_begin_rendering(cmd, &map.rendering_info(frame, view.view_mask)?)?;
            set_full_viewport(device, cmd, extent)?;
            let info = RenderInfo::new(cmd, frame, self.camera, extent).with_light(view);
            self.pipelines.render(device, tag, &info, &casters)?;
            device.cmd_end_rendering(cmd)?;
            apply_barriers(device, cmd, map.end_pass_barriers(frame))?;

            stats.shadow_passes += 1;
            stats.draw_calls += casters.len() as u64;
        }
        Ok(())
    }
}

/// Make sure every shadow casting light (up to `MAX_SHADOW_CASTERS`) has a matching map
fn prepare_shadow_maps(
    device: &mut dyn GraphicsDevice,
    requests: &RenderRequests,
    shadow_maps: &mut Vec<Option<ShadowMap>>,
    depth_format: Format,
) -> Result<()> {
    for (slot, light) in requests.shadow_casting_lights().take(MAX_SHADOW_CASTERS).enumerate() {
        if shadow_maps.len() <= slot {
            shadow_maps.resize_with(slot + 1, || None);
        }
        let entry = &mut shadow_maps[slot];
        if entry.as_ref().is_some_and(|map| map.matches(light)) {
            continue;
        }
        if let Some(mut stale) = entry.take() {
            stale.destroy(device)?;
        }
        *entry = Some(ShadowMap::new(device, light, depth_format, slot)?);
    }
    Ok(())
}

fn apply_barriers(device: &mut dyn GraphicsDevice, cmd: CommandBufferHandle, batch: BarrierBatch) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    device.cmd_pipeline_barrier(cmd, &batch)
}

fn set_full_viewport(device: &mut dyn GraphicsDevice, cmd: CommandBufferHandle, extent: Extent2D) -> Result<()> {
    device.cmd_set_viewport(cmd, Viewport::full(extent))?;
    device.cmd_set_scissor(cmd, Rect2D::full(extent))
}

fn register_viewport_textures(
    device: &mut dyn GraphicsDevice,
    gui: &mut Option<Box<dyn GuiRenderer>>,
    target: &mut RenderTarget,
) -> Result<()> {
    let Some(gui) = gui.as_mut() else {
        return Ok(());
    };
    for image in target.resolve_images_mut() {
        let Some(sampler) = image.sampler() else {
            continue;
        };
        let texture = gui.register_texture(device, image.sampled_view(), sampler)?;
        image.set_gui_texture(Some(texture));
    }
    Ok(())
}

fn unregister_viewport_textures(
    device: &mut dyn GraphicsDevice,
    gui: &mut Option<Box<dyn GuiRenderer>>,
    target: &mut RenderTarget,
) {
    let Some(gui) = gui.as_mut() else {
        return;
    };
    for image in target.resolve_images_mut() {
        if let Some(texture) = image.gui_texture() {
            gui.unregister_texture(device, texture);
            image.set_gui_texture(None);
        }
    }
}

/// Multisampled targets resolve into the acquired image; single-sampled
/// ones render into it directly
fn swapchain_target_config(device: &dyn GraphicsDevice, samples: SampleCount) -> RenderTargetConfig {
    RenderTargetConfig {
        extent: device.swapchain_extent(),
        color_format: if samples.is_multisampled() { device.swapchain_format() } else { Format::Undefined },
        depth_format: SCENE_DEPTH_FORMAT,
        resolve_format: Format::Undefined,
        samples,
        sampled_depth: false,
        cube_map: false,
        layers: 1,
        label: "swapchain".to_string(),
    }
}

/// The resolve images are what the GUI samples
fn offscreen_target_config(extent: Extent2D, samples: SampleCount) -> RenderTargetConfig {
    RenderTargetConfig {
        extent,
        color_format: if samples.is_multisampled() { OFFSCREEN_COLOR_FORMAT } else { Format::Undefined },
        depth_format: SCENE_DEPTH_FORMAT,
        resolve_format: OFFSCREEN_COLOR_FORMAT,
        samples,
        sampled_depth: false,
        cube_map: false,
        layers: 1,
        label: "offscreen".to_string(),
    }
}

fn picking_target_config(extent: Extent2D) -> RenderTargetConfig {
    RenderTargetConfig {
        extent,
        color_format: MOUSE_PICKING_FORMAT,
        depth_format: SCENE_DEPTH_FORMAT,
        resolve_format: Format::Undefined,
        samples: SampleCount::S1,
        sampled_depth: false,
        cube_map: false,
        layers: 1,
        label: "mouse picking".to_string(),
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
