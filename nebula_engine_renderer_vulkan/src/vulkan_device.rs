/// VulkanDevice - `GraphicsDevice` on Vulkan 1.3
///
/// Owns the instance, surface, logical device, queues, allocator,
/// swapchain, per-frame sync objects, command pools and every object
/// created through the trait. Destruction happens in `Drop`, after a
/// device-idle wait, in reverse dependency order.

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use nebula_engine::config::EngineConfig;
use nebula_engine::nebula::device::*;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_debug, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::mem::ManuallyDrop;

use crate::debug;
use crate::vulkan_commands::{image_barriers, rendering_attachment};
use crate::vulkan_conversions::*;
use crate::vulkan_instance::VulkanInstance;
use crate::vulkan_physical_device::{
    create_logical_device, select_physical_device, supports_sampled_depth, PhysicalDeviceInfo, RayTracingProperties,
};
use crate::vulkan_pipeline;
use crate::vulkan_resources::*;
use crate::vulkan_shader;
use crate::vulkan_swapchain::Swapchain;
use crate::vulkan_sync::FrameSync;

const SOURCE: &str = "nebula::vulkan::Device";

/// Everything created on top of the logical device
struct DeviceObjects {
    allocator: Allocator,
    swapchain: Swapchain,
    sync: FrameSync,
    graphics_pool: vk::CommandPool,
    compute_pool: vk::CommandPool,
}

pub struct VulkanDevice {
    instance: VulkanInstance,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical: PhysicalDeviceInfo,
    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    allocator: ManuallyDrop<Allocator>,
    ray_tracing: Option<(ash::khr::ray_tracing_pipeline::Device, RayTracingProperties)>,
    swapchain: Swapchain,
    swapchain_handles: Vec<(ImageHandle, ImageViewHandle)>,
    sync: FrameSync,
    graphics_pool: vk::CommandPool,
    compute_pool: vk::CommandPool,
    tables: ResourceTables,
    report_validation_stats: bool,
}

impl VulkanDevice {
    /// Create the device for `window`
    ///
    /// The swapchain starts at the configured window size, clamped to what
    /// the surface allows.
    pub fn new<W>(window: &W, config: &EngineConfig) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| engine_err!(SOURCE, "Window has no display handle: {}", e))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| engine_err!(SOURCE, "Window has no window handle: {}", e))?
            .as_raw();

        let mut instance = VulkanInstance::new(display, config)?;
        let surface_loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);
        let surface = match unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, window_handle, None)
        } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy() };
                engine_error!(SOURCE, "Failed to create window surface: {:?}", e);
                return Err(Error::InitializationFailed(format!("Failed to create surface: {:?}", e)));
            }
        };

        let opened = select_physical_device(&instance.instance, &surface_loader, surface, config).and_then(|physical| {
            let device = create_logical_device(&instance.instance, &physical, config)?;
            match Self::create_device_objects(&instance.instance, &device, &physical, &surface_loader, surface, config) {
                Ok(objects) => Ok((physical, device, objects)),
                Err(e) => {
                    unsafe { device.destroy_device(None) };
                    Err(e)
                }
            }
        });
        let (physical, device, objects) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy();
                }
                return Err(e);
            }
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let ray_tracing = physical
            .ray_tracing
            .map(|props| (ash::khr::ray_tracing_pipeline::Device::new(&instance.instance, &device), props));

        let mut vulkan_device = Self {
            instance,
            surface_loader,
            surface,
            physical,
            device,
            graphics_queue,
            present_queue,
            allocator: ManuallyDrop::new(objects.allocator),
            ray_tracing,
            swapchain: objects.swapchain,
            swapchain_handles: Vec::new(),
            sync: objects.sync,
            graphics_pool: objects.graphics_pool,
            compute_pool: objects.compute_pool,
            tables: ResourceTables::default(),
            report_validation_stats: config.debug.enable_stats,
        };
        vulkan_device.register_swapchain_images();

        engine_info!(
            SOURCE,
            "VulkanDevice ready on {} ({} frames in flight, validation messenger {})",
            vulkan_device.physical.name,
            vulkan_device.sync.frame_count(),
            if vulkan_device.instance.has_messenger() { "on" } else { "off" }
        );
        Ok(vulkan_device)
    }

    fn create_device_objects(
        instance: &ash::Instance,
        device: &ash::Device,
        physical: &PhysicalDeviceInfo,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        config: &EngineConfig,
    ) -> Result<DeviceObjects> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: physical.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: physical.ray_tracing.is_some(),
            allocation_sizes: Default::default(),
        })
        .map_err(|e| allocation_error("allocator", e))?;

        let requested = Extent2D::new(config.window.width, config.window.height);
        let mut swapchain = Swapchain::new(
            instance,
            device,
            physical.physical_device,
            surface_loader,
            surface,
            (physical.graphics_family, physical.present_family),
            requested,
            None,
        )?;

        let mut sync = match FrameSync::new(device, config.max_frames_in_flight.max(1)) {
            Ok(sync) => sync,
            Err(e) => {
                unsafe { swapchain.destroy(device) };
                return Err(e);
            }
        };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical.graphics_family);
        let pools = unsafe { device.create_command_pool(&pool_info, None) }.and_then(|graphics_pool| {
            match unsafe { device.create_command_pool(&pool_info, None) } {
                Ok(compute_pool) => Ok((graphics_pool, compute_pool)),
                Err(e) => {
                    unsafe { device.destroy_command_pool(graphics_pool, None) };
                    Err(e)
                }
            }
        });
        let (graphics_pool, compute_pool) = match pools {
            Ok(pools) => pools,
            Err(e) => {
                unsafe {
                    sync.destroy(device);
                    swapchain.destroy(device);
                }
                return Err(creation_error("command pool", e));
            }
        };

        Ok(DeviceObjects { allocator, swapchain, sync, graphics_pool, compute_pool })
    }

    /// Expose the swapchain images through the image tables
    fn register_swapchain_images(&mut self) {
        let extent = self.swapchain.extent();
        let format = self.swapchain.format;
        self.swapchain_handles = self
            .swapchain
            .images
            .iter()
            .zip(&self.swapchain.views)
            .map(|(&image, &view)| {
                let image_handle =
                    self.tables.images.insert(ImageRecord { image, allocation: None, format, extent, swapchain: true });
                let view_handle =
                    self.tables.image_views.insert(ImageViewRecord { view, image: image_handle, swapchain: true });
                (image_handle, view_handle)
            })
            .collect();
    }

    fn unregister_swapchain_images(&mut self) {
        for (image, view) in self.swapchain_handles.drain(..) {
            self.tables.image_views.remove(view);
            self.tables.images.remove(image);
        }
    }

    fn queue(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Graphics | QueueKind::Compute => self.graphics_queue,
            QueueKind::Present => self.present_queue,
        }
    }

    fn command_pool(&self, kind: QueueKind) -> vk::CommandPool {
        match kind {
            QueueKind::Compute => self.compute_pool,
            QueueKind::Graphics | QueueKind::Present => self.graphics_pool,
        }
    }

    fn cmd(&self, command_buffer: CommandBufferHandle) -> Result<vk::CommandBuffer> {
        self.tables.command_buffer(command_buffer)
    }

    fn stage(&self, stage: PipelineStage) -> vk::PipelineStageFlags {
        pipeline_stage_to_vk(stage, self.ray_tracing.is_some())
    }

    fn wait_fences(&self, frame: usize, roles: &[FenceRole]) -> Result<()> {
        let fences = roles
            .iter()
            .map(|&role| self.sync.fence(frame, role))
            .collect::<Result<Vec<_>>>()?;
        unsafe { self.device.wait_for_fences(&fences, true, u64::MAX) }
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for {:?} fences of frame {}: {:?}", roles, frame, e))
    }

    fn reset_fences(&self, frame: usize, roles: &[FenceRole]) -> Result<()> {
        let fences = roles
            .iter()
            .map(|&role| self.sync.fence(frame, role))
            .collect::<Result<Vec<_>>>()?;
        unsafe { self.device.reset_fences(&fences) }
            .map_err(|e| engine_err!(SOURCE, "Failed to reset {:?} fences of frame {}: {:?}", roles, frame, e))
    }

    /// Submit one command buffer with the wiring of `kind`
    fn submit_kind(
        &mut self,
        kind: SubmitKind,
        frame: usize,
        command_buffer: CommandBufferHandle,
        wait: bool,
    ) -> Result<()> {
        let topology = kind.topology();
        let command_buffers = [self.cmd(command_buffer)?];

        let mut wait_semaphores = Vec::new();
        let mut wait_stages = Vec::new();
        if let (true, Some((role, stage))) = (wait, topology.wait) {
            wait_semaphores.push(self.sync.semaphore(frame, role)?);
            wait_stages.push(self.stage(stage));
        }
        let signal_semaphores = match topology.signal {
            Some(role) => vec![self.sync.semaphore(frame, role)?],
            None => Vec::new(),
        };
        let fence = self.sync.fence(frame, topology.fence)?;

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .queue_submit(self.queue(topology.queue), std::slice::from_ref(&submit_info), fence)
        }
        .map_err(|e| engine_err!(SOURCE, "{:?} submission for frame {} failed: {:?}", kind, frame, e))
    }

    /// Release every object still in the tables
    unsafe fn release_tables(&mut self) {
        let device = &self.device;
        let allocator = &mut *self.allocator;
        for (_, mut record) in self.tables.pipelines.drain() {
            if let Some(sbt) = record.sbt.as_mut() {
                sbt.destroy(device, allocator);
            }
            device.destroy_pipeline(record.pipeline, None);
        }
        for (_, layout) in self.tables.pipeline_layouts.drain() {
            device.destroy_pipeline_layout(layout, None);
        }
        for (_, render_pass) in self.tables.render_passes.drain() {
            device.destroy_render_pass(render_pass, None);
        }
        for (_, module) in self.tables.shader_modules.drain() {
            device.destroy_shader_module(module, None);
        }
        self.tables.descriptor_sets.clear();
        for (_, record) in self.tables.descriptor_pools.drain() {
            device.destroy_descriptor_pool(record.pool, None);
        }
        for (_, record) in self.tables.set_layouts.drain() {
            device.destroy_descriptor_set_layout(record.layout, None);
        }
        for (_, sampler) in self.tables.samplers.drain() {
            device.destroy_sampler(sampler, None);
        }
        for (_, record) in self.tables.image_views.drain() {
            if !record.swapchain {
                device.destroy_image_view(record.view, None);
            }
        }
        for (_, record) in self.tables.images.drain() {
            if !record.swapchain {
                release_image(device, allocator, record);
            }
        }
        for (_, record) in self.tables.buffers.drain() {
            release_buffer(device, allocator, record);
        }
        self.tables.command_buffers.clear();
        self.swapchain_handles.clear();
    }
}

unsafe fn release_image(device: &ash::Device, allocator: &mut Allocator, record: ImageRecord) {
    if let Some(allocation) = record.allocation {
        if let Err(e) = allocator.free(allocation) {
            engine_warn!(SOURCE, "Failed to free image memory: {}", e);
        }
    }
    device.destroy_image(record.image, None);
}

unsafe fn release_buffer(device: &ash::Device, allocator: &mut Allocator, record: BufferRecord) {
    if let Some(allocation) = record.allocation {
        if let Err(e) = allocator.free(allocation) {
            engine_warn!(SOURCE, "Failed to free buffer memory: {}", e);
        }
    }
    device.destroy_buffer(record.buffer, None);
}

impl GraphicsDevice for VulkanDevice {
    // ===== DEVICE INFO =====

    fn max_frames_in_flight(&self) -> usize {
        self.sync.frame_count()
    }

    fn swapchain_format(&self) -> Format {
        self.swapchain.format
    }

    fn swapchain_extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    fn swapchain_image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn swapchain_image(&self, index: u32) -> Result<(ImageHandle, ImageViewHandle)> {
        self.swapchain_handles
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("swapchain image {} out of range", index)))
    }

    fn max_usable_sample_count(&self) -> SampleCount {
        self.physical.max_samples
    }

    fn supports_sampled_depth(&self, format: Format) -> bool {
        format.is_depth()
            && supports_sampled_depth(&self.instance.instance, self.physical.physical_device, format_to_vk(format))
    }

    fn supports_ray_tracing(&self) -> bool {
        self.ray_tracing.is_some()
    }

    // ===== OBJECT CREATION / DESTRUCTION =====

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle> {
        if desc.extent.is_zero_area() || desc.format.is_undefined() {
            return Err(Error::DeviceObjectCreation {
                object: "image",
                reason: format!("invalid extent {:?} or format {:?}", desc.extent, desc.format),
            });
        }
        let flags = if desc.cube_compatible {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(format_to_vk(desc.format))
            .extent(vk::Extent3D { width: desc.extent.width, height: desc.extent.height, depth: 1 })
            .mip_levels(1)
            .array_layers(desc.array_layers.max(1))
            .samples(sample_count_to_vk(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None) }.map_err(|e| creation_error("image", e))?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = match self.allocator.allocate(&AllocationCreateDesc {
            name: &desc.label,
            requirements,
            location: gpu_allocator::MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(allocation_error("image", e));
            }
        };
        let record = ImageRecord {
            image,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            swapchain: false,
        };
        let bound = record
            .allocation
            .as_ref()
            .map(|allocation| unsafe { self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) });
        if let Some(Err(e)) = bound {
            unsafe { release_image(&self.device, &mut self.allocator, record) };
            return Err(creation_error("image memory binding", e));
        }

        engine_trace!(
            SOURCE,
            "Created image '{}' {}x{} {:?}",
            desc.label,
            desc.extent.width,
            desc.extent.height,
            desc.format
        );
        Ok(self.tables.images.insert(record))
    }

    fn destroy_image(&mut self, image: &mut ImageHandle) {
        let Some(handle) = take_handle(image) else { return };
        if self.tables.images.get(handle).is_some_and(|record| record.swapchain) {
            engine_debug!(SOURCE, "Ignoring destroy of a swapchain image");
            return;
        }
        if let Some(record) = self.tables.images.remove(handle) {
            unsafe { release_image(&self.device, &mut self.allocator, record) };
        }
    }

    fn create_image_view(&mut self, desc: &ImageViewDesc) -> Result<ImageViewHandle> {
        let image = self.tables.image(desc.image)?.image;
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type_to_vk(desc.view_type))
            .format(format_to_vk(desc.format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_to_vk(desc.aspect),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: desc.base_layer,
                layer_count: desc.layer_count.max(1),
            });
        let view = unsafe { self.device.create_image_view(&create_info, None) }
            .map_err(|e| creation_error("image view", e))?;
        Ok(self.tables.image_views.insert(ImageViewRecord { view, image: desc.image, swapchain: false }))
    }

    fn destroy_image_view(&mut self, view: &mut ImageViewHandle) {
        let Some(handle) = take_handle(view) else { return };
        if self.tables.image_views.get(handle).is_some_and(|record| record.swapchain) {
            engine_debug!(SOURCE, "Ignoring destroy of a swapchain image view");
            return;
        }
        if let Some(record) = self.tables.image_views.remove(handle) {
            unsafe { self.device.destroy_image_view(record.view, None) };
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let filter = filter_to_vk(desc.filter);
        let address_mode = address_mode_to_vk(desc.address_mode);
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .max_lod(vk::LOD_CLAMP_NONE);
        if let Some(max_anisotropy) = desc.max_anisotropy {
            create_info = create_info
                .anisotropy_enable(true)
                .max_anisotropy(max_anisotropy.min(self.physical.max_anisotropy));
        }
        if let Some(compare) = desc.compare {
            create_info = create_info.compare_enable(true).compare_op(compare_op_to_vk(compare));
        }
        let sampler =
            unsafe { self.device.create_sampler(&create_info, None) }.map_err(|e| creation_error("sampler", e))?;
        Ok(self.tables.samplers.insert(sampler))
    }

    fn destroy_sampler(&mut self, sampler: &mut SamplerHandle) {
        if let Some(sampler) = take_handle(sampler).and_then(|handle| self.tables.samplers.remove(handle)) {
            unsafe { self.device.destroy_sampler(sampler, None) };
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        if desc.size == 0 {
            return Err(Error::DeviceObjectCreation { object: "buffer", reason: "size is zero".to_string() });
        }
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (buffer, allocation) = create_buffer_with_memory(
            &self.device,
            &mut self.allocator,
            &create_info,
            memory_location(desc.location),
            &desc.label,
            0,
        )?;
        engine_trace!(SOURCE, "Created buffer '{}' ({} bytes, {:?})", desc.label, desc.size, desc.location);
        Ok(self.tables.buffers.insert(BufferRecord {
            buffer,
            allocation: Some(allocation),
            size: desc.size,
            mapped: false,
        }))
    }

    fn destroy_buffer(&mut self, buffer: &mut BufferHandle) {
        if let Some(record) = take_handle(buffer).and_then(|handle| self.tables.buffers.remove(handle)) {
            unsafe { release_buffer(&self.device, &mut self.allocator, record) };
        }
    }

    fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = desc
            .pool_sizes
            .iter()
            .map(|&(descriptor_type, count)| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(descriptor_type),
                descriptor_count: count.max(1),
            })
            .collect();
        let create_info = vk::DescriptorPoolCreateInfo::default().max_sets(desc.max_sets).pool_sizes(&pool_sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&create_info, None) }
            .map_err(|e| creation_error("descriptor pool", e))?;
        Ok(self.tables.descriptor_pools.insert(DescriptorPoolRecord { pool, sets: Vec::new() }))
    }

    fn destroy_descriptor_pool(&mut self, pool: &mut DescriptorPoolHandle) {
        if let Some(record) = take_handle(pool).and_then(|handle| self.tables.descriptor_pools.remove(handle)) {
            for set in record.sets {
                self.tables.descriptor_sets.remove(set);
            }
            unsafe { self.device.destroy_descriptor_pool(record.pool, None) };
        }
    }

    fn create_descriptor_set_layout(&mut self, bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type_to_vk(binding.descriptor_type))
                    .descriptor_count(binding.count)
                    .stage_flags(shader_stages_to_vk(binding.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| creation_error("descriptor set layout", e))?;
        Ok(self.tables.set_layouts.insert(DescriptorSetLayoutRecord { layout, bindings: bindings.to_vec() }))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: &mut DescriptorSetLayoutHandle) {
        if let Some(record) = take_handle(layout).and_then(|handle| self.tables.set_layouts.remove(handle)) {
            unsafe { self.device.destroy_descriptor_set_layout(record.layout, None) };
        }
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        count: usize,
    ) -> Result<Vec<DescriptorSetHandle>> {
        let vk_pool = lookup(&self.tables.descriptor_pools, pool, "descriptor pool")?.pool;
        if count == 0 {
            return Ok(Vec::new());
        }
        let layout_record = self.tables.set_layout(layout)?;
        let bindings = layout_record.bindings.clone();
        let layouts = vec![layout_record.layout; count];
        let allocate_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(vk_pool).set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(|e| creation_error("descriptor set", e))?;

        let handles: Vec<DescriptorSetHandle> = sets
            .into_iter()
            .map(|set| {
                self.tables.descriptor_sets.insert(DescriptorSetRecord { set, pool, bindings: bindings.clone() })
            })
            .collect();
        lookup_mut(&mut self.tables.descriptor_pools, pool, "descriptor pool")?
            .sets
            .extend(handles.iter().copied());
        Ok(handles)
    }

    fn update_descriptor_set(&mut self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) -> Result<()> {
        enum Info {
            Buffer(usize),
            Image(usize),
        }

        let record = self.tables.descriptor_set(set)?;
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        let mut planned = Vec::with_capacity(writes.len());
        for write in writes {
            let binding = record
                .bindings
                .iter()
                .find(|binding| binding.binding == write.binding)
                .ok_or_else(|| Error::InvalidResource(format!("descriptor set has no binding {}", write.binding)))?;
            let info = match write.resource {
                DescriptorResource::Buffer { buffer, offset, range } => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: self.tables.buffer(buffer)?.buffer,
                        offset,
                        range,
                    });
                    Info::Buffer(buffer_infos.len() - 1)
                }
                DescriptorResource::Image { view, sampler, layout } => {
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: self.tables.sampler(sampler)?,
                        image_view: self.tables.image_view(view)?,
                        image_layout: image_layout_to_vk(layout),
                    });
                    Info::Image(image_infos.len() - 1)
                }
                DescriptorResource::StorageImage { view } => {
                    image_infos.push(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: self.tables.image_view(view)?,
                        image_layout: vk::ImageLayout::GENERAL,
                    });
                    Info::Image(image_infos.len() - 1)
                }
            };
            planned.push((write.binding, descriptor_type_to_vk(binding.descriptor_type), info));
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = planned
            .iter()
            .map(|(binding, descriptor_type, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(record.set)
                    .dst_binding(*binding)
                    .descriptor_type(*descriptor_type);
                match info {
                    Info::Buffer(index) => write.buffer_info(std::slice::from_ref(&buffer_infos[*index])),
                    Info::Image(index) => write.image_info(std::slice::from_ref(&image_infos[*index])),
                }
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let render_pass = vulkan_pipeline::create_render_pass(&self.device, desc)?;
        Ok(self.tables.render_passes.insert(render_pass))
    }

    fn destroy_render_pass(&mut self, render_pass: &mut RenderPassHandle) {
        if let Some(render_pass) = take_handle(render_pass).and_then(|handle| self.tables.render_passes.remove(handle)) {
            unsafe { self.device.destroy_render_pass(render_pass, None) };
        }
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let set_layouts = desc
            .set_layouts
            .iter()
            .map(|&layout| self.tables.set_layout(layout).map(|record| record.layout))
            .collect::<Result<Vec<_>>>()?;
        let push_constant_ranges: Vec<vk::PushConstantRange> = desc
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: shader_stages_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { self.device.create_pipeline_layout(&create_info, None) }
            .map_err(|e| creation_error("pipeline layout", e))?;
        Ok(self.tables.pipeline_layouts.insert(layout))
    }

    fn destroy_pipeline_layout(&mut self, layout: &mut PipelineLayoutHandle) {
        if let Some(layout) = take_handle(layout).and_then(|handle| self.tables.pipeline_layouts.remove(handle)) {
            unsafe { self.device.destroy_pipeline_layout(layout, None) };
        }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<ShaderModuleHandle> {
        let module = vulkan_shader::create_shader_module(&self.device, code)?;
        Ok(self.tables.shader_modules.insert(module))
    }

    fn destroy_shader_module(&mut self, module: &mut ShaderModuleHandle) {
        if let Some(module) = take_handle(module).and_then(|handle| self.tables.shader_modules.remove(handle)) {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        let pipeline = vulkan_pipeline::create_graphics_pipeline(&self.device, &self.tables, desc)?;
        Ok(self.tables.pipelines.insert(PipelineRecord { pipeline, bind_point: BindPoint::Graphics, sbt: None }))
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        let pipeline = vulkan_pipeline::create_compute_pipeline(&self.device, &self.tables, desc)?;
        Ok(self.tables.pipelines.insert(PipelineRecord { pipeline, bind_point: BindPoint::Compute, sbt: None }))
    }

    fn create_ray_tracing_pipeline(&mut self, desc: &RayTracingPipelineDesc) -> Result<PipelineHandle> {
        let Some((loader, props)) = self.ray_tracing.as_ref() else {
            engine_error!(SOURCE, "Ray tracing pipeline requested on a device without ray tracing");
            return Err(Error::DeviceObjectCreation {
                object: "ray tracing pipeline",
                reason: "ray tracing is not enabled on this device".to_string(),
            });
        };
        let (pipeline, sbt) = vulkan_pipeline::create_ray_tracing_pipeline(
            &self.device,
            loader,
            &mut self.allocator,
            &self.tables,
            props,
            desc,
        )?;
        Ok(self.tables.pipelines.insert(PipelineRecord {
            pipeline,
            bind_point: BindPoint::RayTracing,
            sbt: Some(sbt),
        }))
    }

    fn destroy_pipeline(&mut self, pipeline: &mut PipelineHandle) {
        if let Some(mut record) = take_handle(pipeline).and_then(|handle| self.tables.pipelines.remove(handle)) {
            unsafe {
                if let Some(sbt) = record.sbt.as_mut() {
                    sbt.destroy(&self.device, &mut self.allocator);
                }
                self.device.destroy_pipeline(record.pipeline, None);
            }
        }
    }

    fn allocate_command_buffers(&mut self, queue: QueueKind, count: usize) -> Result<Vec<CommandBufferHandle>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let pool = self.command_pool(queue);
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);
        let buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| creation_error("command buffer", e))?;
        Ok(buffers
            .into_iter()
            .map(|buffer| self.tables.command_buffers.insert(CommandBufferRecord { buffer, pool, queue }))
            .collect())
    }

    fn free_command_buffer(&mut self, command_buffer: &mut CommandBufferHandle) {
        if let Some(record) = take_handle(command_buffer).and_then(|handle| self.tables.command_buffers.remove(handle))
        {
            unsafe { self.device.free_command_buffers(record.pool, &[record.buffer]) };
        }
    }

    fn do_mapped_memory_operation(
        &mut self,
        buffer: BufferHandle,
        op: &mut dyn FnMut(&mut [u8]) -> Result<()>,
    ) -> Result<()> {
        let BufferRecord { allocation, size, mapped, .. } = lookup_mut(&mut self.tables.buffers, buffer, "buffer")?;
        let _guard = MappedGuard::acquire(mapped)?;
        let bytes = allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| Error::InvalidResource("buffer memory is not host visible".to_string()))?;
        let len = (*size as usize).min(bytes.len());
        op(&mut bytes[..len])
    }

    // ===== SYNCHRONIZATION =====

    fn wait_for_graphics_fences(&mut self, frame: usize) -> Result<()> {
        self.wait_fences(frame, &[FenceRole::Graphics, FenceRole::OffscreenGraphics])
    }

    fn reset_graphics_fences(&mut self, frame: usize) -> Result<()> {
        self.reset_fences(frame, &[FenceRole::Graphics])
    }

    fn wait_for_compute_fences(&mut self, frame: usize) -> Result<()> {
        self.wait_fences(frame, &[FenceRole::Compute])
    }

    fn reset_compute_fences(&mut self, frame: usize) -> Result<()> {
        self.reset_fences(frame, &[FenceRole::Compute])
    }

    fn wait_for_mouse_picking_fences(&mut self, frame: usize) -> Result<()> {
        self.wait_fences(frame, &[FenceRole::MousePicking])
    }

    fn reset_mouse_picking_fences(&mut self, frame: usize) -> Result<()> {
        self.reset_fences(frame, &[FenceRole::MousePicking])
    }

    fn submit_graphics_queue(&mut self, frame: usize, command_buffer: CommandBufferHandle) -> Result<()> {
        self.submit_kind(SubmitKind::Graphics, frame, command_buffer, true)
    }

    fn submit_offscreen_graphics_queue(
        &mut self,
        frame: usize,
        command_buffer: CommandBufferHandle,
        wait_compute: bool,
    ) -> Result<()> {
        self.reset_fences(frame, &[FenceRole::OffscreenGraphics])?;
        self.submit_kind(SubmitKind::OffscreenGraphics, frame, command_buffer, wait_compute)
    }

    fn submit_compute_queue(&mut self, frame: usize, command_buffer: CommandBufferHandle) -> Result<()> {
        self.submit_kind(SubmitKind::Compute, frame, command_buffer, true)
    }

    fn submit_mouse_picking_graphics_queue(
        &mut self,
        frame: usize,
        command_buffer: CommandBufferHandle,
    ) -> Result<()> {
        self.submit_kind(SubmitKind::MousePicking, frame, command_buffer, true)
    }

    fn submit_immediate(&mut self, queue: QueueKind, command_buffer: CommandBufferHandle) -> Result<()> {
        let command_buffers = [self.cmd(command_buffer)?];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue(queue), std::slice::from_ref(&submit_info), vk::Fence::null())
        }
        .map_err(|e| engine_err!(SOURCE, "Immediate submission to {:?} failed: {:?}", queue, e))
    }

    fn acquire_next_image(&mut self, frame: usize) -> Result<AcquireResult> {
        let semaphore = self.sync.semaphore(frame, SemaphoreRole::ImageAvailable)?;
        match unsafe {
            self.swapchain
                .loader
                .acquire_next_image(self.swapchain.swapchain, u64::MAX, semaphore, vk::Fence::null())
        } {
            Ok((image_index, suboptimal)) => Ok(AcquireResult::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!(SOURCE, "Swapchain out of date on acquire (frame {})", frame);
                Ok(AcquireResult::OutOfDate)
            }
            Err(e) => Err(engine_err!(SOURCE, "Failed to acquire swapchain image: {:?}", e)),
        }
    }

    fn queue_present(&mut self, frame: usize, image_index: u32, wait: &[SemaphoreRole]) -> Result<PresentStatus> {
        let wait_semaphores = wait
            .iter()
            .map(|&role| self.sync.semaphore(frame, role))
            .collect::<Result<Vec<_>>>()?;
        let swapchains = [self.swapchain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        match unsafe { self.swapchain.loader.queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Success),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => {
                engine_error!(SOURCE, "Present failed: {:?}", e);
                Err(Error::Presentation(format!("{:?}", e)))
            }
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| engine_err!(SOURCE, "Device wait idle failed: {:?}", e))
    }

    fn queue_wait_idle(&mut self, queue: QueueKind) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.queue(queue)) }
            .map_err(|e| engine_err!(SOURCE, "{:?} queue wait idle failed: {:?}", queue, e))
    }

    fn recreate_swapchain(&mut self, extent: Extent2D) -> Result<()> {
        if extent.is_zero_area() {
            return Err(Error::InvalidResource(format!(
                "cannot recreate swapchain with zero area {}x{}",
                extent.width, extent.height
            )));
        }
        self.wait_idle()?;

        let mut replacement = Swapchain::new(
            &self.instance.instance,
            &self.device,
            self.physical.physical_device,
            &self.surface_loader,
            self.surface,
            (self.physical.graphics_family, self.physical.present_family),
            extent,
            Some(&self.swapchain),
        )?;
        std::mem::swap(&mut self.swapchain, &mut replacement);
        unsafe { replacement.destroy(&self.device) };
        self.unregister_swapchain_images();
        self.register_swapchain_images();

        engine_info!(
            SOURCE,
            "Swapchain recreated at {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
        Ok(())
    }

    // ===== COMMAND RECORDING =====

    fn begin_command_buffer(&mut self, command_buffer: CommandBufferHandle, usage: CommandBufferUsage) -> Result<()> {
        let flags = match usage {
            CommandBufferUsage::PerFrame => vk::CommandBufferUsageFlags::empty(),
            CommandBufferUsage::OneTimeSubmit => vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(self.cmd(command_buffer)?, &begin_info) }.map_err(|e| {
            engine_error!(SOURCE, "Failed to begin command buffer: {:?}", e);
            Error::CommandRecording(format!("begin failed: {:?}", e))
        })
    }

    fn end_command_buffer(&mut self, command_buffer: CommandBufferHandle) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.cmd(command_buffer)?) }.map_err(|e| {
            engine_error!(SOURCE, "Failed to end command buffer: {:?}", e);
            Error::CommandRecording(format!("end failed: {:?}", e))
        })
    }

    fn reset_command_buffer(&mut self, command_buffer: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.cmd(command_buffer)?, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| {
            engine_error!(SOURCE, "Failed to reset command buffer: {:?}", e);
            Error::CommandRecording(format!("reset failed: {:?}", e))
        })
    }

    fn cmd_pipeline_barrier(&mut self, command_buffer: CommandBufferHandle, batch: &BarrierBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let cmd = self.cmd(command_buffer)?;
        let (barriers, src_stage, dst_stage) = image_barriers(&self.tables, batch, self.ray_tracing.is_some())?;
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            )
        };
        Ok(())
    }

    fn cmd_begin_rendering(&mut self, command_buffer: CommandBufferHandle, info: &RenderingInfo) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let color_attachments = info
            .color_attachments
            .iter()
            .map(|attachment| rendering_attachment(&self.tables, attachment))
            .collect::<Result<Vec<_>>>()?;
        let depth_attachment = info
            .depth_attachment
            .as_ref()
            .map(|attachment| rendering_attachment(&self.tables, attachment))
            .transpose()?;

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(rect_to_vk(info.render_area))
            .layer_count(info.layer_count.max(1))
            .view_mask(info.view_mask)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        unsafe { self.device.cmd_begin_rendering(cmd, &rendering_info) };
        Ok(())
    }

    fn cmd_end_rendering(&mut self, command_buffer: CommandBufferHandle) -> Result<()> {
        unsafe { self.device.cmd_end_rendering(self.cmd(command_buffer)?) };
        Ok(())
    }

    fn cmd_set_viewport(&mut self, command_buffer: CommandBufferHandle, viewport: Viewport) -> Result<()> {
        unsafe { self.device.cmd_set_viewport(self.cmd(command_buffer)?, 0, &[viewport_to_vk(viewport)]) };
        Ok(())
    }

    fn cmd_set_scissor(&mut self, command_buffer: CommandBufferHandle, scissor: Rect2D) -> Result<()> {
        unsafe { self.device.cmd_set_scissor(self.cmd(command_buffer)?, 0, &[rect_to_vk(scissor)]) };
        Ok(())
    }

    fn cmd_bind_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        bind_point: BindPoint,
        pipeline: PipelineHandle,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let record = self.tables.pipeline(pipeline)?;
        if record.bind_point != bind_point {
            return Err(Error::InvalidResource(format!(
                "{:?} pipeline bound at the {:?} bind point",
                record.bind_point, bind_point
            )));
        }
        unsafe { self.device.cmd_bind_pipeline(cmd, bind_point_to_vk(bind_point), record.pipeline) };
        Ok(())
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        command_buffer: CommandBufferHandle,
        bind_point: BindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let layout = self.tables.pipeline_layout(layout)?;
        let sets = sets
            .iter()
            .map(|&set| self.tables.descriptor_set(set).map(|record| record.set))
            .collect::<Result<Vec<_>>>()?;
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(cmd, bind_point_to_vk(bind_point), layout, first_set, &sets, &[])
        };
        Ok(())
    }

    fn cmd_push_constants(
        &mut self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let layout = self.tables.pipeline_layout(layout)?;
        unsafe { self.device.cmd_push_constants(cmd, layout, shader_stages_to_vk(stages), offset, data) };
        Ok(())
    }

    fn cmd_bind_vertex_buffers(
        &mut self,
        command_buffer: CommandBufferHandle,
        first_binding: u32,
        buffers: &[(BufferHandle, u64)],
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let mut vk_buffers = Vec::with_capacity(buffers.len());
        let mut offsets = Vec::with_capacity(buffers.len());
        for &(buffer, offset) in buffers {
            vk_buffers.push(self.tables.buffer(buffer)?.buffer);
            offsets.push(offset);
        }
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, first_binding, &vk_buffers, &offsets) };
        Ok(())
    }

    fn cmd_bind_index_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let buffer = self.tables.buffer(buffer)?.buffer;
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, offset, index_type_to_vk(index_type)) };
        Ok(())
    }

    fn cmd_draw(
        &mut self,
        command_buffer: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance) };
        Ok(())
    }

    fn cmd_draw_indexed(
        &mut self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        unsafe {
            self.device
                .cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance)
        };
        Ok(())
    }

    fn cmd_dispatch(&mut self, command_buffer: CommandBufferHandle, x: u32, y: u32, z: u32) -> Result<()> {
        unsafe { self.device.cmd_dispatch(self.cmd(command_buffer)?, x, y, z) };
        Ok(())
    }

    fn cmd_trace_rays(
        &mut self,
        command_buffer: CommandBufferHandle,
        pipeline: PipelineHandle,
        extent: Extent2D,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let (loader, _) = self
            .ray_tracing
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "Trace rays on a device without ray tracing"))?;
        let sbt = self
            .tables
            .pipeline(pipeline)?
            .sbt
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("pipeline has no shader binding table".to_string()))?;
        let callable = vk::StridedDeviceAddressRegionKHR::default();
        unsafe {
            loader.cmd_trace_rays(cmd, &sbt.raygen, &sbt.miss, &sbt.hit, &callable, extent.width, extent.height, 1)
        };
        Ok(())
    }

    fn cmd_clear_depth_attachment(
        &mut self,
        command_buffer: CommandBufferHandle,
        rect: Rect2D,
        layer_count: u32,
        depth: f32,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            color_attachment: 0,
            clear_value: vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 } },
        };
        let clear_rect = vk::ClearRect { rect: rect_to_vk(rect), base_array_layer: 0, layer_count: layer_count.max(1) };
        unsafe { self.device.cmd_clear_attachments(cmd, &[attachment], &[clear_rect]) };
        Ok(())
    }

    fn cmd_copy_image_to_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        layout: ImageLayout,
        buffer: BufferHandle,
        region: BufferImageCopy,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let image = self.tables.image(image)?.image;
        let buffer = self.tables.buffer(buffer)?.buffer;
        let copy = vk::BufferImageCopy {
            buffer_offset: region.buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect_to_vk(region.aspect),
                mip_level: 0,
                base_array_layer: region.layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: region.image_offset.0, y: region.image_offset.1, z: 0 },
            image_extent: vk::Extent3D { width: region.extent.width, height: region.extent.height, depth: 1 },
        };
        unsafe { self.device.cmd_copy_image_to_buffer(cmd, image, image_layout_to_vk(layout), buffer, &[copy]) };
        Ok(())
    }

    fn cmd_copy_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> Result<()> {
        let cmd = self.cmd(command_buffer)?;
        let src = self.tables.buffer(src)?.buffer;
        let dst = self.tables.buffer(dst)?.buffer;
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                engine_warn!(SOURCE, "Device wait idle failed during shutdown: {:?}", e);
            }

            let leaked = self.tables.live_count();
            if leaked > 0 {
                engine_warn!(SOURCE, "{} device objects still alive at shutdown, releasing them", leaked);
            }
            self.release_tables();

            self.sync.destroy(&self.device);
            self.device.destroy_command_pool(self.compute_pool, None);
            self.device.destroy_command_pool(self.graphics_pool, None);
            self.swapchain.destroy(&self.device);
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if self.report_validation_stats {
                debug::print_validation_stats_report();
            }
            self.instance.destroy();
        }
        engine_info!(SOURCE, "VulkanDevice destroyed");
    }
}
