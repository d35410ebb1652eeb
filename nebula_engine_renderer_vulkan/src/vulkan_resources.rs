/// Object tables behind the device handles
///
/// Each handle type maps to a slotmap of native objects. Images and
/// buffers carry their gpu-allocator allocation; swapchain images are
/// registered with `swapchain: true` and never freed through the tables.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::AllocationError;
use nebula_engine::nebula::device::*;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_error, engine_warn};
use slotmap::{Key, SlotMap};

use crate::vulkan_pipeline::ShaderBindingTable;

const SOURCE: &str = "nebula::vulkan::Resources";

pub(crate) struct ImageRecord {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: Format,
    pub extent: Extent2D,
    pub swapchain: bool,
}

pub(crate) struct ImageViewRecord {
    pub view: vk::ImageView,
    pub image: ImageHandle,
    pub swapchain: bool,
}

pub(crate) struct BufferRecord {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
    /// Set while a host operation holds the mapped bytes
    pub mapped: bool,
}

/// Marks a buffer as mapped for the duration of a host operation
///
/// Allocations stay persistently mapped by gpu-allocator, so releasing the
/// guard only clears the flag. It is released on every exit path of the
/// operation, unwinding included.
pub(crate) struct MappedGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> MappedGuard<'a> {
    pub(crate) fn acquire(flag: &'a mut bool) -> Result<Self> {
        if *flag {
            return Err(Error::InvalidResource("buffer is already mapped".to_string()));
        }
        *flag = true;
        Ok(Self { flag })
    }
}

impl Drop for MappedGuard<'_> {
    fn drop(&mut self) {
        *self.flag = false;
    }
}

pub(crate) struct DescriptorPoolRecord {
    pub pool: vk::DescriptorPool,
    pub sets: Vec<DescriptorSetHandle>,
}

pub(crate) struct DescriptorSetLayoutRecord {
    pub layout: vk::DescriptorSetLayout,
    pub bindings: Vec<DescriptorBinding>,
}

pub(crate) struct DescriptorSetRecord {
    pub set: vk::DescriptorSet,
    pub pool: DescriptorPoolHandle,
    pub bindings: Vec<DescriptorBinding>,
}

pub(crate) struct PipelineRecord {
    pub pipeline: vk::Pipeline,
    pub bind_point: BindPoint,
    pub sbt: Option<ShaderBindingTable>,
}

pub(crate) struct CommandBufferRecord {
    pub buffer: vk::CommandBuffer,
    pub pool: vk::CommandPool,
    pub queue: QueueKind,
}

/// Look `key` up in `map`, reporting a dead or null handle as `InvalidResource`
pub(crate) fn lookup<'a, K: Key, V>(map: &'a SlotMap<K, V>, key: K, what: &str) -> Result<&'a V> {
    map.get(key).ok_or_else(|| Error::InvalidResource(format!("{} handle {:?} is not alive", what, key)))
}

pub(crate) fn lookup_mut<'a, K: Key, V>(map: &'a mut SlotMap<K, V>, key: K, what: &str) -> Result<&'a mut V> {
    map.get_mut(key).ok_or_else(|| Error::InvalidResource(format!("{} handle {:?} is not alive", what, key)))
}

/// Map a native creation failure to `DeviceObjectCreation`, logging it
pub(crate) fn creation_error(object: &'static str, e: vk::Result) -> Error {
    engine_error!(SOURCE, "Failed to create {}: {:?}", object, e);
    match e {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfMemory,
        _ => Error::DeviceObjectCreation { object, reason: format!("{:?}", e) },
    }
}

/// Map an allocator failure, keeping out-of-memory distinct
pub(crate) fn allocation_error(object: &'static str, e: AllocationError) -> Error {
    engine_error!(SOURCE, "Failed to allocate memory for {}: {}", object, e);
    match e {
        AllocationError::OutOfMemory => Error::OutOfMemory,
        other => Error::DeviceObjectCreation { object, reason: other.to_string() },
    }
}

pub(crate) fn memory_location(location: MemoryLocation) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
        MemoryLocation::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
    }
}

/// Create a buffer and bind freshly allocated memory to it
pub(crate) fn create_buffer_with_memory(
    device: &ash::Device,
    allocator: &mut Allocator,
    info: &vk::BufferCreateInfo,
    location: gpu_allocator::MemoryLocation,
    label: &str,
    min_alignment: u64,
) -> Result<(vk::Buffer, Allocation)> {
    let buffer = unsafe { device.create_buffer(info, None) }.map_err(|e| creation_error("buffer", e))?;
    let mut requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    requirements.alignment = requirements.alignment.max(min_alignment);

    let allocation = match allocator.allocate(&AllocationCreateDesc {
        name: label,
        requirements,
        location,
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(allocation_error("buffer", e));
        }
    };

    if let Err(e) = unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
        unsafe { device.destroy_buffer(buffer, None) };
        if let Err(free_error) = allocator.free(allocation) {
            engine_warn!(SOURCE, "Failed to free buffer memory after bind failure: {}", free_error);
        }
        return Err(creation_error("buffer memory binding", e));
    }
    Ok((buffer, allocation))
}

/// Every object created through the device, keyed by handle
#[derive(Default)]
pub(crate) struct ResourceTables {
    pub images: SlotMap<ImageHandle, ImageRecord>,
    pub image_views: SlotMap<ImageViewHandle, ImageViewRecord>,
    pub samplers: SlotMap<SamplerHandle, vk::Sampler>,
    pub buffers: SlotMap<BufferHandle, BufferRecord>,
    pub descriptor_pools: SlotMap<DescriptorPoolHandle, DescriptorPoolRecord>,
    pub set_layouts: SlotMap<DescriptorSetLayoutHandle, DescriptorSetLayoutRecord>,
    pub descriptor_sets: SlotMap<DescriptorSetHandle, DescriptorSetRecord>,
    pub render_passes: SlotMap<RenderPassHandle, vk::RenderPass>,
    pub pipeline_layouts: SlotMap<PipelineLayoutHandle, vk::PipelineLayout>,
    pub pipelines: SlotMap<PipelineHandle, PipelineRecord>,
    pub shader_modules: SlotMap<ShaderModuleHandle, vk::ShaderModule>,
    pub command_buffers: SlotMap<CommandBufferHandle, CommandBufferRecord>,
}

impl ResourceTables {
    pub(crate) fn image(&self, handle: ImageHandle) -> Result<&ImageRecord> {
        lookup(&self.images, handle, "image")
    }

    pub(crate) fn image_view(&self, handle: ImageViewHandle) -> Result<vk::ImageView> {
        lookup(&self.image_views, handle, "image view").map(|record| record.view)
    }

    pub(crate) fn sampler(&self, handle: SamplerHandle) -> Result<vk::Sampler> {
        lookup(&self.samplers, handle, "sampler").copied()
    }

    pub(crate) fn buffer(&self, handle: BufferHandle) -> Result<&BufferRecord> {
        lookup(&self.buffers, handle, "buffer")
    }

    pub(crate) fn set_layout(&self, handle: DescriptorSetLayoutHandle) -> Result<&DescriptorSetLayoutRecord> {
        lookup(&self.set_layouts, handle, "descriptor set layout")
    }

    pub(crate) fn descriptor_set(&self, handle: DescriptorSetHandle) -> Result<&DescriptorSetRecord> {
        lookup(&self.descriptor_sets, handle, "descriptor set")
    }

    pub(crate) fn render_pass(&self, handle: RenderPassHandle) -> Result<vk::RenderPass> {
        lookup(&self.render_passes, handle, "render pass").copied()
    }

    pub(crate) fn pipeline_layout(&self, handle: PipelineLayoutHandle) -> Result<vk::PipelineLayout> {
        lookup(&self.pipeline_layouts, handle, "pipeline layout").copied()
    }

    pub(crate) fn pipeline(&self, handle: PipelineHandle) -> Result<&PipelineRecord> {
        lookup(&self.pipelines, handle, "pipeline")
    }

    pub(crate) fn shader_module(&self, handle: ShaderModuleHandle) -> Result<vk::ShaderModule> {
        lookup(&self.shader_modules, handle, "shader module").copied()
    }

    pub(crate) fn command_buffer(&self, handle: CommandBufferHandle) -> Result<vk::CommandBuffer> {
        lookup(&self.command_buffers, handle, "command buffer").map(|record| record.buffer)
    }

    /// Number of objects still alive, swapchain images and views excluded
    pub(crate) fn live_count(&self) -> usize {
        self.images.values().filter(|record| !record.swapchain).count()
            + self.image_views.values().filter(|record| !record.swapchain).count()
            + self.samplers.len()
            + self.buffers.len()
            + self.descriptor_pools.len()
            + self.set_layouts.len()
            + self.render_passes.len()
            + self.pipeline_layouts.len()
            + self.pipelines.len()
            + self.shader_modules.len()
    }
}

#[cfg(test)]
#[path = "vulkan_resources_tests.rs"]
mod tests;
