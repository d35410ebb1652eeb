//! Unit tests for vulkan_resources.rs
//!
//! Tables are filled with null native handles; nothing touches a device.

use super::*;

fn image_record(swapchain: bool) -> ImageRecord {
    ImageRecord {
        image: vk::Image::null(),
        allocation: None,
        format: Format::B8G8R8A8_SRGB,
        extent: Extent2D::new(4, 4),
        swapchain,
    }
}

#[test]
fn test_lookup_of_removed_handle_is_invalid_resource() {
    let mut tables = ResourceTables::default();
    let handle = tables.samplers.insert(vk::Sampler::null());
    assert!(tables.sampler(handle).is_ok());

    tables.samplers.remove(handle);
    match tables.sampler(handle) {
        Err(Error::InvalidResource(message)) => assert!(message.contains("sampler")),
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}

#[test]
fn test_lookup_of_null_handle_fails() {
    let tables = ResourceTables::default();
    assert!(tables.buffer(BufferHandle::default()).is_err());
    assert!(tables.pipeline(PipelineHandle::default()).is_err());
}

#[test]
fn test_live_count_skips_swapchain_images() {
    let mut tables = ResourceTables::default();
    let swapchain_image = tables.images.insert(image_record(true));
    tables.image_views.insert(ImageViewRecord { view: vk::ImageView::null(), image: swapchain_image, swapchain: true });
    assert_eq!(tables.live_count(), 0);

    let owned = tables.images.insert(image_record(false));
    tables.image_views.insert(ImageViewRecord { view: vk::ImageView::null(), image: owned, swapchain: false });
    tables.shader_modules.insert(vk::ShaderModule::null());
    assert_eq!(tables.live_count(), 3);
}

#[test]
fn test_creation_error_mapping() {
    assert!(matches!(creation_error("image", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY), Error::OutOfMemory));
    match creation_error("sampler", vk::Result::ERROR_INITIALIZATION_FAILED) {
        Error::DeviceObjectCreation { object, reason } => {
            assert_eq!(object, "sampler");
            assert!(reason.contains("INITIALIZATION_FAILED"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_allocation_error_mapping() {
    assert!(matches!(allocation_error("buffer", AllocationError::OutOfMemory), Error::OutOfMemory));
    assert!(matches!(
        allocation_error("buffer", AllocationError::InvalidAllocationCreateDesc),
        Error::DeviceObjectCreation { object: "buffer", .. }
    ));
}

#[test]
fn test_memory_locations() {
    assert_eq!(memory_location(MemoryLocation::GpuOnly), gpu_allocator::MemoryLocation::GpuOnly);
    assert_eq!(memory_location(MemoryLocation::CpuToGpu), gpu_allocator::MemoryLocation::CpuToGpu);
    assert_eq!(memory_location(MemoryLocation::GpuToCpu), gpu_allocator::MemoryLocation::GpuToCpu);
}

#[test]
fn test_mapped_guard_clears_flag() {
    let mut mapped = false;
    {
        let _guard = MappedGuard::acquire(&mut mapped).unwrap();
    }
    assert!(!mapped);
}

#[test]
fn test_mapped_guard_rejects_nested_mapping() {
    let mut mapped = true;
    assert!(matches!(MappedGuard::acquire(&mut mapped), Err(Error::InvalidResource(_))));
    assert!(mapped);
}

#[test]
fn test_mapped_guard_released_on_panic() {
    let mut mapped = false;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = MappedGuard::acquire(&mut mapped).unwrap();
        panic!("host operation failed");
    }));
    assert!(result.is_err());
    assert!(!mapped);
}
