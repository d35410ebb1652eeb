/// Swapchain - presentable images for the window surface
///
/// Owns the `VkSwapchainKHR` and one color view per image. Semaphores and
/// fences live in `FrameSync`, not here, so recreation only rebuilds images.

use ash::vk;
use nebula_engine::nebula::device::{Extent2D, Format};
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_debug, engine_error};

use crate::vulkan_conversions::format_from_vk;

const SOURCE: &str = "nebula::vulkan::Swapchain";

/// Pick the surface format: sRGB BGRA8 when offered, otherwise the first
/// format the engine can name
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, Format)> {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    preferred
        .into_iter()
        .chain(formats.iter())
        .find_map(|f| format_from_vk(f.format).map(|format| (*f, format)))
}

/// Extent for the swapchain, clamped to the surface limits when the
/// surface lets the application choose
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One image more than the minimum, within the maximum (0 means unbounded)
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub(crate) struct Swapchain {
    pub loader: ash::khr::swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: Format,
    pub vk_format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `surface`, retiring `old` if given
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        queue_families: (u32, u32),
        requested: Extent2D,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let caps = unsafe { surface_loader.get_physical_device_surface_capabilities(physical_device, surface) }
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to get surface capabilities: {:?}", e);
                Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
            })?;
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to query surface formats: {:?}", e);
                Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
            })?;
        let (surface_format, format) = choose_surface_format(&formats).ok_or_else(|| {
            engine_error!(SOURCE, "No supported surface format among {} offered", formats.len());
            Error::InitializationFailed("No supported surface format".to_string())
        })?;
        let extent = choose_extent(&caps, requested);

        let (graphics_family, present_family) = queue_families;
        let family_indices = [graphics_family, present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(choose_image_count(&caps))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.swapchain));
        create_info = if graphics_family != present_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = ash::khr::swapchain::Device::new(instance, device);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|e| {
            engine_error!(SOURCE, "Failed to create swapchain: {:?}", e);
            Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
        })?;

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                engine_error!(SOURCE, "Failed to get swapchain images: {:?}", e);
                return Err(Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e)));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    unsafe {
                        for view in views {
                            device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                    }
                    engine_error!(SOURCE, "Failed to create swapchain image view: {:?}", e);
                    return Err(Error::DeviceObjectCreation {
                        object: "swapchain image view",
                        reason: format!("{:?}", e),
                    });
                }
            }
        }

        engine_debug!(
            SOURCE,
            "Swapchain {}x{} {:?} with {} images",
            extent.width,
            extent.height,
            format,
            images.len()
        );

        Ok(Self { loader, swapchain, images, views, format, vk_format: surface_format.format, extent })
    }

    pub(crate) fn extent(&self) -> Extent2D {
        Extent2D::new(self.extent.width, self.extent.height)
    }

    pub(crate) fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Destroy the views and the swapchain
    ///
    /// # Safety
    /// The device must be idle with respect to the swapchain images.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        for view in self.views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
