/*!
# Nebula Engine - Vulkan Backend

Vulkan 1.3 implementation of `nebula_engine`'s `GraphicsDevice`.

The backend uses ash for the Vulkan bindings, ash-window for surface
creation and gpu-allocator for device memory. Every object handed to the
engine is a slotmap handle; the native objects stay inside the device.

```no_run
use nebula_engine::nebula::{EngineConfig, Renderer};
use nebula_engine_renderer_vulkan::nebula::VulkanDevice;
# fn run(window: &winit::window::Window) -> nebula_engine::nebula::Result<()> {
let config = EngineConfig::default();
let device = VulkanDevice::new(window, &config)?;
let _renderer = Renderer::new(config, Box::new(device), None)?;
# Ok(())
# }
```
*/

mod debug;
mod vulkan_conversions;
mod vulkan_instance;
mod vulkan_physical_device;
mod vulkan_swapchain;
mod vulkan_sync;
mod vulkan_resources;
mod vulkan_commands;
mod vulkan_pipeline;
mod vulkan_shader;
mod vulkan_device;

/// Public API of the Vulkan backend
pub mod nebula {
    pub use crate::vulkan_device::VulkanDevice;

    /// Validation statistics collected by the debug messenger
    pub use crate::debug::{print_validation_stats_report, reset_validation_stats, validation_stats};
}
