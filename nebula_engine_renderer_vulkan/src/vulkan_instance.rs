/// Vulkan entry, instance and validation messenger

use ash::vk;
use nebula_engine::config::EngineConfig;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_error, engine_info, engine_warn};
use raw_window_handle::RawDisplayHandle;
use std::ffi::CString;

use crate::debug;

const SOURCE: &str = "nebula::vulkan::Instance";

/// Instance plus the optional debug messenger
pub(crate) struct VulkanInstance {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

/// Whether validation layers are enabled for this configuration
pub(crate) fn validation_enabled(config: &EngineConfig) -> bool {
    config.enable_validation || cfg!(feature = "vulkan-validation")
}

/// Requested layers that are not installed
pub(crate) fn missing_layers(requested: &[String], available: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|layer| !available.iter().any(|name| name == *layer))
        .cloned()
        .collect()
}

fn to_cstrings(names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid name '{}': {}", name, e)))
        })
        .collect()
}

impl VulkanInstance {
    /// Load Vulkan, create a 1.3 instance with the surface extensions for
    /// `display` and, when validation is on, the requested layers and messenger
    pub(crate) fn new(display: RawDisplayHandle, config: &EngineConfig) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            engine_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
            Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
        })?;

        let validation = validation_enabled(config);
        let layers = if validation {
            let available: Vec<String> = unsafe { entry.enumerate_instance_layer_properties() }
                .map_err(|e| Error::InitializationFailed(format!("Failed to enumerate layers: {:?}", e)))?
                .iter()
                .filter_map(|layer| layer.layer_name_as_c_str().ok())
                .map(|name| name.to_string_lossy().into_owned())
                .collect();
            if let Some(missing) = missing_layers(&config.validation_layers, &available).into_iter().next() {
                engine_error!(SOURCE, "Validation layer {} is not installed", missing);
                return Err(Error::MissingValidationLayer(missing));
            }
            to_cstrings(&config.validation_layers)?
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const std::ffi::c_char> = layers.iter().map(|layer| layer.as_ptr()).collect();

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to get required surface extensions: {:?}", e);
                Error::InitializationFailed(format!("Failed to get required extensions: {:?}", e))
            })?
            .to_vec();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
        let (major, minor, patch) = config.app_version;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(c"Nebula")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extensions);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            engine_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
            Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
        })?;

        let debug_utils = if validation {
            debug::init_debug_settings(config.debug.clone());
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let info = debug::messenger_create_info(config.debug.severity);
            match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    engine_warn!(SOURCE, "Failed to create debug messenger: {:?}", e);
                    debug::clear_debug_settings();
                    None
                }
            }
        } else {
            None
        };

        engine_info!(
            SOURCE,
            "Vulkan instance created (validation {})",
            if validation { "on" } else { "off" }
        );
        Ok(Self { entry, instance, debug_utils })
    }

    pub(crate) fn has_messenger(&self) -> bool {
        self.debug_utils.is_some()
    }

    /// Destroy the messenger and the instance
    ///
    /// # Safety
    /// Every object created from the instance must already be destroyed.
    pub(crate) unsafe fn destroy(&mut self) {
        if let Some((loader, messenger)) = self.debug_utils.take() {
            debug::clear_debug_settings();
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
#[path = "vulkan_instance_tests.rs"]
mod tests;
