/// Physical device selection and logical device creation
///
/// A candidate must expose Vulkan 1.3, a queue family with graphics and
/// compute, a family that can present to the surface, the swapchain
/// extension plus any configured extensions, at least one surface format
/// and present mode, and the sampler anisotropy, dynamic rendering and
/// multiview features. Discrete GPUs win over everything else. Ray tracing
/// is enabled only when requested and fully supported.

use ash::vk;
use nebula_engine::config::EngineConfig;
use nebula_engine::nebula::device::SampleCount;
use nebula_engine::nebula::{Error, Result};
use nebula_engine::{engine_debug, engine_error, engine_info};
use std::ffi::{CStr, CString};

use crate::vulkan_conversions::max_sample_count;

const SOURCE: &str = "nebula::vulkan::PhysicalDevice";

const RAY_TRACING_EXTENSIONS: [&CStr; 3] = [
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::acceleration_structure::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Shader binding table limits of a ray tracing capable device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RayTracingProperties {
    pub handle_size: u32,
    pub handle_alignment: u32,
    pub base_alignment: u32,
    pub max_recursion_depth: u32,
}

/// The selected physical device and what the engine needs to know about it
#[derive(Debug, Clone)]
pub(crate) struct PhysicalDeviceInfo {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    /// Family used for graphics and compute submissions
    pub graphics_family: u32,
    pub present_family: u32,
    pub max_samples: SampleCount,
    pub max_anisotropy: f32,
    pub ray_tracing: Option<RayTracingProperties>,
    score: u32,
}

/// Preference of a device type (higher is better)
pub(crate) fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    }
}

/// Required extensions missing from `available`
pub(crate) fn missing_extensions(required: &[String], available: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .cloned()
        .collect()
}

/// Extensions every candidate must expose
pub(crate) fn required_extensions(config: &EngineConfig) -> Vec<String> {
    let mut required = vec![ash::khr::swapchain::NAME.to_string_lossy().into_owned()];
    for extension in &config.device_extensions {
        if !required.contains(extension) {
            required.push(extension.clone());
        }
    }
    required
}

fn ray_tracing_extension_names() -> Vec<String> {
    RAY_TRACING_EXTENSIONS.iter().map(|name| name.to_string_lossy().into_owned()).collect()
}

/// Pick the best device for `surface`, or `NoSuitableDevice` listing why each was rejected
pub(crate) fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    config: &EngineConfig,
) -> Result<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        engine_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
        Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
    })?;

    let mut rejections = Vec::new();
    let mut best: Option<PhysicalDeviceInfo> = None;
    for physical_device in devices {
        match evaluate(instance, surface_loader, surface, physical_device, config) {
            Ok(info) => {
                engine_debug!(SOURCE, "Candidate {} (score {})", info.name, info.score);
                if best.as_ref().map_or(true, |current| info.score > current.score) {
                    best = Some(info);
                }
            }
            Err(reason) => {
                engine_debug!(SOURCE, "Rejected device: {}", reason);
                rejections.push(reason);
            }
        }
    }

    match best {
        Some(info) => {
            engine_info!(
                SOURCE,
                "Selected {} (max {}x MSAA, ray tracing {})",
                info.name,
                info.max_samples.count(),
                if info.ray_tracing.is_some() { "on" } else { "off" }
            );
            Ok(info)
        }
        None => {
            let reason = if rejections.is_empty() {
                "no Vulkan devices".to_string()
            } else {
                rejections.join("; ")
            };
            engine_error!(SOURCE, "No suitable GPU: {}", reason);
            Err(Error::NoSuitableDevice(reason))
        }
    }
}

/// Score one device, or explain why it cannot be used
fn evaluate(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    config: &EngineConfig,
) -> std::result::Result<PhysicalDeviceInfo, String> {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unnamed device".to_string());
    let reject = |why: &str| format!("{}: {}", name, why);

    if properties.api_version < vk::API_VERSION_1_3 {
        return Err(reject("Vulkan 1.3 not supported"));
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let graphics_family = families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))
        .map(|index| index as u32)
        .ok_or_else(|| reject("no graphics + compute queue family"))?;
    let can_present = |index: u32| unsafe {
        surface_loader
            .get_physical_device_surface_support(physical_device, index, surface)
            .unwrap_or(false)
    };
    let present_family = if can_present(graphics_family) {
        graphics_family
    } else {
        (0..families.len() as u32)
            .find(|&index| can_present(index))
            .ok_or_else(|| reject("no queue family can present to the surface"))?
    };

    let available: Vec<String> = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .map_err(|e| reject(&format!("cannot enumerate extensions ({:?})", e)))?
        .iter()
        .filter_map(|extension| extension.extension_name_as_c_str().ok())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    let missing = missing_extensions(&required_extensions(config), &available);
    if !missing.is_empty() {
        return Err(reject(&format!("missing extensions {}", missing.join(", "))));
    }

    let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }
        .unwrap_or_default();
    let present_modes =
        unsafe { surface_loader.get_physical_device_surface_present_modes(physical_device, surface) }
            .unwrap_or_default();
    if formats.is_empty() || present_modes.is_empty() {
        return Err(reject("no surface formats or present modes"));
    }

    let mut features11 = vk::PhysicalDeviceVulkan11Features::default();
    let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut rt_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
    let mut as_features = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
    let rt_extensions_present = missing_extensions(&ray_tracing_extension_names(), &available).is_empty();
    let query_rt = config.enable_ray_tracing && rt_extensions_present;
    let anisotropy = {
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features11)
            .push_next(&mut features12)
            .push_next(&mut features13);
        if query_rt {
            features = features.push_next(&mut rt_features).push_next(&mut as_features);
        }
        unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
        features.features.sampler_anisotropy
    };
    if anisotropy == vk::FALSE {
        return Err(reject("sampler anisotropy not supported"));
    }
    if features13.dynamic_rendering == vk::FALSE {
        return Err(reject("dynamic rendering not supported"));
    }
    if features11.multiview == vk::FALSE {
        return Err(reject("multiview not supported"));
    }

    let ray_tracing = if query_rt
        && rt_features.ray_tracing_pipeline == vk::TRUE
        && as_features.acceleration_structure == vk::TRUE
        && features12.buffer_device_address == vk::TRUE
    {
        Some(ray_tracing_properties(instance, physical_device))
    } else {
        if config.enable_ray_tracing {
            engine_debug!(SOURCE, "{}: ray tracing requested but not supported", name);
        }
        None
    };

    let limits = properties.limits;
    let max_samples =
        max_sample_count(limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts);
    let score = device_type_score(properties.device_type) + u32::from(ray_tracing.is_some());

    Ok(PhysicalDeviceInfo {
        physical_device,
        name,
        graphics_family,
        present_family,
        max_samples,
        max_anisotropy: limits.max_sampler_anisotropy,
        ray_tracing,
        score,
    })
}

fn ray_tracing_properties(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> RayTracingProperties {
    let mut rt = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
    {
        let mut properties = vk::PhysicalDeviceProperties2::default().push_next(&mut rt);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties) };
    }
    RayTracingProperties {
        handle_size: rt.shader_group_handle_size,
        handle_alignment: rt.shader_group_handle_alignment,
        base_alignment: rt.shader_group_base_alignment,
        max_recursion_depth: rt.max_ray_recursion_depth,
    }
}

/// True if `format` supports both depth attachment and sampled use with optimal tiling
pub(crate) fn supports_sampled_depth(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    format: vk::Format,
) -> bool {
    let properties = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
    properties.optimal_tiling_features.contains(
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE,
    )
}

/// Create the logical device with one graphics/compute queue and one present queue
pub(crate) fn create_logical_device(
    instance: &ash::Instance,
    info: &PhysicalDeviceInfo,
    config: &EngineConfig,
) -> Result<ash::Device> {
    let priorities = [1.0];
    let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
        .queue_family_index(info.graphics_family)
        .queue_priorities(&priorities)];
    if info.present_family != info.graphics_family {
        queue_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(info.present_family)
                .queue_priorities(&priorities),
        );
    }

    let mut extension_names = required_extensions(config);
    if info.ray_tracing.is_some() {
        extension_names.extend(ray_tracing_extension_names());
    }
    let extensions: Vec<CString> = extension_names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid extension name '{}': {}", name, e)))
        })
        .collect::<Result<_>>()?;
    let extension_ptrs: Vec<*const std::ffi::c_char> = extensions.iter().map(|name| name.as_ptr()).collect();

    let ray_tracing = info.ray_tracing.is_some();
    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(true)
        .fill_mode_non_solid(true);
    let mut features11 = vk::PhysicalDeviceVulkan11Features::default().multiview(true);
    let mut features12 = vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(ray_tracing);
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
    let mut rt_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);
    let mut as_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);

    let mut create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&features)
        .push_next(&mut features11)
        .push_next(&mut features12)
        .push_next(&mut features13);
    if ray_tracing {
        create_info = create_info.push_next(&mut rt_features).push_next(&mut as_features);
    }

    unsafe { instance.create_device(info.physical_device, &create_info, None) }.map_err(|e| {
        engine_error!(SOURCE, "Failed to create logical device: {:?}", e);
        Error::InitializationFailed(format!("Failed to create device: {:?}", e))
    })
}

#[cfg(test)]
#[path = "vulkan_physical_device_tests.rs"]
mod tests;
