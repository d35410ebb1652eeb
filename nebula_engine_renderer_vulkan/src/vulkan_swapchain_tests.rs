//! Unit tests for vulkan_swapchain.rs

use super::*;

fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32), images: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
        max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
        min_image_count: images.0,
        max_image_count: images.1,
        ..Default::default()
    }
}

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR { format, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR }
}

#[test]
fn test_prefers_bgra_srgb() {
    let formats = [surface_format(vk::Format::R8G8B8A8_UNORM), surface_format(vk::Format::B8G8R8A8_SRGB)];
    let (chosen, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(format, Format::B8G8R8A8_SRGB);
}

#[test]
fn test_falls_back_to_first_known_format() {
    let formats = [
        surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
        surface_format(vk::Format::R8G8B8A8_UNORM),
    ];
    let (_, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(format, Format::R8G8B8A8_UNORM);
}

#[test]
fn test_no_known_format() {
    assert!(choose_surface_format(&[surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)]).is_none());
    assert!(choose_surface_format(&[]).is_none());
}

#[test]
fn test_extent_follows_surface_when_fixed() {
    let caps = caps((1024, 768), (1, 1), (4096, 4096), (2, 8));
    let extent = choose_extent(&caps, Extent2D::new(800, 600));
    assert_eq!((extent.width, extent.height), (1024, 768));
}

#[test]
fn test_extent_clamped_when_free() {
    let caps = caps((u32::MAX, u32::MAX), (64, 64), (1920, 1080), (2, 8));
    let extent = choose_extent(&caps, Extent2D::new(4000, 10));
    assert_eq!((extent.width, extent.height), (1920, 64));
}

#[test]
fn test_image_count() {
    assert_eq!(choose_image_count(&caps((1, 1), (1, 1), (1, 1), (2, 8))), 3);
    assert_eq!(choose_image_count(&caps((1, 1), (1, 1), (1, 1), (2, 2))), 2);
    assert_eq!(choose_image_count(&caps((1, 1), (1, 1), (1, 1), (3, 0))), 4);
}
