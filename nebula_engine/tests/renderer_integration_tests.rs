//! Renderer integration tests on a real Vulkan device
//!
//! All tests require a GPU and are marked with #[ignore]. Tests that draw
//! frames also need the compiled engine shaders (see `gpu_test_utils`) and
//! return early without them.
//!
//! Run with: cargo test --test renderer_integration_tests -- --ignored

mod gpu_test_utils;

use gpu_test_utils::*;
use nebula_engine::nebula::device::*;
use nebula_engine::nebula::render::{Light, Line, Mesh, PointLight, Vertex, WinitWindowSurface};
use nebula_engine::nebula::{Error, Renderer};
use nebula_engine::glam::{Mat4, Vec3, Vec4};
use serial_test::serial;

fn renderer() -> Option<(Renderer, WinitWindowSurface)> {
    if !shaders_available() {
        eprintln!("engine shaders not found in {}, skipping", shader_dir().display());
        return None;
    }
    let config = test_config();
    let device = create_test_device(&config).unwrap();
    let renderer = Renderer::new(config, Box::new(device), None).unwrap();
    Some((renderer, WinitWindowSurface::new(test_window())))
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_device_on_shared_window() {
    let config = test_config().with_max_frames_in_flight(3);
    let device = create_test_device(&config).unwrap();
    assert_eq!(device.max_frames_in_flight(), 3);
    assert!(!device.swapchain_extent().is_zero_area());
    drop(device);

    // The surface was released, so the window accepts a new device
    let device = create_test_device(&config).unwrap();
    assert!(device.swapchain_image_count() > 0);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_missing_shaders_fail_cleanly() {
    let config = test_config().with_shader_dir("does/not/exist");
    let device = create_test_device(&config).unwrap();
    match Renderer::new(config, Box::new(device), None) {
        Err(Error::ShaderModuleLoad { path, .. }) => assert!(path.contains("does")),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("renderer built without shaders"),
    }

    // The failed renderer released its device and surface
    assert!(create_test_device(&test_config()).is_ok());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_render_frames() {
    let Some((mut renderer, window)) = renderer() else { return };
    let frames = renderer.device().max_frames_in_flight() as u64 * 2;
    for _ in 0..frames {
        renderer.render(&window).unwrap();
    }
    renderer.wait_idle().unwrap();

    let stats = renderer.stats();
    assert!(stats.frames_presented + stats.swapchain_recreations >= frames);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_render_lines_and_lights() {
    let Some((mut renderer, window)) = renderer() else { return };
    renderer.register_light(Light::Point(PointLight::new(Vec3::new(0.0, 4.0, 0.0)).with_shadows(512))).unwrap();
    renderer.register_line(Line::new(Vec3::ZERO, Vec3::X, Vec4::new(1.0, 0.0, 0.0, 1.0)));
    renderer.register_line(Line::new(Vec3::ZERO, Vec3::Y, Vec4::new(0.0, 1.0, 0.0, 1.0)));

    renderer.render(&window).unwrap();
    renderer.clear_render_requests();
    renderer.render(&window).unwrap();
    renderer.wait_idle().unwrap();
    assert!(renderer.render_requests().is_empty());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_recreate_swapchain() {
    let Some((mut renderer, window)) = renderer() else { return };
    renderer.render(&window).unwrap();
    renderer.recreate_swapchain(&window).unwrap();
    renderer.render(&window).unwrap();
    renderer.wait_idle().unwrap();

    assert_eq!(renderer.stats().swapchain_recreations, 1);
    assert_eq!(renderer.swapchain_target().extent(), renderer.device().swapchain_extent());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_object_transform_round_trip() {
    let Some((mut renderer, window)) = renderer() else { return };
    let vertex = |x: f32, y: f32| Vertex { position: [x, y, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0] };
    let vertices = [vertex(0.0, 0.5), vertex(-0.5, -0.5), vertex(0.5, -0.5)];
    let mesh = Mesh::upload(renderer.device_mut(), &vertices, &[0, 1, 2]).unwrap();
    let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
    let object = renderer.add_render_object(mesh, transform).unwrap();
    assert_eq!(renderer.render_object(object).unwrap().transform(), transform);

    renderer.render(&window).unwrap();
    renderer.remove_render_object(object).unwrap();
    assert!(renderer.render_object(object).is_none());
    renderer.render(&window).unwrap();
    renderer.wait_idle().unwrap();
}
