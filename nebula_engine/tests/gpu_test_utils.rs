#![allow(dead_code)]
//! GPU test utilities - one hidden window shared by every GPU test
//!
//! winit refuses to create a second event loop in the same process, so the
//! window lives in a static and its event loop is leaked. Each test builds
//! its own `VulkanDevice` on that window; tests must be `#[serial]` so only
//! one surface exists at a time.

use nebula_engine::nebula::{EngineConfig, Result};
use nebula_engine_renderer_vulkan::nebula::VulkanDevice;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use winit::event_loop::EventLoop;
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(all(unix, not(target_os = "macos")))]
use winit::platform::x11::EventLoopBuilderExtX11;

pub const TEST_WIDTH: u32 = 640;
pub const TEST_HEIGHT: u32 = 480;

/// Shader files the renderer loads at startup
pub const ENGINE_SHADERS: &[&str] = &[
    "mesh.vert.spv",
    "mesh.frag.spv",
    "lines.vert.spv",
    "lines.frag.spv",
    "shadow.vert.spv",
    "shadow_cube.vert.spv",
    "mouse_picking.vert.spv",
    "mouse_picking.frag.spv",
];

static GPU_WINDOW: OnceLock<Arc<Window>> = OnceLock::new();

/// The shared hidden test window
pub fn test_window() -> Arc<Window> {
    GPU_WINDOW
        .get_or_init(|| {
            let (window, event_loop) = create_test_window();
            // EventLoop is not Sync and cannot be stored; leaking it keeps the window valid
            std::mem::forget(event_loop);
            Arc::new(window)
        })
        .clone()
}

#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    // any_thread: cargo test runs tests off the main thread
    let mut builder = EventLoop::builder();
    #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
    builder.with_any_thread(true);
    let event_loop = builder.build().unwrap();

    let window_attrs = Window::default_attributes()
        .with_title("Nebula GPU Test Window")
        .with_inner_size(winit::dpi::PhysicalSize::new(TEST_WIDTH, TEST_HEIGHT))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

/// Shader directory for GPU tests (`NEBULA_SHADER_DIR`, or the workspace `assets/shaders`)
pub fn shader_dir() -> PathBuf {
    std::env::var_os("NEBULA_SHADER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../assets/shaders"))
}

/// True when every engine shader is present in `shader_dir()`
pub fn shaders_available() -> bool {
    let dir = shader_dir();
    ENGINE_SHADERS.iter().all(|name| dir.join(name).is_file())
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_window(TEST_WIDTH, TEST_HEIGHT, "Nebula GPU Test")
        .with_shader_dir(shader_dir())
}

/// Create a device on the shared window
pub fn create_test_device(config: &EngineConfig) -> Result<VulkanDevice> {
    let window = test_window();
    VulkanDevice::new(window.as_ref(), config)
}
