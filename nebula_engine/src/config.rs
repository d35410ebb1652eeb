/// Engine configuration
///
/// `EngineConfig` is built once by the application and passed by reference
/// to every constructor that needs it. Nothing reads configuration from
/// global state.

use std::path::PathBuf;

use glam::Vec3;

use crate::device::{Extent2D, SampleCount};
use crate::error::{Error, Result};

// ============================================================================
// DEBUG / VALIDATION
// ============================================================================

/// Which validation messages are displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    All,
}

/// Where validation messages go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DebugOutput {
    #[default]
    Console,
    File(String),
    Both(String),
}

/// Validation message categories to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self { show_general: true, show_validation: true, show_performance: true }
    }
}

/// Validation message counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Debug messenger settings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebugSettings {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    pub break_on_error: bool,
    pub panic_on_error: bool,
    pub enable_stats: bool,
}

// ============================================================================
// WINDOW / GUI LAYOUT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { width: 1280, height: 720, title: "Nebula".to_string() }
    }
}

/// Docking pane sizes, as fractions of the window
///
/// The offscreen viewport fills whatever the panes leave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DockingLayout {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for DockingLayout {
    fn default() -> Self {
        Self { left: 0.2, right: 0.2, bottom: 0.25 }
    }
}

impl DockingLayout {
    /// Extent of the central viewport for a window of `window` pixels
    pub fn viewport_extent(&self, window: Extent2D) -> Extent2D {
        let width = window.width as f32 * (1.0 - self.left - self.right).max(0.0);
        let height = window.height as f32 * (1.0 - self.bottom).max(0.0);
        Extent2D::new(width.floor() as u32, height.floor() as u32)
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Immutable engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub app_name: String,
    pub app_version: (u32, u32, u32),
    pub window: WindowConfig,
    pub camera_position: Vec3,
    /// Number of frame slots (N)
    pub max_frames_in_flight: usize,
    pub enable_validation: bool,
    pub validation_layers: Vec<String>,
    /// Extensions requested on top of the ones the engine always needs
    pub device_extensions: Vec<String>,
    pub enable_ray_tracing: bool,
    /// MSAA sample count; `None` picks the highest the device supports
    pub msaa_samples: Option<SampleCount>,
    /// Render the scene into a separate viewport sampled by the GUI
    pub offscreen_viewport: bool,
    pub mouse_picking: bool,
    pub shadow_map_size: u32,
    pub particles_enabled: bool,
    pub docking: DockingLayout,
    pub clear_color: [f32; 4],
    pub debug: DebugSettings,
    pub shader_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "Nebula Application".to_string(),
            app_version: (1, 0, 0),
            window: WindowConfig::default(),
            camera_position: Vec3::new(0.0, 2.0, 5.0),
            max_frames_in_flight: 2,
            enable_validation: cfg!(debug_assertions),
            validation_layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            device_extensions: Vec::new(),
            enable_ray_tracing: false,
            msaa_samples: None,
            offscreen_viewport: true,
            mouse_picking: true,
            shadow_map_size: 1024,
            particles_enabled: false,
            docking: DockingLayout::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            debug: DebugSettings::default(),
            shader_dir: PathBuf::from("assets/shaders"),
        }
    }
}

impl EngineConfig {
    pub fn with_window(mut self, width: u32, height: u32, title: impl Into<String>) -> Self {
        self.window = WindowConfig { width, height, title: title.into() };
        self
    }

    pub fn with_camera_position(mut self, position: Vec3) -> Self {
        self.camera_position = position;
        self
    }

    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn with_ray_tracing(mut self, enable: bool) -> Self {
        self.enable_ray_tracing = enable;
        self
    }

    pub fn with_msaa(mut self, samples: SampleCount) -> Self {
        self.msaa_samples = Some(samples);
        self
    }

    pub fn with_offscreen_viewport(mut self, enable: bool) -> Self {
        self.offscreen_viewport = enable;
        self
    }

    pub fn with_mouse_picking(mut self, enable: bool) -> Self {
        self.mouse_picking = enable;
        self
    }

    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    pub fn with_particles(mut self, enable: bool) -> Self {
        self.particles_enabled = enable;
        self
    }

    pub fn with_docking(mut self, docking: DockingLayout) -> Self {
        self.docking = docking;
        self
    }

    pub fn with_debug(mut self, debug: DebugSettings) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Full path of a shader binary inside the shader directory
    pub fn shader_path(&self, file_name: &str) -> PathBuf {
        self.shader_dir.join(file_name)
    }

    /// Effective MSAA sample count given the device limit
    pub fn sample_count(&self, device_max: SampleCount) -> SampleCount {
        match self.msaa_samples {
            Some(requested) => requested.min(device_max),
            None => device_max,
        }
    }

    /// Reject configurations the renderer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 {
            return Err(Error::InitializationFailed("max_frames_in_flight must be at least 1".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::InitializationFailed(format!(
                "invalid window size {}x{}",
                self.window.width, self.window.height
            )));
        }
        if !self.shadow_map_size.is_power_of_two() {
            return Err(Error::InitializationFailed(format!(
                "shadow map size {} is not a power of two",
                self.shadow_map_size
            )));
        }
        let docking = self.docking;
        let fractions = [docking.left, docking.right, docking.bottom];
        if fractions.iter().any(|f| !(0.0..1.0).contains(f)) || docking.left + docking.right >= 1.0 {
            return Err(Error::InitializationFailed("docking panes leave no viewport".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
