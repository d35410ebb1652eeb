/*!
# Nebula Engine

Core of a real-time 3D renderer built on an explicit graphics device.

The crate is backend-agnostic: everything GPU-facing goes through the
`GraphicsDevice` trait, implemented by `nebula_engine_renderer_vulkan` for
Vulkan (and by a mock device in unit tests).

## Architecture

- **GraphicsDevice**: creation of GPU objects, command recording, queue
  submission and presentation
- **RenderTarget / ImageResource**: per-frame-slot attachments with tracked layouts
- **Pipeline / PipelineManager**: graphics, compute and ray tracing pipelines
  registered under a `PipelineType`
- **Renderer**: the frame loop (shadow passes, offscreen viewport, swapchain
  pass, GUI, mouse picking) and swapchain recovery
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod device;
pub mod command;
pub mod image;
pub mod descriptor;
pub mod pipeline;
pub mod render;

#[cfg(test)]
mod test_support;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging facade
    pub use crate::engine::Engine;

    // Configuration
    pub use crate::config::EngineConfig;

    // Frame orchestrator
    pub use crate::render::Renderer;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // Device abstraction and its value types
    pub mod device {
        pub use crate::device::*;
    }

    pub mod image {
        pub use crate::image::*;
    }

    pub mod pipeline {
        pub use crate::pipeline::*;
    }

    pub mod render {
        pub use crate::render::*;
    }
}

// Re-export math library at crate root
pub use glam;
