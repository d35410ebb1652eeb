/// Window collaborator
///
/// The renderer only needs the framebuffer size and a resize flag. Surface
/// creation lives in the backend, which accepts any `raw-window-handle`
/// provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use winit::window::Window;

use crate::device::Extent2D;

pub trait WindowSurface {
    /// Current framebuffer size in pixels (zero while minimized)
    fn framebuffer_size(&self) -> Extent2D;

    /// Return and clear the resize flag
    fn take_resized(&self) -> bool;

    fn set_resized(&self);

    /// Block briefly while the window is minimized
    fn wait_events(&self) {
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// `WindowSurface` over a winit window
#[derive(Debug, Clone)]
pub struct WinitWindowSurface {
    window: Arc<Window>,
    resized: Arc<AtomicBool>,
}

impl WinitWindowSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window, resized: Arc::new(AtomicBool::new(false)) }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}

impl WindowSurface for WinitWindowSurface {
    fn framebuffer_size(&self) -> Extent2D {
        let size = self.window.inner_size();
        Extent2D::new(size.width, size.height)
    }

    fn take_resized(&self) -> bool {
        self.resized.swap(false, Ordering::AcqRel)
    }

    fn set_resized(&self) {
        self.resized.store(true, Ordering::Release);
    }
}
