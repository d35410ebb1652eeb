//! Shared fixtures for unit tests: SPIR-V files on disk and a scripted window

use std::cell::Cell;
use std::path::PathBuf;

use crate::device::Extent2D;
use crate::pipeline::SPIRV_MAGIC;
use crate::render::WindowSurface;

/// Shader files the renderer loads at startup, plus a few for application pipelines
pub const SHADER_FILES: [&str; 9] = [
    "shadow.vert.spv",
    "shadow_cube.vert.spv",
    "lines.vert.spv",
    "lines.frag.spv",
    "mouse_picking.vert.spv",
    "mouse_picking.frag.spv",
    "mesh.vert.spv",
    "mesh.frag.spv",
    "particles.comp.spv",
];

/// Minimal module: header words only, which is all the mock device looks at
pub fn spirv_bytes() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0600, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// Directory holding every file of `SHADER_FILES`, unique to `name`
pub fn shader_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nebula_shaders_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for file in SHADER_FILES {
        std::fs::write(dir.join(file), spirv_bytes()).unwrap();
    }
    dir
}

/// Window whose size and resize flag are set by the test
pub struct TestWindow {
    pub size: Cell<Extent2D>,
    pub resized: Cell<bool>,
    /// Sizes returned by successive `framebuffer_size` calls before `size`
    pub pending: std::cell::RefCell<Vec<Extent2D>>,
    pub waits: Cell<usize>,
}

impl TestWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new(Extent2D::new(width, height)),
            resized: Cell::new(false),
            pending: std::cell::RefCell::new(Vec::new()),
            waits: Cell::new(0),
        }
    }
}

impl WindowSurface for TestWindow {
    fn framebuffer_size(&self) -> Extent2D {
        let mut pending = self.pending.borrow_mut();
        if pending.is_empty() {
            self.size.get()
        } else {
            pending.remove(0)
        }
    }

    fn take_resized(&self) -> bool {
        self.resized.replace(false)
    }

    fn set_resized(&self) {
        self.resized.set(true);
    }

    fn wait_events(&self) {
        self.waits.set(self.waits.get() + 1);
    }
}
