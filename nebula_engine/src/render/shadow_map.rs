/// Shadow maps: depth-only render targets owned per light slot
///
/// Point lights get a six-layer cube map rendered in one multiview pass;
/// spot lights get a single layer. Depth images are sampled by scene
/// shaders after the pass.

use crate::device::*;
use crate::error::Result;
use crate::image::{AttachmentLoads, RenderTarget, RenderTargetConfig};
use crate::render::light::Light;

/// Depth format for shadow maps on `device`
pub fn shadow_depth_format(device: &dyn GraphicsDevice) -> Format {
    if device.supports_sampled_depth(Format::D32_SFLOAT) {
        Format::D32_SFLOAT
    } else {
        Format::D16_UNORM
    }
}

#[derive(Debug)]
pub struct ShadowMap {
    target: RenderTarget,
    cube: bool,
}

impl ShadowMap {
    pub fn new(device: &mut dyn GraphicsDevice, light: &Light, depth_format: Format, slot: usize) -> Result<Self> {
        let size = light.shadow_map_size();
        let cube = light.is_cube();
        let target = RenderTarget::new(
            device,
            &RenderTargetConfig {
                extent: Extent2D::new(size, size),
                color_format: Format::Undefined,
                depth_format,
                resolve_format: Format::Undefined,
                samples: SampleCount::S1,
                sampled_depth: true,
                cube_map: cube,
                layers: light.face_count(),
                label: format!("shadow map #{}", slot),
            },
        )?;
        Ok(Self { target, cube })
    }

    /// True if this map can be reused for `light`
    pub fn matches(&self, light: &Light) -> bool {
        let size = light.shadow_map_size();
        self.cube == light.is_cube() && self.target.extent() == Extent2D::new(size, size)
    }

    pub fn is_cube(&self) -> bool {
        self.cube
    }

    pub fn extent(&self) -> Extent2D {
        self.target.extent()
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Depth-only rendering into slot `frame`, cleared to 1.0
    pub fn rendering_info(&self, frame: usize, view_mask: u32) -> Result<RenderingInfo> {
        self.target
            .rendering_info(frame, AttachmentLoads::clear([0.0; 4], 1.0), view_mask, None)
    }

    pub fn begin_pass_barriers(&mut self, frame: usize) -> BarrierBatch {
        self.target.begin_pass_barriers(frame)
    }

    pub fn end_pass_barriers(&mut self, frame: usize) -> BarrierBatch {
        self.target.end_pass_barriers(frame)
    }

    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        self.target.destroy(device)
    }
}
