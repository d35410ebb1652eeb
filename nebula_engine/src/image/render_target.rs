/// Render targets: one set of role images per frame slot
///
/// A render target is bound to one rendering destination (swapchain,
/// offscreen viewport, mouse picking buffer or shadow map). It is never
/// resized in place: `recreate` destroys it and builds a new one.

use crate::device::*;
use crate::engine_debug;
use crate::error::{Error, Result};
use crate::image::image_resource::{ImageResource, ImageResourceConfig, ImageRole};

/// Images per role in every render target
pub const IMAGE_COUNT: usize = 3;

/// Render target creation parameters
///
/// Roles whose format is `Format::Undefined` get no images.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetConfig {
    pub extent: Extent2D,
    pub color_format: Format,
    pub depth_format: Format,
    pub resolve_format: Format,
    pub samples: SampleCount,
    /// Depth images get a compare sampler and are left readable after each pass
    pub sampled_depth: bool,
    pub cube_map: bool,
    pub layers: u32,
    pub label: String,
}

impl RenderTargetConfig {
    pub fn with_extent(&self, extent: Extent2D) -> Self {
        Self { extent, ..self.clone() }
    }

    fn image_config(&self, role: ImageRole, index: usize) -> ImageResourceConfig {
        ImageResourceConfig {
            role,
            extent: self.extent,
            color_format: self.color_format,
            depth_format: self.depth_format,
            resolve_format: self.resolve_format,
            samples: self.samples,
            create_sampler: match role {
                ImageRole::Resolve => true,
                ImageRole::Depth => self.sampled_depth,
                ImageRole::Color | ImageRole::RayTracingOutput => false,
            },
            cube_map: self.cube_map,
            layers: self.layers,
            label: format!("{} {:?} #{}", self.label, role, index),
        }
    }
}

/// Structural description of a render target, independent of its handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetLayout {
    pub image_count: usize,
    pub extent: Extent2D,
    pub color_format: Format,
    pub depth_format: Format,
    pub resolve_format: Format,
    pub samples: SampleCount,
    pub layers: u32,
    pub color_images: usize,
    pub depth_images: usize,
    pub resolve_images: usize,
}

/// Load operations for the two attachment kinds of a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentLoads {
    pub color: LoadOp,
    pub depth: LoadOp,
}

impl AttachmentLoads {
    pub fn clear(color: [f32; 4], depth: f32) -> Self {
        Self {
            color: LoadOp::Clear(ClearValue::Color(color)),
            depth: LoadOp::Clear(ClearValue::DepthStencil { depth, stencil: 0 }),
        }
    }
}

/// Per-slot role images of one rendering destination
#[derive(Debug)]
pub struct RenderTarget {
    config: RenderTargetConfig,
    color: Vec<ImageResource>,
    depth: Vec<ImageResource>,
    resolve: Vec<ImageResource>,
}

impl RenderTarget {
    pub fn new(device: &mut dyn GraphicsDevice, config: &RenderTargetConfig) -> Result<Self> {
        if config.extent.is_zero_area() {
            return Err(Error::InvalidResource(format!(
                "render target '{}' has zero extent",
                config.label
            )));
        }

        let mut target = Self {
            config: config.clone(),
            color: Vec::new(),
            depth: Vec::new(),
            resolve: Vec::new(),
        };
        if let Err(e) = target.create_images(device) {
            target.destroy_images(device);
            return Err(e);
        }

        engine_debug!(
            "nebula::render_target",
            "Created render target '{}' {}x{} ({} color, {} depth, {} resolve)",
            config.label,
            config.extent.width,
            config.extent.height,
            target.color.len(),
            target.depth.len(),
            target.resolve.len()
        );
        Ok(target)
    }

    fn create_images(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let roles = [
            (ImageRole::Color, self.config.color_format),
            (ImageRole::Depth, self.config.depth_format),
            (ImageRole::Resolve, self.config.resolve_format),
        ];
        for (role, format) in roles {
            if format.is_undefined() {
                continue;
            }
            for index in 0..IMAGE_COUNT {
                let image = ImageResource::new(device, &self.config.image_config(role, index))?;
                match role {
                    ImageRole::Color | ImageRole::RayTracingOutput => self.color.push(image),
                    ImageRole::Depth => self.depth.push(image),
                    ImageRole::Resolve => self.resolve.push(image),
                }
            }
        }
        Ok(())
    }

    /// Destroy this target and replace it with one of the same configuration at `extent`
    ///
    /// On failure the target is left empty.
    pub fn recreate(&mut self, device: &mut dyn GraphicsDevice, extent: Extent2D) -> Result<()> {
        self.destroy(device)?;
        *self = RenderTarget::new(device, &self.config.with_extent(extent))?;
        Ok(())
    }

    pub fn config(&self) -> &RenderTargetConfig {
        &self.config
    }

    pub fn extent(&self) -> Extent2D {
        self.config.extent
    }

    pub fn layout(&self) -> RenderTargetLayout {
        RenderTargetLayout {
            image_count: IMAGE_COUNT,
            extent: self.config.extent,
            color_format: self.config.color_format,
            depth_format: self.config.depth_format,
            resolve_format: self.config.resolve_format,
            samples: self.config.samples,
            layers: self.layer_count(),
            color_images: self.color.len(),
            depth_images: self.depth.len(),
            resolve_images: self.resolve.len(),
        }
    }

    pub fn layer_count(&self) -> u32 {
        if self.config.cube_map {
            6
        } else {
            self.config.layers.max(1)
        }
    }

    pub fn color(&self, index: usize) -> Option<&ImageResource> {
        self.color.get(index)
    }

    pub fn color_mut(&mut self, index: usize) -> Option<&mut ImageResource> {
        self.color.get_mut(index)
    }

    pub fn depth(&self, index: usize) -> Option<&ImageResource> {
        self.depth.get(index)
    }

    pub fn resolve(&self, index: usize) -> Option<&ImageResource> {
        self.resolve.get(index)
    }

    pub fn resolve_mut(&mut self, index: usize) -> Option<&mut ImageResource> {
        self.resolve.get_mut(index)
    }

    pub fn resolve_images_mut(&mut self) -> impl Iterator<Item = &mut ImageResource> {
        self.resolve.iter_mut()
    }

    /// Dynamic rendering parameters for slot `index`
    ///
    /// `external` is an image view owned elsewhere (the acquired swapchain
    /// image): it becomes the resolve destination when the target is
    /// multisampled, or the color attachment itself when the target has no
    /// color images. Single-sampled targets without color images render
    /// straight into their resolve images.
    pub fn rendering_info(
        &self,
        index: usize,
        loads: AttachmentLoads,
        view_mask: u32,
        external: Option<ImageViewHandle>,
    ) -> Result<RenderingInfo> {
        let missing = || Error::InvalidResource(format!("render target '{}' has no slot {}", self.config.label, index));
        if index >= IMAGE_COUNT {
            return Err(missing());
        }

        let mut color_attachments = Vec::new();
        if let Some(color) = self.color.get(index) {
            let resolve = if color.samples().is_multisampled() {
                match (external, self.resolve.get(index)) {
                    (Some(view), _) => Some((view, ImageLayout::ColorAttachment)),
                    (None, Some(resolve)) => Some((resolve.view(), ImageLayout::ColorAttachment)),
                    (None, None) => None,
                }
            } else {
                None
            };
            color_attachments.push(RenderingAttachment {
                view: color.view(),
                layout: ImageLayout::ColorAttachment,
                load: loads.color,
                store: if resolve.is_some() { StoreOp::DontCare } else { StoreOp::Store },
                resolve,
            });
        } else if let Some(view) = external.or_else(|| self.resolve.get(index).map(|r| r.view())) {
            color_attachments.push(RenderingAttachment {
                view,
                layout: ImageLayout::ColorAttachment,
                load: loads.color,
                store: StoreOp::Store,
                resolve: None,
            });
        }

        let depth_attachment = match self.depth.get(index) {
            Some(depth) => Some(RenderingAttachment {
                view: depth.view(),
                layout: ImageLayout::DepthAttachment,
                load: loads.depth,
                store: if self.config.sampled_depth { StoreOp::Store } else { StoreOp::DontCare },
                resolve: None,
            }),
            None if self.config.depth_format.is_undefined() => None,
            None => return Err(missing()),
        };

        Ok(RenderingInfo {
            render_area: Rect2D::full(self.config.extent),
            layer_count: self.layer_count(),
            view_mask,
            color_attachments,
            depth_attachment,
        })
    }

    /// Transitions into attachment layouts before rendering into slot `index`
    pub fn begin_pass_barriers(&mut self, index: usize) -> BarrierBatch {
        let mut batch = BarrierBatch::new();
        if let Some(resolve) = self.resolve.get_mut(index) {
            batch = batch.with(resolve.barrier_to(ImageLayout::ColorAttachment));
        }
        if self.config.sampled_depth {
            if let Some(depth) = self.depth.get_mut(index) {
                batch = batch.with(depth.barrier_to(ImageLayout::DepthAttachment));
            }
        }
        batch
    }

    /// Transitions into sampling layouts after rendering into slot `index`
    pub fn end_pass_barriers(&mut self, index: usize) -> BarrierBatch {
        let mut batch = BarrierBatch::new();
        if let Some(resolve) = self.resolve.get_mut(index) {
            batch = batch.with(resolve.barrier_to(ImageLayout::ShaderReadOnly));
        }
        if self.config.sampled_depth {
            if let Some(depth) = self.depth.get_mut(index) {
                batch = batch.with(depth.barrier_to(ImageLayout::DepthReadOnly));
            }
        }
        batch
    }

    fn destroy_images(&mut self, device: &mut dyn GraphicsDevice) {
        for image in self
            .resolve
            .iter_mut()
            .chain(self.depth.iter_mut())
            .chain(self.color.iter_mut())
        {
            image.destroy(device);
        }
        self.color.clear();
        self.depth.clear();
        self.resolve.clear();
    }

    /// Wait for the device to go idle, then release every image
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.color.is_empty() && self.depth.is_empty() && self.resolve.is_empty() {
            return Ok(());
        }
        device.wait_idle()?;
        self.destroy_images(device);
        Ok(())
    }
}

#[cfg(test)]
#[path = "render_target_tests.rs"]
mod tests;
