/// Image resources: one GPU image + view tagged with a role
///
/// Usage flags, sample count and the working layout are derived from the
/// role and the configured formats only.

use crate::command::SingleUseCommandBuffer;
use crate::device::*;
use crate::engine_debug;
use crate::error::{Error, Result};
use crate::render::gui::GuiTextureId;

/// What an image is used for inside a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    Color,
    Depth,
    Resolve,
    RayTracingOutput,
}

impl ImageRole {
    /// Image usage for this role
    pub fn usage(self, format: Format, samples: SampleCount) -> ImageUsage {
        match self {
            ImageRole::Color => {
                let mut usage = ImageUsage::COLOR_ATTACHMENT;
                if samples.is_multisampled() {
                    usage |= ImageUsage::TRANSIENT_ATTACHMENT;
                }
                if format.is_readback() {
                    usage |= ImageUsage::TRANSFER_SRC;
                }
                usage
            }
            ImageRole::Depth => {
                let mut usage = ImageUsage::DEPTH_STENCIL_ATTACHMENT;
                if format.is_samplable_depth() {
                    usage |= ImageUsage::SAMPLED;
                }
                usage
            }
            ImageRole::Resolve => {
                let mut usage = ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED;
                if format.is_readback() {
                    usage |= ImageUsage::TRANSFER_SRC;
                }
                usage
            }
            ImageRole::RayTracingOutput => ImageUsage::STORAGE | ImageUsage::SAMPLED,
        }
    }

    /// Layout the image is kept in between passes
    pub fn working_layout(self) -> ImageLayout {
        match self {
            ImageRole::Color => ImageLayout::ColorAttachment,
            ImageRole::Depth => ImageLayout::DepthAttachment,
            ImageRole::Resolve => ImageLayout::ShaderReadOnly,
            ImageRole::RayTracingOutput => ImageLayout::General,
        }
    }

    /// True if shaders outside the owning pass may sample this image
    pub fn is_sampled_externally(self, format: Format) -> bool {
        match self {
            ImageRole::Resolve | ImageRole::RayTracingOutput => true,
            ImageRole::Depth => format.is_samplable_depth(),
            ImageRole::Color => false,
        }
    }

    /// Resolve and storage images are always single-sampled
    pub fn samples(self, configured: SampleCount) -> SampleCount {
        match self {
            ImageRole::Color | ImageRole::Depth => configured,
            ImageRole::Resolve | ImageRole::RayTracingOutput => SampleCount::S1,
        }
    }
}

/// Image resource creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResourceConfig {
    pub role: ImageRole,
    pub extent: Extent2D,
    pub color_format: Format,
    pub depth_format: Format,
    pub resolve_format: Format,
    pub samples: SampleCount,
    pub create_sampler: bool,
    /// Six layers with an additional cube view for sampling
    pub cube_map: bool,
    pub layers: u32,
    pub label: String,
}

impl ImageResourceConfig {
    /// Format of the image for the configured role
    pub fn format(&self) -> Format {
        match self.role {
            ImageRole::Color | ImageRole::RayTracingOutput => self.color_format,
            ImageRole::Depth => self.depth_format,
            ImageRole::Resolve => self.resolve_format,
        }
    }

    pub fn layer_count(&self) -> u32 {
        if self.cube_map {
            6
        } else {
            self.layers.max(1)
        }
    }

    pub fn image_desc(&self) -> ImageDesc {
        let format = self.format();
        let samples = self.role.samples(self.samples);
        ImageDesc {
            extent: self.extent,
            format,
            usage: self.role.usage(format, samples),
            samples,
            array_layers: self.layer_count(),
            cube_compatible: self.cube_map,
            label: self.label.clone(),
        }
    }
}

/// One image, its views and an optional sampler
#[derive(Debug)]
pub struct ImageResource {
    role: ImageRole,
    format: Format,
    extent: Extent2D,
    samples: SampleCount,
    layer_count: u32,
    image: ImageHandle,
    view: ImageViewHandle,
    cube_view: ImageViewHandle,
    sampler: SamplerHandle,
    layout: ImageLayout,
    gui_texture: Option<GuiTextureId>,
}

impl ImageResource {
    /// Create the image and its views, then transition it to its working layout
    pub fn new(device: &mut dyn GraphicsDevice, config: &ImageResourceConfig) -> Result<Self> {
        let format = config.format();
        if format.is_undefined() {
            return Err(Error::InvalidResource(format!("{:?} image '{}' has no format", config.role, config.label)));
        }
        if config.extent.is_zero_area() {
            return Err(Error::InvalidResource(format!(
                "image '{}' has zero extent {}x{}",
                config.label, config.extent.width, config.extent.height
            )));
        }

        let desc = config.image_desc();
        let mut resource = Self {
            role: config.role,
            format,
            extent: config.extent,
            samples: desc.samples,
            layer_count: desc.array_layers,
            image: device.create_image(&desc)?,
            view: ImageViewHandle::default(),
            cube_view: ImageViewHandle::default(),
            sampler: SamplerHandle::default(),
            layout: ImageLayout::Undefined,
            gui_texture: None,
        };

        if let Err(e) = resource.create_views(device, config) {
            resource.destroy(device);
            return Err(e);
        }

        engine_debug!(
            "nebula::image",
            "Created {:?} image '{}' {}x{} {:?} x{}",
            config.role, config.label, config.extent.width, config.extent.height, format, resource.layer_count
        );
        Ok(resource)
    }

    fn create_views(&mut self, device: &mut dyn GraphicsDevice, config: &ImageResourceConfig) -> Result<()> {
        let view_type = if self.layer_count > 1 {
            ImageViewType::D2Array
        } else {
            ImageViewType::D2
        };
        self.view = device.create_image_view(&ImageViewDesc {
            image: self.image,
            format: self.format,
            view_type,
            aspect: self.format.aspect(),
            base_layer: 0,
            layer_count: self.layer_count,
        })?;

        if config.cube_map {
            self.cube_view = device.create_image_view(&ImageViewDesc {
                image: self.image,
                format: self.format,
                view_type: ImageViewType::Cube,
                aspect: self.format.aspect(),
                base_layer: 0,
                layer_count: 6,
            })?;
        }

        if config.create_sampler {
            let compare = match self.role {
                ImageRole::Depth => Some(CompareOp::LessOrEqual),
                _ => None,
            };
            self.sampler = device.create_sampler(&SamplerDesc { compare, ..SamplerDesc::default() })?;
        }

        self.transition_to(device, self.role.working_layout())
    }

    /// Move the image to `layout` with a single-use command buffer
    pub fn transition_to(&mut self, device: &mut dyn GraphicsDevice, layout: ImageLayout) -> Result<()> {
        let batch = BarrierBatch::from(self.barrier_to(layout));
        if batch.is_empty() {
            return Ok(());
        }
        SingleUseCommandBuffer::record(device, QueueKind::Graphics, |device, cmd| {
            device.cmd_pipeline_barrier(cmd, &batch)
        })
    }

    /// Barrier from the tracked layout to `layout`; updates the tracked layout
    pub fn barrier_to(&mut self, layout: ImageLayout) -> ImageBarrier {
        let barrier = ImageBarrier::transition(self.image, self.format, self.layout, layout)
            .layers(0, self.layer_count);
        self.layout = layout;
        barrier
    }

    pub fn role(&self) -> ImageRole {
        self.role
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn samples(&self) -> SampleCount {
        self.samples
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn image(&self) -> ImageHandle {
        self.image
    }

    /// Attachment view (2D, or 2D array for layered images)
    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    /// View for sampling: the cube view for cube maps, the attachment view otherwise
    pub fn sampled_view(&self) -> ImageViewHandle {
        if slotmap::Key::is_null(&self.cube_view) {
            self.view
        } else {
            self.cube_view
        }
    }

    pub fn sampler(&self) -> Option<SamplerHandle> {
        (!slotmap::Key::is_null(&self.sampler)).then_some(self.sampler)
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn is_sampled_externally(&self) -> bool {
        self.role.is_sampled_externally(self.format)
    }

    pub fn gui_texture(&self) -> Option<GuiTextureId> {
        self.gui_texture
    }

    pub fn set_gui_texture(&mut self, texture: Option<GuiTextureId>) {
        self.gui_texture = texture;
    }

    /// Release the sampler, the views and the image
    ///
    /// The caller waits for the device to be idle first.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        device.destroy_sampler(&mut self.sampler);
        device.destroy_image_view(&mut self.cube_view);
        device.destroy_image_view(&mut self.view);
        device.destroy_image(&mut self.image);
        self.layout = ImageLayout::Undefined;
        self.gui_texture = None;
    }
}

#[cfg(test)]
#[path = "image_resource_tests.rs"]
mod tests;
