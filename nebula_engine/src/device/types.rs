/// Backend-agnostic value types shared by every device entry point

use bitflags::bitflags;

/// Image and attachment formats
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Undefined,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32_SFLOAT,
    R32_SFLOAT,
    R32_UINT,
    D16_UNORM,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

/// Format used for object-id render targets that are read back on the host
pub const MOUSE_PICKING_FORMAT: Format = Format::R32_UINT;

impl Format {
    pub fn is_undefined(self) -> bool {
        self == Format::Undefined
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16_UNORM | Format::D32_SFLOAT | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT)
    }

    /// Depth formats that can also be bound as a sampled image (shadow maps)
    pub fn is_samplable_depth(self) -> bool {
        matches!(self, Format::D32_SFLOAT | Format::D16_UNORM)
    }

    /// True if the format is read back on the host by mouse picking
    pub fn is_readback(self) -> bool {
        self == MOUSE_PICKING_FORMAT
    }

    /// Size of one texel in bytes (0 for Undefined)
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::D16_UNORM => 2,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::R32_SFLOAT
            | Format::R32_UINT
            | Format::D32_SFLOAT
            | Format::D24_UNORM_S8_UINT => 4,
            Format::R16G16B16A16_SFLOAT | Format::R32G32_SFLOAT | Format::D32_SFLOAT_S8_UINT => 8,
            Format::R32G32B32_SFLOAT => 12,
            Format::R32G32B32A32_SFLOAT => 16,
        }
    }

    /// Aspect touched by barriers and views of this format
    pub fn aspect(self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }
}

/// MSAA sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SampleCount {
    #[default]
    S1,
    S2,
    S4,
    S8,
    S16,
    S32,
    S64,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
            SampleCount::S16 => 16,
            SampleCount::S32 => 32,
            SampleCount::S64 => 64,
        }
    }

    pub fn is_multisampled(self) -> bool {
        self != SampleCount::S1
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
        const TRANSIENT_ATTACHMENT = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
        const SHADER_BINDING_TABLE = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const GEOMETRY = 1 << 3;
        const RAYGEN = 1 << 4;
        const MISS = 1 << 5;
        const CLOSEST_HIT = 1 << 6;
        const ANY_HIT = 1 << 7;
    }
}

bitflags! {
    /// Pipeline stages used by barriers and semaphore waits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_INPUT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const EARLY_FRAGMENT_TESTS = 1 << 4;
        const LATE_FRAGMENT_TESTS = 1 << 5;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 6;
        const COMPUTE_SHADER = 1 << 7;
        const TRANSFER = 1 << 8;
        const RAY_TRACING_SHADER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const SHADER_READ = 1 << 0;
        const SHADER_WRITE = 1 << 1;
        const COLOR_ATTACHMENT_READ = 1 << 2;
        const COLOR_ATTACHMENT_WRITE = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 5;
        const TRANSFER_READ = 1 << 6;
        const TRANSFER_WRITE = 1 << 7;
        const HOST_READ = 1 << 8;
        const MEMORY_READ = 1 << 9;
    }
}

/// Image layouts the engine transitions between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthAttachment,
    DepthReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

impl ImageLayout {
    /// Accesses that must be made available before leaving this layout
    pub fn src_access(self) -> AccessFlags {
        match self {
            ImageLayout::Undefined | ImageLayout::PresentSrc => AccessFlags::empty(),
            ImageLayout::General => AccessFlags::SHADER_WRITE,
            ImageLayout::ColorAttachment => AccessFlags::COLOR_ATTACHMENT_WRITE,
            ImageLayout::DepthAttachment => AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ImageLayout::DepthReadOnly | ImageLayout::ShaderReadOnly => AccessFlags::SHADER_READ,
            ImageLayout::TransferSrc => AccessFlags::TRANSFER_READ,
            ImageLayout::TransferDst => AccessFlags::TRANSFER_WRITE,
        }
    }

    /// Accesses performed once the image is in this layout
    pub fn dst_access(self) -> AccessFlags {
        match self {
            ImageLayout::Undefined => AccessFlags::empty(),
            ImageLayout::PresentSrc => AccessFlags::MEMORY_READ,
            ImageLayout::General => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            ImageLayout::ColorAttachment => {
                AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            ImageLayout::DepthAttachment => {
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            ImageLayout::DepthReadOnly | ImageLayout::ShaderReadOnly => AccessFlags::SHADER_READ,
            ImageLayout::TransferSrc => AccessFlags::TRANSFER_READ,
            ImageLayout::TransferDst => AccessFlags::TRANSFER_WRITE,
        }
    }

    /// Stage that last touches an image in this layout
    pub fn src_stage(self) -> PipelineStage {
        match self {
            ImageLayout::Undefined => PipelineStage::TOP_OF_PIPE,
            ImageLayout::PresentSrc => PipelineStage::BOTTOM_OF_PIPE,
            ImageLayout::General => PipelineStage::COMPUTE_SHADER | PipelineStage::RAY_TRACING_SHADER,
            ImageLayout::ColorAttachment => PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            ImageLayout::DepthAttachment => PipelineStage::LATE_FRAGMENT_TESTS,
            ImageLayout::DepthReadOnly | ImageLayout::ShaderReadOnly => PipelineStage::FRAGMENT_SHADER,
            ImageLayout::TransferSrc | ImageLayout::TransferDst => PipelineStage::TRANSFER,
        }
    }

    /// Stage that first touches an image in this layout
    pub fn dst_stage(self) -> PipelineStage {
        match self {
            ImageLayout::Undefined => PipelineStage::TOP_OF_PIPE,
            ImageLayout::PresentSrc => PipelineStage::BOTTOM_OF_PIPE,
            ImageLayout::General => PipelineStage::COMPUTE_SHADER | PipelineStage::RAY_TRACING_SHADER,
            ImageLayout::ColorAttachment => PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            ImageLayout::DepthAttachment => {
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS
            }
            ImageLayout::DepthReadOnly | ImageLayout::ShaderReadOnly => PipelineStage::FRAGMENT_SHADER,
            ImageLayout::TransferSrc | ImageLayout::TransferDst => PipelineStage::TRANSFER,
        }
    }
}

/// 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const ZERO: Extent2D = Extent2D { width: 0, height: 0 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (minimized window, hidden viewport)
    pub fn is_zero_area(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering the whole extent
    pub fn full(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn full(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

/// Clear value for an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    ColorUint([u32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Attachment load operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Load,
    Clear(ClearValue),
    DontCare,
}

/// Attachment store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

/// Queues owned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Present,
    Compute,
}

/// Memory placement for buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device local, not host visible
    GpuOnly,
    /// Host visible, written by the CPU every frame
    CpuToGpu,
    /// Host visible, read back by the CPU
    GpuToCpu,
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// Image acquired; `suboptimal` asks for recreation after present
    Acquired { image_index: u32, suboptimal: bool },
    /// Swapchain no longer matches the surface and must be recreated
    OutOfDate,
}

/// Result of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Success,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// True if the swapchain should be rebuilt
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentStatus::Success)
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
