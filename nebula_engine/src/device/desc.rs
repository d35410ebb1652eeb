/// Creation-info value types passed to `GraphicsDevice::create_*`

use super::handles::*;
use super::types::*;

// ===== IMAGES =====

/// Image creation description
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDesc {
    pub extent: Extent2D,
    pub format: Format,
    pub usage: ImageUsage,
    pub samples: SampleCount,
    pub array_layers: u32,
    /// Allows cube views over 6 layers
    pub cube_compatible: bool,
    pub label: String,
}

/// View dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageViewType {
    D2,
    D2Array,
    Cube,
}

/// Image view creation description
#[derive(Debug, Clone, PartialEq)]
pub struct ImageViewDesc {
    pub image: ImageHandle,
    pub format: Format,
    pub view_type: ImageViewType,
    pub aspect: ImageAspect,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

/// Comparison function (depth test, shadow sampling)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Sampler creation description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_mode: AddressMode,
    /// Enables depth comparison (shadow samplers)
    pub compare: Option<CompareOp>,
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_mode: AddressMode::ClampToEdge,
            compare: None,
            max_anisotropy: None,
        }
    }
}

// ===== BUFFERS =====

/// Buffer creation description
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
    pub label: String,
}

/// Region of a buffer <-> image copy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub image_offset: (i32, i32),
    pub extent: Extent2D,
    pub aspect: ImageAspect,
    pub layer: u32,
}

// ===== DESCRIPTORS =====

/// Descriptor types used by engine layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    StorageImage,
    AccelerationStructure,
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Descriptor pool creation description
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorPoolDesc {
    pub max_sets: u32,
    pub pool_sizes: Vec<(DescriptorType, u32)>,
}

/// Resource written into a descriptor binding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorResource {
    Buffer { buffer: BufferHandle, offset: u64, range: u64 },
    Image { view: ImageViewHandle, sampler: SamplerHandle, layout: ImageLayout },
    StorageImage { view: ImageViewHandle },
}

/// One descriptor write
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

// ===== PIPELINES =====

/// Push constant range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// Pipeline layout creation description
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineLayoutDesc {
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Single shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    Compute,
    RayGen,
    Miss,
    ClosestHit,
    AnyHit,
}

impl ShaderStage {
    pub fn flags(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
            ShaderStage::RayGen => ShaderStageFlags::RAYGEN,
            ShaderStage::Miss => ShaderStageFlags::MISS,
            ShaderStage::ClosestHit => ShaderStageFlags::CLOSEST_HIT,
            ShaderStage::AnyHit => ShaderStageFlags::ANY_HIT,
        }
    }
}

/// Primitive assembly topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

/// Rasterizer state block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Constant and slope depth bias (shadow acne)
    pub depth_bias: Option<(f32, f32)>,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

/// Depth test state block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: CompareOp,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self { depth_test: true, depth_write: true, compare_op: CompareOp::Less }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    Max,
}

/// Color blend state for one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendState {
    Opaque,
    Blend { src: BlendFactor, dst: BlendFactor, op: BlendOp },
}

impl BlendState {
    pub const ALPHA: BlendState = BlendState::Blend {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::OneMinusSrcAlpha,
        op: BlendOp::Add,
    };
    pub const ADDITIVE: BlendState = BlendState::Blend {
        src: BlendFactor::One,
        dst: BlendFactor::One,
        op: BlendOp::Add,
    };
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float2,
    Float3,
    Float4,
    Uint,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 => 16,
            VertexFormat::Uint => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Interleaved single-binding vertex layout (empty for vertex-pulling shaders)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Tightly packed layout from consecutive attribute formats
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = VertexAttribute { location: location as u32, format, offset };
                offset += format.size();
                attribute
            })
            .collect();
        Self { stride: offset, attributes }
    }
}

/// Legacy render pass attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentDesc {
    pub format: Format,
    pub samples: SampleCount,
    pub load: LoadOp,
    pub store: StoreOp,
    pub final_layout: ImageLayout,
}

/// Single-subpass render pass description
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<AttachmentDesc>,
    pub depth_attachment: Option<AttachmentDesc>,
}

/// Where a graphics pipeline renders to
#[derive(Debug, Clone, PartialEq)]
pub enum RenderDescription {
    /// Render pass object created through `create_render_pass`
    RenderPass(RenderPassHandle),
    /// Dynamic rendering formats (+ multiview mask, 0 for single view)
    Dynamic {
        color_formats: Vec<Format>,
        depth_format: Format,
        view_mask: u32,
    },
}

impl RenderDescription {
    pub fn view_mask(&self) -> u32 {
        match self {
            RenderDescription::RenderPass(_) => 0,
            RenderDescription::Dynamic { view_mask, .. } => *view_mask,
        }
    }
}

/// Graphics pipeline creation description
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub stages: Vec<(ShaderStage, ShaderModuleHandle)>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    /// One entry per color attachment
    pub blend: Vec<BlendState>,
    pub samples: SampleCount,
    pub layout: PipelineLayoutHandle,
    pub render: RenderDescription,
}

/// Compute pipeline creation description
#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineDesc {
    pub module: ShaderModuleHandle,
    pub layout: PipelineLayoutHandle,
}

/// Ray tracing pipeline creation description
#[derive(Debug, Clone, PartialEq)]
pub struct RayTracingPipelineDesc {
    pub raygen: ShaderModuleHandle,
    pub miss: Vec<ShaderModuleHandle>,
    pub closest_hit: Vec<ShaderModuleHandle>,
    pub layout: PipelineLayoutHandle,
    pub max_recursion_depth: u32,
}

// ===== DYNAMIC RENDERING =====

/// One attachment of a dynamic rendering pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub view: ImageViewHandle,
    pub layout: ImageLayout,
    pub load: LoadOp,
    pub store: StoreOp,
    /// MSAA resolve destination
    pub resolve: Option<(ImageViewHandle, ImageLayout)>,
}

/// `begin_rendering` parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub render_area: Rect2D,
    pub layer_count: u32,
    /// Multiview mask (0b111111 renders all six cube faces at once)
    pub view_mask: u32,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
}

/// Command buffer begin flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferUsage {
    /// Recorded once per frame and resubmitted after a reset
    PerFrame,
    /// Submitted once and freed
    OneTimeSubmit,
}
