/// Declarative pipeline creation options
///
/// Options are plain values: a pipeline is built from them once and is
/// immutable afterwards. Reconfiguring means building a new pipeline.

use crate::device::*;
use crate::pipeline::pipeline::RenderLayer;
use crate::pipeline::shader::ShaderSource;

/// Graphics pipeline options
///
/// `set_layouts` lists descriptor sets declared by the caller. Pipelines
/// that own per-pass or per-object sets place them first and the caller's
/// sets after them.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineOptions {
    pub label: String,
    pub shaders: Vec<(ShaderStage, ShaderSource)>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    /// One entry per color attachment of `render`
    pub blend: Vec<BlendState>,
    pub samples: SampleCount,
    pub set_layouts: Vec<Vec<DescriptorBinding>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    pub render: RenderDescription,
    pub layer: RenderLayer,
}

impl GraphicsPipelineOptions {
    /// Opaque triangle pipeline with default state for `render`
    pub fn new(label: impl Into<String>, render: RenderDescription) -> Self {
        let blend = match &render {
            RenderDescription::Dynamic { color_formats, .. } => vec![BlendState::Opaque; color_formats.len()],
            RenderDescription::RenderPass(_) => vec![BlendState::Opaque],
        };
        Self {
            label: label.into(),
            shaders: Vec::new(),
            vertex_layout: VertexLayout::default(),
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState::default(),
            depth_stencil: DepthStencilState::default(),
            blend,
            samples: SampleCount::S1,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            render,
            layer: RenderLayer::Scene,
        }
    }

    pub fn with_shader(mut self, stage: ShaderStage, source: ShaderSource) -> Self {
        self.shaders.push((stage, source));
        self
    }

    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_rasterization(mut self, rasterization: RasterizationState) -> Self {
        self.rasterization = rasterization;
        self
    }

    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }

    pub fn with_blend(mut self, blend: BlendState) -> Self {
        for state in &mut self.blend {
            *state = blend;
        }
        self
    }

    pub fn with_samples(mut self, samples: SampleCount) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_set_layout(mut self, bindings: Vec<DescriptorBinding>) -> Self {
        self.set_layouts.push(bindings);
        self
    }

    pub fn with_push_constants(mut self, stages: ShaderStageFlags, size: u32) -> Self {
        let offset = self.push_constant_ranges.iter().map(|r| r.offset + r.size).max().unwrap_or(0);
        self.push_constant_ranges.push(PushConstantRange { stages, offset, size });
        self
    }

    pub fn with_layer(mut self, layer: RenderLayer) -> Self {
        self.layer = layer;
        self
    }
}

/// Compute pipeline options
#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineOptions {
    pub label: String,
    pub shader: ShaderSource,
    pub set_layouts: Vec<Vec<DescriptorBinding>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// Workgroup counts passed to dispatch
    pub workgroups: [u32; 3],
}

impl ComputePipelineOptions {
    pub fn new(label: impl Into<String>, shader: ShaderSource, workgroups: [u32; 3]) -> Self {
        Self {
            label: label.into(),
            shader,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            workgroups,
        }
    }

    pub fn with_set_layout(mut self, bindings: Vec<DescriptorBinding>) -> Self {
        self.set_layouts.push(bindings);
        self
    }
}

/// Ray tracing pipeline options
///
/// The pipeline writes into its own storage image of `output_format` at
/// `output_extent`; set 0 binding 0 is that image.
#[derive(Debug, Clone, PartialEq)]
pub struct RayTracingPipelineOptions {
    pub label: String,
    pub raygen: ShaderSource,
    pub miss: Vec<ShaderSource>,
    pub closest_hit: Vec<ShaderSource>,
    pub set_layouts: Vec<Vec<DescriptorBinding>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    pub max_recursion_depth: u32,
    pub output_extent: Extent2D,
    pub output_format: Format,
}
