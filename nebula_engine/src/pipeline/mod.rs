/// Pipeline module - capability trait, built-in pipelines and registry

pub mod shader;
pub mod options;
pub mod pipeline;
pub mod graphics_pipeline;
pub mod compute_pipeline;
pub mod ray_tracing_pipeline;
pub mod shadow_pipeline;
pub mod mouse_picking_pipeline;
pub mod line_pipeline;
pub mod pipeline_manager;

pub use shader::*;
pub use options::*;
pub use pipeline::*;
pub use graphics_pipeline::*;
pub use compute_pipeline::*;
pub use ray_tracing_pipeline::*;
pub use shadow_pipeline::*;
pub use mouse_picking_pipeline::*;
pub use line_pipeline::*;
pub use pipeline_manager::*;

#[cfg(test)]
#[path = "pipeline_kinds_tests.rs"]
mod pipeline_kinds_tests;
