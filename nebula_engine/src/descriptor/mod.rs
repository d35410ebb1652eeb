/// Descriptor module - per-frame descriptor sets

pub mod descriptor_set;

pub use descriptor_set::*;
