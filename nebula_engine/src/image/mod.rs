/// Image module - role-tagged images and per-slot render targets

pub mod image_resource;
pub mod render_target;

pub use image_resource::*;
pub use render_target::*;
