/// Render module - frame orchestrator and the scene content it draws

pub mod camera;
pub mod render_info;
pub mod light;
pub mod render_object;
pub mod render_requests;
pub mod line_buffer;
pub mod frame_state;
pub mod gui;
pub mod window;
pub mod shadow_map;
pub mod renderer;

pub use camera::*;
pub use render_info::*;
pub use light::*;
pub use render_object::*;
pub use render_requests::*;
pub use line_buffer::*;
pub use frame_state::*;
pub use gui::*;
pub use window::*;
pub use shadow_map::*;
pub use renderer::*;
