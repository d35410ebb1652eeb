/// Device module - the logical device contract and the value types it speaks

// Module declarations
pub mod types;
pub mod handles;
pub mod desc;
pub mod barrier;
pub mod sync;
pub mod graphics_device;

// Re-exports
pub use types::*;
pub use handles::*;
pub use desc::*;
pub use barrier::*;
pub use sync::*;
pub use graphics_device::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_device;
