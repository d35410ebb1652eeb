/// Typed handles for every GPU object created through a `GraphicsDevice`
///
/// Handles are slotmap keys into the backend's object tables. The default
/// key is the null handle; destroy calls take `&mut Handle`, release the
/// object if it is still alive and leave the handle null, so destroying
/// twice is a no-op.

use slotmap::new_key_type;

new_key_type! {
    /// GPU image (owned, or a swapchain image registered by the backend)
    pub struct ImageHandle;
    /// View onto an image
    pub struct ImageViewHandle;
    /// Texture sampler
    pub struct SamplerHandle;
    /// GPU buffer with its memory allocation
    pub struct BufferHandle;
    /// Descriptor pool
    pub struct DescriptorPoolHandle;
    /// Descriptor set layout
    pub struct DescriptorSetLayoutHandle;
    /// Descriptor set allocated from a pool
    pub struct DescriptorSetHandle;
    /// Legacy render pass object
    pub struct RenderPassHandle;
    /// Pipeline layout
    pub struct PipelineLayoutHandle;
    /// Graphics, compute or ray-tracing pipeline
    pub struct PipelineHandle;
    /// Shader module
    pub struct ShaderModuleHandle;
    /// Command buffer allocated from a per-queue pool
    pub struct CommandBufferHandle;
}

/// Take the handle out of `slot`, leaving null behind
///
/// Returns `None` when the slot was already null, which is how destroy
/// entry points stay idempotent.
pub fn take_handle<K: slotmap::Key>(slot: &mut K) -> Option<K> {
    if slot.is_null() {
        None
    } else {
        Some(std::mem::take(slot))
    }
}
