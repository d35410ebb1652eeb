/// Immediate-mode GUI collaborator
///
/// The renderer does not build GUI content. It hands the GUI the offscreen
/// viewport texture, asks it to prepare its draw data once per frame and
/// to record that data at the end of the swapchain pass.

use crate::device::{CommandBufferHandle, GraphicsDevice, ImageViewHandle, SamplerHandle};
use crate::error::Result;

/// Texture registered with the GUI backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuiTextureId(pub u64);

pub trait GuiRenderer {
    /// Make a sampled image available to GUI widgets
    fn register_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        view: ImageViewHandle,
        sampler: SamplerHandle,
    ) -> Result<GuiTextureId>;

    fn unregister_texture(&mut self, device: &mut dyn GraphicsDevice, texture: GuiTextureId);

    /// Texture the viewport pane shows this frame (`None` hides the scene)
    fn set_viewport_texture(&mut self, texture: Option<GuiTextureId>);

    /// Build this frame's draw data
    fn prepare_draw_data(&mut self) -> Result<()>;

    /// Record the prepared draw data into an active swapchain pass
    fn render_draw_data(&mut self, device: &mut dyn GraphicsDevice, command_buffer: CommandBufferHandle) -> Result<()>;

    fn destroy(&mut self, _device: &mut dyn GraphicsDevice) {}
}
