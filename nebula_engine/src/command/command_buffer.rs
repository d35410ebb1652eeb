/// Per-frame command buffers and single-use command buffers

use crate::device::{CommandBufferHandle, CommandBufferUsage, GraphicsDevice, QueueKind};
use crate::engine_error;
use crate::error::{Error, Result};

/// Wrap a begin/end failure into `Error::CommandRecording`
fn recording_error(stage: &str, error: Error) -> Error {
    match error {
        Error::CommandRecording(_) => error,
        other => {
            engine_error!("nebula::command", "Failed to {} command buffer: {}", stage, other);
            Error::CommandRecording(format!("{} failed: {}", stage, other))
        }
    }
}

/// Scoped begin -> f -> end on one handle
fn record_scoped<F>(
    device: &mut dyn GraphicsDevice,
    handle: CommandBufferHandle,
    usage: CommandBufferUsage,
    f: F,
) -> Result<()>
where
    F: FnOnce(&mut dyn GraphicsDevice, CommandBufferHandle) -> Result<()>,
{
    device
        .begin_command_buffer(handle, usage)
        .map_err(|e| recording_error("begin", e))?;
    f(&mut *device, handle)?;
    device
        .end_command_buffer(handle)
        .map_err(|e| recording_error("end", e))
}

/// One command buffer per frame slot plus a current-frame cursor
///
/// A slot must only be reset and re-recorded after the fences guarding its
/// previous submission were waited on.
#[derive(Debug)]
pub struct CommandBuffer {
    handles: Vec<CommandBufferHandle>,
    queue: QueueKind,
    current: usize,
}

impl CommandBuffer {
    /// Allocate one command buffer per frame slot on `queue`
    pub fn new(device: &mut dyn GraphicsDevice, queue: QueueKind) -> Result<Self> {
        let frames = device.max_frames_in_flight();
        let handles = device.allocate_command_buffers(queue, frames)?;
        if handles.len() != frames {
            return Err(Error::DeviceObjectCreation {
                object: "command buffer",
                reason: format!("allocated {} of {} command buffers", handles.len(), frames),
            });
        }
        Ok(Self { handles, queue, current: 0 })
    }

    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn set_current_frame(&mut self, frame: usize) -> Result<()> {
        if frame >= self.handles.len() {
            return Err(Error::InvalidResource(format!(
                "frame {} out of range for {} command buffers",
                frame,
                self.handles.len()
            )));
        }
        self.current = frame;
        Ok(())
    }

    /// Handle of the current slot (null once destroyed)
    pub fn handle(&self) -> CommandBufferHandle {
        self.handles.get(self.current).copied().unwrap_or_default()
    }

    /// Reset the current slot before re-recording
    pub fn reset(&self, device: &mut dyn GraphicsDevice) -> Result<()> {
        device.reset_command_buffer(self.handle())
    }

    /// Record the current slot: begin, run `f`, end
    pub fn record<F>(&self, device: &mut dyn GraphicsDevice, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn GraphicsDevice, CommandBufferHandle) -> Result<()>,
    {
        record_scoped(device, self.handle(), CommandBufferUsage::PerFrame, f)
    }

    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for handle in &mut self.handles {
            device.free_command_buffer(handle);
        }
        self.handles.clear();
        self.current = 0;
    }
}

/// Command buffer that submits, waits and frees itself on `record`
///
/// Used for one-off transitions and transfers outside the frame loop.
pub struct SingleUseCommandBuffer;

impl SingleUseCommandBuffer {
    pub fn record<F>(device: &mut dyn GraphicsDevice, queue: QueueKind, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn GraphicsDevice, CommandBufferHandle) -> Result<()>,
    {
        let mut handle = device
            .allocate_command_buffers(queue, 1)?
            .into_iter()
            .next()
            .ok_or(Error::DeviceObjectCreation {
                object: "command buffer",
                reason: "no single-use command buffer allocated".to_string(),
            })?;

        let result = record_scoped(device, handle, CommandBufferUsage::OneTimeSubmit, f)
            .and_then(|_| device.submit_immediate(queue, handle))
            .and_then(|_| device.queue_wait_idle(queue));

        device.free_command_buffer(&mut handle);
        result
    }
}

#[cfg(test)]
#[path = "command_buffer_tests.rs"]
mod tests;
