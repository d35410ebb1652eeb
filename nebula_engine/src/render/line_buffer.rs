/// Host-visible vertex buffers for debug lines, one per frame slot

use crate::device::*;
use crate::engine_warn;
use crate::error::{Error, Result};
use crate::render::render_info::LineBatch;
use crate::render::render_requests::{Line, LineVertex};

#[derive(Debug)]
pub struct LineBuffer {
    buffers: Vec<BufferHandle>,
    /// Lines per buffer
    capacity: usize,
}

impl LineBuffer {
    pub fn new(device: &mut dyn GraphicsDevice, capacity: usize) -> Result<Self> {
        let mut line_buffer = Self { buffers: Vec::new(), capacity };
        let size = (capacity.max(1) * 2 * std::mem::size_of::<LineVertex>()) as u64;
        for frame in 0..device.max_frames_in_flight() {
            let created = device.create_buffer(&BufferDesc {
                size,
                usage: BufferUsage::VERTEX,
                location: MemoryLocation::CpuToGpu,
                label: format!("line vertices #{}", frame),
            });
            match created {
                Ok(buffer) => line_buffer.buffers.push(buffer),
                Err(e) => {
                    line_buffer.destroy(device);
                    return Err(e);
                }
            }
        }
        Ok(line_buffer)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upload `lines` into the buffer of frame slot `frame`
    ///
    /// Lines beyond the capacity are dropped. Returns `None` when there is
    /// nothing to draw.
    pub fn write(&self, device: &mut dyn GraphicsDevice, frame: usize, lines: &[Line]) -> Result<Option<LineBatch>> {
        if lines.is_empty() {
            return Ok(None);
        }
        let buffer = self
            .buffers
            .get(frame)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("no line buffer for frame {}", frame)))?;
        if lines.len() > self.capacity {
            engine_warn!(
                "nebula::LineBuffer",
                "{} lines requested, drawing the first {}",
                lines.len(),
                self.capacity
            );
        }
        let vertices: Vec<LineVertex> = lines
            .iter()
            .take(self.capacity)
            .flat_map(LineVertex::pair)
            .collect();
        write_buffer_slice(device, buffer, &vertices)?;
        Ok(Some(LineBatch { buffer, vertex_count: vertices.len() as u32 }))
    }

    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for buffer in &mut self.buffers {
            device.destroy_buffer(buffer);
        }
        self.buffers.clear();
    }
}

#[cfg(test)]
#[path = "line_buffer_tests.rs"]
mod tests;
