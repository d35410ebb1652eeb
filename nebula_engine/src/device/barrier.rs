/// Image layout transitions as plain values
///
/// Transition helpers return an `ImageBarrier` (or a `BarrierBatch` of them)
/// instead of mutating barrier structs in place; the command layer applies
/// the batch with a single `cmd_pipeline_barrier` call.

use super::handles::ImageHandle;
use super::types::{AccessFlags, Format, ImageAspect, ImageLayout, PipelineStage};

/// One image memory barrier with its masks derived from the two layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub aspect: ImageAspect,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageBarrier {
    /// Transition all layers of `image` from `old_layout` to `new_layout`
    pub fn transition(
        image: ImageHandle,
        format: Format,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> Self {
        Self {
            image,
            aspect: format.aspect(),
            old_layout,
            new_layout,
            src_access: old_layout.src_access(),
            dst_access: new_layout.dst_access(),
            src_stage: old_layout.src_stage(),
            dst_stage: new_layout.dst_stage(),
            base_layer: 0,
            layer_count: 1,
        }
    }

    /// Restrict the barrier to `count` layers starting at `base`
    pub fn layers(mut self, base: u32, count: u32) -> Self {
        self.base_layer = base;
        self.layer_count = count;
        self
    }

    /// Override the destination stage (e.g. a depth map sampled by compute)
    pub fn dst_stage(mut self, stage: PipelineStage) -> Self {
        self.dst_stage = stage;
        self
    }

    pub fn is_noop(&self) -> bool {
        self.old_layout == self.new_layout
    }
}

/// A batch of image barriers submitted as one pipeline barrier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierBatch {
    barriers: Vec<ImageBarrier>,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a barrier; transitions whose layouts match are skipped and a
    /// second barrier for the same image and layers replaces the first
    pub fn with(mut self, barrier: ImageBarrier) -> Self {
        if barrier.is_noop() {
            return self;
        }
        if let Some(existing) = self.barriers.iter_mut().find(|b| {
            b.image == barrier.image
                && b.base_layer == barrier.base_layer
                && b.layer_count == barrier.layer_count
        }) {
            *existing = barrier;
        } else {
            self.barriers.push(barrier);
        }
        self
    }

    pub fn barriers(&self) -> &[ImageBarrier] {
        &self.barriers
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    /// Union of all source stages
    pub fn src_stage(&self) -> PipelineStage {
        self.barriers
            .iter()
            .fold(PipelineStage::empty(), |acc, b| acc | b.src_stage)
    }

    /// Union of all destination stages
    pub fn dst_stage(&self) -> PipelineStage {
        self.barriers
            .iter()
            .fold(PipelineStage::empty(), |acc, b| acc | b.dst_stage)
    }
}

impl From<ImageBarrier> for BarrierBatch {
    fn from(barrier: ImageBarrier) -> Self {
        BarrierBatch::new().with(barrier)
    }
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
