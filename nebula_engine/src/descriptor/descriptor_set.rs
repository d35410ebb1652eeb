/// Per-frame descriptor sets
///
/// One set per frame slot, allocated from a pool sized for exactly those
/// sets. Updates are declarative: the caller describes the writes for a
/// frame slot and `update` re-applies them whenever bound resources change.

use rustc_hash::FxHashMap;

use crate::device::*;
use crate::error::{Error, Result};

/// Layout + N descriptor sets (one per frame slot)
#[derive(Debug)]
pub struct DescriptorSet {
    layout: DescriptorSetLayoutHandle,
    owns_layout: bool,
    pool: DescriptorPoolHandle,
    sets: Vec<DescriptorSetHandle>,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSet {
    /// Create a layout from `bindings` and one set per frame slot
    pub fn new(device: &mut dyn GraphicsDevice, bindings: &[DescriptorBinding]) -> Result<Self> {
        let layout = device.create_descriptor_set_layout(bindings)?;
        let mut set = Self::allocate(device, layout, bindings);
        if let Ok(set) = &mut set {
            set.owns_layout = true;
        } else {
            let mut layout = layout;
            device.destroy_descriptor_set_layout(&mut layout);
        }
        set
    }

    /// Allocate sets for a layout owned elsewhere (a pipeline's set layout)
    pub fn with_layout(
        device: &mut dyn GraphicsDevice,
        layout: DescriptorSetLayoutHandle,
        bindings: &[DescriptorBinding],
    ) -> Result<Self> {
        Self::allocate(device, layout, bindings)
    }

    fn allocate(
        device: &mut dyn GraphicsDevice,
        layout: DescriptorSetLayoutHandle,
        bindings: &[DescriptorBinding],
    ) -> Result<Self> {
        let frames = device.max_frames_in_flight();
        let mut pool = device.create_descriptor_pool(&pool_desc(bindings, frames))?;
        let sets = match device.allocate_descriptor_sets(pool, layout, frames) {
            Ok(sets) => sets,
            Err(e) => {
                device.destroy_descriptor_pool(&mut pool);
                return Err(e);
            }
        };
        Ok(Self {
            layout,
            owns_layout: false,
            pool,
            sets,
            bindings: bindings.to_vec(),
        })
    }

    pub fn layout(&self) -> DescriptorSetLayoutHandle {
        self.layout
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Set of frame slot `frame`
    pub fn set(&self, frame: usize) -> Result<DescriptorSetHandle> {
        self.sets
            .get(frame)
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("no descriptor set for frame {}", frame)))
    }

    /// Apply `writes` to the set of frame slot `frame`
    pub fn update_frame(
        &self,
        device: &mut dyn GraphicsDevice,
        frame: usize,
        writes: &[DescriptorWrite],
    ) -> Result<()> {
        for write in writes {
            let binding = self
                .bindings
                .iter()
                .find(|b| b.binding == write.binding)
                .ok_or_else(|| Error::InvalidResource(format!("descriptor binding {} not in layout", write.binding)))?;
            if !accepts(binding.descriptor_type, &write.resource) {
                return Err(Error::InvalidResource(format!(
                    "binding {} is {:?}, cannot hold {:?}",
                    write.binding, binding.descriptor_type, write.resource
                )));
            }
        }
        device.update_descriptor_set(self.set(frame)?, writes)
    }

    /// Re-run the declarative update for every frame slot
    pub fn update<F>(&self, device: &mut dyn GraphicsDevice, writes_for_frame: F) -> Result<()>
    where
        F: Fn(usize) -> Vec<DescriptorWrite>,
    {
        for frame in 0..self.sets.len() {
            self.update_frame(device, frame, &writes_for_frame(frame))?;
        }
        Ok(())
    }

    /// Release the pool (and its sets), then the layout if owned
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        device.destroy_descriptor_pool(&mut self.pool);
        self.sets.clear();
        if self.owns_layout {
            device.destroy_descriptor_set_layout(&mut self.layout);
        }
    }
}

/// Pool sized for `frames` sets of `bindings`
pub fn pool_desc(bindings: &[DescriptorBinding], frames: usize) -> DescriptorPoolDesc {
    let mut counts: FxHashMap<DescriptorType, u32> = FxHashMap::default();
    for binding in bindings {
        *counts.entry(binding.descriptor_type).or_insert(0) += binding.count.max(1) * frames as u32;
    }
    let mut pool_sizes: Vec<_> = counts.into_iter().collect();
    pool_sizes.sort_by_key(|(ty, _)| *ty as u32);
    DescriptorPoolDesc { max_sets: frames as u32, pool_sizes }
}

fn accepts(descriptor_type: DescriptorType, resource: &DescriptorResource) -> bool {
    matches!(
        (descriptor_type, resource),
        (DescriptorType::UniformBuffer | DescriptorType::StorageBuffer, DescriptorResource::Buffer { .. })
            | (DescriptorType::CombinedImageSampler, DescriptorResource::Image { .. })
            | (DescriptorType::StorageImage, DescriptorResource::StorageImage { .. })
    )
}

#[cfg(test)]
#[path = "descriptor_set_tests.rs"]
mod tests;
