/// Per-frame semaphores and fences
///
/// Every frame slot owns one semaphore per `SemaphoreRole` and one fence per
/// `FenceRole`. Fences start signalled so the first wait of each slot
/// returns immediately.

use ash::vk;
use nebula_engine::nebula::device::{FenceRole, SemaphoreRole};
use nebula_engine::nebula::{Error, Result};
use nebula_engine::engine_error;

const SOURCE: &str = "nebula::vulkan::Sync";

const SEMAPHORE_ROLES: usize = 4;
const FENCE_ROLES: usize = 4;

pub(crate) fn semaphore_index(role: SemaphoreRole) -> usize {
    match role {
        SemaphoreRole::ImageAvailable => 0,
        SemaphoreRole::RenderFinished => 1,
        SemaphoreRole::OffscreenRenderFinished => 2,
        SemaphoreRole::ComputeFinished => 3,
    }
}

pub(crate) fn fence_index(role: FenceRole) -> usize {
    match role {
        FenceRole::Graphics => 0,
        FenceRole::OffscreenGraphics => 1,
        FenceRole::Compute => 2,
        FenceRole::MousePicking => 3,
    }
}

struct FrameObjects {
    semaphores: [vk::Semaphore; SEMAPHORE_ROLES],
    fences: [vk::Fence; FENCE_ROLES],
}

pub(crate) struct FrameSync {
    frames: Vec<FrameObjects>,
}

impl FrameSync {
    pub(crate) fn new(device: &ash::Device, frame_count: usize) -> Result<Self> {
        let mut sync = Self { frames: Vec::with_capacity(frame_count) };
        for _ in 0..frame_count {
            match Self::create_frame(device) {
                Ok(frame) => sync.frames.push(frame),
                Err(e) => {
                    unsafe { sync.destroy(device) };
                    return Err(e);
                }
            }
        }
        Ok(sync)
    }

    fn create_frame(device: &ash::Device) -> Result<FrameObjects> {
        let mut frame = FrameObjects {
            semaphores: [vk::Semaphore::null(); SEMAPHORE_ROLES],
            fences: [vk::Fence::null(); FENCE_ROLES],
        };
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let created = (|| -> std::result::Result<(), vk::Result> {
            for semaphore in frame.semaphores.iter_mut() {
                *semaphore = unsafe { device.create_semaphore(&semaphore_info, None) }?;
            }
            for fence in frame.fences.iter_mut() {
                *fence = unsafe { device.create_fence(&fence_info, None) }?;
            }
            Ok(())
        })();
        if let Err(e) = created {
            unsafe { destroy_frame(device, &frame) };
            engine_error!(SOURCE, "Failed to create frame sync objects: {:?}", e);
            return Err(Error::DeviceObjectCreation { object: "semaphore/fence", reason: format!("{:?}", e) });
        }
        Ok(frame)
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, frame: usize) -> Result<&FrameObjects> {
        self.frames.get(frame).ok_or_else(|| {
            Error::InvalidResource(format!("frame index {} out of range ({} frames)", frame, self.frames.len()))
        })
    }

    pub(crate) fn semaphore(&self, frame: usize, role: SemaphoreRole) -> Result<vk::Semaphore> {
        Ok(self.frame(frame)?.semaphores[semaphore_index(role)])
    }

    pub(crate) fn fence(&self, frame: usize, role: FenceRole) -> Result<vk::Fence> {
        Ok(self.frame(frame)?.fences[fence_index(role)])
    }

    /// # Safety
    /// No submission may still reference these objects.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        for frame in self.frames.drain(..) {
            destroy_frame(device, &frame);
        }
    }
}

unsafe fn destroy_frame(device: &ash::Device, frame: &FrameObjects) {
    for &semaphore in &frame.semaphores {
        if semaphore != vk::Semaphore::null() {
            device.destroy_semaphore(semaphore, None);
        }
    }
    for &fence in &frame.fences {
        if fence != vk::Fence::null() {
            device.destroy_fence(fence, None);
        }
    }
}
