/// Per-frame submission topology
///
/// Every submission kind waits on and signals a fixed set of per-frame
/// semaphores and signals one fence. The table is data so both the backend
/// and the tests read the same wiring.

use super::types::{PipelineStage, QueueKind};

/// Per-frame semaphores owned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreRole {
    /// Signalled by image acquisition
    ImageAvailable,
    /// Signalled by the swapchain pass
    RenderFinished,
    /// Signalled by the offscreen pass
    OffscreenRenderFinished,
    /// Signalled by the compute dispatch, consumed by the offscreen pass
    ComputeFinished,
}

/// Per-frame fences owned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenceRole {
    Graphics,
    OffscreenGraphics,
    Compute,
    MousePicking,
}

/// Queue submissions issued by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitKind {
    Graphics,
    OffscreenGraphics,
    Compute,
    MousePicking,
}

/// Wait/signal wiring of one submission kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitTopology {
    pub queue: QueueKind,
    pub wait: Option<(SemaphoreRole, PipelineStage)>,
    pub signal: Option<SemaphoreRole>,
    pub fence: FenceRole,
}

impl SubmitKind {
    pub fn topology(self) -> SubmitTopology {
        match self {
            SubmitKind::Compute => SubmitTopology {
                queue: QueueKind::Compute,
                wait: None,
                signal: Some(SemaphoreRole::ComputeFinished),
                fence: FenceRole::Compute,
            },
            SubmitKind::OffscreenGraphics => SubmitTopology {
                queue: QueueKind::Graphics,
                wait: Some((SemaphoreRole::ComputeFinished, PipelineStage::VERTEX_INPUT)),
                signal: Some(SemaphoreRole::OffscreenRenderFinished),
                fence: FenceRole::OffscreenGraphics,
            },
            SubmitKind::Graphics => SubmitTopology {
                queue: QueueKind::Graphics,
                wait: Some((SemaphoreRole::ImageAvailable, PipelineStage::COLOR_ATTACHMENT_OUTPUT)),
                signal: Some(SemaphoreRole::RenderFinished),
                fence: FenceRole::Graphics,
            },
            SubmitKind::MousePicking => SubmitTopology {
                queue: QueueKind::Graphics,
                wait: None,
                signal: None,
                fence: FenceRole::MousePicking,
            },
        }
    }
}

/// Semaphores present waits on for a frame
///
/// The offscreen semaphore is only waited on when the offscreen pass was
/// submitted, since a skipped pass never signals it.
pub fn present_wait_semaphores(offscreen_submitted: bool) -> Vec<SemaphoreRole> {
    let mut waits = vec![SemaphoreRole::RenderFinished];
    if offscreen_submitted {
        waits.push(SemaphoreRole::OffscreenRenderFinished);
    }
    waits
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
