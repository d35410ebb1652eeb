/// Per-slot frame state machine
///
/// Each frame slot cycles Idle -> Acquired -> ShadowRecorded ->
/// OffscreenSubmitted -> SwapchainSubmitted -> Presented -> Idle. A stage
/// that has nothing to do this frame (no shadow casters, hidden offscreen
/// viewport) still advances the state. Any other transition is an
/// `InvalidFrameState` error.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Acquired,
    ShadowRecorded,
    OffscreenSubmitted,
    SwapchainSubmitted,
    Presented,
}

impl FrameState {
    /// The only state this one may advance to
    pub fn next(self) -> FrameState {
        match self {
            FrameState::Idle => FrameState::Acquired,
            FrameState::Acquired => FrameState::ShadowRecorded,
            FrameState::ShadowRecorded => FrameState::OffscreenSubmitted,
            FrameState::OffscreenSubmitted => FrameState::SwapchainSubmitted,
            FrameState::SwapchainSubmitted => FrameState::Presented,
            FrameState::Presented => FrameState::Idle,
        }
    }
}

/// One `FrameState` per frame slot
#[derive(Debug, Clone)]
pub struct FrameStates {
    states: Vec<FrameState>,
}

impl FrameStates {
    pub fn new(frames: usize) -> Self {
        Self { states: vec![FrameState::Idle; frames] }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<FrameState> {
        self.states.get(slot).copied()
    }

    /// Move slot `slot` to `to`, which must be its successor state
    pub fn advance(&mut self, slot: usize, to: FrameState) -> Result<()> {
        let state = self
            .states
            .get_mut(slot)
            .ok_or_else(|| Error::InvalidFrameState(format!("frame slot {} out of range", slot)))?;
        if state.next() != to {
            return Err(Error::InvalidFrameState(format!(
                "slot {}: {:?} -> {:?} is not allowed",
                slot, state, to
            )));
        }
        *state = to;
        Ok(())
    }
}

#[cfg(test)]
#[path = "frame_state_tests.rs"]
mod tests;
