//! Error types for the Nebula engine
//!
//! Fatal initialization errors, recording/submission errors and programming
//! contract violations all share one enum. Out-of-date or suboptimal swapchain
//! results are not errors: they are returned as status values by the device
//! (see `AcquireResult` and `PresentStatus`).

use std::fmt;

/// Result type for Nebula engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nebula engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A native create call did not report success
    DeviceObjectCreation {
        /// Kind of object being created ("image", "fence", ...)
        object: &'static str,
        /// Backend-provided reason
        reason: String,
    },

    /// No physical device satisfies the required extensions, swapchain support and features
    NoSuitableDevice(String),

    /// A requested validation layer is not installed
    MissingValidationLayer(String),

    /// A shader binary could not be read or is not valid SPIR-V
    ShaderModuleLoad {
        /// Path of the shader binary
        path: String,
        /// Why the load failed
        reason: String,
    },

    /// Begin/end of a command buffer failed
    CommandRecording(String),

    /// Presentation failed with something other than out-of-date/suboptimal
    Presentation(String),

    /// A render request referenced a pipeline type that was never registered
    UnknownPipelineType(String),

    /// A registered pipeline was used through an interface it does not support
    PipelineTypeMismatch {
        /// Pipeline type tag
        pipeline: String,
        /// Capability that was requested
        expected: &'static str,
    },

    /// Frame orchestrator was driven through an illegal state transition
    InvalidFrameState(String),

    /// Backend-specific error (Vulkan submission failure, lost device, ...)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (unknown handle, out-of-range index, bad description)
    InvalidResource(String),

    /// Initialization failed (instance, surface, swapchain, subsystems)
    InitializationFailed(String),
}

impl Error {
    /// True for errors that can only happen during startup
    pub fn is_fatal_initialization(&self) -> bool {
        matches!(
            self,
            Error::DeviceObjectCreation { .. }
                | Error::NoSuitableDevice(_)
                | Error::MissingValidationLayer(_)
                | Error::ShaderModuleLoad { .. }
                | Error::InitializationFailed(_)
        )
    }

    /// True for programming errors in client code
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::UnknownPipelineType(_)
                | Error::PipelineTypeMismatch { .. }
                | Error::InvalidFrameState(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceObjectCreation { object, reason } => {
                write!(f, "Failed to create {}: {}", object, reason)
            }
            Error::NoSuitableDevice(msg) => write!(f, "No suitable GPU found: {}", msg),
            Error::MissingValidationLayer(layer) => {
                write!(f, "Validation layer requested but not available: {}", layer)
            }
            Error::ShaderModuleLoad { path, reason } => {
                write!(f, "Failed to load shader module '{}': {}", path, reason)
            }
            Error::CommandRecording(msg) => write!(f, "Command recording failed: {}", msg),
            Error::Presentation(msg) => write!(f, "Presentation failed: {}", msg),
            Error::UnknownPipelineType(tag) => write!(f, "Unknown pipeline type: {}", tag),
            Error::PipelineTypeMismatch { pipeline, expected } => {
                write!(f, "Pipeline '{}' does not support {}", pipeline, expected)
            }
            Error::InvalidFrameState(msg) => write!(f, "Invalid frame state: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
