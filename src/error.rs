use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Process,
    InputDevice,
    FrameBuffer,
    GpuDevice,
    Context,
    CommandBuffer,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Process => "process",
            ResourceKind::InputDevice => "input device",
            ResourceKind::FrameBuffer => "frame buffer",
            ResourceKind::GpuDevice => "gpu device",
            ResourceKind::Context => "context",
            ResourceKind::CommandBuffer => "command buffer",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("subsystem is not initialized")]
    NotInitialized,
    #[error("subsystem is already initialized")]
    AlreadyInitialized,
    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },
    #[error("{registry} table is full (capacity {capacity})")]
    CapacityExceeded {
        registry: &'static str,
        capacity: usize,
    },
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: u32 },
    #[error("out of memory ({requested} bytes requested)")]
    OutOfMemory { requested: usize },
    #[error("operation failed: {reason}")]
    OperationFailed { reason: String },
    #[error("{kind} {id} is busy")]
    ResourceBusy { kind: ResourceKind, id: u32 },
    #[error("{kind} {id} is already in use")]
    AlreadyInUse { kind: ResourceKind, id: u32 },
}

impl CoreError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        CoreError::OperationFailed {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, id: u32) -> Self {
        CoreError::NotFound { kind, id }
    }
}
