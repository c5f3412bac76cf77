use parking_lot::Mutex;

use crate::error::CoreError;

/// Collaborator that enacts real-time priorities. The core only forwards
/// intent; the actual scheduling policy lives outside this crate.
pub trait RealtimeScheduler: Send + Sync {
    fn set_realtime_priority(&self, pid: u32, priority: u8) -> Result<(), CoreError>;
}

/// Accepts every priority request. Default collaborator.
#[derive(Debug, Default)]
pub struct NullScheduler;

impl RealtimeScheduler for NullScheduler {
    fn set_realtime_priority(&self, _pid: u32, _priority: u8) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Test double that records every forwarded request and can be told to
/// refuse them, for exercising registration rollback.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<(u32, u8)>>,
    refuse: bool,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    pub fn calls(&self) -> Vec<(u32, u8)> {
        self.calls.lock().clone()
    }
}

impl RealtimeScheduler for RecordingScheduler {
    fn set_realtime_priority(&self, pid: u32, priority: u8) -> Result<(), CoreError> {
        self.calls.lock().push((pid, priority));
        if self.refuse {
            return Err(CoreError::failed(format!(
                "scheduler refused realtime priority for pid {pid}"
            )));
        }
        Ok(())
    }
}
