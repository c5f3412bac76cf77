use serde::Serialize;

use crate::error::{CoreError, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandBufferState {
    Writable,
    Submitted,
    Completed,
}

impl CommandBufferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandBufferState::Writable => "writable",
            CommandBufferState::Submitted => "submitted",
            CommandBufferState::Completed => "completed",
        }
    }
}

/// Append-only command storage. Writable until submitted, then read-only;
/// completion is terminal and happens exactly once. `used <= size` and
/// `read_offset <= used` hold at every return.
#[derive(Debug)]
pub struct CommandBuffer {
    pub buffer_id: u32,
    pub device_id: u32,
    size: usize,
    data: Vec<u8>,
    state: CommandBufferState,
    read_offset: usize,
}

impl CommandBuffer {
    pub fn new(buffer_id: u32, device_id: u32, size: usize) -> Self {
        Self {
            buffer_id,
            device_id,
            size,
            data: Vec::new(),
            state: CommandBufferState::Writable,
            read_offset: 0,
        }
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn used(&self) -> usize {
        self.data.len()
    }

    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    pub fn record(&mut self, bytes: &[u8]) -> Result<usize, CoreError> {
        if self.state != CommandBufferState::Writable {
            return Err(CoreError::ResourceBusy {
                kind: ResourceKind::CommandBuffer,
                id: self.buffer_id,
            });
        }
        if self.data.len() + bytes.len() > self.size {
            return Err(CoreError::CapacityExceeded {
                registry: "command buffer",
                capacity: self.size,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(self.data.len())
    }

    pub fn submit(&mut self) -> Result<(), CoreError> {
        if self.state != CommandBufferState::Writable {
            return Err(CoreError::ResourceBusy {
                kind: ResourceKind::CommandBuffer,
                id: self.buffer_id,
            });
        }
        self.state = CommandBufferState::Submitted;
        Ok(())
    }

    /// Called once by the execution collaborator when the hardware retires
    /// the buffer.
    pub fn complete(&mut self) -> Result<(), CoreError> {
        if self.state != CommandBufferState::Submitted {
            return Err(CoreError::failed(format!(
                "command buffer {} cannot complete from state {}",
                self.buffer_id,
                self.state.as_str()
            )));
        }
        self.state = CommandBufferState::Completed;
        Ok(())
    }

    /// Reads up to `len` bytes from the current read offset. Only legal
    /// once the buffer has been submitted.
    pub fn read(&mut self, len: usize) -> Result<&[u8], CoreError> {
        if self.state == CommandBufferState::Writable {
            return Err(CoreError::ResourceBusy {
                kind: ResourceKind::CommandBuffer,
                id: self.buffer_id,
            });
        }
        let available = self.data.len() - self.read_offset;
        let take = len.min(available);
        let start = self.read_offset;
        self.read_offset += take;
        Ok(&self.data[start..start + take])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_appends_until_capacity() {
        let mut buffer = CommandBuffer::new(1, 1, 8);
        assert_eq!(buffer.record(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(buffer.record(&[4, 5, 6, 7, 8]).unwrap(), 8);
        assert_eq!(
            buffer.record(&[9]),
            Err(CoreError::CapacityExceeded {
                registry: "command buffer",
                capacity: 8
            })
        );
        assert_eq!(buffer.used(), 8);
    }

    #[test]
    fn writes_after_submission_are_rejected() {
        let mut buffer = CommandBuffer::new(2, 1, 8);
        buffer.record(&[1, 2]).unwrap();
        buffer.submit().unwrap();

        assert_eq!(
            buffer.record(&[3]),
            Err(CoreError::ResourceBusy {
                kind: ResourceKind::CommandBuffer,
                id: 2
            })
        );
    }

    #[test]
    fn double_submit_is_busy_and_completion_is_terminal() {
        let mut buffer = CommandBuffer::new(3, 1, 8);
        buffer.submit().unwrap();
        assert!(matches!(
            buffer.submit(),
            Err(CoreError::ResourceBusy { .. })
        ));

        buffer.complete().unwrap();
        assert!(matches!(
            buffer.complete(),
            Err(CoreError::OperationFailed { .. })
        ));
    }

    #[test]
    fn completing_an_unsubmitted_buffer_fails() {
        let mut buffer = CommandBuffer::new(4, 1, 8);
        assert!(matches!(
            buffer.complete(),
            Err(CoreError::OperationFailed { .. })
        ));
    }

    #[test]
    fn reads_advance_within_used_bytes() {
        let mut buffer = CommandBuffer::new(5, 1, 16);
        buffer.record(&[10, 20, 30, 40]).unwrap();
        assert!(matches!(buffer.read(2), Err(CoreError::ResourceBusy { .. })));

        buffer.submit().unwrap();
        assert_eq!(buffer.read(2).unwrap(), &[10, 20]);
        assert_eq!(buffer.read(10).unwrap(), &[30, 40]);
        assert_eq!(buffer.read(1).unwrap(), &[] as &[u8]);
        assert_eq!(buffer.read_offset(), buffer.used());
    }
}
