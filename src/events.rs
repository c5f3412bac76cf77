use std::collections::VecDeque;

use serde::Serialize;
use serde_json::json;

use crate::clock::DeterministicClock;

/// One structured record in the core's lifecycle log. Events are the
/// crate's observability surface: every state change publishes exactly one,
/// stamped by the deterministic clock, and callers drain them to JSONL.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoreEvent {
    pub subject: u32,
    pub kind: EventKind,
    pub detail: serde_json::Value,
    pub timestamp: u64,
}

impl CoreEvent {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "subject": self.subject,
            "timestamp": self.timestamp,
            "kind": self.kind.as_str(),
            "detail": self.detail,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum EventKind {
    Initialized,
    ShutdownCompleted,
    ProcessRegistered,
    ProcessUnregistered,
    PriorityUpdated,
    DeviceRegistered,
    DeviceUnregistered,
    PrecisionUpdated,
    BufferCreated,
    BufferDestroyed,
    PixelsRendered,
    GpuProbed,
    GpuRemoved,
    PowerChanged,
    GpuFault,
    VramAllocated,
    VramFreed,
    ContextCreated,
    ContextBound,
    ContextUnbound,
    ContextDestroyed,
    ViewportUpdated,
    CommandBufferCreated,
    CommandRecorded,
    CommandSubmitted,
    CommandCompleted,
    PhysicsCalculated,
    OperationRejected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Initialized => "initialized",
            EventKind::ShutdownCompleted => "shutdown_completed",
            EventKind::ProcessRegistered => "process_registered",
            EventKind::ProcessUnregistered => "process_unregistered",
            EventKind::PriorityUpdated => "priority_updated",
            EventKind::DeviceRegistered => "device_registered",
            EventKind::DeviceUnregistered => "device_unregistered",
            EventKind::PrecisionUpdated => "precision_updated",
            EventKind::BufferCreated => "buffer_created",
            EventKind::BufferDestroyed => "buffer_destroyed",
            EventKind::PixelsRendered => "pixels_rendered",
            EventKind::GpuProbed => "gpu_probed",
            EventKind::GpuRemoved => "gpu_removed",
            EventKind::PowerChanged => "power_changed",
            EventKind::GpuFault => "gpu_fault",
            EventKind::VramAllocated => "vram_allocated",
            EventKind::VramFreed => "vram_freed",
            EventKind::ContextCreated => "context_created",
            EventKind::ContextBound => "context_bound",
            EventKind::ContextUnbound => "context_unbound",
            EventKind::ContextDestroyed => "context_destroyed",
            EventKind::ViewportUpdated => "viewport_updated",
            EventKind::CommandBufferCreated => "command_buffer_created",
            EventKind::CommandRecorded => "command_recorded",
            EventKind::CommandSubmitted => "command_submitted",
            EventKind::CommandCompleted => "command_completed",
            EventKind::PhysicsCalculated => "physics_calculated",
            EventKind::OperationRejected => "operation_rejected",
        }
    }
}

#[derive(Debug, Default)]
pub struct EventLog {
    queue: VecDeque<CoreEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, clock: &mut DeterministicClock, event: EventBuilder) {
        let timestamp = clock.tick();
        self.queue.push_back(event.into_event(timestamp));
    }

    pub fn drain(&mut self) -> Vec<CoreEvent> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct EventBuilder {
    subject: u32,
    kind: EventKind,
    detail: serde_json::Value,
}

impl EventBuilder {
    pub fn new(subject: u32, kind: EventKind) -> Self {
        Self {
            subject,
            kind,
            detail: serde_json::Value::Null,
        }
    }

    pub fn detail(mut self, value: impl Serialize) -> Self {
        self.detail = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self
    }

    fn into_event(self, timestamp: u64) -> CoreEvent {
        CoreEvent {
            subject: self.subject,
            kind: self.kind,
            detail: self.detail,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_events_carry_monotonic_timestamps() {
        let mut log = EventLog::new();
        let mut clock = DeterministicClock::new();

        log.publish(
            &mut clock,
            EventBuilder::new(7, EventKind::ProcessRegistered).detail(json!({"priority": 10})),
        );
        log.publish(&mut clock, EventBuilder::new(7, EventKind::ProcessUnregistered));

        let events = log.drain();
        assert_eq!(events.len(), 2);
        assert!(events[1].timestamp > events[0].timestamp);
        assert!(log.is_empty());
    }

    #[test]
    fn events_render_to_structured_json() {
        let event = CoreEvent {
            subject: 3,
            kind: EventKind::VramAllocated,
            detail: json!({"address": 4096, "size": 256}),
            timestamp: 12,
        };

        let rendered = event.to_json();
        assert_eq!(rendered["subject"], 3);
        assert_eq!(rendered["timestamp"], 12);
        assert_eq!(rendered["kind"], "vram_allocated");
        assert_eq!(rendered["detail"]["size"], 256);
    }
}
