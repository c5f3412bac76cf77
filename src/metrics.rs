use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::{CoreEvent, EventKind};

/// Counters aggregated from a drained event log. The event stream is the
/// source of truth; metrics are derived, never tracked separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreMetrics {
    pub processes_registered: usize,
    pub processes_unregistered: usize,
    pub devices_registered: usize,
    pub devices_unregistered: usize,
    pub precision_updates: usize,
    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub pixels_rendered: u64,
    pub vram_bytes_held: i64,
    pub command_submissions: usize,
    pub physics_calculations: BTreeMap<String, usize>,
    pub rejected_operations: usize,
}

impl CoreMetrics {
    pub fn from_events(events: &[CoreEvent]) -> Self {
        let mut metrics = Self::default();
        for event in events {
            match &event.kind {
                EventKind::ProcessRegistered => metrics.processes_registered += 1,
                EventKind::ProcessUnregistered => metrics.processes_unregistered += 1,
                EventKind::DeviceRegistered => metrics.devices_registered += 1,
                EventKind::DeviceUnregistered => metrics.devices_unregistered += 1,
                EventKind::PrecisionUpdated => metrics.precision_updates += 1,
                EventKind::BufferCreated => metrics.buffers_created += 1,
                EventKind::BufferDestroyed => metrics.buffers_destroyed += 1,
                EventKind::PixelsRendered => {
                    metrics.pixels_rendered += event
                        .detail
                        .get("written")
                        .and_then(|v| v.as_u64())
                        .unwrap_or_default();
                }
                EventKind::VramAllocated => {
                    metrics.vram_bytes_held += event
                        .detail
                        .get("size")
                        .and_then(|v| v.as_i64())
                        .unwrap_or_default();
                }
                EventKind::VramFreed => {
                    metrics.vram_bytes_held -= event
                        .detail
                        .get("size")
                        .and_then(|v| v.as_i64())
                        .unwrap_or_default();
                }
                EventKind::CommandSubmitted => metrics.command_submissions += 1,
                EventKind::PhysicsCalculated => {
                    if let Some(kind) = event.detail.get("calculation").and_then(|v| v.as_str()) {
                        *metrics
                            .physics_calculations
                            .entry(kind.to_owned())
                            .or_default() += 1;
                    }
                }
                EventKind::OperationRejected => metrics.rejected_operations += 1,
                _ => {}
            }
        }
        metrics
    }

    pub fn render_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Metrics: processes={}/{} devices={}/{} buffers={}/{}",
            self.processes_registered,
            self.processes_unregistered,
            self.devices_registered,
            self.devices_unregistered,
            self.buffers_created,
            self.buffers_destroyed,
        ));
        lines.push(format!(
            "  precision_updates={} pixels_rendered={} command_submissions={}",
            self.precision_updates, self.pixels_rendered, self.command_submissions
        ));
        lines.push(format!("  vram_bytes_held={}", self.vram_bytes_held));

        if !self.physics_calculations.is_empty() {
            lines.push("  physics:".to_string());
            for (kind, count) in &self.physics_calculations {
                lines.push(format!("    {kind}: {count}"));
            }
        }
        if self.rejected_operations > 0 {
            lines.push(format!("  rejected_operations={}", self.rejected_operations));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aggregates_counts_from_events() {
        let events = vec![
            CoreEvent {
                subject: 7,
                kind: EventKind::ProcessRegistered,
                detail: json!({"priority": 10}),
                timestamp: 1,
            },
            CoreEvent {
                subject: 1,
                kind: EventKind::VramAllocated,
                detail: json!({"address": 4096, "size": 512}),
                timestamp: 2,
            },
            CoreEvent {
                subject: 1,
                kind: EventKind::VramFreed,
                detail: json!({"address": 4096, "size": 512}),
                timestamp: 3,
            },
            CoreEvent {
                subject: 7,
                kind: EventKind::PhysicsCalculated,
                detail: json!({"calculation": "collision", "result": "4.75"}),
                timestamp: 4,
            },
            CoreEvent {
                subject: 7,
                kind: EventKind::PhysicsCalculated,
                detail: json!({"calculation": "collision", "result": "0"}),
                timestamp: 5,
            },
            CoreEvent {
                subject: 9,
                kind: EventKind::OperationRejected,
                detail: json!({"error": "process 9 not found"}),
                timestamp: 6,
            },
        ];

        let metrics = CoreMetrics::from_events(&events);
        assert_eq!(metrics.processes_registered, 1);
        assert_eq!(metrics.vram_bytes_held, 0);
        assert_eq!(metrics.physics_calculations.get("collision"), Some(&2));
        assert_eq!(metrics.rejected_operations, 1);

        let report = metrics.render_report();
        assert!(report.contains("collision: 2"));
        assert!(report.contains("rejected_operations=1"));
    }
}
