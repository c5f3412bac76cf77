use serde::Serialize;

/// Capability bits advertised through [`SubsystemStatus::capabilities`].
pub const CAP_EXACT_PHYSICS: u32 = 1 << 0;
pub const CAP_EXACT_RENDERING: u32 = 1 << 1;
pub const CAP_LOW_LATENCY_INPUT: u32 = 1 << 2;
pub const CAP_REALTIME_SCHEDULING: u32 = 1 << 3;
pub const CAP_VRAM_MANAGEMENT: u32 = 1 << 4;

pub const ALL_CAPABILITIES: u32 = CAP_EXACT_PHYSICS
    | CAP_EXACT_RENDERING
    | CAP_LOW_LATENCY_INPUT
    | CAP_REALTIME_SCHEDULING
    | CAP_VRAM_MANAGEMENT;

/// Read-only snapshot of the core. All fields are captured under a single
/// registry lock acquisition so the snapshot is never torn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemStatus {
    pub initialized: bool,
    pub version: &'static str,
    pub capabilities: u32,
    pub active_process_count: usize,
    pub registered_device_count: usize,
    pub active_buffer_count: usize,
    pub anticheat_enabled: bool,
    pub vr_enabled: bool,
    pub network_gaming_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_bits_are_distinct() {
        let bits = [
            CAP_EXACT_PHYSICS,
            CAP_EXACT_RENDERING,
            CAP_LOW_LATENCY_INPUT,
            CAP_REALTIME_SCHEDULING,
            CAP_VRAM_MANAGEMENT,
        ];
        let mut combined = 0u32;
        for bit in bits {
            assert_eq!(combined & bit, 0);
            combined |= bit;
        }
        assert_eq!(combined, ALL_CAPABILITIES);
    }
}
