use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ResourceKind};
use crate::exact::{ExactEngine, ExactValue};
use crate::sched::RealtimeScheduler;
use crate::slot::{IdSpace, SlotRegistry};

pub const DEFAULT_GRAVITY: &str = "9.80665";
pub const DEFAULT_TIME_DELTA: &str = "0.016666666666666666";
pub const DEFAULT_COLLISION_EPSILON: &str = "0.000001";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub priority: u8,
    pub realtime_enabled: bool,
    pub low_latency_enabled: bool,
    pub exact_physics_enabled: bool,
    pub anticheat_enabled: bool,
    pub vr_enabled: bool,
    pub streaming_enabled: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            realtime_enabled: false,
            low_latency_enabled: false,
            exact_physics_enabled: false,
            anticheat_enabled: false,
            vr_enabled: false,
            streaming_enabled: false,
        }
    }
}

impl ProcessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_realtime(mut self, enabled: bool) -> Self {
        self.realtime_enabled = enabled;
        self
    }

    pub fn with_low_latency(mut self, enabled: bool) -> Self {
        self.low_latency_enabled = enabled;
        self
    }

    pub fn with_exact_physics(mut self, enabled: bool) -> Self {
        self.exact_physics_enabled = enabled;
        self
    }

    pub fn with_anticheat(mut self, enabled: bool) -> Self {
        self.anticheat_enabled = enabled;
        self
    }

    pub fn with_vr(mut self, enabled: bool) -> Self {
        self.vr_enabled = enabled;
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming_enabled = enabled;
        self
    }
}

/// Exact physics constants for one process, allocated only when the
/// process opted into exact physics.
#[derive(Debug)]
pub struct PhysicsContext {
    pub gravity: ExactValue,
    pub time_delta: ExactValue,
    pub collision_epsilon: ExactValue,
}

impl PhysicsContext {
    pub fn with_defaults(engine: &dyn ExactEngine) -> Result<Self, CoreError> {
        Ok(Self {
            gravity: engine.from_str(DEFAULT_GRAVITY)?,
            time_delta: engine.from_str(DEFAULT_TIME_DELTA)?,
            collision_epsilon: engine.from_str(DEFAULT_COLLISION_EPSILON)?,
        })
    }

    pub fn release(self, engine: &dyn ExactEngine) {
        engine.cleanup(self.gravity);
        engine.cleanup(self.time_delta);
        engine.cleanup(self.collision_epsilon);
    }
}

#[derive(Debug)]
pub struct GamingProcess {
    pub pid: u32,
    pub config: ProcessConfig,
    pub physics: Option<PhysicsContext>,
}

/// Per-process performance and physics state, keyed by caller-chosen pid.
#[derive(Debug)]
pub struct ProcessRegistry {
    table: SlotRegistry<GamingProcess>,
}

impl ProcessRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: SlotRegistry::new(capacity, IdSpace::ZeroBased, ResourceKind::Process, "process"),
        }
    }

    /// Registers a process. The exact-physics context is allocated only on
    /// request, and realtime intent is forwarded to the scheduler
    /// collaborator; a scheduler refusal rolls the record back so no
    /// half-initialized entry stays active.
    pub fn register(
        &mut self,
        pid: u32,
        config: ProcessConfig,
        engine: &dyn ExactEngine,
        scheduler: &dyn RealtimeScheduler,
    ) -> Result<(), CoreError> {
        if self.table.is_full() {
            return Err(CoreError::CapacityExceeded {
                registry: "process",
                capacity: self.table.capacity(),
            });
        }
        if pid == 0 {
            return Err(CoreError::invalid("process id 0 is reserved"));
        }
        if self.table.contains(pid) {
            return Err(CoreError::AlreadyInUse {
                kind: ResourceKind::Process,
                id: pid,
            });
        }

        let physics = if config.exact_physics_enabled {
            Some(PhysicsContext::with_defaults(engine)?)
        } else {
            None
        };

        let realtime = config.realtime_enabled;
        let priority = config.priority;
        self.table.insert(
            pid,
            GamingProcess {
                pid,
                config,
                physics,
            },
        )?;

        if realtime {
            if let Err(err) = scheduler.set_realtime_priority(pid, priority) {
                let record = self.table.remove(pid).expect("just-inserted process");
                if let Some(ctx) = record.physics {
                    ctx.release(engine);
                }
                return Err(err);
            }
        }

        Ok(())
    }

    /// Unregisters a process, releasing its exact-physics state exactly
    /// once before the slot is recycled.
    pub fn unregister(&mut self, pid: u32, engine: &dyn ExactEngine) -> Result<(), CoreError> {
        let record = self.table.remove(pid)?;
        if let Some(ctx) = record.physics {
            ctx.release(engine);
        }
        Ok(())
    }

    pub fn update_priority(
        &mut self,
        pid: u32,
        priority: u8,
        scheduler: &dyn RealtimeScheduler,
    ) -> Result<(), CoreError> {
        let record = self
            .table
            .get_mut(pid)
            .ok_or(CoreError::not_found(ResourceKind::Process, pid))?;
        record.config.priority = priority;
        if record.config.realtime_enabled {
            scheduler.set_realtime_priority(pid, priority)?;
        }
        Ok(())
    }

    pub fn get(&self, pid: u32) -> Option<&GamingProcess> {
        self.table.get(pid)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.table.ids()
    }

    /// Tears down every active process. Used by subsystem shutdown.
    pub fn clear(&mut self, engine: &dyn ExactEngine) -> usize {
        let pids = self.table.ids();
        let mut released = 0;
        for pid in pids {
            if self.unregister(pid, engine).is_ok() {
                released += 1;
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::DecimalExactEngine;
    use crate::sched::{NullScheduler, RecordingScheduler};

    #[test]
    fn register_then_unregister_releases_all_exact_state() {
        let engine = DecimalExactEngine::new();
        let mut registry = ProcessRegistry::new(4);

        registry
            .register(
                7,
                ProcessConfig::new().with_exact_physics(true),
                &engine,
                &NullScheduler,
            )
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(engine.live_values(), 3);

        registry.unregister(7, &engine).unwrap();
        assert_eq!(registry.len(), 0);
        assert_eq!(engine.live_values(), 0);

        let err = registry.unregister(7, &engine).unwrap_err();
        assert_eq!(err, CoreError::not_found(ResourceKind::Process, 7));
    }

    #[test]
    fn realtime_registration_forwards_to_scheduler() {
        let engine = DecimalExactEngine::new();
        let scheduler = RecordingScheduler::new();
        let mut registry = ProcessRegistry::new(4);

        registry
            .register(
                7,
                ProcessConfig::new().with_priority(10).with_realtime(true),
                &engine,
                &scheduler,
            )
            .unwrap();
        assert_eq!(scheduler.calls(), vec![(7, 10)]);
    }

    #[test]
    fn scheduler_refusal_rolls_back_the_record() {
        let engine = DecimalExactEngine::new();
        let scheduler = RecordingScheduler::refusing();
        let mut registry = ProcessRegistry::new(4);

        let err = registry
            .register(
                5,
                ProcessConfig::new()
                    .with_priority(2)
                    .with_realtime(true)
                    .with_exact_physics(true),
                &engine,
                &scheduler,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::OperationFailed { .. }));
        assert_eq!(registry.len(), 0);
        assert_eq!(engine.live_values(), 0);
    }

    #[test]
    fn capacity_is_enforced_and_freed_slots_are_reused() {
        let engine = DecimalExactEngine::new();
        let mut registry = ProcessRegistry::new(64);

        for pid in 1..=64 {
            registry
                .register(pid, ProcessConfig::new(), &engine, &NullScheduler)
                .unwrap();
        }
        let err = registry
            .register(65, ProcessConfig::new(), &engine, &NullScheduler)
            .unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { .. }));

        registry.unregister(10, &engine).unwrap();
        registry
            .register(65, ProcessConfig::new(), &engine, &NullScheduler)
            .unwrap();
        assert_eq!(registry.len(), 64);
    }

    #[test]
    fn priority_updates_only_reach_the_scheduler_for_realtime_processes() {
        let engine = DecimalExactEngine::new();
        let scheduler = RecordingScheduler::new();
        let mut registry = ProcessRegistry::new(4);

        registry
            .register(1, ProcessConfig::new(), &engine, &scheduler)
            .unwrap();
        registry.update_priority(1, 9, &scheduler).unwrap();
        assert!(scheduler.calls().is_empty());

        registry
            .register(
                2,
                ProcessConfig::new().with_realtime(true),
                &engine,
                &scheduler,
            )
            .unwrap();
        registry.update_priority(2, 4, &scheduler).unwrap();
        assert_eq!(scheduler.calls().last(), Some(&(2, 4)));
    }

    #[test]
    fn clear_releases_every_process() {
        let engine = DecimalExactEngine::new();
        let mut registry = ProcessRegistry::new(8);
        for pid in 1..=5 {
            registry
                .register(
                    pid,
                    ProcessConfig::new().with_exact_physics(pid % 2 == 0),
                    &engine,
                    &NullScheduler,
                )
                .unwrap();
        }

        assert_eq!(registry.clear(&engine), 5);
        assert!(registry.is_empty());
        assert_eq!(engine.live_values(), 0);
    }
}
