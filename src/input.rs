use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ResourceKind};
use crate::exact::{ExactEngine, ExactValue};
use crate::slot::{IdSpace, SlotRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Mouse,
    Keyboard,
    Gamepad,
    VrController,
    Custom(String),
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Mouse => "mouse",
            DeviceType::Keyboard => "keyboard",
            DeviceType::Gamepad => "gamepad",
            DeviceType::VrController => "vr_controller",
            DeviceType::Custom(_) => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_type: DeviceType,
    pub polling_rate_hz: u32,
    pub low_latency_enabled: bool,
    pub exact_precision_enabled: bool,
}

impl DeviceConfig {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            polling_rate_hz: 125,
            low_latency_enabled: false,
            exact_precision_enabled: false,
        }
    }

    pub fn with_polling_rate(mut self, hz: u32) -> Self {
        self.polling_rate_hz = hz;
        self
    }

    pub fn with_low_latency(mut self, enabled: bool) -> Self {
        self.low_latency_enabled = enabled;
        self
    }

    pub fn with_exact_precision(mut self, enabled: bool) -> Self {
        self.exact_precision_enabled = enabled;
        self
    }
}

/// Nine exact values tracking a device: position, rotation, and
/// acceleration triples.
#[derive(Debug)]
pub struct PrecisionContext {
    pub position: [ExactValue; 3],
    pub rotation: [ExactValue; 3],
    pub acceleration: [ExactValue; 3],
}

fn zero_triple(engine: &dyn ExactEngine) -> [ExactValue; 3] {
    [engine.init(), engine.init(), engine.init()]
}

fn release_triple(triple: [ExactValue; 3], engine: &dyn ExactEngine) {
    for value in triple {
        engine.cleanup(value);
    }
}

impl PrecisionContext {
    pub fn zeroed(engine: &dyn ExactEngine) -> Self {
        Self {
            position: zero_triple(engine),
            rotation: zero_triple(engine),
            acceleration: zero_triple(engine),
        }
    }

    pub fn release(self, engine: &dyn ExactEngine) {
        release_triple(self.position, engine);
        release_triple(self.rotation, engine);
        release_triple(self.acceleration, engine);
    }
}

/// One full precision reading. Updates are whole-sample overwrites, so a
/// caller must supply all nine values each time. The sample stays
/// caller-owned; release it after use.
#[derive(Debug)]
pub struct PrecisionSample {
    pub position: [ExactValue; 3],
    pub rotation: [ExactValue; 3],
    pub acceleration: [ExactValue; 3],
}

impl PrecisionSample {
    /// Parses nine decimal strings in position/rotation/acceleration order.
    pub fn from_strings(
        engine: &dyn ExactEngine,
        values: &[String; 9],
    ) -> Result<Self, CoreError> {
        let mut parsed = Vec::with_capacity(9);
        for text in values {
            match engine.from_str(text) {
                Ok(value) => parsed.push(value),
                Err(err) => {
                    for value in parsed {
                        engine.cleanup(value);
                    }
                    return Err(err);
                }
            }
        }
        let mut parsed = parsed.into_iter();
        let mut next = || parsed.next().expect("nine parsed values");
        Ok(Self {
            position: [next(), next(), next()],
            rotation: [next(), next(), next()],
            acceleration: [next(), next(), next()],
        })
    }

    pub fn release(self, engine: &dyn ExactEngine) {
        release_triple(self.position, engine);
        release_triple(self.rotation, engine);
        release_triple(self.acceleration, engine);
    }
}

#[derive(Debug)]
pub struct InputDevice {
    pub device_id: u32,
    pub config: DeviceConfig,
    pub precision: Option<PrecisionContext>,
    pub last_update_timestamp: u64,
}

/// Per-device precision-tracking state, keyed by caller-chosen device id.
#[derive(Debug)]
pub struct InputRegistry {
    table: SlotRegistry<InputDevice>,
}

impl InputRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: SlotRegistry::new(
                capacity,
                IdSpace::ZeroBased,
                ResourceKind::InputDevice,
                "input device",
            ),
        }
    }

    pub fn register(
        &mut self,
        device_id: u32,
        config: DeviceConfig,
        engine: &dyn ExactEngine,
    ) -> Result<(), CoreError> {
        if self.table.is_full() {
            return Err(CoreError::CapacityExceeded {
                registry: "input device",
                capacity: self.table.capacity(),
            });
        }
        if device_id == 0 {
            return Err(CoreError::invalid("input device id 0 is reserved"));
        }
        if self.table.contains(device_id) {
            return Err(CoreError::AlreadyInUse {
                kind: ResourceKind::InputDevice,
                id: device_id,
            });
        }

        // Validity was checked above, so the context allocated here always
        // ends up owned by an active record.
        let precision = if config.exact_precision_enabled {
            Some(PrecisionContext::zeroed(engine))
        } else {
            None
        };

        self.table.insert(
            device_id,
            InputDevice {
                device_id,
                config,
                precision,
                last_update_timestamp: 0,
            },
        )
    }

    pub fn unregister(&mut self, device_id: u32, engine: &dyn ExactEngine) -> Result<(), CoreError> {
        let record = self.table.remove(device_id)?;
        if let Some(ctx) = record.precision {
            ctx.release(engine);
        }
        Ok(())
    }

    /// Overwrites all nine stored values from the sample and stamps the
    /// update time. Devices without exact precision report `NotFound`, the
    /// same as absent devices, so callers cannot distinguish the two.
    pub fn update_precision(
        &mut self,
        device_id: u32,
        sample: &PrecisionSample,
        timestamp: u64,
        engine: &dyn ExactEngine,
    ) -> Result<(), CoreError> {
        let record = self
            .table
            .get_mut(device_id)
            .ok_or(CoreError::not_found(ResourceKind::InputDevice, device_id))?;
        let ctx = record
            .precision
            .as_mut()
            .ok_or(CoreError::not_found(ResourceKind::InputDevice, device_id))?;

        for (stored, incoming) in ctx
            .position
            .iter_mut()
            .chain(ctx.rotation.iter_mut())
            .chain(ctx.acceleration.iter_mut())
            .zip(
                sample
                    .position
                    .iter()
                    .chain(sample.rotation.iter())
                    .chain(sample.acceleration.iter()),
            )
        {
            let previous = std::mem::replace(stored, engine.copy(incoming));
            engine.cleanup(previous);
        }
        record.last_update_timestamp = timestamp;
        Ok(())
    }

    pub fn get(&self, device_id: u32) -> Option<&InputDevice> {
        self.table.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn device_ids(&self) -> Vec<u32> {
        self.table.ids()
    }

    pub fn clear(&mut self, engine: &dyn ExactEngine) -> usize {
        let ids = self.table.ids();
        let mut released = 0;
        for id in ids {
            if self.unregister(id, engine).is_ok() {
                released += 1;
            }
        }
        released
    }
}
