use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::command::CommandBuffer;
use crate::error::{CoreError, ResourceKind};
use crate::vram::VramAllocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Uninitialized,
    Initializing,
    Ready,
    Active,
    Suspended,
    Shutdown,
    Error,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Uninitialized => "uninitialized",
            DeviceState::Initializing => "initializing",
            DeviceState::Ready => "ready",
            DeviceState::Active => "active",
            DeviceState::Suspended => "suspended",
            DeviceState::Shutdown => "shutdown",
            DeviceState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PowerSave,
    Balanced,
    Performance,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::PowerSave => "power_save",
            PowerState::Balanced => "balanced",
            PowerState::Performance => "performance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuDeviceConfig {
    pub cores: u32,
    pub clusters: u32,
    pub shader_units: u32,
    pub raster_units: u32,
    pub texture_units: u32,
    pub vram_base: u64,
    pub vram_size: u64,
    pub power_limit_watts: u32,
    pub thermal_limit_celsius: u32,
}

impl Default for GpuDeviceConfig {
    fn default() -> Self {
        Self {
            cores: 1024,
            clusters: 8,
            shader_units: 64,
            raster_units: 16,
            texture_units: 32,
            vram_base: 0x1000_0000,
            vram_size: 256 * 1024 * 1024,
            power_limit_watts: 200,
            thermal_limit_celsius: 95,
        }
    }
}

impl GpuDeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vram(mut self, base: u64, size: u64) -> Self {
        self.vram_base = base;
        self.vram_size = size;
        self
    }

    pub fn with_cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }
}

#[derive(Debug)]
struct DeviceStatus {
    state: DeviceState,
    power: PowerState,
    fault: Option<String>,
}

/// One physical GPU. State transitions run under the status lock; VRAM and
/// command traffic each take their own lock so unrelated contexts are not
/// serialized behind each other.
#[derive(Debug)]
pub struct GpuDevice {
    pub device_id: u32,
    pub config: GpuDeviceConfig,
    status: Mutex<DeviceStatus>,
    vram: Mutex<VramAllocator>,
    commands: Mutex<CommandTable>,
}

#[derive(Debug, Default)]
struct CommandTable {
    next_id: u32,
    buffers: HashMap<u32, CommandBuffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuContext {
    pub context_id: u32,
    /// Weak reference by id; the context never owns the device.
    pub device_id: u32,
    pub pid: u32,
    pub bound: bool,
    pub viewport: (u32, u32, u32, u32),
    pub bound_buffers: Vec<u32>,
}

#[derive(Debug, Default)]
struct ContextTable {
    next_id: u32,
    contexts: HashMap<u32, GpuContext>,
}

/// Owns every hardware-facing handle: devices, their VRAM address spaces,
/// rendering contexts, and command buffers.
#[derive(Debug, Default)]
pub struct GpuManager {
    devices: RwLock<DeviceTable>,
    contexts: Mutex<ContextTable>,
}

#[derive(Debug, Default)]
struct DeviceTable {
    next_id: u32,
    devices: HashMap<u32, Arc<GpuDevice>>,
}

impl GpuManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self, device_id: u32) -> Result<Arc<GpuDevice>, CoreError> {
        self.devices
            .read()
            .devices
            .get(&device_id)
            .cloned()
            .ok_or(CoreError::not_found(ResourceKind::GpuDevice, device_id))
    }

    fn ensure_not_faulted(status: &DeviceStatus, device_id: u32) -> Result<(), CoreError> {
        if status.state == DeviceState::Error {
            let reason = status.fault.as_deref().unwrap_or("unknown fault");
            return Err(CoreError::failed(format!(
                "gpu device {device_id} is in error state: {reason}"
            )));
        }
        Ok(())
    }

    /// Probes a device into service: Uninitialized through Initializing to
    /// Ready in one call, as hardware probing is synchronous here.
    pub fn probe_device(&self, config: GpuDeviceConfig) -> Result<u32, CoreError> {
        if config.vram_size == 0 {
            return Err(CoreError::invalid("gpu vram size must be nonzero"));
        }
        let mut table = self.devices.write();
        table.next_id += 1;
        let device_id = table.next_id;
        let device = GpuDevice {
            device_id,
            status: Mutex::new(DeviceStatus {
                state: DeviceState::Ready,
                power: PowerState::Balanced,
                fault: None,
            }),
            vram: Mutex::new(VramAllocator::new(config.vram_base, config.vram_size)),
            commands: Mutex::new(CommandTable::default()),
            config,
        };
        table.devices.insert(device_id, Arc::new(device));
        Ok(device_id)
    }

    /// Removes a device, dropping its VRAM bookkeeping and command buffers
    /// and destroying every context that references it.
    pub fn remove_device(&self, device_id: u32) -> Result<(), CoreError> {
        let removed = self.devices.write().devices.remove(&device_id);
        let device =
            removed.ok_or(CoreError::not_found(ResourceKind::GpuDevice, device_id))?;
        device.status.lock().state = DeviceState::Shutdown;

        let mut table = self.contexts.lock();
        table.contexts.retain(|_, ctx| ctx.device_id != device_id);
        Ok(())
    }

    pub fn device_state(&self, device_id: u32) -> Result<DeviceState, CoreError> {
        Ok(self.device(device_id)?.status.lock().state)
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().devices.len()
    }

    pub fn device_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.devices.read().devices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_power_state(&self, device_id: u32, power: PowerState) -> Result<(), CoreError> {
        let device = self.device(device_id)?;
        let mut status = device.status.lock();
        match status.state {
            DeviceState::Ready | DeviceState::Active | DeviceState::Suspended => {
                status.power = power;
                Ok(())
            }
            state => Err(CoreError::failed(format!(
                "gpu device {device_id} cannot change power in state {}",
                state.as_str()
            ))),
        }
    }

    pub fn power_state(&self, device_id: u32) -> Result<PowerState, CoreError> {
        Ok(self.device(device_id)?.status.lock().power)
    }

    fn transition(
        &self,
        device_id: u32,
        from: &[DeviceState],
        to: DeviceState,
    ) -> Result<(), CoreError> {
        let device = self.device(device_id)?;
        let mut status = device.status.lock();
        Self::ensure_not_faulted(&status, device_id)?;
        if !from.contains(&status.state) {
            return Err(CoreError::failed(format!(
                "gpu device {device_id} cannot move from {} to {}",
                status.state.as_str(),
                to.as_str()
            )));
        }
        status.state = to;
        Ok(())
    }

    pub fn activate(&self, device_id: u32) -> Result<(), CoreError> {
        self.transition(device_id, &[DeviceState::Ready], DeviceState::Active)
    }

    pub fn suspend(&self, device_id: u32) -> Result<(), CoreError> {
        self.transition(device_id, &[DeviceState::Active], DeviceState::Suspended)
    }

    pub fn resume(&self, device_id: u32) -> Result<(), CoreError> {
        self.transition(device_id, &[DeviceState::Suspended], DeviceState::Active)
    }

    /// Unrecoverable hardware fault: reachable from any state, and only
    /// `remove_device` is legal afterwards.
    pub fn record_fault(&self, device_id: u32, reason: impl Into<String>) -> Result<(), CoreError> {
        let device = self.device(device_id)?;
        let mut status = device.status.lock();
        status.state = DeviceState::Error;
        status.fault = Some(reason.into());
        Ok(())
    }

    pub fn alloc_vram(
        &self,
        device_id: u32,
        size: u64,
        alignment: u64,
    ) -> Result<u64, CoreError> {
        let device = self.device(device_id)?;
        {
            let status = device.status.lock();
            Self::ensure_not_faulted(&status, device_id)?;
        }
        let mut vram = device.vram.lock();
        vram.alloc(size, alignment)
    }

    pub fn free_vram(&self, device_id: u32, address: u64) -> Result<u64, CoreError> {
        let device = self.device(device_id)?;
        {
            let status = device.status.lock();
            Self::ensure_not_faulted(&status, device_id)?;
        }
        let mut vram = device.vram.lock();
        vram.free(address)
    }

    pub fn vram_used(&self, device_id: u32) -> Result<u64, CoreError> {
        Ok(self.device(device_id)?.vram.lock().used_bytes())
    }

    pub fn create_context(&self, device_id: u32, pid: u32) -> Result<u32, CoreError> {
        let device = self.device(device_id)?;
        {
            let status = device.status.lock();
            Self::ensure_not_faulted(&status, device_id)?;
            if !matches!(status.state, DeviceState::Ready | DeviceState::Active) {
                return Err(CoreError::failed(format!(
                    "gpu device {device_id} cannot create contexts in state {}",
                    status.state.as_str()
                )));
            }
        }

        let mut table = self.contexts.lock();
        table.next_id += 1;
        let context_id = table.next_id;
        table.contexts.insert(
            context_id,
            GpuContext {
                context_id,
                device_id,
                pid,
                bound: false,
                viewport: (0, 0, 0, 0),
                bound_buffers: Vec::new(),
            },
        );
        Ok(context_id)
    }

    pub fn destroy_context(&self, context_id: u32) -> Result<(), CoreError> {
        self.contexts
            .lock()
            .contexts
            .remove(&context_id)
            .map(|_| ())
            .ok_or(CoreError::not_found(ResourceKind::Context, context_id))
    }

    fn set_bound(&self, context_id: u32, bound: bool) -> Result<bool, CoreError> {
        let mut table = self.contexts.lock();
        let ctx = table
            .contexts
            .get_mut(&context_id)
            .ok_or(CoreError::not_found(ResourceKind::Context, context_id))?;
        let changed = ctx.bound != bound;
        ctx.bound = bound;
        Ok(changed)
    }

    /// Idempotent: binding an already-bound context reports `false` with no
    /// state change.
    pub fn bind_context(&self, context_id: u32) -> Result<bool, CoreError> {
        self.set_bound(context_id, true)
    }

    pub fn unbind_context(&self, context_id: u32) -> Result<bool, CoreError> {
        self.set_bound(context_id, false)
    }

    pub fn context(&self, context_id: u32) -> Result<GpuContext, CoreError> {
        self.contexts
            .lock()
            .contexts
            .get(&context_id)
            .cloned()
            .ok_or(CoreError::not_found(ResourceKind::Context, context_id))
    }

    pub fn set_viewport(
        &self,
        context_id: u32,
        viewport: (u32, u32, u32, u32),
    ) -> Result<(), CoreError> {
        let mut table = self.contexts.lock();
        let ctx = table
            .contexts
            .get_mut(&context_id)
            .ok_or(CoreError::not_found(ResourceKind::Context, context_id))?;
        ctx.viewport = viewport;
        Ok(())
    }

    pub fn context_count(&self) -> usize {
        self.contexts.lock().contexts.len()
    }

    pub fn create_command_buffer(&self, device_id: u32, size: usize) -> Result<u32, CoreError> {
        if size == 0 {
            return Err(CoreError::invalid("command buffer size must be nonzero"));
        }
        let device = self.device(device_id)?;
        {
            let status = device.status.lock();
            Self::ensure_not_faulted(&status, device_id)?;
        }
        let mut table = device.commands.lock();
        table.next_id += 1;
        let buffer_id = table.next_id;
        table
            .buffers
            .insert(buffer_id, CommandBuffer::new(buffer_id, device_id, size));
        Ok(buffer_id)
    }

    fn with_command_buffer<R>(
        &self,
        device_id: u32,
        buffer_id: u32,
        op: impl FnOnce(&mut CommandBuffer) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let device = self.device(device_id)?;
        {
            let status = device.status.lock();
            Self::ensure_not_faulted(&status, device_id)?;
        }
        let mut table = device.commands.lock();
        let buffer = table
            .buffers
            .get_mut(&buffer_id)
            .ok_or(CoreError::not_found(ResourceKind::CommandBuffer, buffer_id))?;
        op(buffer)
    }

    pub fn record_commands(
        &self,
        device_id: u32,
        buffer_id: u32,
        bytes: &[u8],
    ) -> Result<usize, CoreError> {
        self.with_command_buffer(device_id, buffer_id, |buffer| buffer.record(bytes))
    }

    pub fn submit_commands(&self, device_id: u32, buffer_id: u32) -> Result<(), CoreError> {
        self.with_command_buffer(device_id, buffer_id, |buffer| buffer.submit())
    }

    pub fn complete_commands(&self, device_id: u32, buffer_id: u32) -> Result<(), CoreError> {
        self.with_command_buffer(device_id, buffer_id, |buffer| buffer.complete())
    }

    /// Reads up to `len` bytes from the buffer's cursor, copied out so no
    /// borrow escapes the command lock.
    pub fn read_commands(
        &self,
        device_id: u32,
        buffer_id: u32,
        len: usize,
    ) -> Result<Vec<u8>, CoreError> {
        self.with_command_buffer(device_id, buffer_id, |buffer| {
            buffer.read(len).map(<[u8]>::to_vec)
        })
    }

    /// Tears down every device and context. Used by subsystem shutdown.
    pub fn clear(&self) -> usize {
        let mut devices = self.devices.write();
        let removed = devices.devices.len();
        for device in devices.devices.values() {
            device.status.lock().state = DeviceState::Shutdown;
        }
        devices.devices.clear();
        self.contexts.lock().contexts.clear();
        removed
    }
}
