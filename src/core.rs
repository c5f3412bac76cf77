use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clock::DeterministicClock;
use crate::error::{CoreError, ResourceKind};
use crate::events::{CoreEvent, EventBuilder, EventKind, EventLog};
use crate::exact::{DecimalExactEngine, ExactEngine};
use crate::framebuffer::{ExactPixel, FrameAllocator, FrameBufferManager, HeapAllocator, PixelFormat};
use crate::gpu::{GpuDeviceConfig, GpuManager, PowerState};
use crate::input::{DeviceConfig, InputRegistry, PrecisionSample};
use crate::physics::{self, PhysicsCalculation};
use crate::process::{ProcessConfig, ProcessRegistry};
use crate::sched::{NullScheduler, RealtimeScheduler};
use crate::status::{SubsystemStatus, ALL_CAPABILITIES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub max_processes: usize,
    pub max_input_devices: usize,
    pub max_frame_buffers: usize,
    pub anticheat_enabled: bool,
    pub vr_enabled: bool,
    pub network_gaming_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_processes: 64,
            max_input_devices: 32,
            max_frame_buffers: 16,
            anticheat_enabled: false,
            vr_enabled: false,
            network_gaming_enabled: false,
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    pub fn with_max_input_devices(mut self, max: usize) -> Self {
        self.max_input_devices = max;
        self
    }

    pub fn with_max_frame_buffers(mut self, max: usize) -> Self {
        self.max_frame_buffers = max;
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

    pub fn with_network_gaming(mut self, enabled: bool) -> Self {
        self.network_gaming_enabled = enabled;
        self
    }
}

#[derive(Debug)]
struct RegistryState {
    initialized: bool,
    processes: ProcessRegistry,
    devices: InputRegistry,
    buffers: FrameBufferManager,
}

#[derive(Debug, Default)]
struct LogState {
    events: EventLog,
    clock: DeterministicClock,
}

/// The subsystem context object. One instance owns the process, input
/// device, and frame buffer registries behind a shared registry lock, the
/// GPU manager with its per-device locks, and the injected collaborators.
/// Every operation requires `init()` first; `shutdown()` releases all
/// resources and clears the initialized flag last.
pub struct GamingCore {
    config: CoreConfig,
    state: RwLock<RegistryState>,
    gpu: GpuManager,
    log: Mutex<LogState>,
    engine: Arc<dyn ExactEngine>,
    scheduler: Arc<dyn RealtimeScheduler>,
    allocator: Arc<dyn FrameAllocator>,
}

impl GamingCore {
    pub fn new(
        config: CoreConfig,
        engine: Arc<dyn ExactEngine>,
        scheduler: Arc<dyn RealtimeScheduler>,
        allocator: Arc<dyn FrameAllocator>,
    ) -> Self {
        let state = RegistryState {
            initialized: false,
            processes: ProcessRegistry::new(config.max_processes),
            devices: InputRegistry::new(config.max_input_devices),
            buffers: FrameBufferManager::new(config.max_frame_buffers),
        };
        Self {
            config,
            state: RwLock::new(state),
            gpu: GpuManager::new(),
            log: Mutex::new(LogState::default()),
            engine,
            scheduler,
            allocator,
        }
    }

    pub fn with_defaults(config: CoreConfig) -> Self {
        Self::new(
            config,
            Arc::new(DecimalExactEngine::new()),
            Arc::new(NullScheduler),
            Arc::new(HeapAllocator),
        )
    }

    /// The injected exact engine, for building samples and pixel batches.
    pub fn engine(&self) -> Arc<dyn ExactEngine> {
        Arc::clone(&self.engine)
    }

    fn publish(&self, subject: u32, kind: EventKind, detail: serde_json::Value) {
        let mut log = self.log.lock();
        let LogState { events, clock } = &mut *log;
        events.publish(clock, EventBuilder::new(subject, kind).detail(detail));
    }

    fn reject(&self, subject: u32, err: CoreError) -> CoreError {
        self.publish(
            subject,
            EventKind::OperationRejected,
            json!({"error": err.to_string()}),
        );
        err
    }

    fn ensure_initialized(&self) -> Result<(), CoreError> {
        if self.state.read().initialized {
            Ok(())
        } else {
            Err(CoreError::NotInitialized)
        }
    }

    pub fn init(&self) -> Result<(), CoreError> {
        {
            let mut state = self.state.write();
            if state.initialized {
                return Err(self.reject(0, CoreError::AlreadyInitialized));
            }
            state.initialized = true;
        }
        self.publish(0, EventKind::Initialized, json!({"config": self.config}));
        Ok(())
    }

    /// Best-effort teardown: every active process, device, and buffer is
    /// unregistered (continuing past individual failures), GPU state is
    /// cleared, and the initialized flag drops last.
    pub fn shutdown(&self) -> Result<(), CoreError> {
        let detail = {
            let mut state = self.state.write();
            if !state.initialized {
                return Err(self.reject(0, CoreError::NotInitialized));
            }
            let processes = state.processes.clear(self.engine.as_ref());
            let devices = state.devices.clear(self.engine.as_ref());
            let buffers = state
                .buffers
                .clear(self.allocator.as_ref(), self.engine.as_ref());
            let gpu_devices = self.gpu.clear();
            state.initialized = false;
            json!({
                "processes_released": processes,
                "devices_released": devices,
                "buffers_released": buffers,
                "gpu_devices_released": gpu_devices,
            })
        };
        self.publish(0, EventKind::ShutdownCompleted, detail);
        Ok(())
    }

    pub fn register_process(&self, pid: u32, config: ProcessConfig) -> Result<(), CoreError> {
        let detail = json!({
            "priority": config.priority,
            "realtime": config.realtime_enabled,
            "exact_physics": config.exact_physics_enabled,
        });
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state.processes.register(
                    pid,
                    config,
                    self.engine.as_ref(),
                    self.scheduler.as_ref(),
                )
            }
        };
        match result {
            Ok(()) => {
                self.publish(pid, EventKind::ProcessRegistered, detail);
                Ok(())
            }
            Err(err) => Err(self.reject(pid, err)),
        }
    }

    pub fn unregister_process(&self, pid: u32) -> Result<(), CoreError> {
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state.processes.unregister(pid, self.engine.as_ref())
            }
        };
        match result {
            Ok(()) => {
                self.publish(pid, EventKind::ProcessUnregistered, serde_json::Value::Null);
                Ok(())
            }
            Err(err) => Err(self.reject(pid, err)),
        }
    }

    pub fn update_priority(&self, pid: u32, priority: u8) -> Result<(), CoreError> {
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state
                    .processes
                    .update_priority(pid, priority, self.scheduler.as_ref())
            }
        };
        match result {
            Ok(()) => {
                self.publish(pid, EventKind::PriorityUpdated, json!({"priority": priority}));
                Ok(())
            }
            Err(err) => Err(self.reject(pid, err)),
        }
    }

    pub fn register_input_device(
        &self,
        device_id: u32,
        config: DeviceConfig,
    ) -> Result<(), CoreError> {
        let detail = json!({
            "device_type": config.device_type.as_str(),
            "polling_rate_hz": config.polling_rate_hz,
            "exact_precision": config.exact_precision_enabled,
        });
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state
                    .devices
                    .register(device_id, config, self.engine.as_ref())
            }
        };
        match result {
            Ok(()) => {
                self.publish(device_id, EventKind::DeviceRegistered, detail);
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn unregister_input_device(&self, device_id: u32) -> Result<(), CoreError> {
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state.devices.unregister(device_id, self.engine.as_ref())
            }
        };
        match result {
            Ok(()) => {
                self.publish(
                    device_id,
                    EventKind::DeviceUnregistered,
                    serde_json::Value::Null,
                );
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn update_input_precision(
        &self,
        device_id: u32,
        sample: &PrecisionSample,
    ) -> Result<(), CoreError> {
        let timestamp = self.log.lock().clock.tick();
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state.devices.update_precision(
                    device_id,
                    sample,
                    timestamp,
                    self.engine.as_ref(),
                )
            }
        };
        match result {
            Ok(()) => {
                self.publish(
                    device_id,
                    EventKind::PrecisionUpdated,
                    json!({"stamped_at": timestamp}),
                );
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn create_frame_buffer(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<u32, CoreError> {
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state.buffers.create(
                    width,
                    height,
                    format,
                    self.allocator.as_ref(),
                    self.engine.as_ref(),
                )
            }
        };
        match result {
            Ok(buffer_id) => {
                self.publish(
                    buffer_id,
                    EventKind::BufferCreated,
                    json!({
                        "width": width,
                        "height": height,
                        "format": format.as_str(),
                    }),
                );
                Ok(buffer_id)
            }
            Err(err) => Err(self.reject(0, err)),
        }
    }

    pub fn destroy_frame_buffer(&self, buffer_id: u32) -> Result<(), CoreError> {
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state
                    .buffers
                    .destroy(buffer_id, self.allocator.as_ref(), self.engine.as_ref())
            }
        };
        match result {
            Ok(()) => {
                self.publish(buffer_id, EventKind::BufferDestroyed, serde_json::Value::Null);
                Ok(())
            }
            Err(err) => Err(self.reject(buffer_id, err)),
        }
    }

    /// Writes an exact pixel batch. Out-of-bounds pixels are skipped, not
    /// errors; the returned count is the number actually written.
    pub fn render_exact_pixels(
        &self,
        buffer_id: u32,
        pixels: &[ExactPixel],
    ) -> Result<usize, CoreError> {
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                state
                    .buffers
                    .render_exact_pixels(buffer_id, pixels, self.engine.as_ref())
            }
        };
        match result {
            Ok(written) => {
                self.publish(
                    buffer_id,
                    EventKind::PixelsRendered,
                    json!({"submitted": pixels.len(), "written": written}),
                );
                Ok(written)
            }
            Err(err) => Err(self.reject(buffer_id, err)),
        }
    }

    pub fn calculate_exact_physics(
        &self,
        pid: u32,
        calc: &PhysicsCalculation,
    ) -> Result<String, CoreError> {
        let result = {
            let state = self.state.read();
            if !state.initialized {
                Err(CoreError::NotInitialized)
            } else {
                // A process without exact physics is indistinguishable
                // from an absent one, matching the registry contract.
                state
                    .processes
                    .get(pid)
                    .and_then(|process| process.physics.as_ref())
                    .ok_or(CoreError::not_found(ResourceKind::Process, pid))
                    .and_then(|ctx| physics::calculate(ctx, calc, self.engine.as_ref()))
            }
        };
        match result {
            Ok(rendered) => {
                self.publish(
                    pid,
                    EventKind::PhysicsCalculated,
                    json!({"calculation": calc.kind(), "result": rendered}),
                );
                Ok(rendered)
            }
            Err(err) => Err(self.reject(pid, err)),
        }
    }

    pub fn probe_gpu_device(&self, config: GpuDeviceConfig) -> Result<u32, CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(0, err));
        }
        match self.gpu.probe_device(config) {
            Ok(device_id) => {
                self.publish(device_id, EventKind::GpuProbed, serde_json::Value::Null);
                Ok(device_id)
            }
            Err(err) => Err(self.reject(0, err)),
        }
    }

    pub fn remove_gpu_device(&self, device_id: u32) -> Result<(), CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        match self.gpu.remove_device(device_id) {
            Ok(()) => {
                self.publish(device_id, EventKind::GpuRemoved, serde_json::Value::Null);
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn set_gpu_power_state(&self, device_id: u32, power: PowerState) -> Result<(), CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        match self.gpu.set_power_state(device_id, power) {
            Ok(()) => {
                self.publish(
                    device_id,
                    EventKind::PowerChanged,
                    json!({"power": power.as_str()}),
                );
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn activate_gpu_device(&self, device_id: u32) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.activate(device_id))
            .map_err(|err| self.reject(device_id, err))
    }

    pub fn suspend_gpu_device(&self, device_id: u32) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.suspend(device_id))
            .map_err(|err| self.reject(device_id, err))
    }

    pub fn resume_gpu_device(&self, device_id: u32) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.resume(device_id))
            .map_err(|err| self.reject(device_id, err))
    }

    pub fn record_gpu_fault(
        &self,
        device_id: u32,
        reason: impl Into<String>,
    ) -> Result<(), CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        let reason = reason.into();
        match self.gpu.record_fault(device_id, reason.clone()) {
            Ok(()) => {
                self.publish(device_id, EventKind::GpuFault, json!({"reason": reason}));
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn alloc_vram(
        &self,
        device_id: u32,
        size: u64,
        alignment: u64,
    ) -> Result<u64, CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        match self.gpu.alloc_vram(device_id, size, alignment) {
            Ok(address) => {
                self.publish(
                    device_id,
                    EventKind::VramAllocated,
                    json!({"address": address, "size": size}),
                );
                Ok(address)
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn free_vram(&self, device_id: u32, address: u64) -> Result<(), CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        match self.gpu.free_vram(device_id, address) {
            Ok(size) => {
                self.publish(
                    device_id,
                    EventKind::VramFreed,
                    json!({"address": address, "size": size}),
                );
                Ok(())
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn create_gpu_context(&self, device_id: u32, pid: u32) -> Result<u32, CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        match self.gpu.create_context(device_id, pid) {
            Ok(context_id) => {
                self.publish(
                    context_id,
                    EventKind::ContextCreated,
                    json!({"device": device_id, "pid": pid}),
                );
                Ok(context_id)
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn destroy_gpu_context(&self, context_id: u32) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.destroy_context(context_id))
            .map(|()| {
                self.publish(context_id, EventKind::ContextDestroyed, serde_json::Value::Null)
            })
            .map_err(|err| self.reject(context_id, err))
    }

    pub fn bind_gpu_context(&self, context_id: u32) -> Result<(), CoreError> {
        match self
            .ensure_initialized()
            .and_then(|_| self.gpu.bind_context(context_id))
        {
            Ok(changed) => {
                if changed {
                    self.publish(context_id, EventKind::ContextBound, serde_json::Value::Null);
                }
                Ok(())
            }
            Err(err) => Err(self.reject(context_id, err)),
        }
    }

    pub fn unbind_gpu_context(&self, context_id: u32) -> Result<(), CoreError> {
        match self
            .ensure_initialized()
            .and_then(|_| self.gpu.unbind_context(context_id))
        {
            Ok(changed) => {
                if changed {
                    self.publish(context_id, EventKind::ContextUnbound, serde_json::Value::Null);
                }
                Ok(())
            }
            Err(err) => Err(self.reject(context_id, err)),
        }
    }

    pub fn set_gpu_viewport(
        &self,
        context_id: u32,
        viewport: (u32, u32, u32, u32),
    ) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.set_viewport(context_id, viewport))
            .map(|()| {
                self.publish(
                    context_id,
                    EventKind::ViewportUpdated,
                    json!({
                        "x": viewport.0,
                        "y": viewport.1,
                        "width": viewport.2,
                        "height": viewport.3,
                    }),
                )
            })
            .map_err(|err| self.reject(context_id, err))
    }

    pub fn create_command_buffer(&self, device_id: u32, size: usize) -> Result<u32, CoreError> {
        if let Err(err) = self.ensure_initialized() {
            return Err(self.reject(device_id, err));
        }
        match self.gpu.create_command_buffer(device_id, size) {
            Ok(buffer_id) => {
                self.publish(
                    buffer_id,
                    EventKind::CommandBufferCreated,
                    json!({"device": device_id, "size": size}),
                );
                Ok(buffer_id)
            }
            Err(err) => Err(self.reject(device_id, err)),
        }
    }

    pub fn record_commands(
        &self,
        device_id: u32,
        buffer_id: u32,
        bytes: &[u8],
    ) -> Result<usize, CoreError> {
        match self
            .ensure_initialized()
            .and_then(|_| self.gpu.record_commands(device_id, buffer_id, bytes))
        {
            Ok(used) => {
                self.publish(
                    buffer_id,
                    EventKind::CommandRecorded,
                    json!({"appended": bytes.len(), "used": used}),
                );
                Ok(used)
            }
            Err(err) => Err(self.reject(buffer_id, err)),
        }
    }

    pub fn submit_commands(&self, device_id: u32, buffer_id: u32) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.submit_commands(device_id, buffer_id))
            .map(|()| {
                self.publish(buffer_id, EventKind::CommandSubmitted, serde_json::Value::Null)
            })
            .map_err(|err| self.reject(buffer_id, err))
    }

    pub fn complete_commands(&self, device_id: u32, buffer_id: u32) -> Result<(), CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.complete_commands(device_id, buffer_id))
            .map(|()| {
                self.publish(buffer_id, EventKind::CommandCompleted, serde_json::Value::Null)
            })
            .map_err(|err| self.reject(buffer_id, err))
    }

    /// Read access does not publish an event; only the cursor moves.
    pub fn read_commands(
        &self,
        device_id: u32,
        buffer_id: u32,
        len: usize,
    ) -> Result<Vec<u8>, CoreError> {
        self.ensure_initialized()
            .and_then(|_| self.gpu.read_commands(device_id, buffer_id, len))
            .map_err(|err| self.reject(buffer_id, err))
    }

    pub fn gpu(&self) -> &GpuManager {
        &self.gpu
    }

    /// Snapshot of the registries, captured under one read-lock
    /// acquisition so no field pair is ever torn.
    pub fn get_status(&self) -> SubsystemStatus {
        let state = self.state.read();
        SubsystemStatus {
            initialized: state.initialized,
            version: env!("CARGO_PKG_VERSION"),
            capabilities: ALL_CAPABILITIES,
            active_process_count: state.processes.len(),
            registered_device_count: state.devices.len(),
            active_buffer_count: state.buffers.len(),
            anticheat_enabled: self.config.anticheat_enabled,
            vr_enabled: self.config.vr_enabled,
            network_gaming_enabled: self.config.network_gaming_enabled,
        }
    }

    pub fn drain_events(&self) -> Vec<CoreEvent> {
        self.log.lock().events.drain()
    }
}
