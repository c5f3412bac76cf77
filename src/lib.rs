//! Resource-lifecycle core for a gaming subsystem: process, input device,
//! frame buffer, and GPU registries with exact-precision physics state.

pub mod clock;
pub mod command;
pub mod core;
pub mod error;
pub mod events;
pub mod exact;
pub mod framebuffer;
pub mod gpu;
pub mod input;
pub mod metrics;
pub mod physics;
pub mod process;
pub mod sched;
pub mod slot;
pub mod status;
pub mod vram;

pub use clock::DeterministicClock;
pub use command::{CommandBuffer, CommandBufferState};
pub use core::{CoreConfig, GamingCore};
pub use error::{CoreError, ResourceKind};
pub use events::{CoreEvent, EventBuilder, EventKind, EventLog};
pub use exact::{DecimalExactEngine, ExactEngine, ExactValue, MAX_SCALE};
pub use framebuffer::{
    BudgetAllocator, ExactPixel, FrameAllocator, FrameBuffer, FrameBufferManager, HeapAllocator,
    PixelFormat,
};
pub use gpu::{DeviceState, GpuContext, GpuDevice, GpuDeviceConfig, GpuManager, PowerState};
pub use input::{
    DeviceConfig, DeviceType, InputDevice, InputRegistry, PrecisionContext, PrecisionSample,
};
pub use metrics::CoreMetrics;
pub use physics::PhysicsCalculation;
pub use process::{
    GamingProcess, PhysicsContext, ProcessConfig, ProcessRegistry, DEFAULT_COLLISION_EPSILON,
    DEFAULT_GRAVITY, DEFAULT_TIME_DELTA,
};
pub use sched::{NullScheduler, RealtimeScheduler, RecordingScheduler};
pub use slot::{IdSpace, SlotRegistry};
pub use status::{
    SubsystemStatus, ALL_CAPABILITIES, CAP_EXACT_PHYSICS, CAP_EXACT_RENDERING,
    CAP_LOW_LATENCY_INPUT, CAP_REALTIME_SCHEDULING, CAP_VRAM_MANAGEMENT,
};
pub use vram::VramAllocator;
