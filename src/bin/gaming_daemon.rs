use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::{env, process};

use anyhow::Context;
use gaming_kernel::{
    CoreConfig, CoreEvent, CoreMetrics, ExactPixel, GamingCore, GpuDeviceConfig, PhysicsCalculation,
    PixelFormat, PowerState, PrecisionSample,
};
use serde::Deserialize;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let config_path = args
        .next()
        .context("missing configuration path. usage: gaming_daemon <config> [events.jsonl]")?;
    let output_path = args.next().map(PathBuf::from);

    let file = File::open(&config_path)
        .with_context(|| format!("open configuration {config_path}"))?;
    let reader = BufReader::new(file);
    let config: DaemonConfig = serde_json::from_reader(reader).context("parse configuration")?;

    let core = GamingCore::with_defaults(config.core);
    core.init().context("initialize core")?;

    for (index, step) in config.steps.into_iter().enumerate() {
        // A rejected step is part of the scenario, not a daemon failure;
        // the event log records the rejection.
        if let Err(err) = apply_step(&core, &step) {
            println!("step {index} ({}) rejected: {err}", step.name());
        }
    }

    core.shutdown().context("shut down core")?;
    let events = core.drain_events();

    if let Some(path) = output_path {
        write_events(&events, path)?;
    }

    print_summary(&events);
    Ok(())
}

fn apply_step(core: &GamingCore, step: &DaemonStep) -> anyhow::Result<()> {
    match step {
        DaemonStep::RegisterProcess { pid, config } => {
            core.register_process(*pid, config.clone())?;
        }
        DaemonStep::UnregisterProcess { pid } => {
            core.unregister_process(*pid)?;
        }
        DaemonStep::UpdatePriority { pid, priority } => {
            core.update_priority(*pid, *priority)?;
        }
        DaemonStep::CalculatePhysics { pid, calculation } => {
            let result = core.calculate_exact_physics(*pid, calculation)?;
            println!("physics {} for pid {pid}: {result}", calculation.kind());
        }
        DaemonStep::RegisterInputDevice { device_id, config } => {
            core.register_input_device(*device_id, config.clone())?;
        }
        DaemonStep::UnregisterInputDevice { device_id } => {
            core.unregister_input_device(*device_id)?;
        }
        DaemonStep::UpdateInputPrecision { device_id, values } => {
            let engine = core.engine();
            let sample = PrecisionSample::from_strings(engine.as_ref(), values)?;
            let result = core.update_input_precision(*device_id, &sample);
            sample.release(engine.as_ref());
            result?;
        }
        DaemonStep::CreateFrameBuffer {
            width,
            height,
            format,
        } => {
            let buffer_id = core.create_frame_buffer(*width, *height, *format)?;
            println!("frame buffer {buffer_id} created");
        }
        DaemonStep::DestroyFrameBuffer { buffer_id } => {
            core.destroy_frame_buffer(*buffer_id)?;
        }
        DaemonStep::RenderExactPixels { buffer_id, pixels } => {
            let engine = core.engine();
            let mut batch = Vec::with_capacity(pixels.len());
            for spec in pixels {
                match ExactPixel::from_strings(engine.as_ref(), spec.x, spec.y, &spec.channels) {
                    Ok(pixel) => batch.push(pixel),
                    Err(err) => {
                        for pixel in batch {
                            pixel.release(engine.as_ref());
                        }
                        return Err(err.into());
                    }
                }
            }
            let result = core.render_exact_pixels(*buffer_id, &batch);
            for pixel in batch {
                pixel.release(engine.as_ref());
            }
            let written = result?;
            println!("rendered {written} exact pixels into buffer {buffer_id}");
        }
        DaemonStep::ProbeGpuDevice { config } => {
            let device_id = core.probe_gpu_device(config.clone())?;
            println!("gpu device {device_id} ready");
        }
        DaemonStep::RemoveGpuDevice { device_id } => {
            core.remove_gpu_device(*device_id)?;
        }
        DaemonStep::SetGpuPowerState { device_id, power } => {
            core.set_gpu_power_state(*device_id, *power)?;
        }
        DaemonStep::AllocVram {
            device_id,
            size,
            alignment,
        } => {
            let address = core.alloc_vram(*device_id, *size, *alignment)?;
            println!("vram {size} bytes at {address:#x} on device {device_id}");
        }
        DaemonStep::FreeVram { device_id, address } => {
            core.free_vram(*device_id, *address)?;
        }
        DaemonStep::CreateGpuContext { device_id, pid } => {
            let context_id = core.create_gpu_context(*device_id, *pid)?;
            println!("gpu context {context_id} created for pid {pid}");
        }
        DaemonStep::BindGpuContext { context_id } => {
            core.bind_gpu_context(*context_id)?;
        }
        DaemonStep::SetGpuViewport {
            context_id,
            viewport,
        } => {
            core.set_gpu_viewport(
                *context_id,
                (viewport[0], viewport[1], viewport[2], viewport[3]),
            )?;
        }
        DaemonStep::CreateCommandBuffer { device_id, size } => {
            let buffer_id = core.create_command_buffer(*device_id, *size)?;
            println!("command buffer {buffer_id} created on device {device_id}");
        }
        DaemonStep::RecordCommands {
            device_id,
            buffer_id,
            bytes,
        } => {
            core.record_commands(*device_id, *buffer_id, bytes)?;
        }
        DaemonStep::SubmitCommands {
            device_id,
            buffer_id,
        } => {
            core.submit_commands(*device_id, *buffer_id)?;
        }
        DaemonStep::CompleteCommands {
            device_id,
            buffer_id,
        } => {
            core.complete_commands(*device_id, *buffer_id)?;
        }
        DaemonStep::PrintStatus => {
            let status = core.get_status();
            println!(
                "status: processes={} devices={} buffers={}",
                status.active_process_count,
                status.registered_device_count,
                status.active_buffer_count
            );
        }
    }
    Ok(())
}

fn write_events(events: &[CoreEvent], path: PathBuf) -> anyhow::Result<()> {
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for event in events {
        let line = serde_json::to_string(&event.to_json())?;
        writeln!(writer, "{}", line)?;
    }

    writer.flush()?;
    Ok(())
}

fn print_summary(events: &[CoreEvent]) {
    if events.is_empty() {
        println!("Gaming daemon processed no events.");
        return;
    }

    println!();
    println!("Gaming daemon summary:");
    println!("  total events: {}", events.len());
    println!("{}", CoreMetrics::from_events(events).render_report());
}

#[derive(Debug, Deserialize)]
struct DaemonConfig {
    #[serde(default)]
    core: CoreConfig,
    #[serde(default)]
    steps: Vec<DaemonStep>,
}

#[derive(Debug, Deserialize)]
struct PixelSpec {
    x: u32,
    y: u32,
    channels: [String; 4],
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DaemonStep {
    RegisterProcess {
        pid: u32,
        #[serde(default)]
        config: gaming_kernel::ProcessConfig,
    },
    UnregisterProcess {
        pid: u32,
    },
    UpdatePriority {
        pid: u32,
        priority: u8,
    },
    CalculatePhysics {
        pid: u32,
        calculation: PhysicsCalculation,
    },
    RegisterInputDevice {
        device_id: u32,
        config: gaming_kernel::DeviceConfig,
    },
    UnregisterInputDevice {
        device_id: u32,
    },
    UpdateInputPrecision {
        device_id: u32,
        values: Box<[String; 9]>,
    },
    CreateFrameBuffer {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    DestroyFrameBuffer {
        buffer_id: u32,
    },
    RenderExactPixels {
        buffer_id: u32,
        pixels: Vec<PixelSpec>,
    },
    ProbeGpuDevice {
        #[serde(default)]
        config: GpuDeviceConfig,
    },
    RemoveGpuDevice {
        device_id: u32,
    },
    SetGpuPowerState {
        device_id: u32,
        power: PowerState,
    },
    AllocVram {
        device_id: u32,
        size: u64,
        alignment: u64,
    },
    FreeVram {
        device_id: u32,
        address: u64,
    },
    CreateGpuContext {
        device_id: u32,
        pid: u32,
    },
    BindGpuContext {
        context_id: u32,
    },
    SetGpuViewport {
        context_id: u32,
        viewport: [u32; 4],
    },
    CreateCommandBuffer {
        device_id: u32,
        size: usize,
    },
    RecordCommands {
        device_id: u32,
        buffer_id: u32,
        #[serde(default)]
        bytes: Vec<u8>,
    },
    SubmitCommands {
        device_id: u32,
        buffer_id: u32,
    },
    CompleteCommands {
        device_id: u32,
        buffer_id: u32,
    },
    PrintStatus,
}

impl DaemonStep {
    fn name(&self) -> &'static str {
        match self {
            DaemonStep::RegisterProcess { .. } => "register_process",
            DaemonStep::UnregisterProcess { .. } => "unregister_process",
            DaemonStep::UpdatePriority { .. } => "update_priority",
            DaemonStep::CalculatePhysics { .. } => "calculate_physics",
            DaemonStep::RegisterInputDevice { .. } => "register_input_device",
            DaemonStep::UnregisterInputDevice { .. } => "unregister_input_device",
            DaemonStep::UpdateInputPrecision { .. } => "update_input_precision",
            DaemonStep::CreateFrameBuffer { .. } => "create_frame_buffer",
            DaemonStep::DestroyFrameBuffer { .. } => "destroy_frame_buffer",
            DaemonStep::RenderExactPixels { .. } => "render_exact_pixels",
            DaemonStep::ProbeGpuDevice { .. } => "probe_gpu_device",
            DaemonStep::RemoveGpuDevice { .. } => "remove_gpu_device",
            DaemonStep::SetGpuPowerState { .. } => "set_gpu_power_state",
            DaemonStep::AllocVram { .. } => "alloc_vram",
            DaemonStep::FreeVram { .. } => "free_vram",
            DaemonStep::CreateGpuContext { .. } => "create_gpu_context",
            DaemonStep::BindGpuContext { .. } => "bind_gpu_context",
            DaemonStep::SetGpuViewport { .. } => "set_gpu_viewport",
            DaemonStep::CreateCommandBuffer { .. } => "create_command_buffer",
            DaemonStep::RecordCommands { .. } => "record_commands",
            DaemonStep::SubmitCommands { .. } => "submit_commands",
            DaemonStep::CompleteCommands { .. } => "complete_commands",
            DaemonStep::PrintStatus => "print_status",
        }
    }
}
