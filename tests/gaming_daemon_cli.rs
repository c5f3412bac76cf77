use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use serde_json::json;

fn write_config() -> PathBuf {
    let mut path = std::env::temp_dir();
    let unique = format!("gaming_daemon_config_{}.json", std::process::id());
    path.push(unique);

    let config = json!({
        "core": {"max_processes": 8, "max_input_devices": 4, "max_frame_buffers": 4},
        "steps": [
            {
                "op": "register_process",
                "pid": 7,
                "config": {"priority": 10, "exact_physics_enabled": true}
            },
            {
                "op": "calculate_physics",
                "pid": 7,
                "calculation": {"kind": "gravity", "mass": "2"}
            },
            {
                "op": "register_input_device",
                "device_id": 1,
                "config": {
                    "device_type": "Mouse",
                    "polling_rate_hz": 1000,
                    "low_latency_enabled": true,
                    "exact_precision_enabled": true
                }
            },
            {
                "op": "update_input_precision",
                "device_id": 1,
                "values": ["1.5", "2.5", "3.5", "0", "0", "0", "0", "0", "0"]
            },
            {"op": "create_frame_buffer", "width": 4, "height": 4, "format": "exact_quantum"},
            {
                "op": "render_exact_pixels",
                "buffer_id": 1,
                "pixels": [{"x": 1, "y": 2, "channels": ["0.5", "0.25", "0.125", "1"]}]
            },
            {"op": "probe_gpu_device"},
            {"op": "alloc_vram", "device_id": 1, "size": 4096, "alignment": 256},
            {"op": "unregister_process", "pid": 7},
            // a scenario may include operations the core rejects
            {"op": "unregister_process", "pid": 7},
            {"op": "print_status"}
        ]
    });

    let mut file = fs::File::create(&path).expect("create config");
    write!(file, "{}", serde_json::to_string_pretty(&config).unwrap()).expect("write config");
    path
}

#[test]
fn gaming_daemon_runs_from_config() {
    let config_path = write_config();
    let mut events_path = std::env::temp_dir();
    events_path.push(format!(
        "gaming_daemon_events_{}_.jsonl",
        std::process::id()
    ));

    let exe = env!("CARGO_BIN_EXE_gaming_daemon");
    let output = Command::new(exe)
        .arg(&config_path)
        .arg(&events_path)
        .output()
        .expect("run gaming daemon");

    fs::remove_file(&config_path).ok();

    assert!(
        output.status.success(),
        "gaming daemon failed: {:?}",
        output
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(stdout.contains("physics gravity for pid 7: 19.6133"));
    assert!(stdout.contains("rendered 1 exact pixels into buffer 1"));
    assert!(stdout.contains("step 9 (unregister_process) rejected"));
    assert!(stdout.contains("Gaming daemon summary"));

    let event_log = fs::read_to_string(&events_path).expect("read events");
    fs::remove_file(&events_path).ok();
    assert!(event_log.contains("\"kind\":\"initialized\""));
    assert!(event_log.contains("\"kind\":\"process_registered\""));
    assert!(event_log.contains("\"kind\":\"vram_allocated\""));
    assert!(event_log.contains("\"kind\":\"operation_rejected\""));
    assert!(event_log.contains("\"kind\":\"shutdown_completed\""));
}
