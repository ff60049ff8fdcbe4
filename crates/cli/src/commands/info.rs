//! `info` command implementation.

use actor_factory::{plan_rig, CameraPlacement};
use anyhow::{Context, Result};
use contracts::CaptureConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Rig plan for JSON output
#[derive(Serialize)]
struct CaptureInfo {
    version: String,
    simulator: SimulatorInfo,
    capture: CadenceInfo,
    output_dir: String,
    groups: Vec<GroupInfo>,
    camera_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cameras: Vec<CameraInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SimulatorInfo {
    town: String,
    host: String,
    port: u16,
    weather_id: u8,
    weather: String,
    seed: u64,
}

#[derive(Serialize)]
struct CadenceInfo {
    fps: f64,
    samples: u64,
    stride: u64,
    offset: u64,
    total_steps: u64,
}

#[derive(Serialize)]
struct GroupInfo {
    name: String,
    positions: usize,
    modalities: Vec<String>,
    cameras: usize,
}

#[derive(Serialize)]
struct CameraInfo {
    name: String,
    blueprint: String,
    location: [f64; 3],
    yaw: f64,
    dir: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    info!(town = %config.simulator.town, "Planning camera rig");

    let placements = plan_rig(
        &config.rigs,
        &config.camera_group,
        &config.output_layout(),
        &config.camera,
    )
    .context("Failed to plan camera rig")?;

    if args.json {
        let info = build_capture_info(&config, &placements, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize capture info")?;
        println!("{}", json);
    } else {
        print_capture_info(&config, &placements, args);
    }

    Ok(())
}

fn build_capture_info(
    config: &CaptureConfig,
    placements: &[CameraPlacement],
    args: &InfoArgs,
) -> CaptureInfo {
    let capture = &config.capture;

    let groups = config
        .selected_rigs()
        .map(|rig| GroupInfo {
            name: rig.name.clone(),
            positions: rig.positions(),
            modalities: rig.sensor_types.iter().map(|m| m.to_string()).collect(),
            cameras: rig.camera_count(),
        })
        .collect();

    let cameras = if args.sensors {
        placements
            .iter()
            .map(|p| CameraInfo {
                name: p.name.to_string(),
                blueprint: p.blueprint().to_string(),
                location: [
                    p.transform.location.x,
                    p.transform.location.y,
                    p.transform.location.z,
                ],
                yaw: p.transform.rotation.yaw,
                dir: p.dir.display().to_string(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        config
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
            })
            .collect()
    } else {
        Vec::new()
    };

    CaptureInfo {
        version: format!("{:?}", config.version),
        simulator: SimulatorInfo {
            town: config.simulator.town.clone(),
            host: config.simulator.host.clone(),
            port: config.simulator.port,
            weather_id: config.weather_id,
            weather: config
                .weather()
                .map_or_else(|| "unknown".to_string(), |w| format!("{w:?}")),
            seed: config.seed(),
        },
        capture: CadenceInfo {
            fps: capture.fps,
            samples: capture.samples,
            stride: capture.stride,
            offset: capture.offset,
            total_steps: capture.offset + capture.samples * capture.stride,
        },
        output_dir: config.output_layout().run_dir().display().to_string(),
        groups,
        camera_count: placements.len(),
        cameras,
        sinks,
    }
}

fn print_capture_info(config: &CaptureConfig, placements: &[CameraPlacement], args: &InfoArgs) {
    println!("=== CARLA Capture Plan ===\n");

    println!("World");
    println!("   Town: {}", config.simulator.town);
    println!(
        "   CARLA Server: {}:{}",
        config.simulator.host, config.simulator.port
    );
    println!("   Weather: {} ({:?})", config.weather_id, config.weather());
    println!("   Mode: {:?}, seed {}", config.mode, config.seed());

    let capture = &config.capture;
    println!("\nCadence");
    println!("   FPS: {}", capture.fps);
    println!(
        "   Record {} frames, every {} steps, after {} warm-up steps",
        capture.samples, capture.stride, capture.offset
    );

    println!("\nCameras ({})", placements.len());
    for rig in config.selected_rigs() {
        println!(
            "   {} - {} positions x {:?} = {}",
            rig.name,
            rig.positions(),
            rig.sensor_types,
            rig.camera_count()
        );
    }

    if args.sensors {
        println!();
        for p in placements {
            let loc = &p.transform.location;
            println!(
                "   {:<36} ({:>5.2}, {:>5.2}, {:>5.2}) yaw {:>6.1}  -> {}",
                p.name.as_str(),
                loc.x,
                loc.y,
                loc.z,
                p.transform.rotation.yaw,
                p.dir.display()
            );
        }
    }

    println!("\nOutput");
    println!("   {}", config.output_layout().run_dir().display());

    if args.sinks && !config.sinks.is_empty() {
        println!("\nSinks ({})", config.sinks.len());
        for sink in &config.sinks {
            println!("   {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigArgs;
    use contracts::CameraSelection;

    fn args(sensors: bool) -> InfoArgs {
        InfoArgs {
            config: ConfigArgs::default(),
            json: true,
            sensors,
            sinks: true,
        }
    }

    #[test]
    fn test_info_lists_every_camera() {
        let config = CaptureConfig::default();
        let placements = plan_rig(
            &config.rigs,
            &config.camera_group,
            &config.output_layout(),
            &config.camera,
        )
        .unwrap();

        let info = build_capture_info(&config, &placements, &args(true));
        assert_eq!(info.camera_count, 45);
        assert_eq!(info.cameras.len(), 45);
        assert_eq!(info.groups.len(), 3);
        assert_eq!(info.capture.total_steps, 10_100);
        assert!(info.cameras[0].dir.ends_with("rgb"));
    }

    #[test]
    fn test_single_group() {
        let mut config = CaptureConfig::default();
        config.camera_group = CameraSelection::Group("SideCameras".to_string());
        let placements = plan_rig(
            &config.rigs,
            &config.camera_group,
            &config.output_layout(),
            &config.camera,
        )
        .unwrap();

        let info = build_capture_info(&config, &placements, &args(false));
        assert_eq!(info.camera_count, 15);
        assert!(info.cameras.is_empty());
        assert_eq!(info.groups[0].name, "SideCameras");
    }
}
