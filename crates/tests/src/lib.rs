//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置快照测试
//! - 基于 MockSimulator 的 e2e 采集测试（无需 CARLA）

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::CaptureConfig;

    #[test]
    fn test_default_config_survives_toml() {
        let config = CaptureConfig::default();
        let text = ConfigLoader::to_toml(&config).unwrap();
        let back = ConfigLoader::load_from_str(&text, ConfigFormat::Toml).unwrap();

        assert_eq!(back.rigs, config.rigs);
        assert_eq!(back.capture.samples, config.capture.samples);
        assert_eq!(back.simulator.town, config.simulator.town);
        assert_eq!(back.sinks.len(), config.sinks.len());
    }

    #[test]
    fn test_shipped_capture_toml_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../capture.toml");
        let config = ConfigLoader::load_from_path(std::path::Path::new(path)).unwrap();
        assert_eq!(config.selected_rigs().count(), 3);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::time::Duration;

    use actor_factory::{ActorFactory, MockConfig, MockSimulator, SensorSilence, SimulatorClient};
    use carla_capture_cli::Pipeline;
    use contracts::{CameraSelection, CaptureConfig, Modality, RigSpec};
    use dispatcher::{create_dispatcher, FrameSink, MANIFEST_FILE};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sync_engine::{CaptureScheduler, StepSynchronizer};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    /// Two groups, two positions, two modalities: 8 cameras of 8x6 pixels
    fn small_config(root: &Path) -> CaptureConfig {
        let mut config = CaptureConfig::default();
        config.output.root = root.to_path_buf();
        config.rigs = vec![
            RigSpec {
                name: "Front".to_string(),
                x_locs: vec![2.0, 2.5],
                y_locs: vec![0.0, 0.0],
                z_locs: vec![1.8, 1.8],
                rot_yaw: 0.0,
                sensor_types: vec![Modality::Rgb, Modality::Depth],
            },
            RigSpec {
                name: "Side".to_string(),
                x_locs: vec![2.0, 2.5],
                y_locs: vec![0.0, 0.0],
                z_locs: vec![1.8, 1.8],
                rot_yaw: 90.0,
                sensor_types: vec![Modality::Rgb, Modality::SemanticSegmentation],
            },
        ];
        config.camera_group = CameraSelection::All;
        config.camera.image_width = 8;
        config.camera.image_height = 6;
        config.capture.samples = 4;
        config.capture.stride = 3;
        config.capture.offset = 5;
        config.capture.step_timeout_s = 2.0;
        config.capture.progress_every = 0;
        config.population.vehicles = 6;
        config.population.pedestrians = 6;
        config
    }

    fn recorded(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Full chain by hand: world -> rig -> synchronizer -> scheduler -> dispatcher
    #[tokio::test]
    async fn test_e2e_mock_capture() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());

        let mut sim = MockSimulator::with_config(MockConfig {
            delivery_delay: Duration::from_millis(1),
            max_jitter: Duration::from_millis(3),
            ..Default::default()
        });
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();

        let factory = ActorFactory::new(sim.clone());
        let mut rng = StdRng::seed_from_u64(config.seed());
        let (graph, rig) = factory.spawn_world(&config, &mut rng).await.unwrap();
        assert_eq!(rig.len(), 8);
        assert_eq!(rig.sensors.len(), rig.slots.len());

        let mut dispatcher = create_dispatcher(&config, rig.slots.clone()).unwrap();
        let sources = rig.sources(&sim).unwrap();
        let mut sync = StepSynchronizer::enter(sim.clone(), sources, config.capture.fps)
            .await
            .unwrap();

        let report = CaptureScheduler::from_settings(&config.capture)
            .run(&mut sync, &mut dispatcher, &CancellationToken::new())
            .await
            .unwrap();
        sync.exit().await.unwrap();
        dispatcher.close().await.unwrap();
        factory.teardown(&graph).await.unwrap();

        assert_eq!(report.steps_run, 5 + 4 * 3);
        assert_eq!(report.frames_recorded, 4);
        assert_eq!(sim.actor_count(), 0);

        let expected: Vec<String> = (0..4).map(|i| format!("{i:06}.png")).collect();
        for slot in &rig.slots {
            assert_eq!(recorded(&slot.dir), expected, "slot {}", slot.sensor.name);
        }

        // slot order is group -> modality -> position
        let names: Vec<&str> = rig.slots.iter().map(|s| s.sensor.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Front_00/rgb",
                "Front_01/rgb",
                "Front_00/depth",
                "Front_01/depth",
                "Side_00/rgb",
                "Side_01/rgb",
                "Side_00/semantic_segmentation",
                "Side_01/semantic_segmentation",
            ]
        );

        let img = image::open(rig.slots[0].dir.join("000003.png")).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));

        let manifest_path = config.output_layout().run_dir().join(MANIFEST_FILE);
        let manifest = std::fs::read_to_string(manifest_path).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        let steps: Vec<u64> = manifest["frames"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["step"].as_u64().unwrap())
            .collect();
        assert_eq!(steps.len(), 4);
        assert!(steps.windows(2).all(|w| w[1] - w[0] == 3));
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end() {
        let dir = tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.weather_id = 2;
        let sim = MockSimulator::new();

        let stats = Pipeline::new(config.clone(), sim.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(stats.frames_recorded, 4);
        assert_eq!(stats.cameras, 8);
        assert_eq!(stats.images(), 32);
        assert_eq!(sim.actor_count(), 0);
        assert!(!sim.current_settings().synchronous_mode);
        assert_eq!(sim.weather(), config.weather());
        assert!(dir
            .path()
            .join("Town01/weather_02/Side_01/semantic_segmentation/000003.png")
            .exists());
    }

    /// A camera that goes quiet aborts the run; what was recorded before
    /// stays on disk and the world is cleaned up.
    #[tokio::test]
    async fn test_silent_sensor_aborts_run() {
        let dir = tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.capture.step_timeout_s = 0.3;

        // quiet after the first 12 steps: indices 0 (counter 5), 1 (8) and 2 (11) land
        let sim = MockSimulator::with_config(MockConfig {
            silent_sensors: vec![SensorSilence {
                role_name: "Side_01/rgb".to_string(),
                after_samples: 12,
            }],
            ..Default::default()
        });

        let err = Pipeline::new(config.clone(), sim.clone())
            .run()
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("timed out") || message.contains("Side_01/rgb"), "{message}");

        let layout = config.output_layout();
        let front = layout.camera_dir("Front", 0, Modality::Rgb);
        assert_eq!(recorded(&front), vec!["000000.png", "000001.png", "000002.png"]);
        assert!(!front.join("000003.png").exists());

        assert_eq!(sim.actor_count(), 0);
        assert!(!sim.current_settings().synchronous_mode);
    }

    /// A camera that never delivers: nothing is written and the world is
    /// handed back untouched.
    #[tokio::test]
    async fn test_mute_sensor_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.capture.step_timeout_s = 0.2;

        let sim = MockSimulator::with_config(MockConfig {
            silent_sensors: vec![SensorSilence {
                role_name: "Front_00/depth".to_string(),
                after_samples: 0,
            }],
            ..Default::default()
        });

        let err = Pipeline::new(config.clone(), sim.clone())
            .run()
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Front_00/depth"), "{message}");

        let layout = config.output_layout();
        let first = [
            ("Front", Modality::Rgb),
            ("Side", Modality::SemanticSegmentation),
        ];
        for (group, modality) in first {
            let cam = layout.camera_dir(group, 0, modality);
            assert!(!cam.join("000000.png").exists(), "{}", cam.display());
        }
        assert_eq!(sim.actor_count(), 0);
        assert!(!sim.current_settings().synchronous_mode);
        assert_eq!(sim.settings_history().last(), Some(&sim.current_settings()));
    }

    #[tokio::test]
    async fn test_failed_batch_item_shrinks_population() {
        let dir = tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.population.vehicles = 10;
        config.population.pedestrians = 0;
        config.capture.samples = 1;

        let sim = MockSimulator::with_config(MockConfig {
            fail_batch_items: vec![3],
            ..Default::default()
        });

        let stats = Pipeline::new(config, sim.clone()).run().await.unwrap();
        // ego + 8 cameras + 9 of 10 traffic vehicles
        assert_eq!(stats.actors, 1 + 8 + 9);
        assert_eq!(stats.frames_recorded, 1);
        assert_eq!(sim.actor_count(), 0);
    }
}
