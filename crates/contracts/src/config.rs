//! CaptureConfig - Config Loader 输出
//!
//! Describes one capture run: simulator session, weather, cadence, population,
//! camera rigs and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::{default_camera_rigs, CameraSelection, Modality, OutputLayout, RigSpec};

/// Config schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Full description of a capture run
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Index into the weather preset table (0..=3)
    #[serde(default)]
    #[validate(range(max = 3))]
    pub weather_id: u8,

    #[serde(default)]
    pub mode: RunMode,

    #[serde(default)]
    pub camera_group: CameraSelection,

    #[serde(default)]
    #[validate(nested)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    #[validate(nested)]
    pub capture: CaptureSettings,

    #[serde(default)]
    #[validate(nested)]
    pub population: PopulationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub camera: CameraIntrinsics,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default = "default_camera_rigs")]
    pub rigs: Vec<RigSpec>,

    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            simulator: SimulatorConfig::default(),
            weather_id: 0,
            mode: RunMode::Train,
            capture: CaptureSettings::default(),
            population: PopulationConfig::default(),
            camera: CameraIntrinsics::default(),
            output: OutputConfig::default(),
            rigs: default_camera_rigs(),
            camera_group: CameraSelection::All,
            sinks: default_sinks(),
        }
    }
}

impl CaptureConfig {
    /// RNG seed of this run (mode base + 100 per weather preset)
    pub fn seed(&self) -> u64 {
        self.mode.seed_base() + 100 * u64::from(self.weather_id)
    }

    pub fn weather(&self) -> Option<WeatherPreset> {
        WeatherPreset::from_id(self.weather_id)
    }

    /// Output layout with the run mode applied to the root
    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout::new(
            self.mode.output_root(&self.output.root),
            self.simulator.town.clone(),
            self.weather_id,
        )
    }

    /// Rigs picked by `camera_group`, in declaration order
    pub fn selected_rigs(&self) -> impl Iterator<Item = &RigSpec> {
        self.rigs
            .iter()
            .filter(|rig| self.camera_group.includes(&rig.name))
    }
}

/// Upper bound of every configured timeout (seconds)
pub const MAX_TIMEOUT_S: f64 = 3600.0;

/// Seconds as a `Duration`, clamped to `0..=MAX_TIMEOUT_S`
fn timeout_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_TIMEOUT_S)).unwrap_or(Duration::ZERO)
}

/// Simulator session settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SimulatorConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Client request timeout (seconds)
    #[serde(default = "default_client_timeout")]
    #[validate(range(exclusive_min = 0.0, max = 3600.0))]
    pub timeout_s: f64,

    /// Map to load (e.g. "Town01")
    #[serde(default = "default_town")]
    pub town: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_s: default_client_timeout(),
            town: default_town(),
        }
    }
}

impl SimulatorConfig {
    /// Client request timeout
    pub fn timeout(&self) -> Duration {
        timeout_duration(self.timeout_s)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    2000
}

fn default_client_timeout() -> f64 {
    10.0
}

fn default_town() -> String {
    "Town01".to_string()
}

/// Train / test split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Train,
    Test,
}

impl RunMode {
    fn seed_base(self) -> u64 {
        match self {
            RunMode::Train => 1234,
            RunMode::Test => 123,
        }
    }

    /// Test runs write next to the train set under `{root}_test`
    pub fn output_root(self, root: &std::path::Path) -> PathBuf {
        match self {
            RunMode::Train => root.to_path_buf(),
            RunMode::Test => {
                let mut name = root.as_os_str().to_os_string();
                name.push("_test");
                PathBuf::from(name)
            }
        }
    }
}

/// Sampling cadence
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureSettings {
    /// Simulation steps per simulated second
    #[serde(default = "default_fps")]
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub fps: f64,

    /// Steps between two recorded frames
    #[serde(default = "default_stride")]
    #[validate(range(min = 1))]
    pub stride: u64,

    /// Warm-up steps before the first recorded frame
    #[serde(default = "default_offset")]
    pub offset: u64,

    /// Number of frames to record
    #[serde(default = "default_samples")]
    #[validate(range(min = 1))]
    pub samples: u64,

    /// Wall-clock budget of one collecting step (seconds)
    #[serde(default = "default_step_timeout")]
    #[validate(range(exclusive_min = 0.0, max = 3600.0))]
    pub step_timeout_s: f64,

    /// Progress log period in steps (0 disables)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            stride: default_stride(),
            offset: default_offset(),
            samples: default_samples(),
            step_timeout_s: default_step_timeout(),
            progress_every: default_progress_every(),
        }
    }
}

impl CaptureSettings {
    /// Fixed simulation delta per step (seconds)
    pub fn fixed_delta_seconds(&self) -> f64 {
        1.0 / self.fps
    }

    /// Wall-clock budget of one collecting step
    pub fn step_timeout(&self) -> Duration {
        timeout_duration(self.step_timeout_s)
    }

    /// World steps of the run (`offset + samples * stride`), `None` on
    /// overflow
    pub fn total_steps(&self) -> Option<u64> {
        self.samples
            .checked_mul(self.stride.max(1))?
            .checked_add(self.offset)
    }
}

fn default_fps() -> f64 {
    30.0
}

fn default_stride() -> u64 {
    10
}

fn default_offset() -> u64 {
    100
}

fn default_samples() -> u64 {
    1000
}

fn default_step_timeout() -> f64 {
    3.0
}

fn default_progress_every() -> u64 {
    500
}

/// Traffic and pedestrians
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PopulationConfig {
    #[serde(default = "default_vehicles")]
    #[validate(range(max = 1000))]
    pub vehicles: usize,

    #[serde(default = "default_pedestrians")]
    #[validate(range(max = 1000))]
    pub pedestrians: usize,

    /// Blueprint filter for the ego vehicle
    #[serde(default = "default_vehicle_filter")]
    pub ego_filter: String,

    #[serde(default = "default_vehicle_filter")]
    pub vehicle_filter: String,

    #[serde(default = "default_walker_filter")]
    pub walker_filter: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            vehicles: default_vehicles(),
            pedestrians: default_pedestrians(),
            ego_filter: default_vehicle_filter(),
            vehicle_filter: default_vehicle_filter(),
            walker_filter: default_walker_filter(),
        }
    }
}

fn default_vehicles() -> usize {
    100
}

fn default_pedestrians() -> usize {
    100
}

fn default_vehicle_filter() -> String {
    "vehicle.*".to_string()
}

fn default_walker_filter() -> String {
    "walker.pedestrian.*".to_string()
}

/// Shared camera attributes
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CameraIntrinsics {
    #[serde(default = "default_width")]
    #[validate(range(min = 1, max = 8192))]
    pub image_width: u32,

    #[serde(default = "default_height")]
    #[validate(range(min = 1, max = 8192))]
    pub image_height: u32,

    /// Horizontal field of view (degrees)
    #[serde(default = "default_fov")]
    #[validate(range(exclusive_min = 0.0, exclusive_max = 180.0))]
    pub fov: f64,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            image_width: default_width(),
            image_height: default_height(),
            fov: default_fov(),
        }
    }
}

impl CameraIntrinsics {
    /// Blueprint attributes shared by every camera
    pub fn attributes(&self) -> Vec<(String, String)> {
        vec![
            ("image_size_x".to_string(), self.image_width.to_string()),
            ("image_size_y".to_string(), self.image_height.to_string()),
            ("fov".to_string(), self.fov.to_string()),
        ]
    }
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_fov() -> f64 {
    90.0
}

/// Dataset location and encoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,

    /// Image file extension, also selects the encoder
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub converters: ConverterConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            extension: default_extension(),
            converters: ConverterConfig::default(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_extension() -> String {
    "png".to_string()
}

/// Color conversion applied before an image is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorConverter {
    /// Pixels as delivered by the simulator
    #[default]
    Raw,
    /// Linear depth in meters encoded as grayscale
    Depth,
    /// Logarithmic depth grayscale (more contrast close to the camera)
    LogarithmicDepth,
    /// Semantic tags mapped to the CityScapes palette
    #[serde(rename = "cityscapes_palette")]
    CityScapesPalette,
}

/// Converter per modality
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub rgb: ColorConverter,
    #[serde(default)]
    pub depth: ColorConverter,
    #[serde(default)]
    pub semantic_segmentation: ColorConverter,
}

impl ConverterConfig {
    pub fn for_modality(&self, modality: Modality) -> ColorConverter {
        match modality {
            Modality::Rgb => self.rgb,
            Modality::Depth => self.depth,
            Modality::SemanticSegmentation => self.semantic_segmentation,
        }
    }
}

/// Weather presets addressable by `weather_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherPreset {
    ClearNoon,
    /// Keep the map's own weather
    Default,
    CloudyNoon,
    ClearSunset,
}

impl WeatherPreset {
    pub const TABLE: [WeatherPreset; 4] = [
        WeatherPreset::ClearNoon,
        WeatherPreset::Default,
        WeatherPreset::CloudyNoon,
        WeatherPreset::ClearSunset,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::TABLE.get(usize::from(id)).copied()
    }

    /// Parameters to apply, `None` for the map default
    pub fn params(self) -> Option<WeatherParams> {
        let clear = WeatherParams {
            cloudiness: 5.0,
            precipitation: 0.0,
            precipitation_deposits: 0.0,
            wind_intensity: 10.0,
            sun_azimuth_angle: -1.0,
            sun_altitude_angle: 45.0,
        };
        match self {
            WeatherPreset::Default => None,
            WeatherPreset::ClearNoon => Some(clear),
            WeatherPreset::CloudyNoon => Some(WeatherParams {
                cloudiness: 60.0,
                ..clear
            }),
            WeatherPreset::ClearSunset => Some(WeatherParams {
                sun_altitude_angle: 15.0,
                ..clear
            }),
        }
    }
}

/// Weather parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherParams {
    pub cloudiness: f32,
    pub precipitation: f32,
    pub precipitation_deposits: f32,
    pub wind_intensity: f32,
    pub sun_azimuth_angle: f32,
    pub sun_altitude_angle: f32,
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,

    pub sink_type: SinkType,

    /// Type specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// One image file per sample, in the sample's output slot
    Image,
    /// Per-frame log line
    Log,
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig {
        name: "images".to_string(),
        sink_type: SinkType::Image,
        params: HashMap::new(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = CaptureConfig::default();
        assert_eq!(config.capture.fps, 30.0);
        assert_eq!(config.capture.stride, 10);
        assert_eq!(config.capture.offset, 100);
        assert_eq!(config.capture.samples, 1000);
        assert_eq!(config.population.vehicles, 100);
        assert_eq!(config.population.pedestrians, 100);
        assert_eq!(config.camera.image_width, 800);
        assert_eq!(config.camera.image_height, 600);
        assert_eq!(config.simulator.port, 2000);
        assert_eq!(config.rigs.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_seed_per_mode_and_weather() {
        let mut config = CaptureConfig::default();
        config.weather_id = 2;
        assert_eq!(config.seed(), 1434);

        config.mode = RunMode::Test;
        assert_eq!(config.seed(), 323);
    }

    #[test]
    fn test_test_mode_suffixes_root() {
        let mut config = CaptureConfig::default();
        config.output.root = PathBuf::from("/data/carla");
        config.mode = RunMode::Test;
        config.weather_id = 1;
        let layout = config.output_layout();
        assert_eq!(layout.root, PathBuf::from("/data/carla_test"));
        assert_eq!(layout.run_dir(), PathBuf::from("/data/carla_test/Town01/weather_01"));
    }

    #[test]
    fn test_timeouts_bounded() {
        let mut config = CaptureConfig::default();
        assert_eq!(config.capture.step_timeout(), Duration::from_secs(3));
        assert_eq!(config.simulator.timeout(), Duration::from_secs(10));

        config.capture.step_timeout_s = 1e30;
        config.simulator.timeout_s = f64::INFINITY;
        let text = config.validate().unwrap_err().to_string();
        assert!(text.contains("step_timeout_s"));
        assert!(text.contains("timeout_s"));

        // unvalidated values are clamped instead of panicking
        assert_eq!(config.capture.step_timeout(), Duration::from_secs(3600));
        assert_eq!(config.simulator.timeout(), Duration::from_secs(3600));
        config.capture.step_timeout_s = f64::NAN;
        assert_eq!(config.capture.step_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_total_steps_overflow() {
        let mut capture = CaptureSettings::default();
        assert_eq!(capture.total_steps(), Some(10_100));
        capture.samples = u64::MAX / 2;
        assert_eq!(capture.total_steps(), None);
        capture.samples = 1;
        capture.stride = 1;
        capture.offset = u64::MAX;
        assert_eq!(capture.total_steps(), None);
    }

    #[test]
    fn test_weather_table() {
        assert_eq!(WeatherPreset::from_id(0), Some(WeatherPreset::ClearNoon));
        assert_eq!(WeatherPreset::from_id(1), Some(WeatherPreset::Default));
        assert_eq!(WeatherPreset::from_id(3), Some(WeatherPreset::ClearSunset));
        assert_eq!(WeatherPreset::from_id(4), None);
        assert!(WeatherPreset::Default.params().is_none());
        let sunset = WeatherPreset::ClearSunset.params().unwrap();
        assert_eq!(sunset.sun_altitude_angle, 15.0);
    }

    #[test]
    fn test_range_violations_detected() {
        let mut config = CaptureConfig::default();
        config.capture.stride = 0;
        config.weather_id = 9;
        config.camera.fov = 0.0;
        let errors = config.validate().unwrap_err();
        let text = errors.to_string();
        assert!(text.contains("stride"));
        assert!(text.contains("weather_id"));
        assert!(text.contains("fov"));
    }

    #[test]
    fn test_selected_rigs() {
        let mut config = CaptureConfig::default();
        config.camera_group = CameraSelection::parse("SideCameras");
        let names: Vec<_> = config.selected_rigs().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["SideCameras"]);
    }

    #[test]
    fn test_converter_lookup() {
        let converters = ConverterConfig {
            depth: ColorConverter::LogarithmicDepth,
            ..Default::default()
        };
        assert_eq!(converters.for_modality(Modality::Depth), ColorConverter::LogarithmicDepth);
        assert_eq!(converters.for_modality(Modality::Rgb), ColorConverter::Raw);
    }

    #[test]
    fn test_converter_names() {
        let json = serde_json::to_string(&ColorConverter::CityScapesPalette).unwrap();
        assert_eq!(json, "\"cityscapes_palette\"");
        let depth: ColorConverter = serde_json::from_str("\"logarithmic_depth\"").unwrap();
        assert_eq!(depth, ColorConverter::LogarithmicDepth);
    }
}
