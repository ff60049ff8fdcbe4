//! Camera rig declarations and output layout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Modality, SensorHandle};

/// One named camera group.
///
/// `x_locs`, `y_locs` and `z_locs` are parallel lists: position `i` sits at
/// `(x_locs[i], y_locs[i], z_locs[i])` relative to the vehicle origin. All
/// cameras of the group share `rot_yaw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigSpec {
    pub name: String,
    pub x_locs: Vec<f64>,
    pub y_locs: Vec<f64>,
    pub z_locs: Vec<f64>,
    #[serde(default)]
    pub rot_yaw: f64,
    pub sensor_types: Vec<Modality>,
}

impl RigSpec {
    /// Number of mount positions (length of every axis list once validated)
    pub fn positions(&self) -> usize {
        self.x_locs.len()
    }

    pub fn has_consistent_axes(&self) -> bool {
        self.x_locs.len() == self.y_locs.len() && self.x_locs.len() == self.z_locs.len()
    }

    /// Number of cameras this group attaches
    pub fn camera_count(&self) -> usize {
        self.positions() * self.sensor_types.len()
    }
}

/// The three stock rigs: a lateral baseline, a longitudinal baseline looking
/// forward, and the same longitudinal baseline looking sideways.
pub fn default_camera_rigs() -> Vec<RigSpec> {
    let sensor_types = vec![
        Modality::Rgb,
        Modality::SemanticSegmentation,
        Modality::Depth,
    ];
    let longitudinal = vec![1.84, 2.38, 2.92, 3.46, 4.0];

    vec![
        RigSpec {
            name: "HorizontalCameras".into(),
            x_locs: vec![2.92; 5],
            y_locs: vec![-1.08, -0.54, 0.0, 0.54, 1.08],
            z_locs: vec![1.8; 5],
            rot_yaw: 0.0,
            sensor_types: sensor_types.clone(),
        },
        RigSpec {
            name: "ForwardCameras".into(),
            x_locs: longitudinal.clone(),
            y_locs: vec![0.0; 5],
            z_locs: vec![1.8; 5],
            rot_yaw: 0.0,
            sensor_types: sensor_types.clone(),
        },
        RigSpec {
            name: "SideCameras".into(),
            x_locs: longitudinal,
            y_locs: vec![0.0; 5],
            z_locs: vec![1.8; 5],
            rot_yaw: 90.0,
            sensor_types,
        },
    ]
}

/// Which camera groups a run attaches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CameraSelection {
    #[default]
    All,
    Group(String),
}

impl CameraSelection {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Group(value.to_string())
        }
    }

    pub fn includes(&self, group: &str) -> bool {
        match self {
            Self::All => true,
            Self::Group(name) => name == group,
        }
    }
}

impl fmt::Display for CameraSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Group(name) => f.write_str(name),
        }
    }
}

impl Serialize for CameraSelection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CameraSelection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| Self::parse(&s))
    }
}

/// Destination of one sensor's images.
///
/// A rig's slot list is index-aligned with its sensor list.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    pub sensor: SensorHandle,
    pub dir: PathBuf,
}

impl OutputSlot {
    /// `{dir}/{index:06}.{ext}`
    pub fn frame_path(&self, index: u64, extension: &str) -> PathBuf {
        self.dir.join(format!("{index:06}.{extension}"))
    }
}

/// Directory scheme `{root}/{town}/weather_{id:02}/{group}_{pos:02}/{modality}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub town: String,
    pub weather_id: u8,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, town: impl Into<String>, weather_id: u8) -> Self {
        Self {
            root: root.into(),
            town: town.into(),
            weather_id,
        }
    }

    /// Run directory shared by every camera
    pub fn run_dir(&self) -> PathBuf {
        self.root
            .join(&self.town)
            .join(format!("weather_{:02}", self.weather_id))
    }

    pub fn camera_dir(&self, group: &str, position: usize, modality: Modality) -> PathBuf {
        self.run_dir()
            .join(format!("{group}_{position:02}"))
            .join(modality.as_str())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
