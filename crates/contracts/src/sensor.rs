//! Sensor-side data model: step identity, camera modality, samples.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ActorId, SensorId};

/// Identifier of one world advance.
///
/// Issued by the simulator on every `tick`; strictly increasing within a
/// session. The pipeline compares StepIds but never computes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u64);

impl StepId {
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// The StepId the simulator issues after this one
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Camera modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Rgb,
    Depth,
    SemanticSegmentation,
}

impl Modality {
    pub const ALL: [Modality; 3] = [
        Modality::Rgb,
        Modality::SemanticSegmentation,
        Modality::Depth,
    ];

    /// Simulator blueprint id of the camera
    pub fn blueprint(self) -> &'static str {
        match self {
            Modality::Rgb => "sensor.camera.rgb",
            Modality::Depth => "sensor.camera.depth",
            Modality::SemanticSegmentation => "sensor.camera.semantic_segmentation",
        }
    }

    /// Directory name and sensor-name suffix
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Rgb => "rgb",
            Modality::Depth => "depth",
            Modality::SemanticSegmentation => "semantic_segmentation",
        }
    }

    pub fn from_blueprint(blueprint: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.blueprint() == blueprint)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one attached camera.
///
/// Created once while the rig is attached and never reassigned; the
/// simulator actor is destroyed at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorHandle {
    /// Simulator actor id
    pub actor: ActorId,

    /// Stable name, `{group}_{pos:02}/{modality}`
    pub name: SensorId,

    pub modality: Modality,
}

/// One item produced by a sensor.
///
/// Per sensor, samples arrive with non-decreasing StepIds. Across sensors
/// there is no arrival order.
#[derive(Debug, Clone)]
pub struct SensorSample {
    pub sensor: SensorId,

    /// Step that produced this sample
    pub step: StepId,

    /// Simulation time in seconds (diagnostics only)
    pub timestamp: f64,

    pub image: ImageData,
}

/// Raw image payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,

    pub height: u32,

    /// Pixel layout of `data`
    pub format: ImageFormat,

    /// Pixel bytes, zero-copy
    pub data: Bytes,
}

impl ImageData {
    /// Byte length `data` must have for the declared size and format
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Simulator native layout for every camera modality
    Bgra8,
    Rgba8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Bgra8 | ImageFormat::Rgba8 => 4,
        }
    }
}
