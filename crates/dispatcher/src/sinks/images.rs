//! ImageSink - writes every sample of a frame into its output slot

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use contracts::{
    CapturedFrame, ContractError, ConverterConfig, FrameSink, Modality, OutputConfig, OutputSlot,
    SensorId, SensorSample, StepId,
};
use observability::metrics::record_image_written;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::converter::convert;
use crate::error::{DispatcherError, Result};
use crate::metrics::SinkMetrics;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Configuration for ImageSink
#[derive(Debug, Clone)]
pub struct ImageSinkConfig {
    /// File extension; also picks the encoder
    pub extension: String,
    pub converters: ConverterConfig,
    /// Where `manifest.json` goes on close; `None` disables it
    pub manifest_dir: Option<PathBuf>,
}

impl ImageSinkConfig {
    pub fn from_output(output: &OutputConfig) -> Self {
        Self {
            extension: output.extension.clone(),
            converters: output.converters.clone(),
            manifest_dir: None,
        }
    }

    pub fn with_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = Some(dir.into());
        self
    }

    /// Apply sink params: `extension`, `manifest = "false"`
    pub fn apply_params(mut self, params: &HashMap<String, String>) -> Self {
        if let Some(ext) = params.get("extension") {
            self.extension = ext.trim_start_matches('.').to_string();
        }
        if params.get("manifest").is_some_and(|v| v == "false") {
            self.manifest_dir = None;
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct ManifestSensor {
    name: SensorId,
    modality: Modality,
    dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct ManifestFrame {
    index: u64,
    step: StepId,
    timestamp: Option<f64>,
}

/// Record of what a run put on disk
#[derive(Debug, Serialize)]
struct Manifest {
    created_at: String,
    closed_at: Option<String>,
    extension: String,
    sensors: Vec<ManifestSensor>,
    frames: Vec<ManifestFrame>,
}

/// Sink that writes one image file per sample
///
/// Slot `i` receives sample `i` of every frame, as
/// `{slot_dir}/{index:06}.{ext}`.
pub struct ImageSink {
    name: String,
    slots: Vec<OutputSlot>,
    config: ImageSinkConfig,
    manifest: Manifest,
    metrics: SinkMetrics,
}

impl ImageSink {
    /// Create the sink and every slot directory.
    pub fn new(
        name: impl Into<String>,
        slots: Vec<OutputSlot>,
        config: ImageSinkConfig,
    ) -> Result<Self> {
        let name = name.into();
        for slot in &slots {
            fs::create_dir_all(&slot.dir)?;
        }
        if let Some(dir) = &config.manifest_dir {
            fs::create_dir_all(dir)?;
        }
        debug!(sink = %name, slots = slots.len(), "output directories ready");

        let manifest = Manifest {
            created_at: chrono::Utc::now().to_rfc3339(),
            closed_at: None,
            extension: config.extension.clone(),
            sensors: slots
                .iter()
                .map(|slot| ManifestSensor {
                    name: slot.sensor.name.clone(),
                    modality: slot.sensor.modality,
                    dir: slot.dir.clone(),
                })
                .collect(),
            frames: Vec::new(),
        };

        Ok(Self {
            name,
            slots,
            config,
            manifest,
            metrics: SinkMetrics::new(),
        })
    }

    pub fn slots(&self) -> &[OutputSlot] {
        &self.slots
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Path sample `position` of frame `index` is written to
    pub fn path_of(&self, position: usize, index: u64) -> Option<PathBuf> {
        self.slots
            .get(position)
            .map(|slot| slot.frame_path(index, &self.config.extension))
    }

    fn write_frame(&mut self, index: u64, frame: &CapturedFrame) -> Result<()> {
        if frame.len() != self.slots.len() {
            return Err(DispatcherError::SlotCount {
                expected: self.slots.len(),
                got: frame.len(),
            });
        }

        // nothing is written unless every sample fits its slot
        for (position, (sample, slot)) in frame.samples.iter().zip(&self.slots).enumerate() {
            if sample.sensor != slot.sensor.name {
                return Err(DispatcherError::SlotMismatch {
                    position,
                    expected: slot.sensor.name.clone(),
                    got: sample.sensor.clone(),
                });
            }
            let expected = sample.image.expected_len();
            if sample.image.data.len() < expected {
                return Err(DispatcherError::PayloadSize {
                    sensor: sample.sensor.clone(),
                    expected,
                    got: sample.image.data.len(),
                });
            }
        }

        for (sample, slot) in frame.samples.iter().zip(&self.slots) {
            let path = slot.frame_path(index, &self.config.extension);
            let bytes = self.save_sample(&path, slot.sensor.modality, sample)?;
            self.metrics.record_image(bytes);
            record_image_written(slot.sensor.modality.as_str(), bytes);
        }

        self.manifest.frames.push(ManifestFrame {
            index,
            step: frame.step,
            timestamp: frame.timestamp(),
        });
        Ok(())
    }

    fn save_sample(&self, path: &Path, modality: Modality, sample: &SensorSample) -> Result<usize> {
        let image = &sample.image;
        let rgba = convert(self.config.converters.for_modality(modality), image);
        let (pixels, color) = if self.opaque_format() {
            let rgb: Vec<u8> = rgba
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            (rgb, image::ColorType::Rgb8)
        } else {
            (rgba, image::ColorType::Rgba8)
        };
        image::save_buffer(path, &pixels, image.width, image.height, color).map_err(|source| {
            DispatcherError::Encode {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(pixels.len())
    }

    /// Encoders without an alpha channel
    fn opaque_format(&self) -> bool {
        matches!(
            self.config.extension.to_ascii_lowercase().as_str(),
            "jpg" | "jpeg"
        )
    }

    fn write_manifest(&mut self) -> Result<()> {
        let Some(dir) = &self.config.manifest_dir else {
            return Ok(());
        };
        self.manifest.closed_at = Some(chrono::Utc::now().to_rfc3339());
        let path = dir.join(MANIFEST_FILE);
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, &self.manifest)?;
        info!(sink = %self.name, path = %path.display(), frames = self.manifest.frames.len(), "manifest written");
        Ok(())
    }
}

impl FrameSink for ImageSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "image_sink_write",
        skip(self, frame),
        fields(sink = %self.name, step = %frame.step)
    )]
    async fn write(&mut self, index: u64, frame: &CapturedFrame) -> std::result::Result<(), ContractError> {
        let result = self.write_frame(index, frame);
        self.metrics.record_write(result.is_ok());
        result.map_err(|e| {
            error!(sink = %self.name, index, error = %e, "write failed");
            e.into_sink_write(&self.name)
        })
    }

    #[instrument(name = "image_sink_flush", skip(self))]
    async fn flush(&mut self) -> std::result::Result<(), ContractError> {
        // images are complete files once written
        Ok(())
    }

    #[instrument(name = "image_sink_close", skip(self))]
    async fn close(&mut self) -> std::result::Result<(), ContractError> {
        self.write_manifest()
            .map_err(|e| e.into_sink_write(&self.name))?;
        debug!(sink = %self.name, images = self.metrics.snapshot().images_written, "ImageSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{ColorConverter, ImageData, ImageFormat, SensorHandle};
    use tempfile::tempdir;

    fn slot(root: &Path, name: &str, modality: Modality) -> OutputSlot {
        OutputSlot {
            sensor: SensorHandle {
                actor: 1,
                name: name.into(),
                modality,
            },
            dir: root.join(name),
        }
    }

    fn sample(name: &str, step: u64, bgra: [u8; 4]) -> SensorSample {
        SensorSample {
            sensor: name.into(),
            step: StepId(step),
            timestamp: 0.5,
            image: ImageData {
                width: 2,
                height: 2,
                format: ImageFormat::Bgra8,
                data: Bytes::from(bgra.repeat(4)),
            },
        }
    }

    fn config() -> ImageSinkConfig {
        ImageSinkConfig {
            extension: "png".to_string(),
            converters: ConverterConfig::default(),
            manifest_dir: None,
        }
    }

    #[test]
    fn test_directories_created_up_front() {
        let dir = tempdir().unwrap();
        let slots = vec![
            slot(dir.path(), "G_00/rgb", Modality::Rgb),
            slot(dir.path(), "G_00/depth", Modality::Depth),
        ];
        let _sink = ImageSink::new("images", slots, config()).unwrap();
        assert!(dir.path().join("G_00/rgb").is_dir());
        assert!(dir.path().join("G_00/depth").is_dir());
    }

    #[tokio::test]
    async fn test_samples_land_in_their_slots() {
        let dir = tempdir().unwrap();
        let slots = vec![
            slot(dir.path(), "G_00/rgb", Modality::Rgb),
            slot(dir.path(), "G_01/rgb", Modality::Rgb),
        ];
        let mut sink = ImageSink::new("images", slots, config()).unwrap();

        let frame = CapturedFrame {
            step: StepId(42),
            samples: vec![
                sample("G_00/rgb", 42, [255, 0, 0, 255]),
                sample("G_01/rgb", 42, [0, 0, 255, 255]),
            ],
        };
        sink.write(7, &frame).await.unwrap();

        let first = image::open(dir.path().join("G_00/rgb/000007.png"))
            .unwrap()
            .to_rgba8();
        let second = image::open(dir.path().join("G_01/rgb/000007.png"))
            .unwrap()
            .to_rgba8();
        // BGRA blue / red after the swap
        assert_eq!(first.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(second.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(sink.metrics().snapshot().images_written, 2);
        assert_eq!(sink.path_of(1, 7), Some(dir.path().join("G_01/rgb/000007.png")));
    }

    #[tokio::test]
    async fn test_depth_converter_applied() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.converters.depth = ColorConverter::Depth;
        let slots = vec![slot(dir.path(), "G_00/depth", Modality::Depth)];
        let mut sink = ImageSink::new("images", slots, config).unwrap();

        let frame = CapturedFrame {
            step: StepId(1),
            samples: vec![sample("G_00/depth", 1, [255, 255, 255, 255])],
        };
        sink.write(0, &frame).await.unwrap();

        let img = image::open(dir.path().join("G_00/depth/000000.png"))
            .unwrap()
            .to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn test_misaligned_frame_rejected() {
        let dir = tempdir().unwrap();
        let slots = vec![
            slot(dir.path(), "G_00/rgb", Modality::Rgb),
            slot(dir.path(), "G_01/rgb", Modality::Rgb),
        ];
        let mut sink = ImageSink::new("images", slots, config()).unwrap();

        let short = CapturedFrame {
            step: StepId(1),
            samples: vec![sample("G_00/rgb", 1, [0; 4])],
        };
        assert!(sink.write(0, &short).await.is_err());

        let swapped = CapturedFrame {
            step: StepId(1),
            samples: vec![sample("G_01/rgb", 1, [0; 4]), sample("G_00/rgb", 1, [0; 4])],
        };
        let err = sink.write(0, &swapped).await.unwrap_err();
        assert!(err.to_string().contains("slot belongs to 'G_00/rgb'"));
        assert_eq!(sink.metrics().failure_count(), 2);
        assert!(!dir.path().join("G_00/rgb/000000.png").exists());
    }

    #[tokio::test]
    async fn test_short_payload_rejected() {
        let dir = tempdir().unwrap();
        let slots = vec![
            slot(dir.path(), "G_00/rgb", Modality::Rgb),
            slot(dir.path(), "G_01/rgb", Modality::Rgb),
        ];
        let mut sink = ImageSink::new("images", slots, config()).unwrap();

        // 2x2 BGRA needs 16 bytes
        let mut truncated = sample("G_01/rgb", 3, [9, 9, 9, 255]);
        truncated.image.data = Bytes::from(vec![0u8; 8]);
        let frame = CapturedFrame {
            step: StepId(3),
            samples: vec![sample("G_00/rgb", 3, [1, 2, 3, 255]), truncated],
        };

        let err = sink.write(0, &frame).await.unwrap_err();
        assert!(err.to_string().contains("expected 16 bytes, got 8"), "{err}");
        assert_eq!(sink.metrics().failure_count(), 1);
        // the intact sample of the same frame is not written either
        assert!(!dir.path().join("G_00/rgb/000000.png").exists());
        assert!(!dir.path().join("G_01/rgb/000000.png").exists());
    }

    #[tokio::test]
    async fn test_manifest_written_on_close() {
        let dir = tempdir().unwrap();
        let slots = vec![slot(dir.path(), "G_00/rgb", Modality::Rgb)];
        let config = config().with_manifest_dir(dir.path());
        let mut sink = ImageSink::new("images", slots, config).unwrap();

        for index in 0..3 {
            let frame = CapturedFrame {
                step: StepId(100 + index),
                samples: vec![sample("G_00/rgb", 100 + index, [1, 2, 3, 255])],
            };
            sink.write(index, &frame).await.unwrap();
        }
        sink.close().await.unwrap();

        let text = fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest["frames"].as_array().unwrap().len(), 3);
        assert_eq!(manifest["frames"][2]["step"], 102);
        assert_eq!(manifest["sensors"][0]["modality"], "rgb");
        assert_eq!(manifest["extension"], "png");
        assert!(manifest["closed_at"].is_string());
    }

    #[test]
    fn test_params_override() {
        let mut params = HashMap::new();
        params.insert("extension".to_string(), ".jpg".to_string());
        params.insert("manifest".to_string(), "false".to_string());
        let config = config().with_manifest_dir("/tmp").apply_params(&params);
        assert_eq!(config.extension, "jpg");
        assert!(config.manifest_dir.is_none());
    }
}
