//! Dispatcher - fans recorded frames out to the configured sinks

use std::path::PathBuf;

use observability::metrics::record_frame_dispatched;
use tracing::{debug, info, instrument, warn};

use contracts::{
    CaptureConfig, CapturedFrame, ContractError, FrameSink, OutputConfig, OutputSlot, SinkConfig,
    SinkType,
};

use crate::error::DispatcherError;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{ImageSink, ImageSinkConfig, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
    pub output: OutputConfig,
    /// Directory of the run manifest
    pub manifest_dir: Option<PathBuf>,
}

impl DispatcherConfig {
    /// Sinks and output policy of a capture run; the manifest goes into the
    /// run's weather directory.
    pub fn from_capture(config: &CaptureConfig) -> Self {
        Self {
            sinks: config.sinks.clone(),
            output: config.output.clone(),
            manifest_dir: Some(config.output_layout().run_dir()),
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    slots: Vec<OutputSlot>,
}

impl DispatcherBuilder {
    /// `slots` must be index-aligned with the frames that will be written
    pub fn new(config: DispatcherConfig, slots: Vec<OutputSlot>) -> Self {
        Self { config, slots }
    }

    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.config.sinks.len(), slots = self.slots.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut sinks = Vec::with_capacity(self.config.sinks.len());
        for sink_config in &self.config.sinks {
            sinks.push(create_sink(sink_config, &self.config, &self.slots)?);
        }
        Ok(Dispatcher { sinks, frames: 0 })
    }
}

#[instrument(
    name = "dispatcher_create_sink",
    skip_all,
    fields(sink = %sink_config.name, sink_type = ?sink_config.sink_type)
)]
fn create_sink(
    sink_config: &SinkConfig,
    config: &DispatcherConfig,
    slots: &[OutputSlot],
) -> Result<AnySink, DispatcherError> {
    match sink_config.sink_type {
        SinkType::Log => Ok(AnySink::Log(LogSink::new(&sink_config.name))),
        SinkType::Image => {
            let mut image_config = ImageSinkConfig::from_output(&config.output);
            if let Some(dir) = &config.manifest_dir {
                image_config = image_config.with_manifest_dir(dir);
            }
            let image_config = image_config.apply_params(&sink_config.params);
            let sink = ImageSink::new(&sink_config.name, slots.to_vec(), image_config)
                .map_err(|e| DispatcherError::sink_creation(&sink_config.name, e.to_string()))?;
            Ok(AnySink::Image(sink))
        }
    }
}

enum AnySink {
    Image(ImageSink),
    Log(LogSink),
}

impl AnySink {
    fn metrics(&self) -> &SinkMetrics {
        match self {
            AnySink::Image(s) => s.metrics(),
            AnySink::Log(s) => s.metrics(),
        }
    }
}

impl FrameSink for AnySink {
    fn name(&self) -> &str {
        match self {
            AnySink::Image(s) => s.name(),
            AnySink::Log(s) => s.name(),
        }
    }

    async fn write(&mut self, index: u64, frame: &CapturedFrame) -> Result<(), ContractError> {
        match self {
            AnySink::Image(s) => s.write(index, frame).await,
            AnySink::Log(s) => s.write(index, frame).await,
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        match self {
            AnySink::Image(s) => s.flush().await,
            AnySink::Log(s) => s.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            AnySink::Image(s) => s.close().await,
            AnySink::Log(s) => s.close().await,
        }
    }
}

/// Writes every recorded frame to each configured sink, in order.
///
/// The first failing sink fails the frame.
pub struct Dispatcher {
    sinks: Vec<AnySink>,
    frames: u64,
}

impl Dispatcher {
    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.sinks
            .iter()
            .map(|s| (s.name().to_string(), s.metrics().snapshot()))
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Frames handed to every sink so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    async fn write(&mut self, index: u64, frame: &CapturedFrame) -> Result<(), ContractError> {
        for sink in &mut self.sinks {
            let result = sink.write(index, frame).await;
            record_frame_dispatched(sink.name(), result.is_ok());
            result?;
        }
        self.frames += 1;
        if self.frames.is_multiple_of(100) {
            debug!(frames = self.frames, "Dispatcher progress");
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        for sink in &mut self.sinks {
            sink.flush().await?;
        }
        Ok(())
    }

    /// Close every sink, even after one fails; the first error is returned.
    #[instrument(name = "dispatcher_close", skip(self), fields(sinks = self.sinks.len()))]
    async fn close(&mut self) -> Result<(), ContractError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.close().await {
                warn!(sink = sink.name(), error = %e, "sink close failed");
                first_error.get_or_insert(e);
            }
        }
        info!(frames = self.frames, "Dispatcher shutdown complete");
        first_error.map_or(Ok(()), Err)
    }
}

/// Convenience function to create a dispatcher for a capture run
pub fn create_dispatcher(
    config: &CaptureConfig,
    slots: Vec<OutputSlot>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(DispatcherConfig::from_capture(config), slots).build()
}
