//! LogSink - logs frame summary via tracing

use contracts::{CapturedFrame, ContractError, FrameSink};
use tracing::{info, instrument};

use crate::metrics::SinkMetrics;

/// Sink that logs one line per recorded frame
pub struct LogSink {
    name: String,
    metrics: SinkMetrics,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: SinkMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    fn log_frame_summary(&self, index: u64, frame: &CapturedFrame) {
        let bytes: usize = frame.samples.iter().map(|s| s.image.data.len()).sum();

        info!(
            sink = %self.name,
            index,
            step = %frame.step,
            timestamp = frame.timestamp().unwrap_or_default(),
            samples = frame.len(),
            bytes,
            "frame recorded"
        );
    }
}

impl FrameSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, step = %frame.step)
    )]
    async fn write(&mut self, index: u64, frame: &CapturedFrame) -> Result<(), ContractError> {
        self.log_frame_summary(index, frame);
        self.metrics.record_write(true);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frames = self.metrics.write_count(), "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::StepId;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        let frame = CapturedFrame {
            step: StepId(3),
            samples: Vec::new(),
        };

        assert!(sink.write(0, &frame).await.is_ok());
        assert!(sink.write(1, &frame).await.is_ok());
        assert_eq!(sink.metrics().write_count(), 2);
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
