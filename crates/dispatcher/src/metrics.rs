//! Per-sink write counters

/// Counters of a single sink
#[derive(Debug, Default, Clone)]
pub struct SinkMetrics {
    write_count: u64,
    failure_count: u64,
    images_written: u64,
    bytes_written: u64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            write_count: self.write_count,
            failure_count: self.failure_count,
            images_written: self.images_written,
            bytes_written: self.bytes_written,
        }
    }

    pub(crate) fn record_write(&mut self, success: bool) {
        if success {
            self.write_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    pub(crate) fn record_image(&mut self, bytes: usize) {
        self.images_written += 1;
        self.bytes_written += bytes as u64;
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames written successfully
    pub write_count: u64,
    pub failure_count: u64,
    pub images_written: u64,
    pub bytes_written: u64,
}
