//! Capture 指标收集模块
//!
//! 基于 StepMeta 收集和统计步进同步与落盘的运行指标。

use std::collections::HashMap;

use contracts::StepMeta;
use metrics::{counter, gauge, histogram};

/// 从 StepMeta 记录指标
///
/// 每个 step 结束后调用一次。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_step_metrics;
///
/// let frame = synchronizer.step(true).await?;
/// record_step_metrics(&synchronizer.last_meta());
/// ```
pub fn record_step_metrics(meta: &StepMeta) {
    counter!("carla_capture_steps_total").increment(1);
    gauge!("carla_capture_last_step_id").set(meta.step.value() as f64);

    if !meta.collected {
        return;
    }

    counter!("carla_capture_frames_collected_total").increment(1);
    histogram!("carla_capture_step_wait_ms").record(meta.wait_ms);
    gauge!("carla_capture_sensors").set(meta.sensors as f64);

    // 过期样本丢弃
    if meta.stale_discarded > 0 {
        counter!("carla_capture_stale_samples_total").increment(meta.stale_discarded);
    }
}

/// 记录 step 超时（哪个传感器没有按时交付）
pub fn record_step_timeout(sensor: &str) {
    counter!(
        "carla_capture_step_timeouts_total",
        "sensor" => sensor.to_string()
    )
    .increment(1);
}

/// 记录图片写盘
pub fn record_image_written(modality: &str, bytes: usize) {
    counter!(
        "carla_capture_images_written_total",
        "modality" => modality.to_string()
    )
    .increment(1);
    counter!("carla_capture_bytes_written_total").increment(bytes as u64);
}

/// 记录帧分发
pub fn record_frame_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "carla_capture_frames_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录已落盘的帧序号
pub fn record_frame_recorded(index: u64) {
    counter!("carla_capture_frames_recorded_total").increment(1);
    gauge!("carla_capture_last_frame_index").set(index as f64);
}

/// 记录缓冲区深度
pub fn record_buffer_depth(sensor: &str, depth: usize) {
    gauge!(
        "carla_capture_buffer_depth",
        "sensor" => sensor.to_string()
    )
    .set(depth as f64);
}

/// Capture 指标聚合器
///
/// 在内存中聚合指标，便于输出运行摘要。
#[derive(Debug, Clone, Default)]
pub struct CaptureStatsAggregator {
    /// 总 step 数
    pub total_steps: u64,

    /// 采集帧数
    pub collected_frames: u64,

    /// 丢弃的过期样本数
    pub stale_discarded: u64,

    /// 等待时间统计 (ms)
    pub wait_stats: RunningStats,

    /// 各 sink 分发失败次数
    pub dispatch_failures: HashMap<String, u64>,
}

impl CaptureStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, meta: &StepMeta) {
        self.total_steps += 1;
        if meta.collected {
            self.collected_frames += 1;
            self.stale_discarded += meta.stale_discarded;
            self.wait_stats.push(meta.wait_ms);
        }
    }

    pub fn record_dispatch_failure(&mut self, sink_name: &str) {
        *self
            .dispatch_failures
            .entry(sink_name.to_string())
            .or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            total_steps: self.total_steps,
            collected_frames: self.collected_frames,
            stale_discarded: self.stale_discarded,
            stale_per_frame: if self.collected_frames > 0 {
                self.stale_discarded as f64 / self.collected_frames as f64
            } else {
                0.0
            },
            wait_ms: StatsSummary::from(&self.wait_stats),
            dispatch_failures: self.dispatch_failures.clone(),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub total_steps: u64,
    pub collected_frames: u64,
    pub stale_discarded: u64,
    pub stale_per_frame: f64,
    pub wait_ms: StatsSummary,
    pub dispatch_failures: HashMap<String, u64>,
}

impl std::fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Summary ===")?;
        writeln!(f, "Steps: {}", self.total_steps)?;
        writeln!(f, "Collected frames: {}", self.collected_frames)?;
        writeln!(
            f,
            "Stale samples discarded: {} ({:.2} per frame)",
            self.stale_discarded, self.stale_per_frame
        )?;
        writeln!(f, "Step wait (ms): {}", self.wait_ms)?;

        if !self.dispatch_failures.is_empty() {
            writeln!(f, "Dispatch failures:")?;
            for (sink, count) in &self.dispatch_failures {
                writeln!(f, "  {}: {}", sink, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
