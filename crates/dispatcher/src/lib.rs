//! # Dispatcher
//!
//! 帧落盘模块。
//!
//! 负责：
//! - 消费 `CapturedFrame`
//! - 按 slot 顺序把每个样本写到对应目录
//! - 按模态做颜色转换（raw / depth / 对数 depth / CityScapes）
//! - Fan-out 到多个 sinks

pub mod converter;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod sinks;

pub use contracts::{CapturedFrame, FrameSink};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{ImageSink, ImageSinkConfig, LogSink, MANIFEST_FILE};
