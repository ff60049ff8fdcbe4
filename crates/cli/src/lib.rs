//! # CARLA Capture
//!
//! 采集管道编排：连接仿真器、生成世界、同步步进采集、落盘、清理。

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineStats};
