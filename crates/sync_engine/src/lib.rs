//! # Sync Engine
//!
//! 同步步进采集引擎。
//!
//! 负责：
//! - 切换仿真器到固定步长同步模式，并在退出时恢复原设置
//! - 每个 step 为每个传感器收集且只收集一个属于该 step 的样本
//! - 按 stride/offset 计划决定哪些 step 落盘
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::{CaptureScheduler, StepSynchronizer};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut sync = StepSynchronizer::enter(client, sources, config.capture.fps).await?;
//! let scheduler = CaptureScheduler::from_settings(&config.capture);
//! let report = scheduler.run(&mut sync, &mut sink, &CancellationToken::new()).await;
//! sync.exit().await?;
//! ```

mod buffer;
mod engine;
mod error;
mod schedule;
mod scheduler;

pub use buffer::{PopError, StreamBuffer};
pub use engine::{StepSynchronizer, SyncStats};
pub use error::{CaptureError, SyncError};
pub use schedule::CapturePlan;
pub use scheduler::{CaptureReport, CaptureScheduler};

pub use contracts::{CapturedFrame, StepMeta, WorldSettings};
