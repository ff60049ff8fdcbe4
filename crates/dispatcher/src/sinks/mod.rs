//! Sink implementations
//!
//! Contains ImageSink and LogSink.

mod images;
mod log;

pub use self::images::{ImageSink, ImageSinkConfig, MANIFEST_FILE};
pub use self::log::LogSink;
