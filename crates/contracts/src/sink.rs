//! FrameSink trait - Dispatcher output interface

use crate::{CapturedFrame, ContractError};

/// Destination of recorded frames.
#[trait_variant::make(FrameSink: Send)]
pub trait LocalFrameSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Persist `frame` as recorded frame number `index`
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, index: u64, frame: &CapturedFrame) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
