//! Per-sensor sample queue.
//!
//! Producers are simulator callback threads; the only consumer is the step
//! synchronizer. Samples leave the queue in arrival order and are never
//! re-queued.

use std::fmt;
use std::sync::Arc;

use contracts::{SensorDataCallback, SensorId, SensorSample, StepId};
use tokio::time::{timeout_at, Instant};
use tracing::trace;

use crate::error::SyncError;

/// Why a pop returned nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Deadline passed with the queue still empty
    Timeout,
    /// Queue empty and every producer gone
    Closed,
}

/// Unbounded queue of one sensor's samples
pub struct StreamBuffer {
    sensor: SensorId,
    /// Kept until [`StreamBuffer::seal`] so pushers can still be handed out
    tx: Option<async_channel::Sender<SensorSample>>,
    rx: async_channel::Receiver<SensorSample>,
    popped: u64,
    discarded: u64,
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("sensor", &self.sensor)
            .field("len", &self.rx.len())
            .field("discarded", &self.discarded)
            .finish()
    }
}

impl StreamBuffer {
    pub fn new(sensor: SensorId) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            sensor,
            tx: Some(tx),
            rx,
            popped: 0,
            discarded: 0,
        }
    }

    pub fn sensor(&self) -> &SensorId {
        &self.sensor
    }

    /// Callback pushing into this buffer.
    ///
    /// Never blocks and never fails; a push after the buffer is gone is
    /// dropped.
    pub fn pusher(&self) -> SensorDataCallback {
        let sensor = self.sensor.clone();
        let tx = self.tx.clone();
        Arc::new(move |sample: SensorSample| {
            let Some(tx) = &tx else {
                return;
            };
            if let Err(e) = tx.try_send(sample) {
                trace!(sensor = %sensor, step = %e.into_inner().step, "sample dropped after teardown");
            }
        })
    }

    /// Drop the buffer's own sender. From here on the stream reports closed
    /// once every handed-out pusher is gone.
    pub fn seal(&mut self) {
        self.tx = None;
    }

    /// Refuse further pushes; queued samples are discarded.
    pub fn close(&mut self) {
        self.tx = None;
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }

    /// Samples currently queued
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stale samples thrown away so far
    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Samples taken out of the queue so far (returned or discarded)
    #[inline]
    pub fn popped(&self) -> u64 {
        self.popped
    }

    /// Oldest queued sample, waiting until `deadline` for one to arrive.
    pub async fn pop(&mut self, deadline: Instant) -> Result<SensorSample, PopError> {
        match timeout_at(deadline, self.rx.recv()).await {
            Ok(Ok(sample)) => {
                self.popped += 1;
                Ok(sample)
            }
            Ok(Err(_)) => Err(PopError::Closed),
            Err(_) => Err(PopError::Timeout),
        }
    }

    /// Pop until the sample tagged `target` shows up.
    ///
    /// Older samples are discarded. A newer sample means `target` was
    /// skipped and fails at once instead of waiting for the deadline.
    pub async fn drain_until(
        &mut self,
        target: StepId,
        deadline: Instant,
    ) -> Result<SensorSample, SyncError> {
        let started = Instant::now();
        loop {
            let sample = match self.pop(deadline).await {
                Ok(sample) => sample,
                Err(PopError::Timeout) => {
                    return Err(SyncError::Timeout {
                        sensor: self.sensor.clone(),
                        step: target,
                        waited_ms: started.elapsed().as_millis() as u64,
                    })
                }
                Err(PopError::Closed) => {
                    return Err(SyncError::StreamClosed {
                        sensor: self.sensor.clone(),
                        step: target,
                    })
                }
            };

            match sample.step.cmp(&target) {
                std::cmp::Ordering::Less => {
                    self.discarded += 1;
                    trace!(sensor = %self.sensor, stale = %sample.step, target = %target, "stale sample discarded");
                }
                std::cmp::Ordering::Equal => return Ok(sample),
                std::cmp::Ordering::Greater => {
                    return Err(SyncError::SkippedStep {
                        sensor: self.sensor.clone(),
                        expected: target,
                        got: sample.step,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{ImageData, ImageFormat};
    use std::time::Duration;

    fn sample(sensor: &str, step: u64) -> SensorSample {
        SensorSample {
            sensor: sensor.into(),
            step: StepId(step),
            timestamp: step as f64 * 0.1,
            image: ImageData {
                width: 1,
                height: 1,
                format: ImageFormat::Bgra8,
                data: Bytes::from_static(&[0, 0, 0, 255]),
            },
        }
    }

    fn soon(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn test_pop_in_arrival_order() {
        let mut buffer = StreamBuffer::new("cam".into());
        let push = buffer.pusher();
        push(sample("cam", 3));
        push(sample("cam", 1));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop(soon(10)).await.unwrap().step, StepId(3));
        assert_eq!(buffer.pop(soon(10)).await.unwrap().step, StepId(1));
        assert_eq!(buffer.popped(), 2);
    }

    #[tokio::test]
    async fn test_pop_times_out() {
        let mut buffer = StreamBuffer::new("cam".into());
        let err = buffer.pop(soon(20)).await.unwrap_err();
        assert_eq!(err, PopError::Timeout);
    }

    #[tokio::test]
    async fn test_stale_sample_discarded() {
        let mut buffer = StreamBuffer::new("cam".into());
        let push = buffer.pusher();
        push(sample("cam", 41));
        push(sample("cam", 42));

        let got = buffer.drain_until(StepId(42), soon(50)).await.unwrap();
        assert_eq!(got.step, StepId(42));
        assert_eq!(buffer.discarded(), 1);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_for_late_sample() {
        let mut buffer = StreamBuffer::new("cam".into());
        let push = buffer.pusher();
        push(sample("cam", 9));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            push(sample("cam", 10));
        });

        let got = buffer.drain_until(StepId(10), soon(1000)).await.unwrap();
        assert_eq!(got.step, StepId(10));
        assert_eq!(buffer.discarded(), 1);
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let mut buffer = StreamBuffer::new("cam".into());
        let push = buffer.pusher();
        push(sample("cam", 4));

        let err = buffer.drain_until(StepId(5), soon(30)).await.unwrap_err();
        match err {
            SyncError::Timeout { sensor, step, .. } => {
                assert_eq!(sensor.as_str(), "cam");
                assert_eq!(step, StepId(5));
            }
            other => panic!("unexpected error: {other}"),
        }
        // the stale sample is gone for good
        assert_eq!(buffer.discarded(), 1);
    }

    #[tokio::test]
    async fn test_newer_sample_is_skipped_step() {
        let mut buffer = StreamBuffer::new("cam".into());
        buffer.pusher()(sample("cam", 8));

        let err = buffer.drain_until(StepId(7), soon(1000)).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::SkippedStep { expected: StepId(7), got: StepId(8), .. }
        ));
    }

    #[tokio::test]
    async fn test_sealed_stream_closes_with_last_pusher() {
        let mut buffer = StreamBuffer::new("cam".into());
        let push = buffer.pusher();
        buffer.seal();
        push(sample("cam", 1));
        drop(push);

        // queued samples are still delivered before the close
        assert_eq!(buffer.pop(soon(10)).await.unwrap().step, StepId(1));
        let err = buffer.drain_until(StepId(2), soon(1000)).await.unwrap_err();
        assert!(matches!(err, SyncError::StreamClosed { .. }));
    }

    #[tokio::test]
    async fn test_push_after_close_is_dropped() {
        let mut buffer = StreamBuffer::new("cam".into());
        let push = buffer.pusher();
        push(sample("cam", 1));
        buffer.close();
        push(sample("cam", 2));
        assert!(buffer.is_empty());
    }
}
