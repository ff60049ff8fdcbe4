//! Mock camera implementation
//!
//! Implements `SensorSource`, rendering one synthetic image per world step.
//! The mock simulator pushes every tick into the camera's feed; a background
//! thread turns ticks into samples and hands them to the callback, the same
//! way simulator callback threads do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    ImageData, ImageFormat, Modality, SensorDataCallback, SensorId, SensorSample, SensorSource,
    StepId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// One world advance as seen by a camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTick {
    pub step: StepId,
    /// Simulation time (seconds)
    pub timestamp: f64,
}

/// Delivery behaviour of a mock camera
#[derive(Debug, Clone, Default)]
pub struct MockCameraBehavior {
    /// Fixed render latency per sample
    pub delivery_delay: Duration,
    /// Extra random latency in `[0, max_jitter)`
    pub max_jitter: Duration,
    /// Stop delivering after this many samples
    pub silence_after: Option<u64>,
    /// Re-send the previous step's sample before every new one
    pub replay_previous: bool,
    /// Tag samples with another camera's name
    pub report_as: Option<SensorId>,
    /// Jitter RNG seed
    pub seed: u64,
}

/// What a camera renders; shared with its delivery thread
#[derive(Debug, Clone)]
struct Lens {
    sensor_id: SensorId,
    modality: Modality,
    width: u32,
    height: u32,
}

impl Lens {
    fn sample(&self, tick: StepTick) -> SensorSample {
        SensorSample {
            sensor: self.sensor_id.clone(),
            step: tick.step,
            timestamp: tick.timestamp,
            image: MockCamera::render(self.modality, self.width, self.height, tick.step),
        }
    }
}

/// Mock camera
pub struct MockCamera {
    lens: Lens,
    feed: async_channel::Receiver<StepTick>,
    behavior: MockCameraBehavior,
    listening: Arc<AtomicBool>,
}

impl MockCamera {
    pub fn new(
        sensor_id: SensorId,
        modality: Modality,
        (width, height): (u32, u32),
        feed: async_channel::Receiver<StepTick>,
        behavior: MockCameraBehavior,
    ) -> Self {
        Self {
            lens: Lens {
                sensor_id,
                modality,
                width,
                height,
            },
            feed,
            behavior,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Synthetic BGRA frame; every pixel encodes the step so tests can tell
    /// samples apart after they hit the disk.
    pub fn render(modality: Modality, width: u32, height: u32, step: StepId) -> ImageData {
        let s = step.value();
        let pixel: [u8; 4] = match modality {
            // B, G, R, A
            Modality::Rgb => [(s % 251) as u8, 96, 160, 255],
            // 24-bit normalized depth in R, G, B (little end first)
            Modality::Depth => {
                let depth = (s * 4099) % 0x00ff_ffff;
                [(depth >> 16) as u8, (depth >> 8) as u8, depth as u8, 255]
            }
            // semantic tag in the red channel
            Modality::SemanticSegmentation => [0, 0, (s % 23) as u8, 255],
        };
        let pixels = width as usize * height as usize;
        ImageData {
            width,
            height,
            format: ImageFormat::Bgra8,
            data: Bytes::from(pixel.repeat(pixels)),
        }
    }
}

impl SensorSource for MockCamera {
    fn sensor_id(&self) -> &SensorId {
        &self.lens.sensor_id
    }

    fn modality(&self) -> Modality {
        self.lens.modality
    }

    fn listen(&self, callback: SensorDataCallback) {
        // Idempotent: if already listening, don't start again
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let listening = self.listening.clone();
        let feed = self.feed.clone();
        let behavior = self.behavior.clone();
        let mut lens = self.lens.clone();
        if let Some(label) = &behavior.report_as {
            lens.sensor_id = label.clone();
        }

        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(behavior.seed);
            let mut delivered: u64 = 0;
            let mut previous: Option<StepTick> = None;

            debug!(sensor_id = %lens.sensor_id, "mock camera started");

            // Ends when the simulator drops the feed (actor destroyed)
            while let Ok(tick) = feed.recv_blocking() {
                if !listening.load(Ordering::Relaxed) {
                    break;
                }
                if behavior.silence_after.is_some_and(|limit| delivered >= limit) {
                    trace!(sensor_id = %lens.sensor_id, step = %tick.step, "mock camera silent");
                    continue;
                }

                let mut latency = behavior.delivery_delay;
                if !behavior.max_jitter.is_zero() {
                    let max = (behavior.max_jitter.as_micros() as u64).max(1);
                    latency += Duration::from_micros(rng.random_range(0..max));
                }
                if !latency.is_zero() {
                    thread::sleep(latency);
                }

                if behavior.replay_previous {
                    if let Some(prev) = previous {
                        callback(lens.sample(prev));
                    }
                }
                callback(lens.sample(tick));
                delivered += 1;
                previous = Some(tick);

                trace!(sensor_id = %lens.sensor_id, step = %tick.step, "mock sample sent");
            }

            listening.store(false, Ordering::SeqCst);
            debug!(sensor_id = %lens.sensor_id, delivered, "mock camera stopped");
        });
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn camera(behavior: MockCameraBehavior) -> (MockCamera, async_channel::Sender<StepTick>) {
        let (tx, rx) = async_channel::unbounded();
        let cam = MockCamera::new(
            "ForwardCameras_00/rgb".into(),
            Modality::Rgb,
            (4, 3),
            rx,
            behavior,
        );
        (cam, tx)
    }

    fn tick(n: u64) -> StepTick {
        StepTick {
            step: StepId(n),
            timestamp: n as f64 / 30.0,
        }
    }

    fn wait_for(received: &Mutex<Vec<StepId>>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while received.lock().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn collector() -> (Arc<Mutex<Vec<StepId>>>, SensorDataCallback) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: SensorDataCallback = Arc::new(move |sample: SensorSample| {
            assert_eq!(sample.image.data.len(), sample.image.expected_len());
            sink.lock().push(sample.step);
        });
        (received, callback)
    }

    #[test]
    fn test_one_sample_per_tick() {
        let (cam, tx) = camera(MockCameraBehavior::default());
        let (received, callback) = collector();
        cam.listen(callback);

        for n in 10..13 {
            tx.try_send(tick(n)).unwrap();
        }
        wait_for(&received, 3);
        cam.stop();

        assert_eq!(*received.lock(), vec![StepId(10), StepId(11), StepId(12)]);
    }

    #[test]
    fn test_idempotent_listen() {
        let (cam, tx) = camera(MockCameraBehavior::default());
        let (first, cb1) = collector();
        let (second, cb2) = collector();
        cam.listen(cb1);
        cam.listen(cb2);

        tx.try_send(tick(1)).unwrap();
        wait_for(&first, 1);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(first.lock().len(), 1);
        assert!(second.lock().is_empty());
    }

    #[test]
    fn test_silence_after() {
        let (cam, tx) = camera(MockCameraBehavior {
            silence_after: Some(2),
            ..Default::default()
        });
        let (received, callback) = collector();
        cam.listen(callback);

        for n in 1..=4 {
            tx.try_send(tick(n)).unwrap();
        }
        wait_for(&received, 2);
        thread::sleep(Duration::from_millis(30));

        assert_eq!(*received.lock(), vec![StepId(1), StepId(2)]);
    }

    #[test]
    fn test_replay_previous() {
        let (cam, tx) = camera(MockCameraBehavior {
            replay_previous: true,
            ..Default::default()
        });
        let (received, callback) = collector();
        cam.listen(callback);

        tx.try_send(tick(41)).unwrap();
        tx.try_send(tick(42)).unwrap();
        wait_for(&received, 3);

        assert_eq!(*received.lock(), vec![StepId(41), StepId(41), StepId(42)]);
    }

    #[test]
    fn test_report_as_relabels_samples() {
        let (cam, tx) = camera(MockCameraBehavior {
            report_as: Some("ForwardCameras_01/rgb".into()),
            ..Default::default()
        });
        let labels = Arc::new(Mutex::new(Vec::new()));
        let sink = labels.clone();
        cam.listen(Arc::new(move |sample: SensorSample| {
            sink.lock().push(sample.sensor);
        }));

        tx.try_send(tick(7)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while labels.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(cam.sensor_id().as_str(), "ForwardCameras_00/rgb");
        assert_eq!(*labels.lock(), vec![SensorId::from("ForwardCameras_01/rgb")]);
    }

    #[test]
    fn test_thread_exits_when_feed_closes() {
        let (cam, tx) = camera(MockCameraBehavior::default());
        let (_received, callback) = collector();
        cam.listen(callback);
        assert!(cam.is_listening());

        drop(tx);
        let deadline = Instant::now() + Duration::from_secs(2);
        while cam.is_listening() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!cam.is_listening());
    }

    #[test]
    fn test_render_encodes_step() {
        let a = MockCamera::render(Modality::SemanticSegmentation, 2, 2, StepId(5));
        assert_eq!(a.data.len(), 16);
        assert_eq!(&a.data[..4], &[0, 0, 5, 255]);
        let b = MockCamera::render(Modality::Rgb, 2, 2, StepId(6));
        assert_ne!(a.data, b.data);
    }
}
