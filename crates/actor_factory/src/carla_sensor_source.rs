//! CARLA camera SensorSource wrapper
//!
//! Only compiled when `real-carla` feature is enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use carla::client::Sensor;
use contracts::{Modality, SensorDataCallback, SensorId, SensorSource};
use tracing::{debug, trace, warn};

use crate::sensor_data_converter::convert_image;

/// CARLA camera wrapper
///
/// The simulator invokes the callback on its own worker threads.
pub struct CarlaSensorSource {
    sensor_id: SensorId,
    modality: Modality,
    sensor: Sensor,
    listening: Arc<AtomicBool>,
}

impl CarlaSensorSource {
    pub fn new(sensor_id: SensorId, modality: Modality, sensor: Sensor) -> Self {
        Self {
            sensor_id,
            modality,
            sensor,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl SensorSource for CarlaSensorSource {
    fn sensor_id(&self) -> &SensorId {
        &self.sensor_id
    }

    fn modality(&self) -> Modality {
        self.modality
    }

    fn listen(&self, callback: SensorDataCallback) {
        // Idempotent: if already listening, don't register again
        if self.listening.swap(true, Ordering::SeqCst) {
            warn!(sensor_id = %self.sensor_id, "camera already listening");
            return;
        }

        let sensor_id = self.sensor_id.clone();
        let listening = self.listening.clone();

        debug!(sensor_id = %sensor_id, modality = %self.modality, "starting CARLA camera");

        self.sensor.listen(move |data| {
            if !listening.load(Ordering::Relaxed) {
                return;
            }

            match convert_image(&sensor_id, &data) {
                Some(sample) => {
                    trace!(sensor_id = %sensor_id, step = %sample.step, "CARLA image received");
                    callback(sample);
                }
                None => warn!(sensor_id = %sensor_id, "non-image payload from camera"),
            }
        });
    }

    fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(sensor_id = %self.sensor_id, "stopping CARLA camera");
            self.sensor.stop();
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}
