//! SensorSource trait - sensor notification channel
//!
//! Real simulator cameras and mock cameras expose the same callback-style
//! interface; the step synchronizer subscribes one buffer per source.

use std::sync::Arc;

use crate::{Modality, SensorId, SensorSample};

/// Sample callback.
///
/// Invoked on the producer's thread (simulator callback thread or mock
/// delivery thread), never on the control task.
pub type SensorDataCallback = Arc<dyn Fn(SensorSample) + Send + Sync>;

/// One attached camera's notification channel.
///
/// ```ignore
/// let source: Box<dyn SensorSource> = client.sensor_source(&handle)?;
/// source.listen(Arc::new(move |sample| { let _ = tx.try_send(sample); }));
/// // ... step the world ...
/// source.stop();
/// ```
pub trait SensorSource: Send + Sync {
    fn sensor_id(&self) -> &SensorId;

    fn modality(&self) -> Modality;

    /// Register the sample callback.
    ///
    /// Calling `listen` on a source that is already listening is a no-op.
    fn listen(&self, callback: SensorDataCallback);

    /// Stop delivering samples. Idempotent.
    fn stop(&self);

    fn is_listening(&self) -> bool;
}
