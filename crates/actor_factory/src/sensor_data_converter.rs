//! CARLA 相机数据转换
//!
//! 将 CARLA 原生 `Image` 转换为 `SensorSample`。
//! 仅在 `real-carla` feature 启用时编译。

use bytes::Bytes;
use carla::sensor::data::Image;
use carla::sensor::{SensorData, SensorDataBase};
use contracts::{ImageData, ImageFormat, SensorId, SensorSample, StepId};

/// CARLA cameras always deliver BGRA
fn image_data(image: &Image) -> ImageData {
    ImageData {
        width: image.width() as u32,
        height: image.height() as u32,
        format: ImageFormat::Bgra8,
        data: Bytes::copy_from_slice(image.as_raw_bytes()),
    }
}

/// 将 CARLA 传感器数据转换为 SensorSample
///
/// The sample is tagged with the simulator frame that produced it, which is
/// the same number `World::tick` returned for that step. Returns `None` if
/// the payload is not an image.
pub fn convert_image(sensor: &SensorId, data: &SensorData) -> Option<SensorSample> {
    let image = Image::try_from(data.clone()).ok()?;

    Some(SensorSample {
        sensor: sensor.clone(),
        step: StepId(data.frame() as u64),
        timestamp: data.timestamp(),
        image: image_data(&image),
    })
}
