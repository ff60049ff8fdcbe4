//! 配置校验模块
//!
//! 校验规则：
//! - 数值范围 (`validator` derive: fps, stride, timeouts, population, camera)
//! - rig 名称唯一，位置列表等长且非空，模态列表非空且不重复
//! - camera_group 必须是 "All" 或已声明的 rig
//! - weather_id 在预设表范围内
//! - sink 名称非空且唯一

use std::collections::HashSet;

use contracts::{CameraSelection, CaptureConfig, ContractError, RigSpec, WeatherPreset};
use ::validator::Validate;

/// 校验 CaptureConfig
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &CaptureConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_plan(config)?;
    validate_weather(config)?;
    validate_rigs(&config.rigs)?;
    validate_camera_group(config)?;
    validate_sinks(config)?;
    validate_output(config)?;
    Ok(())
}

fn validate_ranges(config: &CaptureConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "config".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

/// The step counter of the whole run must fit in a u64
fn validate_plan(config: &CaptureConfig) -> Result<(), ContractError> {
    if config.capture.total_steps().is_none() {
        let capture = &config.capture;
        return Err(ContractError::config_validation(
            "capture.samples",
            format!(
                "offset + samples * stride overflows ({} + {} * {})",
                capture.offset, capture.samples, capture.stride
            ),
        ));
    }
    Ok(())
}

fn validate_weather(config: &CaptureConfig) -> Result<(), ContractError> {
    if WeatherPreset::from_id(config.weather_id).is_none() {
        return Err(ContractError::config_validation(
            "weather_id",
            format!(
                "weather_id must be in 0..={}, got {}",
                WeatherPreset::TABLE.len() - 1,
                config.weather_id
            ),
        ));
    }
    Ok(())
}

/// 校验 rig 声明
fn validate_rigs(rigs: &[RigSpec]) -> Result<(), ContractError> {
    if rigs.is_empty() {
        return Err(ContractError::config_validation(
            "rigs",
            "at least one camera rig is required",
        ));
    }

    let mut names = HashSet::new();
    for rig in rigs {
        let field = format!("rigs[{}]", rig.name);
        if rig.name.is_empty() {
            return Err(ContractError::config_validation("rigs[].name", "rig name cannot be empty"));
        }
        if !names.insert(rig.name.as_str()) {
            return Err(ContractError::config_validation(field, "duplicate rig name"));
        }
        if !rig.has_consistent_axes() {
            return Err(ContractError::config_validation(
                format!("{field}.x_locs/y_locs/z_locs"),
                format!(
                    "location lists must have equal length, got x={} y={} z={}",
                    rig.x_locs.len(),
                    rig.y_locs.len(),
                    rig.z_locs.len()
                ),
            ));
        }
        if rig.positions() == 0 {
            return Err(ContractError::config_validation(
                format!("{field}.x_locs"),
                "rig needs at least one position",
            ));
        }
        if rig.sensor_types.is_empty() {
            return Err(ContractError::config_validation(
                format!("{field}.sensor_types"),
                "rig needs at least one sensor type",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = rig.sensor_types.iter().find(|m| !seen.insert(**m)) {
            return Err(ContractError::config_validation(
                format!("{field}.sensor_types"),
                format!("duplicate sensor type '{dup}'"),
            ));
        }
        let coords = rig.x_locs.iter().chain(&rig.y_locs).chain(&rig.z_locs);
        if coords.chain(std::iter::once(&rig.rot_yaw)).any(|v| !v.is_finite()) {
            return Err(ContractError::config_validation(
                field,
                "rig coordinates must be finite",
            ));
        }
    }
    Ok(())
}

/// camera_group 必须指向已声明的 rig
fn validate_camera_group(config: &CaptureConfig) -> Result<(), ContractError> {
    if let CameraSelection::Group(name) = &config.camera_group {
        if !config.rigs.iter().any(|rig| &rig.name == name) {
            let known: Vec<_> = config.rigs.iter().map(|r| r.name.as_str()).collect();
            return Err(ContractError::config_validation(
                "camera_group",
                format!("unknown camera group '{name}', expected All or one of {known:?}"),
            ));
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(config: &CaptureConfig) -> Result<(), ContractError> {
    let mut names = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !names.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
    }
    Ok(())
}

fn validate_output(config: &CaptureConfig) -> Result<(), ContractError> {
    let ext = config.output.extension.as_str();
    if ext.is_empty() || ext.contains(['.', '/', '\\']) {
        return Err(ContractError::config_validation(
            "output.extension",
            format!("invalid image extension '{ext}'"),
        ));
    }
    if config.output.root.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "output.root",
            "output root cannot be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Modality, SinkConfig, SinkType};
    use std::collections::HashMap;

    fn rig(name: &str, positions: usize) -> RigSpec {
        RigSpec {
            name: name.to_string(),
            x_locs: vec![1.0; positions],
            y_locs: vec![0.0; positions],
            z_locs: vec![1.8; positions],
            rot_yaw: 0.0,
            sensor_types: vec![Modality::Rgb],
        }
    }

    fn field_of(result: Result<(), ContractError>) -> String {
        match result {
            Err(ContractError::ConfigValidation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&CaptureConfig::default()).is_ok());
    }

    #[test]
    fn test_mismatched_axes() {
        let mut config = CaptureConfig::default();
        let mut bad = rig("Bad", 3);
        bad.y_locs.pop();
        config.rigs = vec![bad];
        assert!(field_of(validate(&config)).contains("x_locs/y_locs/z_locs"));
    }

    #[test]
    fn test_empty_positions() {
        let mut config = CaptureConfig::default();
        config.rigs = vec![rig("Empty", 0)];
        assert_eq!(field_of(validate(&config)), "rigs[Empty].x_locs");
    }

    #[test]
    fn test_duplicate_rig_names() {
        let mut config = CaptureConfig::default();
        config.rigs = vec![rig("A", 1), rig("A", 2)];
        assert_eq!(field_of(validate(&config)), "rigs[A]");
    }

    #[test]
    fn test_duplicate_sensor_type() {
        let mut config = CaptureConfig::default();
        let mut twice = rig("Twice", 1);
        twice.sensor_types = vec![Modality::Depth, Modality::Depth];
        config.rigs = vec![twice];
        assert_eq!(field_of(validate(&config)), "rigs[Twice].sensor_types");
    }

    #[test]
    fn test_unknown_camera_group() {
        let mut config = CaptureConfig::default();
        config.camera_group = CameraSelection::parse("RoofCameras");
        assert_eq!(field_of(validate(&config)), "camera_group");
    }

    #[test]
    fn test_weather_out_of_range() {
        let mut config = CaptureConfig::default();
        config.weather_id = 4;
        assert_eq!(field_of(validate(&config)), "weather_id");
    }

    #[test]
    fn test_zero_stride_rejected() {
        let mut config = CaptureConfig::default();
        config.capture.stride = 0;
        assert_eq!(field_of(validate(&config)), "capture");
    }

    #[test]
    fn test_step_count_overflow_rejected() {
        let mut config = CaptureConfig::default();
        config.capture.samples = u64::MAX / 4;
        config.capture.stride = 8;
        assert_eq!(field_of(validate(&config)), "capture.samples");
    }

    #[test]
    fn test_huge_step_timeout_rejected() {
        let mut config = CaptureConfig::default();
        config.capture.step_timeout_s = 1e30;
        assert_eq!(field_of(validate(&config)), "capture");
    }

    #[test]
    fn test_duplicate_sink_names() {
        let mut config = CaptureConfig::default();
        config.sinks.push(SinkConfig {
            name: "images".into(),
            sink_type: SinkType::Log,
            params: HashMap::new(),
        });
        assert_eq!(field_of(validate(&config)), "sinks[1].name");
    }

    #[test]
    fn test_bad_extension() {
        let mut config = CaptureConfig::default();
        config.output.extension = ".png".into();
        assert_eq!(field_of(validate(&config)), "output.extension");
    }
}
