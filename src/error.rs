use thiserror::Error;

use crate::backend::{OptionId, SensorKind, StreamKind};
use crate::capture::format::NativeFormat;
use crate::control::features::CameraFeature;

/// Errors surfaced by the RGB-D driver to its callers.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("No device connected")]
    BackendUnavailable,

    #[error("Backend call `{call}` failed: {message}")]
    BackendCallFailed { call: &'static str, message: String },

    #[error("Pixel format {0:?} not recognized")]
    UnsupportedPixelFormat(NativeFormat),

    #[error("Device and local copy data size don't match: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Frame set has no {0:?} frame")]
    MissingSubFrame(StreamKind),

    #[error("The option {option:?} is not supported by the {sensor:?} sensor")]
    UnsupportedOption { sensor: SensorKind, option: OptionId },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Feature {0:?} not supported")]
    FeatureNotSupported(CameraFeature),

    #[error("Feature {0:?} does not have both auto and manual mode")]
    ModeNotApplicable(CameraFeature),

    #[error("Pipeline is not running")]
    PipelineNotRunning,

    #[error("Sensor warm-up failed after {completed} frame sets: {reason}")]
    WarmupFailed { completed: usize, reason: String },

    #[error("No calibration available for the current stream configuration")]
    NotCalibrated,

    #[error("No {0:?} sensor was resolved on the device")]
    SensorUnavailable(SensorKind),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl DriverError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
