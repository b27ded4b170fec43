//! Device backend abstraction.
//!
//! `DeviceBackend` is the thin synchronous surface the driver needs from a
//! camera SDK: devices, sensors, a start/stop pipeline bound to a stream
//! request, blocking frame-set waits, stream geometry and per-sensor numeric
//! options. `BackendAdapter` sits in front of it and converts every backend
//! failure into a `DriverError`.

pub mod adapter;
pub mod frame;
pub mod simulated;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::format::NativeFormat;
use crate::geometry::{align, Extrinsics, Intrinsics};
use crate::pipeline::CalibrationSnapshot;

pub use adapter::BackendAdapter;
pub use frame::{DepthFrame, DepthUnits, FrameSet, VideoFrame};
pub use simulated::{SimControl, SimulatedBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Color,
    Depth,
}

/// Capability tag used to find a sensor in the device's sensor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Depth,
    Color,
}

/// Numeric device settings addressable through get/set option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionId {
    Exposure,
    Gain,
    WhiteBalance,
    Sharpness,
    Hue,
    Saturation,
    Brightness,
    Contrast,
    Gamma,
    EnableAutoExposure,
    EnableAutoWhiteBalance,
    LaserPower,
    Accuracy,
    MinDistance,
    MaxDistance,
    DepthUnits,
}

impl OptionId {
    pub const ALL: [OptionId; 16] = [
        OptionId::Exposure,
        OptionId::Gain,
        OptionId::WhiteBalance,
        OptionId::Sharpness,
        OptionId::Hue,
        OptionId::Saturation,
        OptionId::Brightness,
        OptionId::Contrast,
        OptionId::Gamma,
        OptionId::EnableAutoExposure,
        OptionId::EnableAutoWhiteBalance,
        OptionId::LaserPower,
        OptionId::Accuracy,
        OptionId::MinDistance,
        OptionId::MaxDistance,
        OptionId::DepthUnits,
    ];
}

/// Valid range of an option as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl OptionRange {
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Identity and descriptive strings of a connected device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub physical_port: Option<String>,
    pub product_id: Option<String>,
    pub usb_type: Option<String>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device information: ")?;
        let fields = [
            ("Name", &self.name),
            ("Serial Number", &self.serial_number),
            ("Firmware Version", &self.firmware_version),
            ("Physical Port", &self.physical_port),
            ("Product Id", &self.product_id),
            ("Usb Type Descriptor", &self.usb_type),
        ];
        for (label, value) in fields {
            writeln!(f, "  {:<20} : {}", label, value.as_deref().unwrap_or("N/A"))?;
        }
        Ok(())
    }
}

/// Sensor entry of a device's sensor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub index: usize,
    pub name: String,
    pub is_depth: bool,
}

/// Non-owning reference to one of the device's sensors.
///
/// Only valid for the device session it was resolved in; the driver
/// resolves fresh handles every time it (re)initializes the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorHandle {
    pub kind: SensorKind,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub format: NativeFormat,
    /// 0 lets the device pick
    pub fps: u32,
}

/// Profile of an active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub kind: StreamKind,
    pub format: NativeFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub unique_id: u32,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("no device connected")]
    NoDevice,

    #[error("pipeline not started")]
    NotStarted,

    #[error("frame didn't arrive within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Synchronous camera SDK surface.
///
/// Implementations are not expected to be safe for concurrent waits; the
/// driver serializes all calls.
pub trait DeviceBackend: Send {
    fn query_devices(&mut self) -> BackendResult<Vec<DeviceInfo>>;

    /// Selects `device` and lists its sensors.
    fn query_sensors(&mut self, device: &DeviceInfo) -> BackendResult<Vec<SensorInfo>>;

    fn start_pipeline(&mut self, streams: &[StreamRequest]) -> BackendResult<()>;

    fn stop_pipeline(&mut self) -> BackendResult<()>;

    /// Blocks until the next synchronized frame set.
    fn wait_for_frames(&mut self, timeout: Duration) -> BackendResult<FrameSet>;

    /// Profile of the running pipeline's stream of `kind`.
    fn active_stream(&self, kind: StreamKind) -> BackendResult<StreamProfile>;

    fn query_intrinsics(&self, stream: &StreamProfile) -> BackendResult<Intrinsics>;

    fn query_extrinsics(&self, from: &StreamProfile, to: &StreamProfile) -> BackendResult<Extrinsics>;

    fn supports_option(&self, sensor: &SensorHandle, option: OptionId) -> bool;

    fn option_range(&self, sensor: &SensorHandle, option: OptionId) -> BackendResult<OptionRange>;

    fn option_description(&self, sensor: &SensorHandle, option: OptionId) -> Option<String>;

    fn get_option(&self, sensor: &SensorHandle, option: OptionId) -> BackendResult<f32>;

    fn set_option(&mut self, sensor: &SensorHandle, option: OptionId, value: f32) -> BackendResult<()>;

    /// Reprojects the depth frame onto the color frame's pixel grid.
    ///
    /// `calibration` is the geometry of the running configuration. The
    /// default does it in software and needs both sub-frames.
    fn align_to_color(&mut self, frames: FrameSet, calibration: &CalibrationSnapshot) -> BackendResult<FrameSet> {
        let (Some(color), Some(depth)) = (&frames.color, &frames.depth) else {
            return Err(BackendError::Failed("alignment needs both a color and a depth frame".to_string()));
        };

        let color_intrin = calibration.color_intrinsics;
        let units = depth.units;
        let aligned = align::align_depth(
            &depth.samples(),
            &calibration.depth_intrinsics,
            &calibration.depth_to_color,
            &color_intrin,
            |raw| units.to_meters(raw),
        );

        let mut bytes = Vec::with_capacity(aligned.len() * 2);
        for sample in aligned {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let mut frame = depth.frame.clone();
        frame.width = color_intrin.width;
        frame.height = color_intrin.height;
        frame.stride = color_intrin.width * 2;
        frame.data = bytes.into();

        Ok(FrameSet {
            color: Some(color.clone()),
            depth: Some(DepthFrame { frame, units }),
        })
    }
}
