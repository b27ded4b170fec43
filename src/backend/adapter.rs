//! Error boundary in front of a `DeviceBackend`.

use std::time::Duration;

use tracing::{debug, error};

use super::{
    BackendError, BackendResult, DeviceBackend, DeviceInfo, FrameSet, OptionId, OptionRange, SensorHandle,
    SensorInfo, StreamKind, StreamProfile, StreamRequest,
};
use crate::error::{DriverError, Result};
use crate::geometry::{Extrinsics, Intrinsics};
use crate::pipeline::CalibrationSnapshot;

/// Wraps a backend, tracks whether its pipeline is streaming and turns
/// every backend failure into a logged `DriverError`.
pub struct BackendAdapter<B> {
    backend: B,
    streaming: bool,
}

impl<B: DeviceBackend> BackendAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            streaming: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the backend pipeline was started and not stopped since.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn query_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        convert("query_devices", self.backend.query_devices())
    }

    pub fn query_sensors(&mut self, device: &DeviceInfo) -> Result<Vec<SensorInfo>> {
        convert("query_sensors", self.backend.query_sensors(device))
    }

    pub fn start_pipeline(&mut self, streams: &[StreamRequest]) -> Result<()> {
        convert("start_pipeline", self.backend.start_pipeline(streams))?;
        self.streaming = true;
        Ok(())
    }

    /// Stops the pipeline. The adapter considers it stopped even when the
    /// backend reports a failure.
    pub fn stop_pipeline(&mut self) -> Result<()> {
        self.streaming = false;
        convert("stop_pipeline", self.backend.stop_pipeline())
    }

    pub fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameSet> {
        if !self.streaming {
            return Err(DriverError::PipelineNotRunning);
        }
        let frames = convert("wait_for_frames", self.backend.wait_for_frames(timeout))?;
        debug!(
            color = frames.color.as_ref().map(|f| f.frame_number),
            depth = frames.depth.as_ref().map(|f| f.frame.frame_number),
            "Frame set received"
        );
        Ok(frames)
    }

    /// Aligns depth onto the color grid described by `calibration`.
    ///
    /// A frame set missing either sub-frame is rejected before it reaches
    /// the backend.
    pub fn align_to_color(&mut self, frames: FrameSet, calibration: &CalibrationSnapshot) -> Result<FrameSet> {
        for kind in [StreamKind::Color, StreamKind::Depth] {
            if !frames.has(kind) {
                error!("Can't align a frame set without its {:?} frame", kind);
                return Err(DriverError::MissingSubFrame(kind));
            }
        }
        convert("align_to_color", self.backend.align_to_color(frames, calibration))
    }

    pub fn active_stream(&self, kind: StreamKind) -> Result<StreamProfile> {
        if !self.streaming {
            return Err(DriverError::PipelineNotRunning);
        }
        convert("active_stream", self.backend.active_stream(kind))
    }

    pub fn query_intrinsics(&self, stream: &StreamProfile) -> Result<Intrinsics> {
        convert("query_intrinsics", self.backend.query_intrinsics(stream))
    }

    pub fn query_extrinsics(&self, from: &StreamProfile, to: &StreamProfile) -> Result<Extrinsics> {
        convert("query_extrinsics", self.backend.query_extrinsics(from, to))
    }

    pub fn supports_option(&self, sensor: &SensorHandle, option: OptionId) -> bool {
        self.backend.supports_option(sensor, option)
    }

    pub fn option_range(&self, sensor: &SensorHandle, option: OptionId) -> Result<OptionRange> {
        convert("option_range", self.backend.option_range(sensor, option))
    }

    pub fn option_description(&self, sensor: &SensorHandle, option: OptionId) -> Option<String> {
        self.backend.option_description(sensor, option)
    }

    pub fn get_option(&self, sensor: &SensorHandle, option: OptionId) -> Result<f32> {
        convert("get_option", self.backend.get_option(sensor, option))
    }

    pub fn set_option(&mut self, sensor: &SensorHandle, option: OptionId, value: f32) -> Result<()> {
        convert("set_option", self.backend.set_option(sensor, option, value))
    }
}

fn convert<T>(call: &'static str, result: BackendResult<T>) -> Result<T> {
    result.map_err(|e| {
        error!("Backend call {} failed: {}", call, e);
        match e {
            BackendError::NoDevice => DriverError::BackendUnavailable,
            BackendError::NotStarted => DriverError::PipelineNotRunning,
            other => DriverError::BackendCallFailed {
                call,
                message: other.to_string(),
            },
        }
    })
}
