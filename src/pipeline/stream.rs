//! Stream negotiation and the pipeline start/stop transaction.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::calibration::CalibrationCache;
use crate::backend::{BackendAdapter, DeviceBackend, StreamKind, StreamRequest};
use crate::capture::format::NativeFormat;
use crate::error::{DriverError, Result};

/// Frame sets discarded after every start so auto exposure and white
/// balance settle before anything reaches a caller.
pub const WARMUP_FRAMES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub format: NativeFormat,
}

impl StreamSettings {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Requested configuration of both streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub color: StreamSettings,
    pub depth: StreamSettings,
    pub fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            color: StreamSettings {
                width: 640,
                height: 480,
                format: NativeFormat::Rgb8,
            },
            depth: StreamSettings {
                width: 640,
                height: 480,
                format: NativeFormat::Z16,
            },
            fps: 30,
        }
    }
}

impl StreamConfig {
    /// Applies a resolution change. Formats are never touched.
    pub fn merge(&mut self, change: StreamChange) {
        if let Some(color) = change.color {
            self.color.width = color.width;
            self.color.height = color.height;
        }
        if let Some(depth) = change.depth {
            self.depth.width = depth.width;
            self.depth.height = depth.height;
        }
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        vec![
            StreamRequest {
                kind: StreamKind::Color,
                width: self.color.width,
                height: self.color.height,
                format: self.color.format,
                fps: self.fps,
            },
            StreamRequest {
                kind: StreamKind::Depth,
                width: self.depth.width,
                height: self.depth.height,
                format: self.depth.format,
                fps: self.fps,
            },
        ]
    }
}

/// Resolution change for either or both streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamChange {
    pub color: Option<Resolution>,
    pub depth: Option<Resolution>,
}

impl StreamChange {
    pub fn color(resolution: Resolution) -> Self {
        Self {
            color: Some(resolution),
            depth: None,
        }
    }

    pub fn depth(resolution: Resolution) -> Self {
        Self {
            color: None,
            depth: Some(resolution),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Reconfiguring,
    Running,
}

/// Owns the stream configuration and drives the backend pipeline through
/// stop, start, warm-up and calibration refresh.
pub struct StreamManager {
    config: StreamConfig,
    state: PipelineState,
    frame_timeout: Duration,
}

impl StreamManager {
    pub fn new(config: StreamConfig, frame_timeout: Duration) -> Self {
        Self {
            config,
            state: PipelineState::Stopped,
            frame_timeout,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    pub fn frame_timeout(&self) -> Duration {
        self.frame_timeout
    }

    /// Restarts the pipeline with `change` merged into the configuration.
    ///
    /// Ends in `Running` only when start, warm-up and calibration refresh all
    /// succeed; every failure leaves the pipeline `Stopped`. The merged
    /// configuration is kept even if the start fails.
    #[instrument(skip(self, adapter, calibration))]
    pub fn reconfigure<B: DeviceBackend>(
        &mut self,
        adapter: &mut BackendAdapter<B>,
        calibration: &CalibrationCache,
        change: StreamChange,
    ) -> Result<()> {
        if self.state == PipelineState::Running || adapter.is_streaming() {
            self.state = PipelineState::Reconfiguring;
            calibration.invalidate();
            if let Err(e) = adapter.stop_pipeline() {
                error!("Pipeline did not stop cleanly, assuming it is stopped: {}", e);
                self.state = PipelineState::Stopped;
                return Err(e);
            }
        }

        self.state = PipelineState::Reconfiguring;
        self.config.merge(change);

        if let Err(e) = adapter.start_pipeline(&self.config.requests()) {
            self.state = PipelineState::Stopped;
            return Err(e);
        }

        if let Err(e) = self.warm_up(adapter) {
            self.abort(adapter, calibration);
            return Err(e);
        }

        if let Err(e) = calibration.refresh(adapter) {
            self.abort(adapter, calibration);
            return Err(e);
        }

        self.state = PipelineState::Running;
        info!(
            color = %self.config.color.resolution(),
            depth = %self.config.depth.resolution(),
            "Pipeline running"
        );
        Ok(())
    }

    /// Stops the pipeline if it is streaming. The manager is `Stopped`
    /// afterwards whatever the backend reports.
    #[instrument(skip_all)]
    pub fn stop<B: DeviceBackend>(&mut self, adapter: &mut BackendAdapter<B>, calibration: &CalibrationCache) -> Result<()> {
        calibration.invalidate();
        self.state = PipelineState::Stopped;
        if !adapter.is_streaming() {
            return Ok(());
        }
        if let Err(e) = adapter.stop_pipeline() {
            error!("Pipeline did not stop cleanly, assuming it is stopped: {}", e);
            return Err(e);
        }
        info!("Pipeline stopped");
        Ok(())
    }

    fn warm_up<B: DeviceBackend>(&self, adapter: &mut BackendAdapter<B>) -> Result<()> {
        for completed in 0..WARMUP_FRAMES {
            adapter
                .wait_for_frames(self.frame_timeout)
                .map_err(|e| DriverError::WarmupFailed {
                    completed,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn abort<B: DeviceBackend>(&mut self, adapter: &mut BackendAdapter<B>, calibration: &CalibrationCache) {
        if let Err(e) = adapter.stop_pipeline() {
            warn!("Failed to stop pipeline after aborted start: {}", e);
        }
        calibration.invalidate();
        self.state = PipelineState::Stopped;
    }
}
