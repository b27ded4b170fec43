//! RGB-D sensor facade over a device backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::backend::{BackendAdapter, DeviceBackend, DeviceInfo, OptionId, SensorKind};
use crate::capture::acquire;
use crate::capture::{AcquisitionStats, DepthImage, FlexImage, Stamp, StatsSnapshot};
use crate::control::{self, features, FeatureMode, SensorHandles};
use crate::error::{DriverError, Result};
use crate::geometry::Intrinsics;
use crate::params::DriverConfig;
use crate::pipeline::{CalibrationCache, PipelineState, Resolution, StreamChange, StreamManager};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    NotReady,
    OkStandby,
    OkInUse,
    GenericError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Usb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescription {
    pub device_description: String,
    pub bus_type: BusType,
}

/// Intrinsics in the plumb-bob property layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrinsicParams {
    pub focal_length_x: f32,
    pub focal_length_y: f32,
    pub principal_point_x: f32,
    pub principal_point_y: f32,
    pub distortion_model: &'static str,
    pub k1: f32,
    pub k2: f32,
    pub t1: f32,
    pub t2: f32,
    pub k3: f32,
}

impl From<&Intrinsics> for IntrinsicParams {
    fn from(intrinsics: &Intrinsics) -> Self {
        let [k1, k2, t1, t2, k3] = intrinsics.coeffs;
        Self {
            focal_length_x: intrinsics.fx,
            focal_length_y: intrinsics.fy,
            principal_point_x: intrinsics.ppx,
            principal_point_y: intrinsics.ppy,
            distortion_model: "plumb_bob",
            k1,
            k2,
            t1,
            t2,
            k3,
        }
    }
}

/// Color and depth images taken from the same frame set.
#[derive(Debug, Clone)]
pub struct RgbdFrame {
    pub color: FlexImage,
    pub color_stamp: Stamp,
    pub depth: DepthImage,
    pub depth_stamp: Stamp,
}

struct Session<B> {
    adapter: BackendAdapter<B>,
    streams: StreamManager,
    sensors: SensorHandles,
    device: DeviceInfo,
    rgb_stamp: Stamp,
    depth_stamp: Stamp,
}

/// Driver for one RGB-D camera.
///
/// Every call touching the pipeline or the sensors is serialized on the
/// session lock and blocks for its whole duration. Geometry getters read
/// the calibration snapshot and never wait on it.
pub struct RgbdDriver<B: DeviceBackend> {
    session: Mutex<Session<B>>,
    calibration: CalibrationCache,
    registered: bool,
    period: Duration,
    stats: AcquisitionStats,
    last_error: ArcSwapOption<String>,
}

impl<B: DeviceBackend> RgbdDriver<B> {
    /// Connects to the first device, waiting for one if none is plugged in,
    /// and starts streaming with the configured resolutions.
    #[instrument(skip_all)]
    pub fn open(backend: B, config: &DriverConfig) -> Result<Self> {
        config.validate()?;

        // Block until a device shows up
        let mut adapter = BackendAdapter::new(backend);
        let device = utils::wait_for_device(&mut adapter, config.device_poll_interval())?;
        utils::log_device_info(&device);

        // Missing sensors only fail the calls that need them
        let sensors = SensorHandles::resolve(&adapter.query_sensors(&device)?);
        for kind in [SensorKind::Depth, SensorKind::Color] {
            if sensors.get(kind).is_err() {
                warn!("No {:?} sensor found on the device", kind);
            }
        }

        // Start streaming and warm up
        let calibration = CalibrationCache::new(config.fallback_extrinsics());
        let mut streams = StreamManager::new(config.stream_config(), config.frame_timeout());
        streams.reconfigure(&mut adapter, &calibration, StreamChange::default())?;

        if config.verbose {
            control::log_supported_options(&adapter, &sensors);
        }

        let driver = Self {
            session: Mutex::new(Session {
                adapter,
                streams,
                sensors,
                device,
                rgb_stamp: Stamp::default(),
                depth_stamp: Stamp::default(),
            }),
            calibration,
            registered: config.registered,
            period: Duration::from_millis(config.period_ms as u64),
            stats: AcquisitionStats::new(),
            last_error: ArcSwapOption::empty(),
        };

        // Depth controls need the sensors, so they come last
        if let Some(accuracy) = config.accuracy {
            driver.set_depth_accuracy(accuracy)?;
        }
        if let Some([near, far]) = config.clip_planes {
            driver.set_depth_clip_planes(near, far)?;
        }

        info!("RGB-D driver open");
        Ok(driver)
    }

    /// Stops the pipeline. Later acquisitions fail with `PipelineNotRunning`.
    pub fn close(&self) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, streams, .. } = &mut *session;
        streams.stop(adapter, &self.calibration)
    }

    fn lock(&self) -> MutexGuard<'_, Session<B>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error.store(Some(Arc::new(e.to_string())));
        }
        result
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.lock().streams.state()
    }

    /// Acquisition period callers should poll at.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn sensor_status(&self) -> SensorStatus {
        SensorStatus::OkInUse
    }

    pub fn last_error_message(&self) -> String {
        self.last_error.load_full().map(|e| e.to_string()).unwrap_or_default()
    }

    pub fn camera_description(&self) -> CameraDescription {
        CameraDescription {
            device_description: self.lock().device.to_string(),
            bus_type: BusType::Usb,
        }
    }

    pub fn rgb_resolution(&self) -> Result<Resolution> {
        let intrinsics = self.calibration.color_intrinsics()?;
        Ok(Resolution::new(intrinsics.width, intrinsics.height))
    }

    pub fn depth_resolution(&self) -> Result<Resolution> {
        let intrinsics = self.calibration.depth_intrinsics()?;
        Ok(Resolution::new(intrinsics.width, intrinsics.height))
    }

    /// Horizontal and vertical field of view in degrees.
    pub fn rgb_fov(&self) -> Result<(f32, f32)> {
        Ok(self.calibration.color_intrinsics()?.fov())
    }

    pub fn depth_fov(&self) -> Result<(f32, f32)> {
        Ok(self.calibration.depth_intrinsics()?.fov())
    }

    pub fn set_rgb_fov(&self, _horizontal: f32, _vertical: f32) -> Result<()> {
        warn!("Setting the field of view is not supported");
        Err(DriverError::NotImplemented("field of view control"))
    }

    pub fn set_depth_fov(&self, _horizontal: f32, _vertical: f32) -> Result<()> {
        warn!("Setting the field of view is not supported");
        Err(DriverError::NotImplemented("field of view control"))
    }

    pub fn rgb_intrinsics(&self) -> Result<Intrinsics> {
        self.calibration.color_intrinsics()
    }

    pub fn depth_intrinsics(&self) -> Result<Intrinsics> {
        self.calibration.depth_intrinsics()
    }

    pub fn rgb_intrinsic_params(&self) -> Result<IntrinsicParams> {
        Ok(IntrinsicParams::from(&self.calibration.color_intrinsics()?))
    }

    pub fn depth_intrinsic_params(&self) -> Result<IntrinsicParams> {
        Ok(IntrinsicParams::from(&self.calibration.depth_intrinsics()?))
    }

    /// Row-major depth-to-color transform.
    pub fn extrinsic(&self) -> Result<[[f64; 4]; 4]> {
        Ok(self.calibration.extrinsic()?.to_matrix())
    }

    pub fn rgb_mirroring(&self) -> Result<bool> {
        warn!("Mirroring not supported");
        Err(DriverError::NotImplemented("mirroring"))
    }

    pub fn set_rgb_mirroring(&self, _mirror: bool) -> Result<()> {
        warn!("Mirroring not supported");
        Err(DriverError::NotImplemented("mirroring"))
    }

    pub fn depth_mirroring(&self) -> Result<bool> {
        warn!("Mirroring not supported");
        Err(DriverError::NotImplemented("mirroring"))
    }

    pub fn set_depth_mirroring(&self, _mirror: bool) -> Result<()> {
        warn!("Mirroring not supported");
        Err(DriverError::NotImplemented("mirroring"))
    }

    pub fn rgb_supported_configurations(&self) -> Result<Vec<Resolution>> {
        Err(DriverError::NotImplemented("listing supported configurations"))
    }

    pub fn set_rgb_resolution(&self, width: u32, height: u32) -> Result<()> {
        self.reconfigure(StreamChange::color(checked_resolution("rgb_resolution", width, height)?))
    }

    pub fn set_depth_resolution(&self, width: u32, height: u32) -> Result<()> {
        self.reconfigure(StreamChange::depth(checked_resolution("depth_resolution", width, height)?))
    }

    fn reconfigure(&self, change: StreamChange) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, streams, .. } = &mut *session;
        let result = streams.reconfigure(adapter, &self.calibration, change);
        self.remember(result)
    }

    fn acquire<T>(&self, f: impl FnOnce(&mut Session<B>) -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let mut session = self.lock();
        // Nothing reaches the backend while stopped
        let result = if session.streams.is_running() {
            f(&mut *session)
        } else {
            Err(DriverError::PipelineNotRunning)
        };
        drop(session);

        match &result {
            Ok(_) => self.stats.record_latency(started.elapsed()),
            Err(_) => self.stats.record_failure(),
        }
        self.remember(result)
    }

    pub fn rgb_image(&self) -> Result<(FlexImage, Stamp)> {
        self.acquire(|s| {
            let frames = s.adapter.wait_for_frames(s.streams.frame_timeout())?;
            // Sized against the calibration, not the frame
            let color = self.calibration.color_intrinsics()?;
            let out = acquire::color_image(&frames, &color, &mut s.rgb_stamp)?;
            self.stats.record_color();
            Ok(out)
        })
    }

    /// Depth in meters, aligned onto the color grid when registration is on.
    pub fn depth_image(&self) -> Result<(DepthImage, Stamp)> {
        self.acquire(|s| {
            let mut frames = s.adapter.wait_for_frames(s.streams.frame_timeout())?;
            // Registered depth needs the color frame of the same set
            if self.registered {
                let calibration = self.calibration.snapshot().ok_or(DriverError::NotCalibrated)?;
                frames = s.adapter.align_to_color(frames, &calibration)?;
            }
            let out = acquire::depth_image(&frames, &mut s.depth_stamp)?;
            self.stats.record_depth();
            Ok(out)
        })
    }

    /// Both images from a single frame set.
    pub fn images(&self) -> Result<RgbdFrame> {
        self.acquire(|s| {
            let calibration = self.calibration.snapshot().ok_or(DriverError::NotCalibrated)?;

            // One wait and at most one alignment for both images
            let mut frames = s.adapter.wait_for_frames(s.streams.frame_timeout())?;
            if self.registered {
                frames = s.adapter.align_to_color(frames, &calibration)?;
            }
            let (color, color_stamp) =
                acquire::color_image(&frames, &calibration.color_intrinsics, &mut s.rgb_stamp)?;
            let (depth, depth_stamp) = acquire::depth_image(&frames, &mut s.depth_stamp)?;
            self.stats.record_color();
            self.stats.record_depth();
            Ok(RgbdFrame {
                color,
                color_stamp,
                depth,
                depth_stamp,
            })
        })
    }

    pub fn set_option(&self, sensor: SensorKind, option: OptionId, value: f32) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, sensors, .. } = &mut *session;
        control::set_option(adapter, sensors, sensor, option, value)
    }

    pub fn get_option(&self, sensor: SensorKind, option: OptionId) -> Result<f32> {
        let session = self.lock();
        control::get_option(&session.adapter, &session.sensors, sensor, option)
    }

    pub fn depth_accuracy(&self) -> Result<f32> {
        self.get_option(SensorKind::Depth, OptionId::Accuracy)
    }

    pub fn set_depth_accuracy(&self, accuracy: f32) -> Result<()> {
        self.set_option(SensorKind::Depth, OptionId::Accuracy, accuracy)
    }

    /// Near and far clip distances in meters.
    // TODO: MinDistance/MaxDistance is a guess at the clip plane options; check it against real firmware.
    pub fn depth_clip_planes(&self) -> Result<(f32, f32)> {
        let session = self.lock();
        let near = control::get_option(&session.adapter, &session.sensors, SensorKind::Depth, OptionId::MinDistance)?;
        let far = control::get_option(&session.adapter, &session.sensors, SensorKind::Depth, OptionId::MaxDistance)?;
        Ok((near, far))
    }

    pub fn set_depth_clip_planes(&self, near: f32, far: f32) -> Result<()> {
        if !(near >= 0.0 && near < far) {
            return Err(DriverError::invalid_parameter(
                "clip_planes",
                format!("expected 0 <= near < far, got [{}, {}]", near, far),
            ));
        }
        let mut session = self.lock();
        let Session { adapter, sensors, .. } = &mut *session;
        control::set_option(adapter, sensors, SensorKind::Depth, OptionId::MinDistance, near)?;
        control::set_option(adapter, sensors, SensorKind::Depth, OptionId::MaxDistance, far)
    }

    pub fn has_feature(&self, feature: i32) -> Result<bool> {
        features::has_feature(feature)
    }

    pub fn set_feature(&self, feature: i32, value: f64) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, sensors, .. } = &mut *session;
        features::set_feature(adapter, sensors, feature, value)
    }

    pub fn get_feature(&self, feature: i32) -> Result<f64> {
        let session = self.lock();
        features::get_feature(&session.adapter, &session.sensors, feature)
    }

    pub fn set_feature2(&self, feature: i32, value1: f64, value2: f64) -> Result<()> {
        features::set_feature2(feature, value1, value2)
    }

    pub fn get_feature2(&self, feature: i32) -> Result<(f64, f64)> {
        features::get_feature2(feature)
    }

    pub fn has_on_off(&self, feature: i32) -> Result<bool> {
        features::has_on_off(feature)
    }

    pub fn set_active(&self, feature: i32, active: bool) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, sensors, .. } = &mut *session;
        features::set_active(adapter, sensors, feature, active)
    }

    pub fn get_active(&self, feature: i32) -> Result<bool> {
        let session = self.lock();
        features::get_active(&session.adapter, &session.sensors, feature)
    }

    pub fn has_auto(&self, feature: i32) -> Result<bool> {
        features::has_auto(feature)
    }

    pub fn has_manual(&self, feature: i32) -> Result<bool> {
        features::has_manual(feature)
    }

    pub fn has_one_push(&self, feature: i32) -> Result<bool> {
        features::has_one_push(feature)
    }

    pub fn set_mode(&self, feature: i32, mode: FeatureMode) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, sensors, .. } = &mut *session;
        features::set_mode(adapter, sensors, feature, mode)
    }

    pub fn get_mode(&self, feature: i32) -> Result<FeatureMode> {
        let session = self.lock();
        features::get_mode(&session.adapter, &session.sensors, feature)
    }

    pub fn set_one_push(&self, feature: i32) -> Result<()> {
        let mut session = self.lock();
        let Session { adapter, sensors, .. } = &mut *session;
        features::set_one_push(adapter, sensors, feature)
    }
}

impl<B: DeviceBackend> Drop for RgbdDriver<B> {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Session { adapter, streams, .. } = session;
        if let Err(e) = streams.stop(adapter, &self.calibration) {
            warn!("Failed to stop pipeline on drop: {}", e);
        }
    }
}

fn checked_resolution(name: &str, width: u32, height: u32) -> Result<Resolution> {
    if width == 0 || height == 0 {
        return Err(DriverError::invalid_parameter(
            name,
            format!("{}x{} is not a valid resolution", width, height),
        ));
    }
    Ok(Resolution::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimControl, SimulatedBackend, StreamKind};
    use crate::capture::format::NativeFormat;
    use crate::capture::PixelCode;
    use crate::control::CameraFeature;

    fn open() -> (RgbdDriver<SimulatedBackend>, SimControl) {
        open_with(DriverConfig::default())
    }

    fn open_with(config: DriverConfig) -> (RgbdDriver<SimulatedBackend>, SimControl) {
        let backend = SimulatedBackend::new();
        let faults = backend.faults();
        (RgbdDriver::open(backend, &config).unwrap(), faults)
    }

    #[test]
    fn test_open_starts_once_and_warms_up() {
        let (driver, faults) = open();
        assert_eq!(driver.pipeline_state(), PipelineState::Running);
        assert_eq!(faults.starts(), 1);
        assert_eq!(faults.frame_sets(), crate::pipeline::WARMUP_FRAMES);
        assert_eq!(driver.sensor_status(), SensorStatus::OkInUse);
        assert!(driver.last_error_message().is_empty());
    }

    #[test]
    fn test_rgb8_frame_size() {
        let (driver, _) = open();
        let (image, stamp) = driver.rgb_image().unwrap();
        assert_eq!(image.raw_image_size(), 640 * 480 * 3);
        assert_eq!(image.pixel_code, PixelCode::Rgb);
        assert_eq!(image.pixel_code.code(), PixelCode::Rgb.code());
        assert_eq!(stamp.sequence, 1);
        assert_eq!(driver.stats().color_frames, 1);
    }

    #[test]
    fn test_resolution_change_updates_geometry() {
        let (driver, _) = open();

        driver.set_rgb_resolution(1280, 720).unwrap();
        assert_eq!(driver.rgb_resolution().unwrap(), Resolution::new(1280, 720));
        let color = driver.rgb_intrinsics().unwrap();
        assert_eq!((color.width, color.height), (1280, 720));

        driver.set_depth_resolution(320, 240).unwrap();
        assert_eq!(driver.depth_resolution().unwrap(), Resolution::new(320, 240));
        let depth = driver.depth_intrinsics().unwrap();
        assert_eq!((depth.width, depth.height), (320, 240));
        assert_eq!(driver.rgb_resolution().unwrap(), Resolution::new(1280, 720));
    }

    #[test]
    fn test_failed_restart_blocks_acquisition() {
        let (driver, _) = open();

        assert!(driver.set_rgb_resolution(123, 45).is_err());
        assert_eq!(driver.pipeline_state(), PipelineState::Stopped);
        assert!(matches!(driver.rgb_image(), Err(DriverError::PipelineNotRunning)));
        assert!(matches!(driver.rgb_resolution(), Err(DriverError::NotCalibrated)));
        assert!(!driver.last_error_message().is_empty());

        driver.set_rgb_resolution(640, 480).unwrap();
        assert!(driver.rgb_image().is_ok());
    }

    #[test]
    fn test_both_images_from_one_frame_set() {
        let (driver, faults) = open();
        let before = faults.frame_sets();

        let frame = driver.images().unwrap();

        assert_eq!(faults.frame_sets(), before + 1);
        assert_eq!((frame.depth.width, frame.depth.height), (frame.color.width, frame.color.height));
        assert!((frame.color_stamp.time - frame.depth_stamp.time).abs() < 1.0 / 30.0);
    }

    #[test]
    fn test_registered_depth_uses_color_grid() {
        let mut config = DriverConfig::default();
        config.depth_resolution = [320, 240];
        let (driver, _) = open_with(config);

        let (depth, _) = driver.depth_image().unwrap();
        assert_eq!((depth.width, depth.height), (640, 480));
        let center = depth.pixel(320, 240).unwrap();
        assert!(center > 1.0 && center < 2.5, "center depth {}", center);
    }

    #[test]
    fn test_unregistered_depth_keeps_native_grid() {
        let mut config = DriverConfig::default();
        config.depth_resolution = [320, 240];
        config.registered = false;
        let (driver, _) = open_with(config);

        let (depth, _) = driver.depth_image().unwrap();
        assert_eq!((depth.width, depth.height), (320, 240));
    }

    #[test]
    fn test_size_mismatch_leaves_stamp() {
        let (driver, faults) = open();
        faults.truncate_color(Some(100));

        assert!(matches!(driver.rgb_image(), Err(DriverError::SizeMismatch { actual: 100, .. })));
        assert_eq!(driver.stats().failures, 1);
        assert_eq!(driver.pipeline_state(), PipelineState::Running);

        faults.truncate_color(None);
        let (_, stamp) = driver.rgb_image().unwrap();
        assert_eq!(stamp.sequence, 1);
    }

    #[test]
    fn test_missing_depth_sub_frame() {
        let (driver, faults) = open();
        faults.drop_stream(StreamKind::Depth, true);
        assert!(matches!(
            driver.images(),
            Err(DriverError::MissingSubFrame(StreamKind::Depth))
        ));
    }

    #[test]
    fn test_registered_depth_needs_color_frame() {
        let mut config = DriverConfig::default();
        config.depth_resolution = [320, 240];
        let (driver, faults) = open_with(config);
        faults.drop_stream(StreamKind::Color, true);

        assert!(matches!(
            driver.depth_image(),
            Err(DriverError::MissingSubFrame(StreamKind::Color))
        ));
        assert!(matches!(driver.images(), Err(DriverError::MissingSubFrame(StreamKind::Color))));
        assert_eq!(driver.stats().depth_frames, 0);
        assert_eq!(driver.pipeline_state(), PipelineState::Running);
    }

    #[test]
    fn test_unregistered_depth_without_color_frame() {
        let mut config = DriverConfig::default();
        config.registered = false;
        let (driver, faults) = open_with(config);
        faults.drop_stream(StreamKind::Color, true);

        assert!(driver.depth_image().is_ok());
    }

    #[test]
    fn test_registration_with_configured_extrinsic() {
        let backend = SimulatedBackend::new();
        let faults = backend.faults();
        faults.fail_extrinsics(true);
        let mut config = DriverConfig::default();
        config.depth_resolution = [320, 240];
        config.extrinsic = Some([
            [1.0, 0.0, 0.0, 0.015],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let driver = RgbdDriver::open(backend, &config).unwrap();

        let extrinsic = driver.extrinsic().unwrap();
        assert!((extrinsic[0][3] - 0.015).abs() < 1e-6);
        let (depth, _) = driver.depth_image().unwrap();
        assert_eq!((depth.width, depth.height), (640, 480));
        let frame = driver.images().unwrap();
        assert_eq!((frame.depth.width, frame.depth.height), (640, 480));
    }

    #[test]
    fn test_open_fails_without_any_extrinsic() {
        let backend = SimulatedBackend::new();
        backend.faults().fail_extrinsics(true);
        assert!(RgbdDriver::open(backend, &DriverConfig::default()).is_err());
    }

    #[test]
    fn test_unsupported_color_format_from_device() {
        let (driver, faults) = open();
        faults.deliver_color_as(Some(NativeFormat::Yuyv));

        assert!(matches!(
            driver.rgb_image(),
            Err(DriverError::UnsupportedPixelFormat(NativeFormat::Yuyv))
        ));
        assert!(matches!(
            driver.images(),
            Err(DriverError::UnsupportedPixelFormat(NativeFormat::Yuyv))
        ));
        assert_eq!(driver.stats().failures, 2);

        faults.deliver_color_as(None);
        assert!(driver.rgb_image().is_ok());
    }

    #[test]
    fn test_frame_rate_feature_leaves_pipeline_alone() {
        let (driver, faults) = open();
        let starts = faults.starts();

        let result = driver.set_feature(CameraFeature::FrameRate.id(), 30.0);

        assert!(matches!(result, Err(DriverError::NotImplemented(_))));
        assert_eq!(driver.pipeline_state(), PipelineState::Running);
        assert_eq!(faults.starts(), starts);
    }

    #[test]
    fn test_depth_controls_from_config() {
        let mut config = DriverConfig::default();
        config.accuracy = Some(3.0);
        config.clip_planes = Some([0.3, 5.0]);
        let (driver, _) = open_with(config);

        assert_eq!(driver.depth_accuracy().unwrap(), 3.0);
        let (near, far) = driver.depth_clip_planes().unwrap();
        assert!((near - 0.3).abs() < 1e-6 && (far - 5.0).abs() < 1e-6);
        assert!(driver.set_depth_clip_planes(2.0, 1.0).is_err());
    }

    #[test]
    fn test_close_stops_pipeline() {
        let (driver, faults) = open();
        driver.close().unwrap();
        assert_eq!(faults.stops(), 1);
        assert!(matches!(driver.depth_image(), Err(DriverError::PipelineNotRunning)));
        drop(driver);
        assert_eq!(faults.stops(), 1);
    }

    #[test]
    fn test_description_and_intrinsic_params() {
        let (driver, _) = open();
        let description = driver.camera_description();
        assert_eq!(description.bus_type, BusType::Usb);
        assert!(description.device_description.contains("000000000001"));

        let params = driver.rgb_intrinsic_params().unwrap();
        assert_eq!(params.distortion_model, "plumb_bob");
        assert!(params.focal_length_x > 0.0);
        assert!(matches!(driver.set_rgb_mirroring(true), Err(DriverError::NotImplemented(_))));
    }
}
