//! Synthetic RGB-D device.
//!
//! Behaves like a stereo depth camera with a separate RGB sensor: a fixed
//! set of supported stream modes, factory-like intrinsics, a small
//! depth-to-color baseline and per-sensor option tables with ranges. Frames
//! show a color gradient and a tilted depth plane. A `SimControl` handle
//! injects faults and exposes call counters while the backend itself is
//! owned by a driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::{
    BackendError, BackendResult, DepthFrame, DepthUnits, DeviceBackend, DeviceInfo, FrameSet, OptionId,
    OptionRange, SensorHandle, SensorInfo, StreamKind, StreamProfile, StreamRequest, VideoFrame,
};
use crate::capture::format::NativeFormat;
use crate::geometry::{DistortionModel, Extrinsics, Intrinsics};

const DEPTH_SENSOR: usize = 0;
const COLOR_SENSOR: usize = 1;
const DEFAULT_FPS: u32 = 30;

const COLOR_HFOV_DEG: f32 = 69.4;
const DEPTH_HFOV_DEG: f32 = 87.0;

const COLOR_MODES: [(u32, u32); 9] = [
    (320, 180),
    (320, 240),
    (424, 240),
    (640, 360),
    (640, 480),
    (848, 480),
    (960, 540),
    (1280, 720),
    (1920, 1080),
];
const COLOR_FORMATS: [NativeFormat; 7] = [
    NativeFormat::Rgb8,
    NativeFormat::Bgr8,
    NativeFormat::Rgba8,
    NativeFormat::Bgra8,
    NativeFormat::Yuyv,
    NativeFormat::Y8,
    NativeFormat::Y16,
];

const DEPTH_MODES: [(u32, u32); 8] = [
    (256, 144),
    (320, 240),
    (424, 240),
    (480, 270),
    (640, 360),
    (640, 480),
    (848, 480),
    (1280, 720),
];
const DEPTH_FORMATS: [NativeFormat; 2] = [NativeFormat::Z16, NativeFormat::Disparity16];

/// Depth (mm) of the simulated plane at the left edge of the image.
pub const PLANE_NEAR_MM: u16 = 1500;
/// Increase of the plane's depth (mm) from the left to the right edge.
pub const PLANE_SLOPE_MM: u16 = 500;

/// Baseline between depth and color optical centers, in meters
pub const BASELINE_M: f32 = 0.015;

/// Subpixel steps per disparity unit
const DISPARITY_MULTIPLIER: f32 = 32.0;

#[derive(Debug, Default)]
struct SimState {
    fail_start: Option<String>,
    fail_stop: Option<String>,
    frames_time_out: bool,
    drop_color: bool,
    drop_depth: bool,
    color_format: Option<NativeFormat>,
    truncate_color: Option<usize>,
    extrinsics_unavailable: bool,
    starts: usize,
    stops: usize,
    frame_sets: usize,
}

/// Shared handle for fault injection and call counters.
#[derive(Debug, Clone, Default)]
pub struct SimControl {
    state: Arc<Mutex<SimState>>,
}

impl SimControl {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `start_pipeline` fail with `message`.
    pub fn fail_next_start(&self, message: &str) {
        self.state().fail_start = Some(message.to_string());
    }

    /// Makes the next `stop_pipeline` fail with `message`.
    pub fn fail_next_stop(&self, message: &str) {
        self.state().fail_stop = Some(message.to_string());
    }

    /// While set, every frame wait times out.
    pub fn time_out_frames(&self, enabled: bool) {
        self.state().frames_time_out = enabled;
    }

    /// Leaves the given stream out of delivered frame sets.
    pub fn drop_stream(&self, kind: StreamKind, dropped: bool) {
        let mut state = self.state();
        match kind {
            StreamKind::Color => state.drop_color = dropped,
            StreamKind::Depth => state.drop_depth = dropped,
        }
    }

    /// Delivers color frames tagged and encoded as `format` regardless of
    /// the negotiated one.
    pub fn deliver_color_as(&self, format: Option<NativeFormat>) {
        self.state().color_format = format;
    }

    /// Cuts color buffers down to `len` bytes.
    pub fn truncate_color(&self, len: Option<usize>) {
        self.state().truncate_color = len;
    }

    /// While set, the device can't report extrinsics.
    pub fn fail_extrinsics(&self, failing: bool) {
        self.state().extrinsics_unavailable = failing;
    }

    pub fn starts(&self) -> usize {
        self.state().starts
    }

    pub fn stops(&self) -> usize {
        self.state().stops
    }

    pub fn frame_sets(&self) -> usize {
        self.state().frame_sets
    }
}

#[derive(Debug, Clone)]
struct SimOption {
    value: f32,
    range: OptionRange,
    description: &'static str,
}

fn option(value: f32, min: f32, max: f32, step: f32, description: &'static str) -> SimOption {
    SimOption {
        value,
        range: OptionRange {
            min,
            max,
            step,
            default: value,
        },
        description,
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveStreams {
    color: StreamProfile,
    depth: StreamProfile,
}

pub struct SimulatedBackend {
    device: DeviceInfo,
    polls_until_plugged: u32,
    selected: bool,
    options: HashMap<(usize, OptionId), SimOption>,
    active: Option<ActiveStreams>,
    next_uid: u32,
    frame_number: u64,
    timestamp_ms: f64,
    realtime: bool,
    control: SimControl,
}

impl SimulatedBackend {
    /// A connected device.
    pub fn new() -> Self {
        let device = DeviceInfo {
            name: Some("Simulated RGB-D Camera".to_string()),
            serial_number: Some("000000000001".to_string()),
            firmware_version: Some("5.12.7.100".to_string()),
            physical_port: Some("sim://0".to_string()),
            product_id: Some("0B07".to_string()),
            usb_type: Some("3.2".to_string()),
        };

        Self {
            device,
            polls_until_plugged: 0,
            selected: false,
            options: default_options(),
            active: None,
            next_uid: 1,
            frame_number: 0,
            timestamp_ms: 0.0,
            realtime: false,
            control: SimControl::default(),
        }
    }

    /// The device shows up after `polls` empty device queries.
    pub fn plugged_in_after(polls: u32) -> Self {
        Self {
            polls_until_plugged: polls,
            ..Self::new()
        }
    }

    /// Paces frame delivery to the negotiated frame rate.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn faults(&self) -> SimControl {
        self.control.clone()
    }

    fn supports_mode(request: &StreamRequest) -> bool {
        let (modes, formats): (&[(u32, u32)], &[NativeFormat]) = match request.kind {
            StreamKind::Color => (&COLOR_MODES, &COLOR_FORMATS),
            StreamKind::Depth => (&DEPTH_MODES, &DEPTH_FORMATS),
        };
        modes.contains(&(request.width, request.height))
            && formats.contains(&request.format)
            && (request.fps == 0 || [6, 15, 30, 60].contains(&request.fps))
    }

    fn profile_for(&mut self, request: &StreamRequest) -> StreamProfile {
        let unique_id = self.next_uid;
        self.next_uid += 1;
        StreamProfile {
            kind: request.kind,
            format: request.format,
            width: request.width,
            height: request.height,
            fps: if request.fps == 0 { DEFAULT_FPS } else { request.fps },
            unique_id,
        }
    }

    fn depth_units(&self) -> f32 {
        self.options
            .get(&(DEPTH_SENSOR, OptionId::DepthUnits))
            .map(|o| o.value)
            .unwrap_or(0.001)
    }

    fn color_frame(&self, profile: &StreamProfile, state: &SimState) -> VideoFrame {
        let format = state.color_format.unwrap_or(profile.format);
        let (w, h) = (profile.width, profile.height);
        let bpp = match format {
            NativeFormat::Rgb8 | NativeFormat::Bgr8 => 3,
            NativeFormat::Rgba8 | NativeFormat::Bgra8 => 4,
            NativeFormat::Y8 | NativeFormat::Raw8 => 1,
            _ => 2,
        };
        let shade = (self.frame_number % 256) as u8;

        let mut data = Vec::with_capacity((w * h) as usize * bpp);
        for y in 0..h {
            for x in 0..w {
                let r = (x * 255 / w.max(1)) as u8;
                let g = (y * 255 / h.max(1)) as u8;
                let b = shade;
                match format {
                    NativeFormat::Rgb8 => data.extend_from_slice(&[r, g, b]),
                    NativeFormat::Bgr8 => data.extend_from_slice(&[b, g, r]),
                    NativeFormat::Rgba8 => data.extend_from_slice(&[r, g, b, 255]),
                    NativeFormat::Bgra8 => data.extend_from_slice(&[b, g, r, 255]),
                    NativeFormat::Y8 | NativeFormat::Raw8 => data.push(luma(r, g, b)),
                    NativeFormat::Yuyv => data.extend_from_slice(&[luma(r, g, b), 128]),
                    _ => data.extend_from_slice(&u16::from(luma(r, g, b)).wrapping_mul(257).to_le_bytes()),
                }
            }
        }
        if let Some(len) = state.truncate_color {
            data.truncate(len);
        }

        VideoFrame {
            profile: StreamProfile { format, ..*profile },
            width: w,
            height: h,
            stride: w * bpp as u32,
            timestamp_ms: self.timestamp_ms,
            frame_number: self.frame_number,
            data: Bytes::from(data),
        }
    }

    fn depth_frame(&self, profile: &StreamProfile) -> DepthFrame {
        let (w, h) = (profile.width, profile.height);
        let scale = self.depth_units();
        let intrin = depth_intrinsics(w, h);
        let baseline_focal = BASELINE_M * intrin.fx * DISPARITY_MULTIPLIER;

        let mut data = Vec::with_capacity((w * h) as usize * 2);
        for _y in 0..h {
            for x in 0..w {
                let mm = PLANE_NEAR_MM as u32 + x * PLANE_SLOPE_MM as u32 / w.max(1);
                let meters = mm as f32 / 1000.0;
                let raw = match profile.format {
                    NativeFormat::Disparity16 => (baseline_focal / meters).round() as u16,
                    _ => (meters / scale).round() as u16,
                };
                data.extend_from_slice(&raw.to_le_bytes());
            }
        }

        let units = match profile.format {
            NativeFormat::Disparity16 => DepthUnits::Disparity { baseline_focal },
            _ => DepthUnits::Linear { scale },
        };

        DepthFrame {
            frame: VideoFrame {
                profile: *profile,
                width: w,
                height: h,
                stride: w * 2,
                timestamp_ms: self.timestamp_ms,
                frame_number: self.frame_number,
                data: Bytes::from(data),
            },
            units,
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
}

fn intrinsics_for(width: u32, height: u32, hfov_deg: f32, model: DistortionModel) -> Intrinsics {
    let fx = width as f32 / 2.0 / (hfov_deg.to_radians() / 2.0).tan();
    Intrinsics {
        width,
        height,
        fx,
        fy: fx,
        ppx: width as f32 / 2.0 + width as f32 * 0.002,
        ppy: height as f32 / 2.0 - height as f32 * 0.003,
        model,
        coeffs: [0.0; 5],
    }
}

fn color_intrinsics(width: u32, height: u32) -> Intrinsics {
    intrinsics_for(width, height, COLOR_HFOV_DEG, DistortionModel::InverseBrownConrady)
}

fn depth_intrinsics(width: u32, height: u32) -> Intrinsics {
    intrinsics_for(width, height, DEPTH_HFOV_DEG, DistortionModel::BrownConrady)
}

fn depth_to_color() -> Extrinsics {
    Extrinsics {
        translation: [BASELINE_M, 0.0001, 0.0002],
        ..Extrinsics::IDENTITY
    }
}

fn default_options() -> HashMap<(usize, OptionId), SimOption> {
    use OptionId::*;
    let mut options = HashMap::new();

    let depth = [
        (Exposure, option(8500.0, 1.0, 165000.0, 1.0, "Depth Exposure (usec)")),
        (Gain, option(16.0, 16.0, 248.0, 1.0, "UVC image gain")),
        (EnableAutoExposure, option(1.0, 0.0, 1.0, 1.0, "Enable Auto Exposure")),
        (LaserPower, option(150.0, 0.0, 360.0, 30.0, "Manual laser power in mw")),
        (DepthUnits, option(0.001, 0.000001, 0.01, 0.000001, "Number of meters represented by a single depth unit")),
        (Accuracy, option(2.0, 1.0, 3.0, 1.0, "Set the number of patterns projected per frame")),
        (MinDistance, option(0.1, 0.0, 3.0, 0.01, "Minimal distance to the target")),
        (MaxDistance, option(10.0, 0.1, 65.0, 0.01, "Maximum distance to the target")),
    ];
    for (id, opt) in depth {
        options.insert((DEPTH_SENSOR, id), opt);
    }

    let color = [
        (Exposure, option(166.0, 1.0, 10000.0, 1.0, "Controls exposure time of color camera")),
        (Gain, option(64.0, 0.0, 128.0, 1.0, "UVC image gain")),
        (WhiteBalance, option(4600.0, 2800.0, 6500.0, 10.0, "Controls white balance of color image")),
        (Sharpness, option(50.0, 0.0, 100.0, 1.0, "UVC image sharpness")),
        (Hue, option(0.0, -180.0, 180.0, 1.0, "UVC image hue")),
        (Saturation, option(64.0, 0.0, 100.0, 1.0, "UVC image saturation setting")),
        (Brightness, option(0.0, -64.0, 64.0, 1.0, "UVC image brightness")),
        (Contrast, option(50.0, 0.0, 100.0, 1.0, "UVC image contrast")),
        (Gamma, option(300.0, 100.0, 500.0, 1.0, "UVC image gamma setting")),
        (EnableAutoExposure, option(1.0, 0.0, 1.0, 1.0, "Enable Auto Exposure")),
        (EnableAutoWhiteBalance, option(1.0, 0.0, 1.0, 1.0, "Enable Auto White Balance")),
    ];
    for (id, opt) in color {
        options.insert((COLOR_SENSOR, id), opt);
    }

    options
}

impl DeviceBackend for SimulatedBackend {
    fn query_devices(&mut self) -> BackendResult<Vec<DeviceInfo>> {
        if self.polls_until_plugged > 0 {
            self.polls_until_plugged -= 1;
            return Ok(Vec::new());
        }
        Ok(vec![self.device.clone()])
    }

    fn query_sensors(&mut self, device: &DeviceInfo) -> BackendResult<Vec<SensorInfo>> {
        if device.serial_number != self.device.serial_number {
            return Err(BackendError::NoDevice);
        }
        self.selected = true;
        Ok(vec![
            SensorInfo {
                index: DEPTH_SENSOR,
                name: "Stereo Module".to_string(),
                is_depth: true,
            },
            SensorInfo {
                index: COLOR_SENSOR,
                name: "RGB Camera".to_string(),
                is_depth: false,
            },
        ])
    }

    fn start_pipeline(&mut self, streams: &[StreamRequest]) -> BackendResult<()> {
        if let Some(message) = self.control.state().fail_start.take() {
            return Err(BackendError::Failed(message));
        }
        if self.active.is_some() {
            return Err(BackendError::Failed("start() cannot be called before stop()".to_string()));
        }

        let color = streams.iter().find(|s| s.kind == StreamKind::Color);
        let depth = streams.iter().find(|s| s.kind == StreamKind::Depth);
        let (color, depth) = match (color, depth) {
            (Some(c), Some(d)) if Self::supports_mode(c) && Self::supports_mode(d) => (*c, *d),
            _ => return Err(BackendError::Failed("Couldn't resolve requests".to_string())),
        };

        let active = ActiveStreams {
            color: self.profile_for(&color),
            depth: self.profile_for(&depth),
        };
        debug!(?active, "Simulated pipeline started");
        self.active = Some(active);
        self.control.state().starts += 1;
        Ok(())
    }

    fn stop_pipeline(&mut self) -> BackendResult<()> {
        if let Some(message) = self.control.state().fail_stop.take() {
            self.active = None;
            return Err(BackendError::Failed(message));
        }
        if self.active.take().is_none() {
            return Err(BackendError::Failed("stop() cannot be called before start()".to_string()));
        }
        self.control.state().stops += 1;
        Ok(())
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> BackendResult<FrameSet> {
        let active = self.active.ok_or(BackendError::NotStarted)?;
        let control = self.control.clone();
        let state = control.state();
        if state.frames_time_out {
            return Err(BackendError::Timeout(timeout));
        }

        let period_ms = 1000.0 / active.color.fps.max(1) as f64;
        if self.realtime {
            thread::sleep(Duration::from_secs_f64(period_ms / 1000.0));
        }
        self.frame_number += 1;
        self.timestamp_ms += period_ms;

        let color = (!state.drop_color).then(|| self.color_frame(&active.color, &state));
        let depth = (!state.drop_depth).then(|| self.depth_frame(&active.depth));
        drop(state);
        control.state().frame_sets += 1;

        Ok(FrameSet { color, depth })
    }

    fn active_stream(&self, kind: StreamKind) -> BackendResult<StreamProfile> {
        let active = self.active.ok_or(BackendError::NotStarted)?;
        Ok(match kind {
            StreamKind::Color => active.color,
            StreamKind::Depth => active.depth,
        })
    }

    fn query_intrinsics(&self, stream: &StreamProfile) -> BackendResult<Intrinsics> {
        Ok(match stream.kind {
            StreamKind::Color => color_intrinsics(stream.width, stream.height),
            StreamKind::Depth => depth_intrinsics(stream.width, stream.height),
        })
    }

    fn query_extrinsics(&self, from: &StreamProfile, to: &StreamProfile) -> BackendResult<Extrinsics> {
        if self.control.state().extrinsics_unavailable {
            return Err(BackendError::Failed("extrinsics not available for this device".to_string()));
        }
        Ok(match (from.kind, to.kind) {
            (StreamKind::Depth, StreamKind::Color) => depth_to_color(),
            (StreamKind::Color, StreamKind::Depth) => depth_to_color().inverse(),
            _ => Extrinsics::IDENTITY,
        })
    }

    fn supports_option(&self, sensor: &SensorHandle, option: OptionId) -> bool {
        self.selected && self.options.contains_key(&(sensor.index, option))
    }

    fn option_range(&self, sensor: &SensorHandle, option: OptionId) -> BackendResult<OptionRange> {
        self.options
            .get(&(sensor.index, option))
            .map(|o| o.range)
            .ok_or_else(|| BackendError::Failed(format!("object doesn't support option #{:?}", option)))
    }

    fn option_description(&self, sensor: &SensorHandle, option: OptionId) -> Option<String> {
        self.options.get(&(sensor.index, option)).map(|o| o.description.to_string())
    }

    fn get_option(&self, sensor: &SensorHandle, option: OptionId) -> BackendResult<f32> {
        self.options
            .get(&(sensor.index, option))
            .map(|o| o.value)
            .ok_or_else(|| BackendError::Failed(format!("object doesn't support option #{:?}", option)))
    }

    fn set_option(&mut self, sensor: &SensorHandle, option: OptionId, value: f32) -> BackendResult<()> {
        let entry = self
            .options
            .get_mut(&(sensor.index, option))
            .ok_or_else(|| BackendError::Failed(format!("object doesn't support option #{:?}", option)))?;
        if !entry.range.contains(value) {
            return Err(BackendError::Failed(format!(
                "set_option(id={:?}, value={}) failed: value out of range [{}, {}]",
                option, value, entry.range.min, entry.range.max
            )));
        }
        entry.value = value;
        Ok(())
    }
}
