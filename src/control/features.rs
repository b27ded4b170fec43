//! Camera feature control routed through the color sensor's options.

use serde::{Deserialize, Serialize};
use tracing::error;

use super::options::{get_option, set_option, SensorHandles};
use crate::backend::{BackendAdapter, DeviceBackend, OptionId, SensorKind};
use crate::error::{DriverError, Result};

/// Camera features with their interface ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum CameraFeature {
    Brightness = 0,
    Exposure = 1,
    Sharpness = 2,
    WhiteBalance = 3,
    Hue = 4,
    Saturation = 5,
    Gamma = 6,
    Shutter = 7,
    Gain = 8,
    Iris = 9,
    Focus = 10,
    Temperature = 11,
    Trigger = 12,
    TriggerDelay = 13,
    WhiteShading = 14,
    FrameRate = 15,
    Zoom = 16,
    Pan = 17,
    Tilt = 18,
    OpticalFilter = 19,
    CaptureSize = 20,
    CaptureQuality = 21,
    Mirror = 22,
}

impl CameraFeature {
    pub const COUNT: i32 = 23;

    const ALL: [CameraFeature; 23] = [
        CameraFeature::Brightness,
        CameraFeature::Exposure,
        CameraFeature::Sharpness,
        CameraFeature::WhiteBalance,
        CameraFeature::Hue,
        CameraFeature::Saturation,
        CameraFeature::Gamma,
        CameraFeature::Shutter,
        CameraFeature::Gain,
        CameraFeature::Iris,
        CameraFeature::Focus,
        CameraFeature::Temperature,
        CameraFeature::Trigger,
        CameraFeature::TriggerDelay,
        CameraFeature::WhiteShading,
        CameraFeature::FrameRate,
        CameraFeature::Zoom,
        CameraFeature::Pan,
        CameraFeature::Tilt,
        CameraFeature::OpticalFilter,
        CameraFeature::CaptureSize,
        CameraFeature::CaptureQuality,
        CameraFeature::Mirror,
    ];

    pub fn from_id(id: i32) -> Result<Self> {
        usize::try_from(id)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| DriverError::invalid_parameter("feature", format!("{} is not a known feature id", id)))
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    /// How the feature maps onto sensor options; `None` if unsupported.
    pub const fn control(self) -> Option<FeatureControl> {
        use OptionId::*;
        let control = match self {
            CameraFeature::Exposure => FeatureControl {
                value: Some(Exposure),
                auto: Some(EnableAutoExposure),
                on_off: None,
                manual: true,
            },
            CameraFeature::WhiteBalance => FeatureControl {
                value: Some(WhiteBalance),
                auto: Some(EnableAutoWhiteBalance),
                on_off: Some(EnableAutoWhiteBalance),
                manual: false,
            },
            CameraFeature::Gain => FeatureControl::manual(Gain),
            CameraFeature::Sharpness => FeatureControl::manual(Sharpness),
            CameraFeature::Hue => FeatureControl::manual(Hue),
            CameraFeature::Saturation => FeatureControl::manual(Saturation),
            CameraFeature::FrameRate => FeatureControl {
                value: None,
                auto: None,
                on_off: None,
                manual: true,
            },
            _ => return None,
        };
        Some(control)
    }
}

/// Option routing and capability flags of a supported feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureControl {
    /// Option holding the value; `None` when value control isn't implemented
    pub value: Option<OptionId>,
    /// Option switching automatic mode, 1 auto and 0 manual
    pub auto: Option<OptionId>,
    pub on_off: Option<OptionId>,
    pub manual: bool,
}

impl FeatureControl {
    const fn manual(option: OptionId) -> Self {
        Self {
            value: Some(option),
            auto: None,
            on_off: None,
            manual: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureMode {
    Auto,
    Manual,
    Unknown,
}

impl FeatureMode {
    fn from_option(value: f32) -> Self {
        if value == 0.0 {
            FeatureMode::Manual
        } else if value == 1.0 {
            FeatureMode::Auto
        } else {
            FeatureMode::Unknown
        }
    }
}

/// Whether the feature id is in the supported set. Unknown ids are an error.
pub fn has_feature(id: i32) -> Result<bool> {
    Ok(CameraFeature::from_id(id)?.control().is_some())
}

fn supported(id: i32) -> Result<(CameraFeature, FeatureControl)> {
    let feature = CameraFeature::from_id(id)?;
    match feature.control() {
        Some(control) => Ok((feature, control)),
        None => {
            error!("Feature {:?} not supported", feature);
            Err(DriverError::FeatureNotSupported(feature))
        }
    }
}

fn value_option(feature: CameraFeature, control: &FeatureControl) -> Result<OptionId> {
    match control.value {
        Some(option) => Ok(option),
        None => {
            error!("Control of {:?} is not implemented", feature);
            Err(DriverError::NotImplemented("frame rate control"))
        }
    }
}

pub fn set_feature<B: DeviceBackend>(
    adapter: &mut BackendAdapter<B>,
    handles: &SensorHandles,
    id: i32,
    value: f64,
) -> Result<()> {
    let (feature, control) = supported(id)?;
    let option = value_option(feature, &control)?;
    set_option(adapter, handles, SensorKind::Color, option, value as f32)
}

pub fn get_feature<B: DeviceBackend>(adapter: &BackendAdapter<B>, handles: &SensorHandles, id: i32) -> Result<f64> {
    let (feature, control) = supported(id)?;
    let option = value_option(feature, &control)?;
    get_option(adapter, handles, SensorKind::Color, option).map(f64::from)
}

/// None of the supported features take two values.
pub fn set_feature2(id: i32, _value1: f64, _value2: f64) -> Result<()> {
    let (feature, _) = supported(id)?;
    error!("No 2-valued features are supported");
    Err(DriverError::FeatureNotSupported(feature))
}

pub fn get_feature2(id: i32) -> Result<(f64, f64)> {
    let (feature, _) = supported(id)?;
    error!("No 2-valued features are supported");
    Err(DriverError::FeatureNotSupported(feature))
}

pub fn has_on_off(id: i32) -> Result<bool> {
    Ok(supported(id)?.1.on_off.is_some())
}

fn on_off_option(id: i32) -> Result<OptionId> {
    let (feature, control) = supported(id)?;
    control.on_off.ok_or_else(|| {
        error!("Feature {:?} has no on/off switch", feature);
        DriverError::FeatureNotSupported(feature)
    })
}

pub fn set_active<B: DeviceBackend>(
    adapter: &mut BackendAdapter<B>,
    handles: &SensorHandles,
    id: i32,
    active: bool,
) -> Result<()> {
    let option = on_off_option(id)?;
    set_option(adapter, handles, SensorKind::Color, option, if active { 1.0 } else { 0.0 })
}

pub fn get_active<B: DeviceBackend>(adapter: &BackendAdapter<B>, handles: &SensorHandles, id: i32) -> Result<bool> {
    let option = on_off_option(id)?;
    Ok(get_option(adapter, handles, SensorKind::Color, option)? != 0.0)
}

pub fn has_auto(id: i32) -> Result<bool> {
    Ok(supported(id)?.1.auto.is_some())
}

pub fn has_manual(id: i32) -> Result<bool> {
    Ok(supported(id)?.1.manual)
}

/// One-push is offered wherever auto mode is.
pub fn has_one_push(id: i32) -> Result<bool> {
    has_auto(id)
}

fn auto_option(id: i32) -> Result<(CameraFeature, OptionId)> {
    let (feature, control) = supported(id)?;
    match control.auto {
        Some(option) => Ok((feature, option)),
        None => {
            error!("Feature {:?} does not have both auto and manual mode", feature);
            Err(DriverError::ModeNotApplicable(feature))
        }
    }
}

pub fn set_mode<B: DeviceBackend>(
    adapter: &mut BackendAdapter<B>,
    handles: &SensorHandles,
    id: i32,
    mode: FeatureMode,
) -> Result<()> {
    let (_, option) = auto_option(id)?;
    let value = match mode {
        FeatureMode::Auto => 1.0,
        FeatureMode::Manual => 0.0,
        FeatureMode::Unknown => {
            return Err(DriverError::invalid_parameter("mode", "cannot set an unknown mode"));
        }
    };
    set_option(adapter, handles, SensorKind::Color, option, value)
}

pub fn get_mode<B: DeviceBackend>(adapter: &BackendAdapter<B>, handles: &SensorHandles, id: i32) -> Result<FeatureMode> {
    let (_, option) = auto_option(id)?;
    get_option(adapter, handles, SensorKind::Color, option).map(FeatureMode::from_option)
}

/// Runs the automatic adjustment once, then returns to manual.
pub fn set_one_push<B: DeviceBackend>(adapter: &mut BackendAdapter<B>, handles: &SensorHandles, id: i32) -> Result<()> {
    let (feature, control) = supported(id)?;
    if control.auto.is_none() {
        error!("Feature {:?} doesn't have one-push", feature);
        return Err(DriverError::FeatureNotSupported(feature));
    }
    set_mode(adapter, handles, id, FeatureMode::Auto)?;
    set_mode(adapter, handles, id, FeatureMode::Manual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;

    fn session() -> (BackendAdapter<SimulatedBackend>, SensorHandles) {
        let mut adapter = BackendAdapter::new(SimulatedBackend::new());
        let device = adapter.query_devices().unwrap().remove(0);
        let sensors = adapter.query_sensors(&device).unwrap();
        (adapter, SensorHandles::resolve(&sensors))
    }

    #[test]
    fn test_supported_set() {
        let supported: Vec<CameraFeature> = (0..CameraFeature::COUNT)
            .filter(|&id| has_feature(id).unwrap())
            .map(|id| CameraFeature::from_id(id).unwrap())
            .collect();
        assert_eq!(
            supported,
            vec![
                CameraFeature::Exposure,
                CameraFeature::Sharpness,
                CameraFeature::WhiteBalance,
                CameraFeature::Hue,
                CameraFeature::Saturation,
                CameraFeature::Gain,
                CameraFeature::FrameRate,
            ]
        );
        assert!(matches!(has_feature(-1), Err(DriverError::InvalidParameter { .. })));
        assert!(matches!(has_feature(23), Err(DriverError::InvalidParameter { .. })));
    }

    #[test]
    fn test_frame_rate_not_implemented() {
        let (mut adapter, handles) = session();
        let id = CameraFeature::FrameRate.id();
        assert!(matches!(
            set_feature(&mut adapter, &handles, id, 30.0),
            Err(DriverError::NotImplemented(_))
        ));
        assert!(matches!(get_feature(&adapter, &handles, id), Err(DriverError::NotImplemented(_))));
        assert!(has_manual(id).unwrap());
    }

    #[test]
    fn test_unsupported_feature_fails_before_on_off() {
        let zoom = CameraFeature::Zoom.id();
        assert!(matches!(has_on_off(zoom), Err(DriverError::FeatureNotSupported(CameraFeature::Zoom))));
        // Mirror has a switch on some cameras but isn't in the supported set here
        let mirror = CameraFeature::Mirror.id();
        assert!(matches!(has_on_off(mirror), Err(DriverError::FeatureNotSupported(CameraFeature::Mirror))));
    }

    #[test]
    fn test_capability_flags() {
        let wb = CameraFeature::WhiteBalance.id();
        let exposure = CameraFeature::Exposure.id();
        let gain = CameraFeature::Gain.id();

        assert!(has_on_off(wb).unwrap());
        assert!(!has_on_off(exposure).unwrap());
        assert!(has_auto(exposure).unwrap() && has_auto(wb).unwrap());
        assert!(!has_auto(gain).unwrap());
        assert!(has_manual(exposure).unwrap());
        assert!(!has_manual(wb).unwrap());
        assert!(!has_one_push(gain).unwrap());
    }

    #[test]
    fn test_value_features_route_to_color_options() {
        let (mut adapter, handles) = session();
        let hue = CameraFeature::Hue.id();
        set_feature(&mut adapter, &handles, hue, 12.0).unwrap();
        assert_eq!(get_feature(&adapter, &handles, hue).unwrap(), 12.0);
        let color = handles.get(SensorKind::Color).unwrap();
        assert_eq!(adapter.get_option(&color, OptionId::Hue).unwrap(), 12.0);
    }

    #[test]
    fn test_mode_switching() {
        let (mut adapter, handles) = session();
        let exposure = CameraFeature::Exposure.id();

        set_mode(&mut adapter, &handles, exposure, FeatureMode::Manual).unwrap();
        assert_eq!(get_mode(&adapter, &handles, exposure).unwrap(), FeatureMode::Manual);
        set_mode(&mut adapter, &handles, exposure, FeatureMode::Auto).unwrap();
        assert_eq!(get_mode(&adapter, &handles, exposure).unwrap(), FeatureMode::Auto);

        set_one_push(&mut adapter, &handles, exposure).unwrap();
        assert_eq!(get_mode(&adapter, &handles, exposure).unwrap(), FeatureMode::Manual);

        let gain = CameraFeature::Gain.id();
        assert!(matches!(
            set_mode(&mut adapter, &handles, gain, FeatureMode::Auto),
            Err(DriverError::ModeNotApplicable(CameraFeature::Gain))
        ));
    }

    #[test]
    fn test_white_balance_switch() {
        let (mut adapter, handles) = session();
        let wb = CameraFeature::WhiteBalance.id();
        set_active(&mut adapter, &handles, wb, false).unwrap();
        assert!(!get_active(&adapter, &handles, wb).unwrap());
        assert_eq!(get_mode(&adapter, &handles, wb).unwrap(), FeatureMode::Manual);

        let sharpness = CameraFeature::Sharpness.id();
        assert!(set_active(&mut adapter, &handles, sharpness, true).is_err());
    }

    #[test]
    fn test_two_valued_features() {
        assert!(matches!(
            set_feature2(CameraFeature::Exposure.id(), 1.0, 2.0),
            Err(DriverError::FeatureNotSupported(CameraFeature::Exposure))
        ));
        assert!(get_feature2(CameraFeature::Gain.id()).is_err());
    }
}
