//! Sensor option get/set with support checks.

use tracing::{debug, error, info};

use crate::backend::{BackendAdapter, DeviceBackend, OptionId, SensorHandle, SensorInfo, SensorKind};
use crate::error::{DriverError, Result};

/// Depth and color sensors resolved for the current device session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorHandles {
    depth: Option<SensorHandle>,
    color: Option<SensorHandle>,
}

impl SensorHandles {
    /// Picks the first depth sensor and the first other sensor from `sensors`.
    pub fn resolve(sensors: &[SensorInfo]) -> Self {
        let find = |depth: bool, kind: SensorKind| {
            sensors
                .iter()
                .find(|s| s.is_depth == depth)
                .map(|s| SensorHandle { kind, index: s.index })
        };
        let handles = Self {
            depth: find(true, SensorKind::Depth),
            color: find(false, SensorKind::Color),
        };
        debug!(?handles, "Sensors resolved");
        handles
    }

    pub fn get(&self, kind: SensorKind) -> Result<SensorHandle> {
        match kind {
            SensorKind::Depth => self.depth,
            SensorKind::Color => self.color,
        }
        .ok_or(DriverError::SensorUnavailable(kind))
    }

    pub fn is_complete(&self) -> bool {
        self.depth.is_some() && self.color.is_some()
    }
}

pub fn set_option<B: DeviceBackend>(
    adapter: &mut BackendAdapter<B>,
    handles: &SensorHandles,
    sensor: SensorKind,
    option: OptionId,
    value: f32,
) -> Result<()> {
    let handle = supported(adapter, handles, sensor, option)?;
    adapter.set_option(&handle, option, value)?;
    debug!(?sensor, ?option, value, "Option set");
    Ok(())
}

pub fn get_option<B: DeviceBackend>(
    adapter: &BackendAdapter<B>,
    handles: &SensorHandles,
    sensor: SensorKind,
    option: OptionId,
) -> Result<f32> {
    let handle = supported(adapter, handles, sensor, option)?;
    adapter.get_option(&handle, option)
}

fn supported<B: DeviceBackend>(
    adapter: &BackendAdapter<B>,
    handles: &SensorHandles,
    sensor: SensorKind,
    option: OptionId,
) -> Result<SensorHandle> {
    let handle = handles.get(sensor)?;
    if !adapter.supports_option(&handle, option) {
        error!("The option {:?} is not supported by the {:?} sensor", option, sensor);
        return Err(DriverError::UnsupportedOption { sensor, option });
    }
    Ok(handle)
}

/// Logs every option each sensor supports, with its description and value.
pub fn log_supported_options<B: DeviceBackend>(adapter: &BackendAdapter<B>, handles: &SensorHandles) {
    for kind in [SensorKind::Depth, SensorKind::Color] {
        let Ok(handle) = handles.get(kind) else {
            continue;
        };
        info!("Supported options of the {:?} sensor:", kind);
        for option in OptionId::ALL {
            if !adapter.supports_option(&handle, option) {
                continue;
            }
            let description = adapter.option_description(&handle, option).unwrap_or_default();
            let range = adapter
                .option_range(&handle, option)
                .map(|r| format!(" [{}..{} step {}, default {}]", r.min, r.max, r.step, r.default))
                .unwrap_or_default();
            match adapter.get_option(&handle, option) {
                Ok(value) => info!("  {:?}: {}{} (current: {})", option, description, range, value),
                Err(_) => info!("  {:?}: {}{}", option, description, range),
            }
        }
    }
}
