//! Driver parameters: TOML file, `RGBD_*` environment overrides, validation.

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DriverError, Result};
use crate::geometry::Extrinsics;
use crate::pipeline::{Resolution, StreamConfig};

const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Acquisition period hint for callers polling the driver
    pub period_ms: u32,
    pub verbose: bool,
    /// Align depth onto the color viewpoint before conversion
    pub registered: bool,
    pub rgb_resolution: [u32; 2],
    pub depth_resolution: [u32; 2],
    pub accuracy: Option<f32>,
    /// Near and far clip distances in meters
    pub clip_planes: Option<[f32; 2]>,
    pub frame_timeout_ms: u64,
    pub device_poll_ms: u64,
    /// Row-major depth-to-color transform used when the device can't provide one
    pub extrinsic: Option<[[f64; 4]; 4]>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            period_ms: 30,
            verbose: false,
            registered: true,
            rgb_resolution: [640, 480],
            depth_resolution: [640, 480],
            accuracy: None,
            clip_planes: None,
            frame_timeout_ms: 15_000,
            device_poll_ms: 500,
            extrinsic: None,
        }
    }
}

impl DriverConfig {
    /// Loads `path` (if any) and applies `RGBD_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config: DriverConfig = builder
            .add_source(Environment::with_prefix("RGBD"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: DriverConfig = config::Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_resolution("rgb_resolution", self.rgb_resolution)?;
        check_resolution("depth_resolution", self.depth_resolution)?;

        if self.period_ms == 0 {
            return Err(DriverError::invalid_parameter("period_ms", "must be positive"));
        }
        if self.frame_timeout_ms == 0 {
            return Err(DriverError::invalid_parameter("frame_timeout_ms", "must be positive"));
        }

        if let Some(accuracy) = self.accuracy {
            if !accuracy.is_finite() {
                return Err(DriverError::invalid_parameter("accuracy", "not a number"));
            }
        }

        if let Some([near, far]) = self.clip_planes {
            if !(near.is_finite() && far.is_finite()) || near < 0.0 || near >= far {
                return Err(DriverError::invalid_parameter(
                    "clip_planes",
                    format!("expected 0 <= near < far, got [{}, {}]", near, far),
                ));
            }
        }

        if let Some(m) = &self.extrinsic {
            check_rigid(m)?;
        }
        Ok(())
    }

    pub fn rgb_resolution(&self) -> Resolution {
        Resolution::new(self.rgb_resolution[0], self.rgb_resolution[1])
    }

    pub fn depth_resolution(&self) -> Resolution {
        Resolution::new(self.depth_resolution[0], self.depth_resolution[1])
    }

    /// Stream configuration requested at open.
    pub fn stream_config(&self) -> StreamConfig {
        let mut streams = StreamConfig::default();
        streams.color.width = self.rgb_resolution[0];
        streams.color.height = self.rgb_resolution[1];
        streams.depth.width = self.depth_resolution[0];
        streams.depth.height = self.depth_resolution[1];
        streams
    }

    pub fn fallback_extrinsics(&self) -> Option<Extrinsics> {
        self.extrinsic.as_ref().map(Extrinsics::from_matrix)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_ms.max(1))
    }
}

fn check_resolution(name: &str, [width, height]: [u32; 2]) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(DriverError::invalid_parameter(
            name,
            format!("{}x{} is not a valid resolution", width, height),
        ));
    }
    Ok(())
}

fn check_rigid(m: &[[f64; 4]; 4]) -> Result<()> {
    if m.iter().flatten().any(|v| !v.is_finite()) {
        return Err(DriverError::invalid_parameter("extrinsic", "not a number"));
    }
    if m[3] != [0.0, 0.0, 0.0, 1.0] {
        return Err(DriverError::invalid_parameter("extrinsic", "last row must be [0, 0, 0, 1]"));
    }
    for i in 0..3 {
        for j in 0..3 {
            let dot: f64 = (0..3).map(|k| m[k][i] * m[k][j]).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            if (dot - expected).abs() > ORTHONORMAL_TOLERANCE {
                return Err(DriverError::invalid_parameter("extrinsic", "rotation is not orthonormal"));
            }
        }
    }
    if m[0][3].abs() > 1.0 || m[1][3].abs() > 1.0 || m[2][3].abs() > 1.0 {
        warn!("Configured extrinsic translation exceeds one meter, check the units");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::from_toml("").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert!(config.registered);
        assert_eq!(config.period_ms, 30);
    }

    #[test]
    fn test_parse_full() {
        let config = DriverConfig::from_toml(
            r#"
            verbose = true
            registered = false
            rgb_resolution = [1280, 720]
            depth_resolution = [640, 480]
            accuracy = 2.0
            clip_planes = [0.2, 4.5]
            extrinsic = [
                [1.0, 0.0, 0.0, 0.015],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
            "#,
        )
        .unwrap();

        assert!(config.verbose);
        assert!(!config.registered);
        assert_eq!(config.rgb_resolution(), Resolution::new(1280, 720));
        assert_eq!(config.clip_planes, Some([0.2, 4.5]));

        let streams = config.stream_config();
        assert_eq!((streams.color.width, streams.color.height), (1280, 720));

        let extrinsics = config.fallback_extrinsics().unwrap();
        assert!((extrinsics.translation[0] - 0.015).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            DriverConfig::from_toml("rgb_resolution = [0, 480]"),
            Err(DriverError::InvalidParameter { .. })
        ));
        assert!(matches!(
            DriverConfig::from_toml("clip_planes = [2.0, 1.0]"),
            Err(DriverError::InvalidParameter { .. })
        ));
        assert!(matches!(
            DriverConfig::from_toml("rgb_resolution = \"big\""),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_non_rigid_extrinsic() {
        let mut config = DriverConfig::default();
        config.extrinsic = Some([
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert!(config.validate().is_err());

        config.extrinsic = Some(Extrinsics::IDENTITY.to_matrix());
        assert!(config.validate().is_ok());
    }
}
