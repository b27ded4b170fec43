//! Geometry of the running streams, cached for lock-free reads.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{info, instrument, warn};

use crate::backend::{BackendAdapter, DeviceBackend, StreamKind};
use crate::error::{DriverError, Result};
use crate::geometry::{Extrinsics, Intrinsics};

/// Intrinsics and extrinsics of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSnapshot {
    pub color_intrinsics: Intrinsics,
    pub depth_intrinsics: Intrinsics,
    pub depth_to_color: Extrinsics,
    pub color_to_depth: Extrinsics,
    /// The extrinsics came from configuration instead of the device
    pub extrinsics_from_config: bool,
}

/// Holds the snapshot of the currently running pipeline.
///
/// Replaced as a whole on every refresh and cleared whenever the pipeline
/// stops, so readers never see geometry from two different configurations.
#[derive(Default)]
pub struct CalibrationCache {
    current: ArcSwapOption<CalibrationSnapshot>,
    fallback_extrinsics: Option<Extrinsics>,
}

impl CalibrationCache {
    /// `fallback` (depth to color) is used when the device can't report extrinsics.
    pub fn new(fallback: Option<Extrinsics>) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            fallback_extrinsics: fallback,
        }
    }

    /// Reads the active streams' geometry and swaps in a new snapshot.
    #[instrument(skip_all)]
    pub fn refresh<B: DeviceBackend>(&self, adapter: &BackendAdapter<B>) -> Result<Arc<CalibrationSnapshot>> {
        if !adapter.is_streaming() {
            return Err(DriverError::PipelineNotRunning);
        }

        let color = adapter.active_stream(StreamKind::Color)?;
        let depth = adapter.active_stream(StreamKind::Depth)?;

        let color_intrinsics = adapter.query_intrinsics(&color)?;
        let depth_intrinsics = adapter.query_intrinsics(&depth)?;

        let device_extrinsics = adapter
            .query_extrinsics(&depth, &color)
            .and_then(|d2c| adapter.query_extrinsics(&color, &depth).map(|c2d| (d2c, c2d)));

        let (depth_to_color, color_to_depth, extrinsics_from_config) = match (device_extrinsics, self.fallback_extrinsics) {
            (Ok((d2c, c2d)), _) => (d2c, c2d, false),
            (Err(e), Some(fallback)) => {
                warn!("Device extrinsics unavailable ({}), using configured transform", e);
                (fallback, fallback.inverse(), true)
            }
            (Err(e), None) => return Err(e),
        };

        let snapshot = Arc::new(CalibrationSnapshot {
            color_intrinsics,
            depth_intrinsics,
            depth_to_color,
            color_to_depth,
            extrinsics_from_config,
        });
        self.current.store(Some(snapshot.clone()));

        info!(
            color = %format!("{}x{}", color_intrinsics.width, color_intrinsics.height),
            depth = %format!("{}x{}", depth_intrinsics.width, depth_intrinsics.height),
            "Calibration refreshed"
        );
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        self.current.store(None);
    }

    pub fn snapshot(&self) -> Option<Arc<CalibrationSnapshot>> {
        self.current.load_full()
    }

    pub fn color_intrinsics(&self) -> Result<Intrinsics> {
        self.read(|s| s.color_intrinsics)
    }

    pub fn depth_intrinsics(&self) -> Result<Intrinsics> {
        self.read(|s| s.depth_intrinsics)
    }

    /// Depth-to-color transform.
    pub fn extrinsic(&self) -> Result<Extrinsics> {
        self.read(|s| s.depth_to_color)
    }

    fn read<T>(&self, f: impl FnOnce(&CalibrationSnapshot) -> T) -> Result<T> {
        self.current.load().as_deref().map(f).ok_or(DriverError::NotCalibrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimulatedBackend, StreamRequest};
    use crate::capture::format::NativeFormat;

    fn adapter(color: (u32, u32), depth: (u32, u32)) -> BackendAdapter<SimulatedBackend> {
        adapter_with(SimulatedBackend::new(), color, depth)
    }

    fn adapter_with(backend: SimulatedBackend, color: (u32, u32), depth: (u32, u32)) -> BackendAdapter<SimulatedBackend> {
        let mut adapter = BackendAdapter::new(backend);
        adapter
            .start_pipeline(&[
                StreamRequest {
                    kind: StreamKind::Color,
                    width: color.0,
                    height: color.1,
                    format: NativeFormat::Rgb8,
                    fps: 0,
                },
                StreamRequest {
                    kind: StreamKind::Depth,
                    width: depth.0,
                    height: depth.1,
                    format: NativeFormat::Z16,
                    fps: 0,
                },
            ])
            .unwrap();
        adapter
    }

    #[test]
    fn test_refresh_reads_active_geometry() {
        let cache = CalibrationCache::new(None);
        let adapter = adapter((640, 480), (320, 240));
        cache.refresh(&adapter).unwrap();

        let color = cache.color_intrinsics().unwrap();
        let depth = cache.depth_intrinsics().unwrap();
        assert_eq!((color.width, color.height), (640, 480));
        assert_eq!((depth.width, depth.height), (320, 240));

        let snapshot = cache.snapshot().unwrap();
        let p = [0.1, 0.2, 1.0];
        let back = snapshot.color_to_depth.transform(snapshot.depth_to_color.transform(p));
        assert!((back[0] - p[0]).abs() < 1e-5);
        assert!(!snapshot.extrinsics_from_config);
    }

    #[test]
    fn test_refresh_requires_running_pipeline() {
        let cache = CalibrationCache::new(None);
        let adapter = BackendAdapter::new(SimulatedBackend::new());
        assert!(matches!(cache.refresh(&adapter), Err(DriverError::PipelineNotRunning)));
        assert!(matches!(cache.color_intrinsics(), Err(DriverError::NotCalibrated)));
    }

    #[test]
    fn test_invalidate_clears_snapshot() {
        let cache = CalibrationCache::new(None);
        let adapter = adapter((640, 480), (640, 480));
        cache.refresh(&adapter).unwrap();
        cache.invalidate();
        assert!(cache.snapshot().is_none());
        assert!(matches!(cache.extrinsic(), Err(DriverError::NotCalibrated)));
    }

    #[test]
    fn test_configured_extrinsics_fill_in() {
        let backend = SimulatedBackend::new();
        backend.faults().fail_extrinsics(true);
        let fallback = Extrinsics {
            translation: [0.05, 0.0, 0.0],
            ..Extrinsics::IDENTITY
        };
        let cache = CalibrationCache::new(Some(fallback));
        let adapter = adapter_with(backend, (640, 480), (640, 480));

        let snapshot = cache.refresh(&adapter).unwrap();

        assert!(snapshot.extrinsics_from_config);
        assert_eq!(snapshot.depth_to_color, fallback);
        assert_eq!(snapshot.color_to_depth, fallback.inverse());
        assert_eq!(cache.extrinsic().unwrap(), fallback);
    }

    #[test]
    fn test_missing_extrinsics_without_fallback() {
        let backend = SimulatedBackend::new();
        backend.faults().fail_extrinsics(true);
        let cache = CalibrationCache::new(None);
        let adapter = adapter_with(backend, (640, 480), (640, 480));

        assert!(matches!(
            cache.refresh(&adapter),
            Err(DriverError::BackendCallFailed { call: "query_extrinsics", .. })
        ));
        assert!(cache.snapshot().is_none());
    }
}
