//! Acquisition counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::utils::CachePadded;

#[derive(Default)]
struct Counters {
    color_frames: AtomicU64,
    depth_frames: AtomicU64,
    failures: AtomicU64,
    last_acquire_us: AtomicU64,
}

/// Frame and failure counts shared between the driver and its observers.
#[derive(Default)]
pub struct AcquisitionStats {
    counters: CachePadded<Counters>,
}

/// Point-in-time copy of [`AcquisitionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub color_frames: u64,
    pub depth_frames: u64,
    pub failures: u64,
    pub last_acquire_us: u64,
}

impl AcquisitionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_color(&self) {
        self.counters.color_frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rgbd_frames_acquired", "stream" => "color").increment(1);
    }

    pub fn record_depth(&self) {
        self.counters.depth_frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rgbd_frames_acquired", "stream" => "depth").increment(1);
    }

    pub fn record_failure(&self) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rgbd_acquisition_failures").increment(1);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.counters.last_acquire_us.store(us, Ordering::Relaxed);
        metrics::histogram!("rgbd_acquire_time_us").record(us as f64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            color_frames: self.counters.color_frames.load(Ordering::Relaxed),
            depth_frames: self.counters.depth_frames.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            last_acquire_us: self.counters.last_acquire_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let stats = AcquisitionStats::new();
        stats.record_color();
        stats.record_color();
        stats.record_depth();
        stats.record_failure();
        stats.record_latency(Duration::from_micros(1500));

        let snap = stats.snapshot();
        assert_eq!(snap.color_frames, 2);
        assert_eq!(snap.depth_frames, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.last_acquire_us, 1500);
    }
}
