pub mod calibration;
pub mod stream;

pub use calibration::{CalibrationCache, CalibrationSnapshot};
pub use stream::{PipelineState, Resolution, StreamChange, StreamConfig, StreamManager, StreamSettings, WARMUP_FRAMES};
