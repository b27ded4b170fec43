pub mod acquire;
pub mod format;
pub mod image;
pub mod stats;

pub use format::{map_format, NativeFormat, PixelCode};
pub use image::{DepthImage, FlexImage, Stamp};
pub use stats::{AcquisitionStats, StatsSnapshot};
