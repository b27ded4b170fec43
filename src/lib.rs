pub mod backend;
pub mod capture;
pub mod control;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod params;
pub mod pipeline;
pub mod utils;

use arc_swap::ArcSwap;

pub use driver::{RgbdDriver, RgbdFrame, SensorStatus};
pub use error::{DriverError, Result};
pub use params::DriverConfig;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<DriverConfig>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(DriverConfig::default()));
