pub mod features;
pub mod options;

pub use features::{CameraFeature, FeatureControl, FeatureMode};
pub use options::{get_option, log_supported_options, set_option, SensorHandles};
