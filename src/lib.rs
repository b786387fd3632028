pub mod alarm;
pub mod camera;
pub mod config;
pub mod error;
pub mod form;
pub mod geometry;
pub mod monitor;
pub mod overlay;
pub mod pipeline;
pub mod pose;
#[cfg(feature = "desktop")]
pub mod render;
pub mod session;

pub use error::{MonitorError, MonitorResult};
pub use form::{ExerciseType, FormStatus};
pub use monitor::{EstimatorFactory, FormMonitor};
pub use session::{FramePoller, SharedSession, StatusSnapshot};
