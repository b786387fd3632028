pub mod acquire;
pub mod capture;

pub use acquire::{acquire, sleep_while_running};
pub use capture::{apply_properties, camera_properties, CameraOpener, FrameSource, OpenCvCamera, OpenCvOpener};
