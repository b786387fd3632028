pub mod estimator;
pub mod keypoint;
pub mod movenet;

pub use estimator::PoseEstimator;
pub use keypoint::{ArmJoints, Keypoint, KeypointIndex, Pose, Side};
pub use movenet::{preprocess_for_movenet, MoveNetEstimator};
