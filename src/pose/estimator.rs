use anyhow::Result;
use opencv::core::Mat;

use super::keypoint::Pose;

/// 画像1枚から姿勢を推定する
///
/// 人物が見つからなければ `Ok(None)`。呼び出しは同期・ブロッキングで、
/// 検出ループのスレッド内でのみ使われる。
pub trait PoseEstimator: Send {
    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>>;
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>> {
        (**self).estimate(frame)
    }
}
