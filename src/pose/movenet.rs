use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::estimator::PoseEstimator;
use super::keypoint::{Keypoint, KeypointIndex, Pose};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// BGR フレームを MoveNet の入力テンソルに変換
///
/// 192x192 にリサイズし、RGB 順の [1, 192, 192, 3] f32 (0.0-255.0) を返す。
pub fn preprocess_for_movenet(frame: &Mat) -> Result<Array4<f32>> {
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let size = MOVENET_INPUT_SIZE as usize;
    let bytes = resized.data_bytes().context("resized frame is not continuous")?;
    if bytes.len() != size * size * 3 {
        anyhow::bail!("expected 8-bit BGR frame, got {} bytes", bytes.len());
    }

    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for (i, bgr) in bytes.chunks_exact(3).enumerate() {
        let (y, x) = (i / size, i % size);
        tensor[[0, y, x, 0]] = bgr[2] as f32;
        tensor[[0, y, x, 1]] = bgr[1] as f32;
        tensor[[0, y, x, 2]] = bgr[0] as f32;
    }

    Ok(tensor)
}

/// MoveNet (SinglePose) による姿勢推定器
pub struct MoveNetEstimator {
    session: Session,
    min_confidence: f32,
}

impl MoveNetEstimator {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, min_confidence: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;

        Ok(Self {
            session,
            min_confidence,
        })
    }

    fn detect(&mut self, input: Array4<f32>) -> Result<Pose> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // 出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (i, keypoint) in keypoints.iter_mut().enumerate() {
            *keypoint = Keypoint::new(output[[0, 0, i, 1]], output[[0, 0, i, 0]], output[[0, 0, i, 2]]);
        }

        Ok(Pose::new(keypoints))
    }
}

impl PoseEstimator for MoveNetEstimator {
    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>> {
        let input = preprocess_for_movenet(frame)?;
        let pose = self.detect(input)?;

        // SinglePose は常に17点を返すので、上半身の信頼度で人物の有無を判定
        if pose.upper_body_confidence() < self.min_confidence {
            return Ok(None);
        }
        Ok(Some(pose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_preprocess_shape_and_channel_order() {
        // BGR = (10, 20, 30)
        let frame = Mat::new_rows_cols_with_default(600, 800, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0))
            .unwrap();
        let tensor = preprocess_for_movenet(&frame).unwrap();

        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        assert_eq!(tensor[[0, 100, 50, 0]], 30.0);
        assert_eq!(tensor[[0, 100, 50, 1]], 20.0);
        assert_eq!(tensor[[0, 100, 50, 2]], 10.0);
    }

    #[test]
    fn test_missing_model_is_an_error() {
        assert!(MoveNetEstimator::new("models/does_not_exist.onnx", 0.3).is_err());
    }
}
