use opencv::{core, core::Mat, prelude::*};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::PoseConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::form::{Evaluation, FormEvaluator};
use crate::overlay;
use crate::pose::{Pose, PoseEstimator, Side};
use crate::session::FrameUpdate;

/// フレーム数を数え、一定間隔ごとにレートを返す
pub struct FpsMeter {
    interval: Duration,
    frames: u32,
    since: Instant,
}

impl FpsMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            frames: 0,
            since: Instant::now(),
        }
    }

    pub fn tick(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.since.elapsed();
        if elapsed < self.interval {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.since = Instant::now();
        Some(fps)
    }
}

/// 1フレーム分の処理結果
pub struct ProcessedFrame {
    pub update: FrameUpdate,
    /// このフレームで姿勢推定を実行した
    pub estimated: bool,
    pub evaluation: Option<Evaluation>,
}

impl ProcessedFrame {
    pub fn alarm(&self) -> bool {
        self.evaluation.map_or(false, |e| e.alarm)
    }
}

/// 推定フレームへの描画関数
pub type DrawDetection = fn(&mut Mat, &Pose, f32, bool) -> MonitorResult<()>;

/// 左右反転 → 間引き → 姿勢推定 → フォーム評価 → 描画
///
/// 推定をスキップしたフレームや人物が見つからなかったフレームでは、
/// 角度とフィードバックの表示を前回のまま保持する。
/// 描画の失敗はログに残すだけで、評価結果（アラーム発火を含む）は必ず返す。
pub struct FramePipeline<E: PoseEstimator> {
    estimator: E,
    draw_detection: DrawDetection,
    evaluator: FormEvaluator,
    side: Side,
    estimate_every: u64,
    min_confidence: f32,
    frames_read: u64,
    angle_text: String,
}

impl<E: PoseEstimator> FramePipeline<E> {
    pub fn new(estimator: E, evaluator: FormEvaluator, config: &PoseConfig) -> Self {
        Self {
            estimator,
            draw_detection: overlay::draw_detection,
            evaluator,
            side: config.side,
            estimate_every: config.estimate_every.max(1) as u64,
            min_confidence: config.min_confidence,
            frames_read: 0,
            angle_text: String::new(),
        }
    }

    pub fn with_detection_overlay(mut self, draw: DrawDetection) -> Self {
        self.draw_detection = draw;
        self
    }

    pub fn evaluator(&self) -> &FormEvaluator {
        &self.evaluator
    }

    pub fn angle_text(&self) -> &str {
        &self.angle_text
    }

    pub fn process(&mut self, raw: Mat) -> MonitorResult<ProcessedFrame> {
        self.frames_read += 1;

        let mut image = Mat::default();
        core::flip(&raw, &mut image, 1)?;

        let estimated = self.frames_read % self.estimate_every == 0;
        let mut evaluation = None;

        if estimated {
            match self.estimator.estimate(&image) {
                Ok(Some(pose)) => {
                    let arm = pose.arm_joints(self.side, image.cols() as u32, image.rows() as u32);
                    let shoulder_angle = arm.shoulder_angle();
                    let elbow_angle = arm.elbow_angle();
                    self.angle_text = self.evaluator.exercise().angle_text(shoulder_angle, elbow_angle);

                    let result = self.evaluator.observe(shoulder_angle, elbow_angle);
                    if let Some(status) = result.transition {
                        info!("form status -> {} ({})", status, self.evaluator.feedback());
                    }

                    if result.alarm {
                        info!("triggering alarm");
                    }
                    if let Err(e) = (self.draw_detection)(&mut image, &pose, self.min_confidence, result.alarm) {
                        warn!("failed to draw detection overlay: {}", e);
                    }
                    evaluation = Some(result);
                }
                Ok(None) => {}
                Err(e) => warn!("{}", MonitorError::Estimation(format!("{:#}", e))),
            }
        }

        if let Err(e) = overlay::draw_status(
            &mut image,
            &self.angle_text,
            self.evaluator.feedback(),
            self.evaluator.status(),
        ) {
            warn!("failed to draw status overlay: {}", e);
        }

        Ok(ProcessedFrame {
            update: FrameUpdate {
                frame: image,
                angle_text: self.angle_text.clone(),
                feedback_text: self.evaluator.feedback().to_string(),
                form_status: self.evaluator.status(),
            },
            estimated,
            evaluation,
        })
    }
}
