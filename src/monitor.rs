use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::alarm::{dispatch_alert, AlertSink, SoundAlert};
use crate::camera::{acquire, sleep_while_running, CameraOpener, OpenCvOpener};
use crate::config::Config;
use crate::error::{MonitorError, MonitorResult};
use crate::form::{ExerciseType, FormEvaluator};
use crate::pipeline::{FpsMeter, FramePipeline};
use crate::pose::{MoveNetEstimator, PoseEstimator};
use crate::session::{placeholder_frame, SharedSession};

/// 実行ごとに新しい推定器を作る
pub type EstimatorFactory = Box<dyn Fn() -> Result<Box<dyn PoseEstimator>> + Send + Sync>;

const FPS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// 検出スレッドと、その書き込み先のセッションを所有する
///
/// 同時に動く実行は1つだけ。`start` でワーカーを起動し、`stop` で実行フラグを
/// 下ろして join する。カメラの取得と解放はワーカー側で行う。
pub struct FormMonitor {
    config: Config,
    session: Arc<SharedSession>,
    opener: Arc<dyn CameraOpener>,
    estimator_factory: EstimatorFactory,
    alert: Arc<dyn AlertSink>,
    worker: Option<JoinHandle<()>>,
}

impl FormMonitor {
    pub fn new(
        config: Config,
        opener: Arc<dyn CameraOpener>,
        estimator_factory: EstimatorFactory,
        alert: Arc<dyn AlertSink>,
    ) -> MonitorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session: Arc::new(SharedSession::new(ExerciseType::default())),
            opener,
            estimator_factory,
            alert,
            worker: None,
        })
    }

    /// `config` から OpenCV カメラ・MoveNet 推定器・音アラートを組み立てる
    pub fn from_config(config: Config) -> MonitorResult<Self> {
        let model_path = config.pose.model_path.clone();
        let min_confidence = config.pose.min_confidence;
        let estimator_factory: EstimatorFactory = Box::new(move || -> Result<Box<dyn PoseEstimator>> {
            Ok(Box::new(MoveNetEstimator::new(&model_path, min_confidence)?))
        });
        let alert = Arc::new(SoundAlert::from_config(&config.alert));
        Self::new(config, Arc::new(OpenCvOpener::default()), estimator_factory, alert)
    }

    /// ポーラー向けの読み取り側
    pub fn session(&self) -> Arc<SharedSession> {
        self.session.clone()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// 実行中は変更不可。実行は開始時の種目のまま
    pub fn set_exercise(&mut self, exercise: ExerciseType) -> MonitorResult<()> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        self.session.set_exercise(exercise);
        Ok(())
    }

    /// 実行を開始する。戻った時点でプレースホルダ画像は設定済み。
    /// カメラの取得はワーカーで行う
    pub fn start(&mut self, exercise: ExerciseType) -> MonitorResult<()> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        // 前回の実行がカメラ失敗などで自然終了している場合
        self.join_worker();

        let estimator = (self.estimator_factory)()
            .map_err(|e| MonitorError::Estimation(format!("{:#}", e)))?;
        let placeholder = placeholder_frame(self.config.camera.width, self.config.camera.height)?;
        self.session.begin_run(exercise, placeholder);

        let worker = Worker {
            session: self.session.clone(),
            opener: self.opener.clone(),
            alert: self.alert.clone(),
            config: self.config.clone(),
            exercise,
            estimator,
        };

        match thread::Builder::new()
            .name("detection".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                info!("monitoring started ({})", exercise);
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.session.request_stop();
                Err(MonitorError::Spawn(e))
            }
        }
    }

    /// 何度呼んでもよい。ワーカーが終了しカメラを解放してから戻る
    pub fn stop(&mut self) {
        self.session.request_stop();
        if self.worker.is_some() {
            self.join_worker();
            info!("monitoring stopped");
        }
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("detection thread panicked");
            }
        }
    }
}

impl Drop for FormMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// ワーカーがどう終わっても（パニック含む）実行フラグを下ろす
struct RunGuard<'a>(&'a SharedSession);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.request_stop();
    }
}

struct Worker {
    session: Arc<SharedSession>,
    opener: Arc<dyn CameraOpener>,
    alert: Arc<dyn AlertSink>,
    config: Config,
    exercise: ExerciseType,
    estimator: Box<dyn PoseEstimator>,
}

impl Worker {
    fn run(self) {
        let _guard = RunGuard(&self.session);
        let running = self.session.running_flag();

        info!("detection loop started, opening camera");
        let (index, mut camera) = match acquire(&*self.opener, &self.config.camera, running) {
            Ok(acquired) => acquired,
            Err(MonitorError::Stopped) => {
                info!("stopped before a camera was opened");
                return;
            }
            Err(e) => {
                error!("aborting detection loop: {}", e);
                return;
            }
        };
        self.session.set_camera_index(index);

        let evaluator = FormEvaluator::from_config(self.exercise, &self.config.form);
        let mut pipeline = FramePipeline::new(self.estimator, evaluator, &self.config.pose);
        let mut fps = FpsMeter::new(FPS_LOG_INTERVAL);
        let backoff = self.config.camera.read_backoff();
        let mut estimated_frames = 0u32;

        while running.load(Ordering::Acquire) {
            let raw = match camera.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[cam{}] {}", index, MonitorError::FrameRead(format!("{:#}", e)));
                    sleep_while_running(running, backoff);
                    continue;
                }
            };

            match pipeline.process(raw) {
                Ok(processed) => {
                    if processed.estimated {
                        estimated_frames += 1;
                    }
                    if processed.alarm() {
                        dispatch_alert(self.alert.clone());
                    }
                    self.session.publish(processed.update);
                }
                Err(e) => {
                    warn!("frame processing failed: {}", e);
                    sleep_while_running(running, backoff);
                }
            }

            if let Some(rate) = fps.tick() {
                info!(
                    "[cam{}] capturing at {:.2} FPS ({} frames estimated)",
                    index, rate, estimated_frames
                );
                estimated_frames = 0;
            }
        }

        info!("detection loop stopped, releasing camera");
        camera.release();
        info!("[cam{}] released", index);
    }
}
