//! 共有セッション状態。検出スレッドが書き込み、任意個のポーラーが読む。
//! 読み出しはすべてロック内でコピーし、フレームバッファへの参照は渡さない。

use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::error::MonitorResult;
use crate::form::{ExerciseType, FormStatus};

/// 最初のカメラフレームが届くまで表示する黒画像
pub fn placeholder_frame(width: u32, height: u32) -> MonitorResult<Mat> {
    Ok(Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?)
}

/// ループ1回分の更新。1回のロックでまとめて反映する
pub struct FrameUpdate {
    pub frame: Mat,
    pub angle_text: String,
    pub feedback_text: String,
    pub form_status: FormStatus,
}

/// フレームを除いたセッションの状態
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub exercise_type: ExerciseType,
    pub camera_index: Option<i32>,
    pub form_status: FormStatus,
    pub feedback: String,
    pub angle: String,
}

struct SessionState {
    exercise: ExerciseType,
    camera_index: Option<i32>,
    frame: Mat,
    angle_text: String,
    feedback_text: String,
    form_status: FormStatus,
}

pub struct SharedSession {
    running: AtomicBool,
    state: Mutex<SessionState>,
}

impl SharedSession {
    pub fn new(exercise: ExerciseType) -> Self {
        Self {
            running: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                exercise,
                camera_index: None,
                frame: Mat::default(),
                angle_text: String::new(),
                feedback_text: String::new(),
                form_status: FormStatus::Unknown,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn running_flag(&self) -> &AtomicBool {
        &self.running
    }

    pub fn exercise(&self) -> ExerciseType {
        self.lock().exercise
    }

    fn snapshot_of(&self, state: &SessionState) -> StatusSnapshot {
        StatusSnapshot {
            running: self.is_running(),
            exercise_type: state.exercise,
            camera_index: state.camera_index,
            form_status: state.form_status,
            feedback: state.feedback_text.clone(),
            angle: state.angle_text.clone(),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock();
        self.snapshot_of(&state)
    }

    /// フレームと状態を同じロック内でコピーする。両者は必ず同じ更新のもの
    pub fn capture(&self) -> MonitorResult<(Mat, StatusSnapshot)> {
        let state = self.lock();
        let frame = state.frame.try_clone()?;
        Ok((frame, self.snapshot_of(&state)))
    }

    /// 現在フレームのディープコピー。初回実行前のみ空
    pub fn frame(&self) -> MonitorResult<Mat> {
        Ok(self.lock().frame.try_clone()?)
    }

    /// 新しい実行のために全項目をリセットし、実行中にする
    pub(crate) fn begin_run(&self, exercise: ExerciseType, placeholder: Mat) {
        {
            let mut state = self.lock();
            state.exercise = exercise;
            state.camera_index = None;
            state.frame = placeholder;
            state.angle_text.clear();
            state.feedback_text.clear();
            state.form_status = FormStatus::Unknown;
        }
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn set_exercise(&self, exercise: ExerciseType) {
        self.lock().exercise = exercise;
    }

    pub(crate) fn set_camera_index(&self, index: i32) {
        self.lock().camera_index = Some(index);
    }

    pub(crate) fn publish(&self, update: FrameUpdate) {
        let mut state = self.lock();
        state.frame = update.frame;
        state.angle_text = update.angle_text;
        state.feedback_text = update.feedback_text;
        state.form_status = update.form_status;
    }

    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// 一定間隔でセッションからフレームと状態をコピーする専用スレッド。
/// 検出側の状態には触れない
pub struct FramePoller {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FramePoller {
    pub fn spawn<F>(session: Arc<SharedSession>, interval: Duration, mut on_frame: F) -> MonitorResult<Self>
    where
        F: FnMut(Mat, StatusSnapshot) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let active_ref = active.clone();

        let handle = thread::Builder::new()
            .name("frame-poller".to_string())
            .spawn(move || {
                let mut copied = 0u32;
                let mut since = Instant::now();
                while active_ref.load(Ordering::Acquire) {
                    match session.capture() {
                        Ok((frame, status)) if !frame.empty() => {
                            on_frame(frame, status);
                            copied += 1;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("[poller] frame copy failed: {}", e),
                    }

                    if since.elapsed() >= Duration::from_secs(5) {
                        debug!("[poller] {:.2} fps", copied as f32 / since.elapsed().as_secs_f32());
                        copied = 0;
                        since = Instant::now();
                    }
                    thread::sleep(interval);
                }
            })
            .map_err(crate::error::MonitorError::Spawn)?;

        Ok(Self {
            active,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[poller] thread panicked");
            }
        }
    }
}

impl Drop for FramePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn update(status: FormStatus, feedback: &str) -> FrameUpdate {
        FrameUpdate {
            frame: placeholder_frame(8, 6).unwrap(),
            angle_text: "Shoulder Angle: 120°".to_string(),
            feedback_text: feedback.to_string(),
            form_status: status,
        }
    }

    #[test]
    fn test_begin_run_installs_placeholder() {
        let session = SharedSession::new(ExerciseType::HandRaise);
        assert!(session.frame().unwrap().empty());

        session.begin_run(ExerciseType::HandCurl, placeholder_frame(800, 600).unwrap());
        let frame = session.frame().unwrap();
        assert_eq!((frame.cols(), frame.rows()), (800, 600));
        assert!(session.is_running());
        assert_eq!(session.exercise(), ExerciseType::HandCurl);
    }

    #[test]
    fn test_begin_run_resets_previous_state() {
        let session = SharedSession::new(ExerciseType::HandRaise);
        session.begin_run(ExerciseType::HandRaise, placeholder_frame(8, 6).unwrap());
        session.set_camera_index(1);
        session.publish(update(FormStatus::Bad, "Warning: Raise your arm higher"));
        session.request_stop();

        session.begin_run(ExerciseType::HandRaise, placeholder_frame(8, 6).unwrap());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.form_status, FormStatus::Unknown);
        assert_eq!(snapshot.feedback, "");
        assert_eq!(snapshot.angle, "");
        assert_eq!(snapshot.camera_index, None);
    }

    #[test]
    fn test_frame_is_a_copy() {
        let session = SharedSession::new(ExerciseType::HandRaise);
        session.begin_run(ExerciseType::HandRaise, placeholder_frame(4, 4).unwrap());

        let mut copy = session.frame().unwrap();
        let whole = opencv::core::Rect::new(0, 0, 4, 4);
        opencv::imgproc::rectangle(&mut copy, whole, Scalar::all(255.0), -1, opencv::imgproc::LINE_8, 0).unwrap();

        let fresh = session.frame().unwrap();
        assert_eq!(fresh.at_2d::<opencv::core::Vec3b>(0, 0).unwrap().0, [0, 0, 0]);
    }

    #[test]
    fn test_snapshot_serializes_like_status_payload() {
        let session = SharedSession::new(ExerciseType::HandCurl);
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["exercise_type"], "hand_curl");
        assert_eq!(json["form_status"], "unknown");
        assert!(json["camera_index"].is_null());
    }

    /// フレーム幅とフィードバック文字列が対応する更新
    fn tagged_update(i: u32) -> FrameUpdate {
        let width = if i % 2 == 0 { 8 } else { 16 };
        FrameUpdate {
            frame: placeholder_frame(width, 6).unwrap(),
            angle_text: format!("Shoulder Angle: {}°", i),
            feedback_text: format!("width {}", width),
            form_status: FormStatus::Good,
        }
    }

    #[test]
    fn test_capture_pairs_frame_with_its_status() {
        let session = Arc::new(SharedSession::new(ExerciseType::HandRaise));
        session.begin_run(ExerciseType::HandRaise, placeholder_frame(8, 6).unwrap());
        session.publish(tagged_update(0));

        let publisher = {
            let session = session.clone();
            thread::spawn(move || {
                for i in 1..2000 {
                    session.publish(tagged_update(i));
                }
            })
        };

        for _ in 0..2000 {
            let (frame, status) = session.capture().unwrap();
            assert_eq!(status.feedback, format!("width {}", frame.cols()));
        }
        publisher.join().unwrap();
    }

    #[test]
    fn test_poller_delivers_frames() {
        let session = Arc::new(SharedSession::new(ExerciseType::HandRaise));
        session.begin_run(ExerciseType::HandRaise, placeholder_frame(8, 6).unwrap());
        session.publish(update(FormStatus::Good, "Good Form!"));

        let (tx, rx) = mpsc::channel();
        let mut poller = FramePoller::spawn(session.clone(), Duration::from_millis(5), move |frame, status| {
            let _ = tx.send((frame.cols(), status.feedback));
        })
        .unwrap();

        let (cols, feedback) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(cols, 8);
        assert_eq!(feedback, "Good Form!");
        poller.stop();
        poller.stop();
    }
}
