use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use tracing::{info, warn};

use crate::config::CameraConfig;

/// 検出ループが占有するカメラデバイス
pub trait FrameSource: Send {
    /// デバイスが使用可能か
    fn is_opened(&self) -> bool;

    /// 解像度・FPS・読み込みタイムアウトを設定（ベストエフォート）
    fn apply_settings(&mut self, config: &CameraConfig) -> Result<()>;

    /// フレームを読み込む（BGR形式）
    fn read_frame(&mut self) -> Result<Mat>;

    fn release(&mut self);
}

/// デバイスインデックスからカメラを開く
pub trait CameraOpener: Send + Sync {
    fn open(&self, index: i32) -> Result<Box<dyn FrameSource>>;
}

/// 検出ループが設定するプロパティ（ID, 名前, 値）
pub fn camera_properties(config: &CameraConfig) -> [(i32, &'static str, f64); 5] {
    [
        (videoio::CAP_PROP_FRAME_WIDTH, "width", config.width as f64),
        (videoio::CAP_PROP_FRAME_HEIGHT, "height", config.height as f64),
        (videoio::CAP_PROP_FPS, "fps", config.fps as f64),
        (videoio::CAP_PROP_BUFFERSIZE, "buffersize", 1.0),
        // read() がブロックし続けると stop() が返らないので上限を設ける
        (videoio::CAP_PROP_READ_TIMEOUT_MSEC, "read_timeout_ms", config.read_timeout_ms as f64),
    ]
}

/// プロパティを1つずつ設定する。失敗しても残りは試し、
/// 1つも適用できなかったときだけエラー
pub fn apply_properties<F>(index: i32, properties: &[(i32, &str, f64)], mut set: F) -> Result<usize>
where
    F: FnMut(i32, f64) -> Result<bool>,
{
    let mut applied = 0;
    for &(prop, name, value) in properties {
        match set(prop, value) {
            Ok(true) => applied += 1,
            Ok(false) => warn!("[cam{}] backend ignored {}={}", index, name, value),
            Err(e) => warn!("[cam{}] failed to set {}={}: {:#}", index, name, value, e),
        }
    }
    if applied == 0 {
        bail!("none of {} camera properties could be applied", properties.len());
    }
    Ok(applied)
}

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    index: i32,
    capture: VideoCapture,
}

impl OpenCvCamera {
    pub fn open(index: i32, api: VideoCaptureAPIs) -> Result<Self> {
        let capture = VideoCapture::new(index, api as i32)
            .with_context(|| format!("Failed to open camera {}", index))?;
        Ok(Self { index, capture })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        let width = self.capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = self.capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        (width as u32, height as u32)
    }
}

impl FrameSource for OpenCvCamera {
    fn is_opened(&self) -> bool {
        self.capture.is_opened().unwrap_or(false)
    }

    fn apply_settings(&mut self, config: &CameraConfig) -> Result<()> {
        let capture = &mut self.capture;
        let applied = apply_properties(self.index, &camera_properties(config), |prop, value| {
            Ok(capture.set(prop, value)?)
        });

        let (width, height) = self.resolution();
        let fps = self.capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        info!("[cam{}] properties: {}x{} @ {} fps", self.index, width, height, fps);
        applied.map(|_| ())
    }

    fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if !grabbed || frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }

    fn release(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("[cam{}] release failed: {}", self.index, e);
        }
    }
}

/// OpenCV バックエンドでカメラを開く
#[derive(Debug, Clone, Copy)]
pub struct OpenCvOpener {
    api: VideoCaptureAPIs,
}

impl OpenCvOpener {
    pub fn new(api: VideoCaptureAPIs) -> Self {
        Self { api }
    }
}

impl Default for OpenCvOpener {
    fn default() -> Self {
        Self::new(VideoCaptureAPIs::CAP_ANY)
    }
}

impl CameraOpener for OpenCvOpener {
    fn open(&self, index: i32) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(OpenCvCamera::open(index, self.api)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_property_attempted_after_failure() {
        let mut attempted = Vec::new();
        let applied = apply_properties(0, &camera_properties(&CameraConfig::default()), |prop, _| {
            attempted.push(prop);
            if prop == videoio::CAP_PROP_FRAME_WIDTH {
                bail!("unsupported");
            }
            Ok(prop != videoio::CAP_PROP_BUFFERSIZE)
        })
        .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(attempted.len(), 5);
        assert!(attempted.contains(&videoio::CAP_PROP_READ_TIMEOUT_MSEC));
    }

    #[test]
    fn test_error_only_when_nothing_applied() {
        let properties = camera_properties(&CameraConfig::default());
        assert!(apply_properties(0, &properties, |_, _| bail!("closed")).is_err());
        assert!(apply_properties(0, &properties, |_, _| Ok(false)).is_err());
    }

    #[test]
    fn test_read_timeout_comes_from_config() {
        let config = CameraConfig {
            read_timeout_ms: 250,
            ..CameraConfig::default()
        };
        let properties = camera_properties(&config);
        assert!(properties
            .iter()
            .any(|&(prop, _, value)| prop == videoio::CAP_PROP_READ_TIMEOUT_MSEC && value == 250.0));
    }
}
