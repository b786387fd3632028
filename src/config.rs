use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::MonitorError;
use crate::pose::Side;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub form: FormConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub view: ViewConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// 試行するデバイスインデックス（優先順）
    #[serde(default = "default_indices")]
    pub indices: Vec<i32>,
    /// 全インデックス失敗後に再試行するインデックス
    #[serde(default = "default_retry_index")]
    pub retry_index: i32,
    /// オープン後、準備確認までの待ち時間（ミリ秒）
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// 再試行前のクールダウン（ミリ秒）
    #[serde(default = "default_retry_cooldown_ms")]
    pub retry_cooldown_ms: u64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// read() の上限時間（ミリ秒）。stop() の待ち時間の上限になる
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// 読み込み失敗後のバックオフ（ミリ秒）
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
}

fn default_indices() -> Vec<i32> { vec![0, 1, 2] }
fn default_retry_index() -> i32 { 0 }
fn default_settle_ms() -> u64 { 1000 }
fn default_retry_cooldown_ms() -> u64 { 5000 }
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_fps() -> u32 { 30 }
fn default_read_timeout_ms() -> u64 { 2000 }
fn default_read_backoff_ms() -> u64 { 100 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            indices: default_indices(),
            retry_index: default_retry_index(),
            settle_ms: default_settle_ms(),
            retry_cooldown_ms: default_retry_cooldown_ms(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            read_timeout_ms: default_read_timeout_ms(),
            read_backoff_ms: default_read_backoff_ms(),
        }
    }
}

impl CameraConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoseConfig {
    /// MoveNet ONNXモデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// これ未満の平均信頼度は「人物なし」とみなす
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// N フレームに1回だけ姿勢推定する
    #[serde(default = "default_estimate_every")]
    pub estimate_every: u32,
    /// 角度計算に使う体の側
    #[serde(default)]
    pub side: Side,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_min_confidence() -> f32 { 0.3 }
fn default_estimate_every() -> u32 { 2 }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            min_confidence: default_min_confidence(),
            estimate_every: default_estimate_every(),
            side: Side::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FormConfig {
    /// Bad へ遷移するまでに必要な連続不正フレーム数
    #[serde(default = "default_stability_frames")]
    pub stability_frames: u32,
    /// アラームを鳴らすまでの安定後の不正フレーム数
    #[serde(default = "default_alarm_frames")]
    pub alarm_frames: u32,
    #[serde(default = "default_hand_raise_min_angle")]
    pub hand_raise_min_angle: f32,
    #[serde(default = "default_hand_curl_max_angle")]
    pub hand_curl_max_angle: f32,
}

fn default_stability_frames() -> u32 { 5 }
fn default_alarm_frames() -> u32 { 15 }
fn default_hand_raise_min_angle() -> f32 { 150.0 }
fn default_hand_curl_max_angle() -> f32 { 120.0 }

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            stability_frames: default_stability_frames(),
            alarm_frames: default_alarm_frames(),
            hand_raise_min_angle: default_hand_raise_min_angle(),
            hand_curl_max_angle: default_hand_curl_max_angle(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_sound_path")]
    pub sound_path: String,
    /// 出力音量 (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_sound_path() -> String { "alarm.wav".to_string() }
fn default_volume() -> f32 { 1.0 }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sound_path: default_sound_path(),
            volume: default_volume(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 { 30 }

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("using default config ({:#})", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.camera.indices.is_empty() {
            return Err(MonitorError::Config("camera.indices must not be empty".into()));
        }
        if self.pose.estimate_every == 0 {
            return Err(MonitorError::Config("pose.estimate_every must be at least 1".into()));
        }
        if self.form.stability_frames == 0 || self.form.alarm_frames == 0 {
            return Err(MonitorError::Config(
                "form.stability_frames and form.alarm_frames must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alert.volume) {
            return Err(MonitorError::Config("alert.volume must be within 0.0..=1.0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = Config::default();
        assert_eq!(config.camera.indices, vec![0, 1, 2]);
        assert_eq!(config.camera.width, 800);
        assert_eq!(config.camera.height, 600);
        assert_eq!(config.pose.estimate_every, 2);
        assert_eq!(config.pose.side, Side::Left);
        assert_eq!(config.form.stability_frames, 5);
        assert_eq!(config.form.alarm_frames, 15);
        assert_eq!(config.form.hand_raise_min_angle, 150.0);
        assert_eq!(config.form.hand_curl_max_angle, 120.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[camera]\nindices = [2]\nsettle_ms = 0\n\n[pose]\nside = \"right\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.camera.indices, vec![2]);
        assert_eq!(config.camera.settle_ms, 0);
        assert_eq!(config.camera.retry_cooldown_ms, 5000);
        assert_eq!(config.pose.side, Side::Right);
        assert_eq!(config.form.alarm_frames, 15);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pose]\nestimate_every = 0").unwrap();
        assert!(Config::load(file.path()).is_err());

        let mut config = Config::default();
        config.alert.volume = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.camera.fps, 30);
    }
}
