use thiserror::Error;

/// 監視ループのエラー分類
///
/// カメラを開けなかった場合だけが実行を終了させる。それ以外はループ内で
/// ログを出して回復する。
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no camera could be opened (tried indices {tried:?})")]
    CameraUnavailable { tried: Vec<i32> },

    #[error("frame read failed: {0}")]
    FrameRead(String),

    #[error("pose estimation failed: {0}")]
    Estimation(String),

    #[error("alert dispatch failed: {0}")]
    AlertDispatch(String),

    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("stop requested during camera acquisition")]
    Stopped,

    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
