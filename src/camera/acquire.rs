use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::capture::{CameraOpener, FrameSource};
use crate::config::CameraConfig;
use crate::error::{MonitorError, MonitorResult};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// `running` が立っている間だけ待つ。途中で止められたら false
pub fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn try_index(
    opener: &dyn CameraOpener,
    index: i32,
    settle: Duration,
    running: &AtomicBool,
) -> MonitorResult<Option<Box<dyn FrameSource>>> {
    info!("[cam{}] trying", index);
    let mut device = match opener.open(index) {
        Ok(device) => device,
        Err(e) => {
            warn!("[cam{}] open failed: {:#}", index, e);
            return Ok(None);
        }
    };

    if !sleep_while_running(running, settle) {
        device.release();
        return Err(MonitorError::Stopped);
    }

    if device.is_opened() {
        info!("[cam{}] opened", index);
        Ok(Some(device))
    } else {
        warn!("[cam{}] not available", index);
        device.release();
        Ok(None)
    }
}

/// 優先順にインデックスを試し、全滅ならクールダウン後にもう一度だけ試す
///
/// 成功したら解像度などを設定する（失敗はログのみ）。
pub fn acquire(
    opener: &dyn CameraOpener,
    config: &CameraConfig,
    running: &AtomicBool,
) -> MonitorResult<(i32, Box<dyn FrameSource>)> {
    let mut tried = Vec::with_capacity(config.indices.len() + 1);
    let mut found = None;

    for &index in &config.indices {
        tried.push(index);
        if let Some(device) = try_index(opener, index, config.settle(), running)? {
            found = Some((index, device));
            break;
        }
    }

    if found.is_none() {
        warn!(
            "no camera opened, retrying index {} in {:?}",
            config.retry_index,
            config.retry_cooldown()
        );
        if !sleep_while_running(running, config.retry_cooldown()) {
            return Err(MonitorError::Stopped);
        }
        tried.push(config.retry_index);
        found = try_index(opener, config.retry_index, config.settle(), running)?
            .map(|device| (config.retry_index, device));
    }

    let Some((index, mut device)) = found else {
        let err = MonitorError::CameraUnavailable { tried };
        error!("{}", err);
        return Err(err);
    };

    if let Err(e) = device.apply_settings(config) {
        warn!("[cam{}] could not apply camera properties: {:#}", index, e);
    }

    Ok((index, device))
}
