use opencv::{
    core::{Mat, Point, Scalar},
    imgproc,
    prelude::*,
};

use crate::error::MonitorResult;
use crate::form::FormStatus;
use crate::pose::{KeypointIndex, Pose};

pub const ALARM_TEXT: &str = "ALARM: Fix Your Form!";

/// 骨格の接続定義（上半身のみ）
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 8] = [
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    (KeypointIndex::RightElbow, KeypointIndex::RightWrist),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
];

// BGR
fn white() -> Scalar { Scalar::new(255.0, 255.0, 255.0, 0.0) }
fn green() -> Scalar { Scalar::new(0.0, 255.0, 0.0, 0.0) }
fn red() -> Scalar { Scalar::new(0.0, 0.0, 255.0, 0.0) }
fn yellow() -> Scalar { Scalar::new(0.0, 255.0, 255.0, 0.0) }

fn put_text(frame: &mut Mat, text: &str, origin: Point, scale: f64, color: Scalar, thickness: i32) -> MonitorResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    imgproc::put_text(
        frame,
        text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        thickness,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// 信頼度が閾値以上のキーポイントと骨格線を描画
pub fn draw_pose(frame: &mut Mat, pose: &Pose, confidence_threshold: f32) -> MonitorResult<()> {
    let w = frame.cols() as u32;
    let h = frame.rows() as u32;

    for (start_idx, end_idx) in SKELETON_CONNECTIONS.iter() {
        let start = pose.get(*start_idx);
        let end = pose.get(*end_idx);
        if start.is_valid(confidence_threshold) && end.is_valid(confidence_threshold) {
            let (x1, y1) = start.to_pixel(w, h);
            let (x2, y2) = end.to_pixel(w, h);
            imgproc::line(frame, Point::new(x1, y1), Point::new(x2, y2), yellow(), 2, imgproc::LINE_8, 0)?;
        }
    }

    for kp in pose.keypoints.iter().filter(|kp| kp.is_valid(confidence_threshold)) {
        let (px, py) = kp.to_pixel(w, h);
        imgproc::circle(frame, Point::new(px, py), 4, green(), -1, imgproc::LINE_8, 0)?;
    }

    Ok(())
}

/// 角度（白）とフィードバック（Good=緑、それ以外=赤）
pub fn draw_status(frame: &mut Mat, angle_text: &str, feedback_text: &str, status: FormStatus) -> MonitorResult<()> {
    put_text(frame, angle_text, Point::new(10, 60), 0.7, white(), 2)?;
    let color = if status == FormStatus::Good { green() } else { red() };
    put_text(frame, feedback_text, Point::new(10, 90), 0.7, color, 2)
}

pub fn draw_alarm(frame: &mut Mat) -> MonitorResult<()> {
    put_text(frame, ALARM_TEXT, Point::new(50, 120), 1.0, red(), 3)
}

/// 推定フレームの描画。骨格と、発火したフレームならアラーム表示
pub fn draw_detection(frame: &mut Mat, pose: &Pose, confidence_threshold: f32, alarm: bool) -> MonitorResult<()> {
    draw_pose(frame, pose, confidence_threshold)?;
    if alarm {
        draw_alarm(frame)?;
    }
    Ok(())
}
