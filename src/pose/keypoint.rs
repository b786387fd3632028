use serde::Deserialize;

use crate::geometry::Point;

/// MoveNet の 17 キーポイントインデックス（モデル出力順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    /// 肩・肘・手首・腰（左右）
    pub const UPPER_BODY: [KeypointIndex; 8] = [
        KeypointIndex::LeftShoulder,
        KeypointIndex::RightShoulder,
        KeypointIndex::LeftElbow,
        KeypointIndex::RightElbow,
        KeypointIndex::LeftWrist,
        KeypointIndex::RightWrist,
        KeypointIndex::LeftHip,
        KeypointIndex::RightHip,
    ];
}

/// 角度計算に使う体の側
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Left,
    Right,
}

impl Side {
    /// (手首, 肘, 肩, 腰)
    fn arm_indices(self) -> [KeypointIndex; 4] {
        match self {
            Side::Left => [
                KeypointIndex::LeftWrist,
                KeypointIndex::LeftElbow,
                KeypointIndex::LeftShoulder,
                KeypointIndex::LeftHip,
            ],
            Side::Right => [
                KeypointIndex::RightWrist,
                KeypointIndex::RightElbow,
                KeypointIndex::RightShoulder,
                KeypointIndex::RightHip,
            ],
        }
    }
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// ピクセル座標に変換（整数に切り捨て）
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// 17キーポイントからなる姿勢
#[derive(Debug, Clone, Default)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 上半身キーポイントの平均信頼度
    pub fn upper_body_confidence(&self) -> f32 {
        let sum: f32 = KeypointIndex::UPPER_BODY
            .iter()
            .map(|&i| self.get(i).confidence)
            .sum();
        sum / KeypointIndex::UPPER_BODY.len() as f32
    }

    /// 片側の腕の関節をピクセル座標で取り出す
    pub fn arm_joints(&self, side: Side, width: u32, height: u32) -> ArmJoints {
        let [wrist, elbow, shoulder, hip] = side
            .arm_indices()
            .map(|i| {
                let (x, y) = self.get(i).to_pixel(width, height);
                (x as f32, y as f32)
            });
        ArmJoints { wrist, elbow, shoulder, hip }
    }
}

/// 角度計算に必要な4関節（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmJoints {
    pub wrist: Point,
    pub elbow: Point,
    pub shoulder: Point,
    pub hip: Point,
}

impl ArmJoints {
    /// 肩の角度（肘-肩-腰）
    pub fn shoulder_angle(&self) -> f32 {
        crate::geometry::angle_at(self.elbow, self.shoulder, self.hip)
    }

    /// 肘の角度（手首-肘-肩）
    pub fn elbow_angle(&self) -> f32 {
        crate::geometry::angle_at(self.wrist, self.elbow, self.shoulder)
    }
}
