//! フレーム単位のフォーム判定と、それを安定した状態に変換するヒステリシス
//!
//! 悪化は遅く回復は速い: `Bad` には `stability_frames` 回連続の不正フレームが
//! 必要だが、正しいフレームが1つあれば即座に `Good` に戻る。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::alarm::AlarmDebouncer;
use crate::config::FormConfig;

pub const FEEDBACK_GOOD: &str = "Good Form!";
pub const FEEDBACK_RAISE_HIGHER: &str = "Warning: Raise your arm higher";
pub const FEEDBACK_CURL_MORE: &str = "Warning: Curl your arm more";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    #[default]
    HandRaise,
    HandCurl,
}

impl ExerciseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseType::HandRaise => "hand_raise",
            ExerciseType::HandCurl => "hand_curl",
        }
    }

    /// この種目で判定に使う関節角度の表示文字列
    pub fn angle_text(self, shoulder_angle: f32, elbow_angle: f32) -> String {
        match self {
            ExerciseType::HandRaise => format!("Shoulder Angle: {}°", shoulder_angle as i32),
            ExerciseType::HandCurl => format!("Elbow Angle: {}°", elbow_angle as i32),
        }
    }

    fn warning(self) -> &'static str {
        match self {
            ExerciseType::HandRaise => FEEDBACK_RAISE_HIGHER,
            ExerciseType::HandCurl => FEEDBACK_CURL_MORE,
        }
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hand_raise" | "raise" => Ok(ExerciseType::HandRaise),
            "hand_curl" | "curl" => Ok(ExerciseType::HandCurl),
            other => Err(format!("unknown exercise type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Unknown,
    Good,
    Bad,
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormStatus::Unknown => "unknown",
            FormStatus::Good => "good",
            FormStatus::Bad => "bad",
        })
    }
}

/// 種目ごとの角度閾値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormRules {
    pub hand_raise_min_angle: f32,
    pub hand_curl_max_angle: f32,
    pub stability_frames: u32,
}

impl FormRules {
    pub fn from_config(config: &FormConfig) -> Self {
        Self {
            hand_raise_min_angle: config.hand_raise_min_angle,
            hand_curl_max_angle: config.hand_curl_max_angle,
            stability_frames: config.stability_frames,
        }
    }

    /// 安定化前の1フレームだけの判定
    pub fn is_incorrect(&self, exercise: ExerciseType, shoulder_angle: f32, elbow_angle: f32) -> bool {
        match exercise {
            ExerciseType::HandRaise => shoulder_angle < self.hand_raise_min_angle,
            ExerciseType::HandCurl => elbow_angle > self.hand_curl_max_angle,
        }
    }
}

impl Default for FormRules {
    fn default() -> Self {
        Self::from_config(&FormConfig::default())
    }
}

/// 推定フレーム1つを評価した結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub incorrect: bool,
    /// このフレームで遷移したときの新しい状態
    pub transition: Option<FormStatus>,
    /// このフレームでアラームが発火した
    pub alarm: bool,
}

pub struct FormEvaluator {
    exercise: ExerciseType,
    rules: FormRules,
    status: FormStatus,
    feedback: &'static str,
    consecutive_wrong_frames: u32,
    alarm: AlarmDebouncer,
}

impl FormEvaluator {
    pub fn new(exercise: ExerciseType, rules: FormRules, alarm: AlarmDebouncer) -> Self {
        Self {
            exercise,
            rules,
            status: FormStatus::Unknown,
            feedback: "",
            consecutive_wrong_frames: 0,
            alarm,
        }
    }

    pub fn from_config(exercise: ExerciseType, config: &FormConfig) -> Self {
        Self::new(
            exercise,
            FormRules::from_config(config),
            AlarmDebouncer::new(config.alarm_frames),
        )
    }

    pub fn observe(&mut self, shoulder_angle: f32, elbow_angle: f32) -> Evaluation {
        let incorrect = self.rules.is_incorrect(self.exercise, shoulder_angle, elbow_angle);
        let mut transition = None;

        if incorrect {
            self.consecutive_wrong_frames += 1;
            if self.consecutive_wrong_frames >= self.rules.stability_frames {
                self.alarm.record_wrong_frame();
                if self.status != FormStatus::Bad {
                    self.status = FormStatus::Bad;
                    self.feedback = self.exercise.warning();
                    transition = Some(FormStatus::Bad);
                }
            }
        } else {
            self.consecutive_wrong_frames = 0;
            self.alarm.clear_counter();
            if self.status != FormStatus::Good {
                self.status = FormStatus::Good;
                self.feedback = FEEDBACK_GOOD;
                transition = Some(FormStatus::Good);
            }
        }

        let alarm = self.alarm.poll();
        if self.status == FormStatus::Good && self.consecutive_wrong_frames == 0 {
            self.alarm.rearm();
        }

        Evaluation {
            incorrect,
            transition,
            alarm,
        }
    }

    pub fn exercise(&self) -> ExerciseType {
        self.exercise
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn feedback(&self) -> &'static str {
        self.feedback
    }

    pub fn consecutive_wrong_frames(&self) -> u32 {
        self.consecutive_wrong_frames
    }

    pub fn wrong_form_counter(&self) -> u32 {
        self.alarm.wrong_form_counter()
    }

    pub fn alarm_triggered(&self) -> bool {
        self.alarm.triggered()
    }
}
