//! 補正済みポーズに対するルールベースのイベント判定

use std::fmt;

use nalgebra::Vector3;

use crate::pose::{JointIndex, JOINT_COUNT};

/// 転倒判定のデフォルト閾値（肩・腰・足首の高さ差）
pub const DEFAULT_FALL_THRESHOLD: f64 = 0.2;
/// ジャンプ判定のデフォルト閾値（鼻の高さ）
pub const DEFAULT_JUMP_THRESHOLD: f64 = 2.0;

/// 検出イベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Jump,
    FallDown,
    None,
}

impl EventKind {
    /// 配信ペイロードで使うラベル
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Jump => "Jump",
            EventKind::FallDown => "Fall-down",
            EventKind::None => "None",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1ポーズから転倒・ジャンプを判定する純関数
///
/// 判定順: ジャンプ（鼻の高さ）→ 転倒（肩-腰または腰-足首の高さ差）→ None。
/// 状態は持たず、ポーズごとに必ず1ラベルを返す。
pub fn classify(
    points: &[Vector3<f64>; JOINT_COUNT],
    fall_threshold: f64,
    jump_threshold: f64,
) -> EventKind {
    let y = |j: JointIndex| points[j as usize].y;
    let avg_y = |a: JointIndex, b: JointIndex| (y(a) + y(b)) / 2.0;

    if y(JointIndex::Nose) >= jump_threshold {
        return EventKind::Jump;
    }

    let shoulder_y = avg_y(JointIndex::LeftShoulder, JointIndex::RightShoulder);
    let hip_y = avg_y(JointIndex::LeftHip, JointIndex::RightHip);
    let ankle_y = avg_y(JointIndex::LeftAnkle, JointIndex::RightAnkle);

    if (shoulder_y - hip_y).abs() <= fall_threshold || (hip_y - ankle_y).abs() <= fall_threshold {
        return EventKind::FallDown;
    }

    EventKind::None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 指定関節のYだけ設定したポーズを作る
    fn pose_with_y(entries: &[(JointIndex, f64)]) -> [Vector3<f64>; JOINT_COUNT] {
        let mut points = [Vector3::zeros(); JOINT_COUNT];
        for &(j, y) in entries {
            points[j as usize] = Vector3::new(0.1, y, 0.1);
        }
        points
    }

    #[test]
    fn test_jump_short_circuits() {
        // 鼻が閾値以上なら他の関節に関係なくJump
        let points = pose_with_y(&[
            (JointIndex::Nose, 2.5),
            (JointIndex::LeftShoulder, 1.0),
            (JointIndex::RightShoulder, 1.0),
            (JointIndex::LeftHip, 1.05),
            (JointIndex::RightHip, 1.05),
            (JointIndex::LeftAnkle, 1.0),
            (JointIndex::RightAnkle, 1.0),
        ]);
        assert_eq!(classify(&points, 0.2, 2.0), EventKind::Jump);
    }

    #[test]
    fn test_fall_down_shoulder_hip() {
        let points = pose_with_y(&[
            (JointIndex::Nose, 0.5),
            (JointIndex::LeftShoulder, 1.0),
            (JointIndex::RightShoulder, 1.0),
            (JointIndex::LeftHip, 1.05),
            (JointIndex::RightHip, 1.05),
            (JointIndex::LeftAnkle, 0.1),
            (JointIndex::RightAnkle, 0.1),
        ]);
        assert_eq!(classify(&points, 0.2, 2.0), EventKind::FallDown);
    }

    #[test]
    fn test_fall_down_hip_ankle() {
        let points = pose_with_y(&[
            (JointIndex::Nose, 0.6),
            (JointIndex::LeftShoulder, 1.2),
            (JointIndex::RightShoulder, 1.2),
            (JointIndex::LeftHip, 0.3),
            (JointIndex::RightHip, 0.3),
            (JointIndex::LeftAnkle, 0.15),
            (JointIndex::RightAnkle, 0.15),
        ]);
        assert_eq!(classify(&points, 0.2, 2.0), EventKind::FallDown);
    }

    #[test]
    fn test_none_when_segments_separated() {
        let points = pose_with_y(&[
            (JointIndex::Nose, 1.7),
            (JointIndex::LeftShoulder, 1.5),
            (JointIndex::RightShoulder, 1.5),
            (JointIndex::LeftHip, 1.0),
            (JointIndex::RightHip, 1.0),
            (JointIndex::LeftAnkle, 0.1),
            (JointIndex::RightAnkle, 0.1),
        ]);
        assert_eq!(classify(&points, 0.2, 2.0), EventKind::None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(EventKind::Jump.as_str(), "Jump");
        assert_eq!(EventKind::FallDown.as_str(), "Fall-down");
        assert_eq!(EventKind::None.as_str(), "None");
    }
}
