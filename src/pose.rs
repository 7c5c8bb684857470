use nalgebra::Vector3;

use crate::event::EventKind;

/// 融合対象の15関節インデックス
///
/// 上流の姿勢推定器は耳などの非融合関節を除外した上で、
/// このインデックス順でキーポイントを送信する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum JointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftShoulder = 3,
    RightShoulder = 4,
    LeftElbow = 5,
    RightElbow = 6,
    LeftWrist = 7,
    RightWrist = 8,
    LeftHip = 9,
    RightHip = 10,
    LeftKnee = 11,
    RightKnee = 12,
    LeftAnkle = 13,
    RightAnkle = 14,
}

impl JointIndex {
    pub const COUNT: usize = 15;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftShoulder),
            4 => Some(Self::RightShoulder),
            5 => Some(Self::LeftElbow),
            6 => Some(Self::RightElbow),
            7 => Some(Self::LeftWrist),
            8 => Some(Self::RightWrist),
            9 => Some(Self::LeftHip),
            10 => Some(Self::RightHip),
            11 => Some(Self::LeftKnee),
            12 => Some(Self::RightKnee),
            13 => Some(Self::LeftAnkle),
            14 => Some(Self::RightAnkle),
            _ => None,
        }
    }
}

pub const JOINT_COUNT: usize = JointIndex::COUNT;

/// 骨格トポロジー（隣接関節ペア）
///
/// 外れ値補正の際、外れ関節を隣接関節の平均位置で置き換えるために使う。
pub const SKELETON_PAIRS: [(usize, usize); 16] = [
    (0, 1),
    (0, 2), // 鼻 - 目
    (1, 3),
    (2, 4), // 目 - 肩
    (3, 4), // 肩 - 肩
    (3, 5),
    (4, 6), // 肩 - 肘
    (5, 7),
    (6, 8), // 肘 - 手首
    (9, 10), // 腰 - 腰
    (3, 9),
    (4, 10), // 肩 - 腰
    (9, 11),
    (10, 12), // 腰 - 膝
    (11, 13),
    (12, 14), // 膝 - 足首
];

/// 指定関節の隣接関節を列挙
pub fn neighbors(joint: usize) -> impl Iterator<Item = usize> {
    SKELETON_PAIRS.iter().filter_map(move |&(a, b)| {
        if a == joint {
            Some(b)
        } else if b == joint {
            Some(a)
        } else {
            None
        }
    })
}

/// 単一の2D観測値（ピクセル座標 + 信頼度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint2 {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Keypoint2 {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    /// (0, 0) は「未観測」センチネル
    pub fn is_observed(&self) -> bool {
        self.x != 0.0 || self.y != 0.0
    }
}

impl Default for Keypoint2 {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 1スロット分の融合結果
///
/// フラッシュごとに生成され、シリアライズ後に破棄される一時値。
/// 未解決の関節はゼロベクトル（実在しない位置を意味するセンチネル）。
#[derive(Debug, Clone)]
pub struct FusedPose {
    pub slot: String,
    pub points: [Vector3<f64>; JOINT_COUNT],
    pub rmse: f64,
    pub capture_time: String,
    pub event: EventKind,
}
