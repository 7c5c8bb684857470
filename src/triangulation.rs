//! DLT法による多視点三角測量
//!
//! 各カメラの射影行列と2D観測から、関節ごとに同次連立方程式を立てて
//! SVDの最小特異値に対応する右特異ベクトルを解とする。

use std::collections::HashMap;

use nalgebra::{Dyn, Matrix3x4, OMatrix, RowVector4, Vector3, U4};
use serde::Deserialize;

use crate::pose::{Keypoint2, JOINT_COUNT};

/// 射影行列が前提とする2D座標空間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// ピクセル座標をそのまま使う
    RawPixel,
    /// 正規化デバイス座標 ([-1, 1], Y上向き) に変換して使う
    Ndc,
}

/// 起動時に確定する三角測量コンテキスト
pub struct Triangulator {
    matrices: HashMap<String, Matrix3x4<f64>>,
    space: CoordinateSpace,
    image_width: u32,
    image_height: u32,
}

impl Triangulator {
    pub fn new(
        matrices: HashMap<String, Matrix3x4<f64>>,
        space: CoordinateSpace,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        Self {
            matrices,
            space,
            image_width,
            image_height,
        }
    }

    /// 射影行列を持つカメラ数
    pub fn camera_count(&self) -> usize {
        self.matrices.len()
    }

    pub fn has_camera(&self, name: &str) -> bool {
        self.matrices.contains_key(name)
    }

    /// 設定された座標空間へ観測値を写す
    fn to_space(&self, kp: &Keypoint2) -> (f64, f64) {
        match self.space {
            CoordinateSpace::RawPixel => (kp.x, kp.y),
            CoordinateSpace::Ndc => (
                kp.x * 2.0 / self.image_width as f64 - 1.0,
                1.0 - kp.y * 2.0 / self.image_height as f64,
            ),
        }
    }

    /// 全関節を三角測量する
    ///
    /// 関節ごとに観測ありのカメラを集め、2台未満ならゼロベクトルを置く。
    /// カメラ順は名前の昇順に固定し、結果を決定的にする。
    pub fn fuse(&self, observations: &HashMap<&str, Vec<Keypoint2>>) -> [Vector3<f64>; JOINT_COUNT] {
        let mut entries: Vec<(&str, &Vec<Keypoint2>)> = observations
            .iter()
            .filter(|(name, _)| self.matrices.contains_key(**name))
            .map(|(name, joints)| (*name, joints))
            .collect();
        entries.sort_by_key(|(name, _)| *name);

        let mut points = [Vector3::zeros(); JOINT_COUNT];
        for (j, point) in points.iter_mut().enumerate() {
            let mut rows: Vec<RowVector4<f64>> = Vec::new();
            for &(name, joints) in &entries {
                let Some(kp) = joints.get(j) else { continue };
                if !kp.is_observed() {
                    continue;
                }
                let p = &self.matrices[name];
                let (u, v) = self.to_space(kp);
                rows.push(p.row(2) * u - p.row(0));
                rows.push(p.row(2) * v - p.row(1));
            }
            // 2視点未満では解が定まらない
            if rows.len() < 4 {
                continue;
            }
            *point = triangulate_point(&rows);
        }
        points
    }
}

/// 同次連立方程式 A x = 0 をSVDで解き、非同次化して返す
fn triangulate_point(rows: &[RowVector4<f64>]) -> Vector3<f64> {
    let a = OMatrix::<f64, Dyn, U4>::from_rows(rows);
    let svd = a.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return Vector3::zeros();
    };
    let x = v_t.row(3);
    let w = x[3];
    if w.abs() < 1e-12 {
        return Vector3::zeros();
    }
    Vector3::new(x[0] / w, x[1] / w, x[2] / w)
}
