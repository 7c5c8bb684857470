//! マハラノビス距離に基づく外れ関節の検出と補修
//!
//! 1ポーズ15点を標本として平均と共分散を取り、距離が閾値を超える関節を
//! 骨格トポロジー上の隣接関節の平均位置で置き換える。置き換えには補正前の
//! 位置のみを使い、1パスで終える。

use nalgebra::{Matrix3, Vector3};

use crate::pose::{neighbors, JOINT_COUNT};

/// 外れ関節を検出して補修し、補修した関節インデックスを返す
///
/// 共分散行列が特異な場合（全点同一など）は何もしない。
pub fn correct(points: &mut [Vector3<f64>; JOINT_COUNT], threshold: f64) -> Vec<usize> {
    let n = JOINT_COUNT as f64;
    let mean: Vector3<f64> = points.iter().copied().sum::<Vector3<f64>>() / n;

    let mut cov = Matrix3::zeros();
    for point in points.iter() {
        let d = point - mean;
        cov += d * d.transpose();
    }
    cov /= n - 1.0;

    let Some(inv) = cov.try_inverse() else {
        return Vec::new();
    };
    if !inv.iter().all(|v| v.is_finite()) {
        return Vec::new();
    }

    let original = *points;
    let mut repaired = Vec::new();
    for (j, point) in points.iter_mut().enumerate() {
        let d = original[j] - mean;
        let dist_sq = (d.transpose() * inv * d)[(0, 0)];
        if dist_sq.sqrt() <= threshold {
            continue;
        }

        let neighbor_points: Vec<Vector3<f64>> =
            neighbors(j).map(|k| original[k]).collect();
        if neighbor_points.is_empty() {
            continue;
        }
        *point = neighbor_points.iter().copied().sum::<Vector3<f64>>()
            / neighbor_points.len() as f64;
        repaired.push(j);
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 直立姿勢の15点
    fn standing_pose() -> [Vector3<f64>; JOINT_COUNT] {
        [
            Vector3::new(0.0, 1.70, 0.05),   // nose
            Vector3::new(-0.04, 1.73, 0.04), // leye
            Vector3::new(0.04, 1.73, 0.04),  // reye
            Vector3::new(-0.20, 1.50, 0.0),  // lsho
            Vector3::new(0.20, 1.50, 0.0),   // rsho
            Vector3::new(-0.25, 1.20, 0.02), // lelb
            Vector3::new(0.25, 1.20, 0.02),  // relb
            Vector3::new(-0.27, 0.95, 0.05), // lwri
            Vector3::new(0.27, 0.95, 0.05),  // rwri
            Vector3::new(-0.15, 1.00, 0.0),  // lhip
            Vector3::new(0.15, 1.00, 0.0),   // rhip
            Vector3::new(-0.15, 0.55, 0.01), // lknee
            Vector3::new(0.15, 0.55, 0.01),  // rknee
            Vector3::new(-0.15, 0.10, -0.07), // lank
            Vector3::new(0.15, 0.10, -0.07),  // rank
        ]
    }

    #[test]
    fn test_displaced_joint_repaired_from_neighbors() {
        let base = standing_pose();
        let mut points = base;
        points[14] = Vector3::new(40.0, -35.0, 30.0);

        let repaired = correct(&mut points, 3.0);
        assert!(repaired.contains(&14), "repaired joints: {:?}", repaired);
        // 右足首の隣接は右膝のみなので、その位置に戻る
        assert_eq!(points[14], base[12]);
    }

    #[test]
    fn test_clean_pose_untouched() {
        let base = standing_pose();
        let mut points = base;
        let repaired = correct(&mut points, 3.0);
        assert!(repaired.is_empty(), "repaired joints: {:?}", repaired);
        assert_eq!(points, base);
    }

    #[test]
    fn test_singular_covariance_is_passthrough() {
        // 全点同一なら共分散は特異。補正せずそのまま返す。
        let mut points = [Vector3::new(1.0, 2.0, 3.0); JOINT_COUNT];
        let repaired = correct(&mut points, 3.0);
        assert!(repaired.is_empty());
        assert_eq!(points, [Vector3::new(1.0, 2.0, 3.0); JOINT_COUNT]);
    }

    #[test]
    fn test_repair_uses_original_positions() {
        // 複数の外れ関節でも、置き換えは補正前の位置だけから計算する
        let base = standing_pose();
        let mut points = base;
        points[13] = Vector3::new(-50.0, 40.0, -30.0);

        let repaired = correct(&mut points, 3.0);
        assert!(repaired.contains(&13));
        // 左足首の隣接は左膝のみ
        assert_eq!(points[13], base[11]);
        // 他の関節は触られない
        assert_eq!(points[0], base[0]);
        assert_eq!(points[12], base[12]);
    }
}
