//! グラウンドトゥルース比較と推定結果のファイル保存
//!
//! スロットキーと同名のグラウンドトゥルースファイルが存在すれば、
//! 推定ポーズとのRMSEと端末間遅延を計算する。推定結果は同じ形式の
//! フラットファイルとして保存できる。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nalgebra::Vector3;

use crate::pose::{FusedPose, JOINT_COUNT};
use crate::protocol::TIMESTAMP_FORMAT;

/// キャプチャ時刻が取得できなかったときのプレースホルダ
pub const UNKNOWN_CAPTURE_TIME: &str = "unknown";

/// 1スロット分の評価結果
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rmse: f64,
    pub capture_time: String,
    /// キャプチャからフラッシュまでの遅延（秒）。時刻が解釈できなければ None。
    pub e2e_delay_secs: Option<f64>,
}

impl Evaluation {
    /// グラウンドトゥルースなしのデフォルト評価
    pub fn unknown() -> Self {
        Self {
            rmse: 0.0,
            capture_time: UNKNOWN_CAPTURE_TIME.to_string(),
            e2e_delay_secs: None,
        }
    }
}

pub fn ground_truth_path<P: AsRef<Path>>(dir: P, slot: &str) -> PathBuf {
    dir.as_ref().join(format!("pos3d_gt_{}.txt", slot))
}

pub fn estimate_path<P: AsRef<Path>>(dir: P, slot: &str) -> PathBuf {
    dir.as_ref().join(format!("pos3d_est_{}.txt", slot))
}

/// グラウンドトゥルースファイルを読む
///
/// 15行の "x, y, z" と最終行のキャプチャ時刻からなる。
pub fn load_ground_truth<P: AsRef<Path>>(
    path: P,
) -> Result<([Vector3<f64>; JOINT_COUNT], String)> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() != JOINT_COUNT + 1 {
        bail!(
            "expected {} lines ({} joints + capture time), found {}",
            JOINT_COUNT + 1,
            JOINT_COUNT,
            lines.len()
        );
    }

    let mut points = [Vector3::zeros(); JOINT_COUNT];
    for (j, line) in lines[..JOINT_COUNT].iter().enumerate() {
        let values: Vec<f64> = line
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("invalid coordinate in line {}: {:?}", j, line))?;
        if values.len() != 3 {
            bail!("expected 3 coordinates in line {}, found {}", j, values.len());
        }
        points[j] = Vector3::new(values[0], values[1], values[2]);
    }
    Ok((points, lines[JOINT_COUNT].trim().to_string()))
}

/// 該当スロットのグラウンドトゥルースがあれば評価する
///
/// ファイルがなければ Ok(None)。読めるのに形式が壊れている場合は Err。
pub fn evaluate<P: AsRef<Path>>(
    dir: P,
    slot: &str,
    points: &[Vector3<f64>; JOINT_COUNT],
) -> Result<Option<Evaluation>> {
    let path = ground_truth_path(dir, slot);
    if !path.exists() {
        return Ok(None);
    }
    let (truth, capture_time) = load_ground_truth(&path)?;

    let sum_sq: f64 = points
        .iter()
        .zip(truth.iter())
        .map(|(p, t)| (p - t).norm_squared())
        .sum();
    let rmse = (sum_sq / (JOINT_COUNT * 3) as f64).sqrt();

    let e2e_delay_secs = chrono::NaiveDateTime::parse_from_str(&capture_time, TIMESTAMP_FORMAT)
        .ok()
        .and_then(|t| t.and_local_timezone(chrono::Local).single())
        .map(|t| (chrono::Local::now() - t).num_microseconds().unwrap_or(0) as f64 / 1e6);

    Ok(Some(Evaluation {
        rmse,
        capture_time,
        e2e_delay_secs,
    }))
}

/// 推定結果をグラウンドトゥルースと同形式 + RMSE/イベント行で保存する
pub fn save_estimate<P: AsRef<Path>>(dir: P, pose: &FusedPose) -> Result<()> {
    fs::create_dir_all(dir.as_ref())
        .with_context(|| format!("failed to create {}", dir.as_ref().display()))?;

    let mut out = String::new();
    for point in &pose.points {
        out.push_str(&format!("{:.6}, {:.6}, {:.6}\n", point.x, point.y, point.z));
    }
    out.push_str(&format!("{}\n", pose.capture_time));
    out.push_str(&format!("{:.6}\n", pose.rmse));
    out.push_str(&format!("{}\n", pose.event.as_str()));

    let path = estimate_path(dir, &pose.slot);
    fs::write(&path, out).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
