//! タイムスタンプスロット単位の同期バッファ
//!
//! 各カメラのインジェストスレッドから投稿を受け、スロットキーが進んだ
//! 時点でウィンドウを切り離してスナップショットとして返す。処理本体は
//! ロック外で行う。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Deserialize;

use crate::pose::{Keypoint2, JOINT_COUNT};

/// 同一スロット・同一カメラへの複数投稿の解決方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiSubmission {
    /// 最初の投稿のみ採用
    First,
    /// 観測された投稿の関節ごとの平均
    Average,
}

/// 1スロット分の収集状態
struct Window {
    slot: String,
    cameras: HashMap<String, Vec<Vec<Keypoint2>>>,
}

/// フラッシュ時にロック外へ持ち出すスナップショット
pub struct FlushSnapshot {
    pub slot: String,
    cameras: HashMap<String, Vec<Vec<Keypoint2>>>,
}

impl FlushSnapshot {
    /// 投稿したカメラの数
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// 複数投稿をポリシーに従って1カメラ1観測に解決する
    pub fn resolve(&self, policy: MultiSubmission) -> HashMap<&str, Vec<Keypoint2>> {
        let mut resolved = HashMap::with_capacity(self.cameras.len());
        for (camera, submissions) in &self.cameras {
            let joints = match policy {
                MultiSubmission::First => submissions[0].clone(),
                MultiSubmission::Average => average_submissions(submissions),
            };
            resolved.insert(camera.as_str(), joints);
        }
        resolved
    }
}

/// 関節ごとに、観測あり投稿の平均を取る。全投稿未観測なら未観測のまま。
fn average_submissions(submissions: &[Vec<Keypoint2>]) -> Vec<Keypoint2> {
    let mut out = vec![Keypoint2::default(); JOINT_COUNT];
    for (j, slot) in out.iter_mut().enumerate() {
        let observed: Vec<&Keypoint2> = submissions
            .iter()
            .filter_map(|s| s.get(j))
            .filter(|k| k.is_observed())
            .collect();
        if observed.is_empty() {
            continue;
        }
        let n = observed.len() as f64;
        *slot = Keypoint2::new(
            observed.iter().map(|k| k.x).sum::<f64>() / n,
            observed.iter().map(|k| k.y).sum::<f64>() / n,
            observed.iter().map(|k| k.confidence).sum::<f64>() / n,
        );
    }
    out
}

/// スロットキーで同期する収集バッファ
///
/// スロットキーは文字列比較で順序付ける（タイムスタンプ形式が辞書順と
/// 時刻順で一致するため）。現スロットより古いキーの投稿は破棄して数える。
pub struct SyncBuffer {
    window: Mutex<Option<Window>>,
    stale_drops: AtomicU64,
}

impl SyncBuffer {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(None),
            stale_drops: AtomicU64::new(0),
        }
    }

    /// 1投稿を取り込み、スロットが進んだ場合は旧ウィンドウを返す
    pub fn add(&self, camera: &str, slot: &str, keypoints: Vec<Keypoint2>) -> Option<FlushSnapshot> {
        let mut guard = match self.window.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_mut() {
            None => {
                *guard = Some(Window {
                    slot: slot.to_string(),
                    cameras: HashMap::from([(camera.to_string(), vec![keypoints])]),
                });
                None
            }
            Some(window) if slot == window.slot => {
                window
                    .cameras
                    .entry(camera.to_string())
                    .or_default()
                    .push(keypoints);
                None
            }
            Some(window) if slot.as_bytes() < window.slot.as_bytes() => {
                // 既に進んだスロットへの遅延到着。黙殺せず数える。
                self.stale_drops.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(_) => {
                let old = guard.take();
                *guard = Some(Window {
                    slot: slot.to_string(),
                    cameras: HashMap::from([(camera.to_string(), vec![keypoints])]),
                });
                old.map(|w| FlushSnapshot {
                    slot: w.slot,
                    cameras: w.cameras,
                })
            }
        }
    }

    pub fn stale_drops(&self) -> u64 {
        self.stale_drops.load(Ordering::Relaxed)
    }
}

impl Default for SyncBuffer {
    fn default() -> Self {
        Self::new()
    }
}
