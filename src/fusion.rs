//! フラッシュ後の融合パイプライン
//!
//! 三角測量、外れ値補正、イベント判定、評価、配信キュー投入をこの順で
//! 実行する。投稿カメラが2台未満のスロットは融合せず、配信もしない。
//! インジェストスレッド上でロック外に実行される。

use tokio::sync::mpsc;

use crate::config::Config;
use crate::evaluate::{self, Evaluation};
use crate::event::{self, EventKind};
use crate::log;
use crate::logger::LogFile;
use crate::outlier;
use crate::pose::FusedPose;
use crate::sync::FlushSnapshot;
use crate::triangulation::Triangulator;

/// フラッシュされたスロットを融合して配信キューへ渡す
pub fn process_flush(
    snapshot: FlushSnapshot,
    triangulator: &Triangulator,
    config: &Config,
    logfile: &LogFile,
    tx: &mpsc::Sender<FusedPose>,
) {
    let slot = snapshot.slot.clone();
    if snapshot.camera_count() < 2 {
        if config.verbose {
            log!(
                logfile,
                "slot {}: only {} camera(s), skipping",
                slot,
                snapshot.camera_count()
            );
        }
        return;
    }

    let observations = snapshot.resolve(config.multi_submission);
    let mut points = triangulator.fuse(&observations);

    let repaired = outlier::correct(&mut points, config.outlier_threshold);
    if !repaired.is_empty() {
        log!(logfile, "slot {}: repaired joints {:?}", slot, repaired);
    }

    let detected = event::classify(&points, config.fall_threshold, config.jump_threshold);
    if detected != EventKind::None {
        log!(logfile, "slot {}: event {}", slot, detected);
    }

    let eval = if config.ground_truth_eval {
        match evaluate::evaluate(&config.ground_truth_dir, &slot, &points) {
            Ok(Some(eval)) => {
                if let Some(delay) = eval.e2e_delay_secs {
                    log!(
                        logfile,
                        "slot {}: rmse {:.4}, e2e delay {:.3}s",
                        slot,
                        eval.rmse,
                        delay
                    );
                } else {
                    log!(logfile, "slot {}: rmse {:.4}", slot, eval.rmse);
                }
                eval
            }
            Ok(None) => Evaluation::unknown(),
            Err(e) => {
                log!(logfile, "slot {}: ground truth unreadable: {:#}", slot, e);
                Evaluation::unknown()
            }
        }
    } else {
        Evaluation::unknown()
    };

    let pose = FusedPose {
        slot,
        points,
        rmse: eval.rmse,
        capture_time: eval.capture_time,
        event: detected,
    };

    if config.save_estimates {
        if let Err(e) = evaluate::save_estimate(&config.estimates_dir, &pose) {
            log!(logfile, "slot {}: estimate not saved: {:#}", pose.slot, e);
        }
    }

    if tx.blocking_send(pose).is_err() {
        log!(logfile, "broadcast hub is gone, fused pose discarded");
    }
}
