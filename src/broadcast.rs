//! 購読者への融合結果配信
//!
//! 購読者は素のTCPで接続し、改行区切りのJSONを受信するだけの片方向
//! プロトコル。ハブは単一のtokioタスクで接続受付と融合結果の受信を
//! select で多重化する。実際のソケット書き込みは購読者ごとの専用
//! タスクと有限キューに任せ、読まない・遅いピアはキュー満杯の時点で
//! 切り離す。ハブ本体がピア1つに塞がれることはない。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::log;
use crate::logger::LogFile;
use crate::metrics::Metrics;
use crate::pose::FusedPose;

/// 購読者1人あたりの書き込み待ち上限。超えたら停止ピアとみなす。
const SUBSCRIBER_QUEUE: usize = 32;

#[derive(Debug, Serialize)]
struct PointJson {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Serialize)]
struct PayloadJson<'a> {
    #[serde(rename = "3D_points")]
    points: Vec<PointJson>,
    rmse: f64,
    capture_time: &'a str,
    event_name: &'a str,
}

/// 座標は3桁で丸めて配信する
fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// 1スロット分の配信ペイロード（改行終端）を組み立てる
pub fn build_payload(pose: &FusedPose) -> Result<String> {
    let payload = PayloadJson {
        points: pose
            .points
            .iter()
            .map(|p| PointJson {
                x: round3(p.x),
                y: round3(p.y),
                z: round3(p.z),
            })
            .collect(),
        rmse: pose.rmse,
        capture_time: &pose.capture_time,
        event_name: pose.event.as_str(),
    };
    let mut line = serde_json::to_string(&payload)?;
    line.push('\n');
    Ok(line)
}

/// 1購読者分のハンドル。書き込みは専用タスクが行う。
struct Subscriber {
    addr: SocketAddr,
    queue: mpsc::Sender<String>,
}

impl Subscriber {
    /// 接続ごとの書き込みタスクを起動する
    ///
    /// キューのSenderが落ちるか書き込みが失敗した時点でタスクは終わり、
    /// ソケットも閉じる。
    fn spawn(mut stream: TcpStream, addr: SocketAddr) -> Self {
        let (queue, mut rx) = mpsc::channel::<String>(SUBSCRIBER_QUEUE);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if stream.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        Self { addr, queue }
    }
}

/// 1ペイロードを全購読者のキューへ渡す
///
/// キューが満杯（停止ピア）か閉じている（切断済み）購読者はここで外す。
/// 1購読者の状態が他への配信を妨げることはない。
fn fan_out(subscribers: &mut Vec<Subscriber>, line: &str, logfile: &LogFile) {
    subscribers.retain(|sub| match sub.queue.try_send(line.to_string()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            log!(logfile, "dropping stalled subscriber {}", sub.addr);
            false
        }
        Err(TrySendError::Closed(_)) => {
            log!(logfile, "dropping subscriber {}: connection closed", sub.addr);
            false
        }
    });
}

/// 配信ハブ本体。融合結果チャネルが閉じるまで走り続ける。
pub async fn run_hub(
    listener: TcpListener,
    mut rx: mpsc::Receiver<FusedPose>,
    metrics: Arc<Metrics>,
    logfile: LogFile,
) {
    let mut subscribers: Vec<Subscriber> = Vec::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        log!(logfile, "subscriber connected: {}", addr);
                        subscribers.push(Subscriber::spawn(stream, addr));
                    }
                    Err(e) => {
                        log!(logfile, "subscriber accept failed: {}", e);
                    }
                }
            }
            pose = rx.recv() => {
                let Some(pose) = pose else { break };
                let line = match build_payload(&pose) {
                    Ok(line) => line,
                    Err(e) => {
                        log!(logfile, "payload serialization failed: {}", e);
                        continue;
                    }
                };
                fan_out(&mut subscribers, &line, &logfile);
                metrics.record_broadcast(line.len(), subscribers.len(), pose.rmse);
            }
        }
    }
}
