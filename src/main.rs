//! 融合サーバ本体
//!
//! カメラ接続は1本ごとにブロッキングスレッドで受信し、同期バッファの
//! フラッシュを契機にそのスレッド上で融合パイプラインを実行する。
//! 配信だけはtokio側の単一ハブタスクに渡す。

use anyhow::{Context, Result};
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use pose_fusion::broadcast;
use pose_fusion::calibration;
use pose_fusion::config::Config;
use pose_fusion::fusion;
use pose_fusion::log;
use pose_fusion::logger::{self, LogFile};
use pose_fusion::metrics::Metrics;
use pose_fusion::pose::FusedPose;
use pose_fusion::protocol;
use pose_fusion::sync::SyncBuffer;
use pose_fusion::triangulation::Triangulator;

const CONFIG_PATH: &str = "fusion_server.toml";

/// 全接続スレッドで共有するサーバ状態
struct ServerCtx {
    config: Config,
    buffer: SyncBuffer,
    triangulator: Triangulator,
    metrics: Arc<Metrics>,
    logfile: LogFile,
    tx: mpsc::Sender<FusedPose>,
}

/// カメラ接続1本の受信ループ
fn serve_camera(ctx: Arc<ServerCtx>, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let mut reader = BufReader::new(stream);

    loop {
        match protocol::read_frame(&mut reader) {
            Ok((msg, wire_len)) => {
                let latency_ms = msg
                    .capture_latency()
                    .and_then(|d| d.num_microseconds())
                    .map(|us| us as f64 / 1000.0);
                ctx.metrics.record_frame(&msg.camera_name, wire_len, latency_ms);

                if ctx.config.verbose && !ctx.triangulator.has_camera(&msg.camera_name) {
                    log!(ctx.logfile, "frame from uncalibrated camera {}", msg.camera_name);
                }
                let snapshot = ctx
                    .buffer
                    .add(&msg.camera_name, &msg.slotted_timestamp, msg.joints());
                if let Some(snapshot) = snapshot {
                    fusion::process_flush(
                        snapshot,
                        &ctx.triangulator,
                        &ctx.config,
                        &ctx.logfile,
                        &ctx.tx,
                    );
                }
            }
            Err(e) if e.is_fatal() => {
                log!(ctx.logfile, "camera {} disconnected: {}", peer, e);
                break;
            }
            Err(e) => {
                log!(ctx.logfile, "camera {} sent a bad frame: {}", peer, e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let logfile = logger::open_log_file("fusion")?;
    log!(logfile, "pose fusion server {} starting", env!("GIT_VERSION"));

    let matrices = calibration::load_all(&config.calibration_dir, &config.cameras, &logfile);
    log!(
        logfile,
        "loaded {} of {} projection matrices from {}",
        matrices.len(),
        config.cameras.len(),
        config.calibration_dir
    );
    if matrices.len() < 2 {
        log!(logfile, "fewer than 2 calibrated cameras, fusion cannot produce points");
    }

    let triangulator = Triangulator::new(
        matrices,
        config.coordinate_space,
        config.image_width,
        config.image_height,
    );

    let subscriber_listener = tokio::net::TcpListener::bind(&config.subscriber_listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.subscriber_listen_addr))?;
    log!(logfile, "subscribers on {}", config.subscriber_listen_addr);

    let metrics = Arc::new(Metrics::new());
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(broadcast::run_hub(
        subscriber_listener,
        rx,
        Arc::clone(&metrics),
        Arc::clone(&logfile),
    ));

    let camera_listener = TcpListener::bind(&config.camera_listen_addr)
        .with_context(|| format!("failed to bind {}", config.camera_listen_addr))?;
    log!(logfile, "cameras on {}", config.camera_listen_addr);

    let ctx = Arc::new(ServerCtx {
        config,
        buffer: SyncBuffer::new(),
        triangulator,
        metrics: Arc::clone(&metrics),
        logfile: Arc::clone(&logfile),
        tx,
    });

    {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            for stream in camera_listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let _ = stream.set_nodelay(true);
                        let ctx = Arc::clone(&ctx);
                        thread::spawn(move || serve_camera(ctx, stream));
                    }
                    Err(e) => {
                        log!(ctx.logfile, "camera accept failed: {}", e);
                    }
                }
            }
        });
    }

    {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let summary = ctx.metrics.summary(ctx.buffer.stale_drops());
                if !summary.is_empty() {
                    log!(ctx.logfile, "{}", summary);
                }
            }
        });
    }

    tokio::signal::ctrl_c().await.context("signal handler failed")?;
    log!(logfile, "shutting down");
    Ok(())
}
