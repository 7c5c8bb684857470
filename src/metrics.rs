//! 通信量・遅延の集計
//!
//! カメラ別の受信量と配信側の送信量を保持し、定期ログ用のサマリ文字列を
//! 組み立てる。ロックは記録と集計の短時間のみ。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone)]
struct CameraTraffic {
    frames: u64,
    bytes: u64,
    last_latency_ms: Option<f64>,
    last_received: Instant,
}

#[derive(Debug, Clone, Default)]
struct ServerTraffic {
    events: u64,
    bytes: u64,
    last_rmse: f64,
}

/// プロセス全体で共有する集計
pub struct Metrics {
    cameras: Mutex<HashMap<String, CameraTraffic>>,
    server: Mutex<ServerTraffic>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cameras: Mutex::new(HashMap::new()),
            server: Mutex::new(ServerTraffic::default()),
        }
    }

    /// カメラフレーム1件の受信を記録する
    pub fn record_frame(&self, camera: &str, bytes: usize, latency_ms: Option<f64>) {
        let mut cameras = match self.cameras.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = cameras.entry(camera.to_string()).or_insert(CameraTraffic {
            frames: 0,
            bytes: 0,
            last_latency_ms: None,
            last_received: Instant::now(),
        });
        entry.frames += 1;
        entry.bytes += bytes as u64;
        if latency_ms.is_some() {
            entry.last_latency_ms = latency_ms;
        }
        entry.last_received = Instant::now();
    }

    /// 配信1件の送信を記録する
    pub fn record_broadcast(&self, payload_bytes: usize, subscribers: usize, rmse: f64) {
        let mut server = match self.server.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        server.events += 1;
        server.bytes += (payload_bytes * subscribers) as u64;
        server.last_rmse = rmse;
    }

    /// 定期ログ用のサマリ。記録がなければ空文字列。
    pub fn summary(&self, stale_drops: u64) -> String {
        let cameras = match self.cameras.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let server = match self.server.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if cameras.is_empty() && server.events == 0 {
            return String::new();
        }

        let mut names: Vec<&String> = cameras.keys().collect();
        names.sort();

        let mut out = String::from("traffic:");
        for name in names {
            let t = &cameras[name];
            let latency = t
                .last_latency_ms
                .map(|ms| format!("{:.1}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                " {}[{} frames, {} B, latency {}, idle {:.1}s]",
                name,
                t.frames,
                t.bytes,
                latency,
                t.last_received.elapsed().as_secs_f64()
            ));
        }
        out.push_str(&format!(
            " | out[{} events, {} B, last rmse {:.4}] | stale drops {}",
            server.events, server.bytes, server.last_rmse, stale_drops
        ));
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary_is_empty() {
        let metrics = Metrics::new();
        assert!(metrics.summary(0).is_empty());
    }

    #[test]
    fn test_frames_accumulate() {
        let metrics = Metrics::new();
        metrics.record_frame("Camera2", 100, Some(12.5));
        metrics.record_frame("Camera2", 150, None);
        metrics.record_frame("Camera1", 80, Some(8.0));

        let summary = metrics.summary(3);
        // カメラ名昇順で出る
        let c1 = summary.find("Camera1").unwrap();
        let c2 = summary.find("Camera2").unwrap();
        assert!(c1 < c2, "summary: {}", summary);
        assert!(summary.contains("Camera2[2 frames, 250 B"), "summary: {}", summary);
        // None の遅延は直前の値を保持
        assert!(summary.contains("latency 12.5ms"), "summary: {}", summary);
        assert!(summary.contains("stale drops 3"), "summary: {}", summary);
    }

    #[test]
    fn test_broadcast_accounting() {
        let metrics = Metrics::new();
        metrics.record_broadcast(200, 3, 0.05);
        let summary = metrics.summary(0);
        assert!(summary.contains("out[1 events, 600 B"), "summary: {}", summary);
        assert!(summary.contains("last rmse 0.0500"), "summary: {}", summary);
    }
}
