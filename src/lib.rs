//! 多視点カメラの2D姿勢推定結果を受信し、三角測量で3Dポーズに融合して
//! 配信するサーバのコアロジック。

pub mod broadcast;
pub mod calibration;
pub mod config;
pub mod evaluate;
pub mod event;
pub mod fusion;
pub mod logger;
pub mod metrics;
pub mod outlier;
pub mod pose;
pub mod protocol;
pub mod sync;
pub mod triangulation;
