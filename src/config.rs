use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::sync::MultiSubmission;
use crate::triangulation::CoordinateSpace;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// カメラ接続の待ち受けアドレス
    #[serde(default = "default_camera_listen_addr")]
    pub camera_listen_addr: String,
    /// 購読者接続の待ち受けアドレス
    #[serde(default = "default_subscriber_listen_addr")]
    pub subscriber_listen_addr: String,
    /// 構成カメラ名（キャリブレーション読み込み対象）
    #[serde(default = "default_cameras")]
    pub cameras: Vec<String>,
    /// 射影行列ファイルのディレクトリ
    #[serde(default = "default_calibration_dir")]
    pub calibration_dir: String,
    /// 射影行列の座標空間 ("raw_pixel" or "ndc")
    #[serde(default = "default_coordinate_space")]
    pub coordinate_space: CoordinateSpace,
    /// 画像解像度（NDC変換用）
    #[serde(default = "default_image_width")]
    pub image_width: u32,
    #[serde(default = "default_image_height")]
    pub image_height: u32,
    /// 転倒判定閾値（肩・腰・足首の高さ差）
    #[serde(default = "default_fall_threshold")]
    pub fall_threshold: f64,
    /// ジャンプ判定閾値（鼻の高さ）
    #[serde(default = "default_jump_threshold")]
    pub jump_threshold: f64,
    /// 外れ値判定のマハラノビス距離閾値
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    /// グラウンドトゥルース比較の有効化
    #[serde(default)]
    pub ground_truth_eval: bool,
    #[serde(default = "default_ground_truth_dir")]
    pub ground_truth_dir: String,
    /// 推定結果のフラットファイル保存
    #[serde(default)]
    pub save_estimates: bool,
    #[serde(default = "default_estimates_dir")]
    pub estimates_dir: String,
    /// 同一スロット内の同一カメラ複数投稿の扱い ("first" or "average")
    #[serde(default = "default_multi_submission")]
    pub multi_submission: MultiSubmission,
    #[serde(default)]
    pub verbose: bool,
}

fn default_camera_listen_addr() -> String { "0.0.0.0:11111".to_string() }
fn default_subscriber_listen_addr() -> String { "0.0.0.0:12222".to_string() }
fn default_cameras() -> Vec<String> {
    vec![
        "Camera1".to_string(),
        "Camera2".to_string(),
        "Camera3".to_string(),
        "Camera4".to_string(),
    ]
}
fn default_calibration_dir() -> String { "calibration".to_string() }
fn default_coordinate_space() -> CoordinateSpace { CoordinateSpace::Ndc }
fn default_image_width() -> u32 { 1920 }
fn default_image_height() -> u32 { 1080 }
fn default_fall_threshold() -> f64 { 0.2 }
fn default_jump_threshold() -> f64 { 2.0 }
fn default_outlier_threshold() -> f64 { 3.0 }
fn default_ground_truth_dir() -> String { "ground_truth".to_string() }
fn default_estimates_dir() -> String { "estimates".to_string() }
fn default_multi_submission() -> MultiSubmission { MultiSubmission::First }

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_listen_addr: default_camera_listen_addr(),
            subscriber_listen_addr: default_subscriber_listen_addr(),
            cameras: default_cameras(),
            calibration_dir: default_calibration_dir(),
            coordinate_space: default_coordinate_space(),
            image_width: default_image_width(),
            image_height: default_image_height(),
            fall_threshold: default_fall_threshold(),
            jump_threshold: default_jump_threshold(),
            outlier_threshold: default_outlier_threshold(),
            ground_truth_eval: false,
            ground_truth_dir: default_ground_truth_dir(),
            save_estimates: false,
            estimates_dir: default_estimates_dir(),
            multi_submission: default_multi_submission(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルが読めなければデフォルトで起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "config: {} unreadable ({}), using defaults",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.camera_listen_addr, "0.0.0.0:11111");
        assert_eq!(config.subscriber_listen_addr, "0.0.0.0:12222");
        assert_eq!(config.cameras.len(), 4);
        assert_eq!(config.coordinate_space, CoordinateSpace::Ndc);
        assert_eq!(config.fall_threshold, 0.2);
        assert_eq!(config.jump_threshold, 2.0);
        assert_eq!(config.outlier_threshold, 3.0);
        assert!(!config.ground_truth_eval);
        assert!(!config.save_estimates);
        assert_eq!(config.multi_submission, MultiSubmission::First);
    }

    #[test]
    fn test_overrides() {
        let toml_str = r#"
            camera_listen_addr = "127.0.0.1:9000"
            cameras = ["CamA", "CamB"]
            coordinate_space = "raw_pixel"
            multi_submission = "average"
            outlier_threshold = 2.5
            ground_truth_eval = true
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.camera_listen_addr, "127.0.0.1:9000");
        assert_eq!(config.cameras, vec!["CamA", "CamB"]);
        assert_eq!(config.coordinate_space, CoordinateSpace::RawPixel);
        assert_eq!(config.multi_submission, MultiSubmission::Average);
        assert_eq!(config.outlier_threshold, 2.5);
        assert!(config.ground_truth_eval);
    }

    #[test]
    fn test_unknown_coordinate_space_rejected() {
        assert!(toml::from_str::<Config>(r#"coordinate_space = "polar""#).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("definitely/not/a/real/path.toml");
        assert_eq!(config.camera_listen_addr, "0.0.0.0:11111");
    }
}
