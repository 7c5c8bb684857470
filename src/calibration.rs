//! カメラ射影行列ファイルの読み込み
//!
//! `<dir>/<camera>_pmatrix.txt` に3行4列のカンマ区切りテキストとして
//! 置かれた射影行列を起動時に読む。欠損・破損は警告して該当カメラを
//! 除外するのみで、起動は止めない。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nalgebra::Matrix3x4;

use crate::log;
use crate::logger::LogFile;

/// カメラ名から行列ファイルパスを組み立てる
pub fn matrix_path<P: AsRef<Path>>(dir: P, camera: &str) -> PathBuf {
    dir.as_ref().join(format!("{}_pmatrix.txt", camera))
}

/// 1ファイルから射影行列を読む
pub fn load_projection<P: AsRef<Path>>(path: P) -> Result<Matrix3x4<f64>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
    parse_projection(&content)
}

/// 3行 x 4列のカンマ区切りテキストをパースする
pub fn parse_projection(content: &str) -> Result<Matrix3x4<f64>> {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() != 3 {
        bail!("expected 3 matrix rows, found {}", lines.len());
    }

    let mut m = Matrix3x4::zeros();
    for (r, line) in lines.iter().enumerate() {
        let values: Vec<f64> = line
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("invalid number in row {}: {:?}", r, line))?;
        if values.len() != 4 {
            bail!("expected 4 values in row {}, found {}", r, values.len());
        }
        for (c, &value) in values.iter().enumerate() {
            m[(r, c)] = value;
        }
    }
    Ok(m)
}

/// 構成カメラ全員分の行列を読む。読めないカメラは警告して除外する。
pub fn load_all<P: AsRef<Path>>(
    dir: P,
    cameras: &[String],
    logfile: &LogFile,
) -> HashMap<String, Matrix3x4<f64>> {
    let mut matrices = HashMap::new();
    for camera in cameras {
        let path = matrix_path(dir.as_ref(), camera);
        match load_projection(&path) {
            Ok(m) => {
                matrices.insert(camera.clone(), m);
            }
            Err(e) => {
                log!(logfile, "calibration: excluding {}: {:#}", camera, e);
            }
        }
    }
    matrices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_projection() {
        let text = "1.0, 2.0, 3.0, 4.0\n5.0, 6.0, 7.0, 8.0\n9.5, 10.0, 11.0, 12.0\n";
        let m = parse_projection(text).unwrap();
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 2)], 7.0);
        assert_eq!(m[(2, 0)], 9.5);
        assert_eq!(m[(2, 3)], 12.0);
    }

    #[test]
    fn test_parse_projection_skips_blank_lines() {
        let text = "\n1, 0, 0, 0\n\n0, 1, 0, 0\n0, 0, 1, 0\n\n";
        assert!(parse_projection(text).is_ok());
    }

    #[test]
    fn test_parse_projection_wrong_row_count() {
        assert!(parse_projection("1, 2, 3, 4\n5, 6, 7, 8\n").is_err());
    }

    #[test]
    fn test_parse_projection_wrong_column_count() {
        let text = "1, 2, 3\n4, 5, 6\n7, 8, 9\n";
        assert!(parse_projection(text).is_err());
    }

    #[test]
    fn test_parse_projection_bad_number() {
        let text = "1, 2, 3, x\n5, 6, 7, 8\n9, 10, 11, 12\n";
        assert!(parse_projection(text).is_err());
    }

    #[test]
    fn test_matrix_path_layout() {
        let path = matrix_path("calibration", "Camera3");
        assert_eq!(path, PathBuf::from("calibration/Camera3_pmatrix.txt"));
    }

    #[test]
    fn test_load_all_excludes_and_logs_missing() {
        let dir = std::env::temp_dir().join("pose_fusion_calib_test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            matrix_path(&dir, "CamA"),
            "1, 0, 0, 0\n0, 1, 0, 0\n0, 0, 1, 0\n",
        )
        .unwrap();
        let log_path = dir.join("calib_test.log");
        let logfile = crate::logger::from_file(std::fs::File::create(&log_path).unwrap());

        let cameras = vec!["CamA".to_string(), "CamMissing".to_string()];
        let matrices = load_all(&dir, &cameras, &logfile);
        assert_eq!(matrices.len(), 1);
        assert!(matrices.contains_key("CamA"));

        // 除外はログファイルにも残る
        let log = fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("excluding CamMissing"), "log: {}", log);
    }
}
