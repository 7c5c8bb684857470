//! 追記専用のファイルロガー
//!
//! 各行を標準エラーへ映しつつ `logs/` 配下のファイルへ書く。ハンドルは
//! 接続スレッドと非同期タスクの双方から共有される。

use std::fs::{self, File};
use std::io::BufWriter;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

pub type LogFile = Arc<Mutex<BufWriter<File>>>;

/// `logs/<prefix>_<timestamp>.log` を作って開く
pub fn open_log_file(prefix: &str) -> Result<LogFile> {
    fs::create_dir_all("logs").context("failed to create logs directory")?;
    let name = format!(
        "logs/{}_{}.log",
        prefix,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let file = File::create(&name).with_context(|| format!("failed to create {}", name))?;
    Ok(from_file(file))
}

/// 任意のファイルをロガーとして包む
pub fn from_file(file: File) -> LogFile {
    Arc::new(Mutex::new(BufWriter::new(file)))
}

#[macro_export]
macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}
