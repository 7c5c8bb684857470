//! Minimal subscriber client: connects to the fusion server's broadcast
//! port and prints one summary line per fused pose.
//!
//! Usage: subscribe [server_addr]

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::net::TcpStream;

fn main() -> Result<()> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:12222".to_string());
    let stream = TcpStream::connect(&addr).with_context(|| format!("connect to {}", addr))?;
    eprintln!("subscribed to {}", addr);

    for line in BufReader::new(stream).lines() {
        let line = line.context("connection lost")?;
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("unparseable payload: {}", e);
                continue;
            }
        };
        let nose = &value["3D_points"][0];
        println!(
            "event={} rmse={} capture_time={} nose=({}, {}, {})",
            value["event_name"],
            value["rmse"],
            value["capture_time"],
            nose["x"],
            nose["y"],
            nose["z"]
        );
    }
    Ok(())
}
