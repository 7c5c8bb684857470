//! Synthetic camera producer for exercising the fusion server without
//! real pose estimators. Streams a gently swaying skeleton in pixel
//! coordinates at a fixed rate.
//!
//! Usage: camera_sim <camera_name> [server_addr] [fps]

use anyhow::{Context, Result};
use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use pose_fusion::pose::JOINT_COUNT;
use pose_fusion::protocol::{encode_frame, CameraMessage, TIMESTAMP_FORMAT};

/// Standing skeleton in pixel coordinates, roughly centered in a 1920x1080 frame.
const BASE_2D: [(f64, f64); JOINT_COUNT] = [
    (960.0, 260.0), // nose
    (944.0, 248.0),
    (976.0, 248.0), // eyes
    (880.0, 340.0),
    (1040.0, 340.0), // shoulders
    (860.0, 460.0),
    (1060.0, 460.0), // elbows
    (852.0, 560.0),
    (1068.0, 560.0), // wrists
    (900.0, 540.0),
    (1020.0, 540.0), // hips
    (900.0, 720.0),
    (1020.0, 720.0), // knees
    (900.0, 900.0),
    (1020.0, 900.0), // ankles
];

fn slot_key(now: chrono::DateTime<chrono::Local>) -> String {
    // Second-level slot plus a 100ms digit, lexicographic order matches time order
    format!(
        "{}.{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        now.timestamp_subsec_millis() / 100
    )
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let camera_name = args.next().context("usage: camera_sim <camera_name> [server_addr] [fps]")?;
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:11111".to_string());
    let fps: f64 = args.next().map(|v| v.parse()).transpose()?.unwrap_or(10.0);

    let mut stream = TcpStream::connect(&addr).with_context(|| format!("connect to {}", addr))?;
    stream.set_nodelay(true)?;
    eprintln!("{} streaming to {} at {} fps", camera_name, addr, fps);

    let mut phase: f64 = 0.0;
    loop {
        let now = chrono::Local::now();
        let mut keypoints = Vec::with_capacity(3 * JOINT_COUNT);
        for &(x, y) in &BASE_2D {
            keypoints.push(x + 30.0 * phase.sin());
            keypoints.push(y + 10.0 * (phase * 0.7).cos());
            keypoints.push(0.9);
        }

        let msg = CameraMessage {
            camera_name: camera_name.clone(),
            exact_timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            slotted_timestamp: slot_key(now),
            keypoints,
        };
        let frame = encode_frame(&msg)?;
        stream.write_all(&frame).context("server closed the connection")?;

        phase += 0.1;
        thread::sleep(Duration::from_secs_f64(1.0 / fps));
    }
}
