//! Camera wire protocol: 4-byte big-endian length prefix + UTF-8 JSON body.
//!
//! Each upstream pose-estimation producer opens one TCP connection and
//! streams frames of this shape. A short read is connection-fatal (the
//! producer must redial); a body that fails JSON decoding is not, and the
//! reader resumes at the next length prefix.

use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::{Keypoint2, JOINT_COUNT};

/// Exact-timestamp format, e.g. `2024-11-02_13-45-12.123456`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.6f";

/// Upper bound on a frame body; anything larger is a corrupt length prefix.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Truncated frame or corrupt length prefix. Connection-fatal.
    #[error("protocol error: {0}")]
    Protocol(#[from] std::io::Error),
    /// Malformed JSON body. The connection stays open.
    #[error("frame decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Well-formed JSON with the wrong keypoint count. The connection stays open.
    #[error("keypoint array has {got} floats, expected {want}", want = 3 * JOINT_COUNT)]
    KeypointCount { got: usize },
}

impl FrameError {
    /// Whether the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Protocol(_))
    }
}

/// One decoded camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMessage {
    pub camera_name: String,
    /// Capture instant at the origin device, used only for latency accounting.
    pub exact_timestamp: String,
    /// Coarsened time-bucket key; compared as an ordering key across cameras.
    pub slotted_timestamp: String,
    /// Flat `x, y, confidence` triples, one per fused joint.
    pub keypoints: Vec<f64>,
}

impl CameraMessage {
    /// Group the flat float array into per-joint observations.
    pub fn joints(&self) -> Vec<Keypoint2> {
        self.keypoints
            .chunks_exact(3)
            .map(|c| Keypoint2::new(c[0], c[1], c[2]))
            .collect()
    }

    /// End-to-end latency from the capture instant, if the timestamp parses.
    pub fn capture_latency(&self) -> Option<chrono::Duration> {
        let t = chrono::NaiveDateTime::parse_from_str(&self.exact_timestamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_local_timezone(chrono::Local)
            .single()?;
        Some(chrono::Local::now() - t)
    }
}

/// Read one length-prefixed frame. Blocks until a full frame arrives.
///
/// Returns the decoded message and its total wire length (prefix + body).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<(CameraMessage, usize), FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Protocol(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {} exceeds {} byte cap", len, MAX_FRAME_LEN),
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let msg: CameraMessage = serde_json::from_slice(&body)?;
    if msg.keypoints.len() != 3 * JOINT_COUNT {
        return Err(FrameError::KeypointCount {
            got: msg.keypoints.len(),
        });
    }
    Ok((msg, 4 + len))
}

/// Encode one frame (producer side and tests).
pub fn encode_frame(msg: &CameraMessage) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(msg)?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}
