//! Probed metadata snapshots. Immutable once built; the caller discards
//! them after use.

use std::collections::HashMap;
use std::path::PathBuf;

/// Per-video-stream characteristics, populated during probing.
#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pixel_format: String,
    pub bit_rate: usize,
    pub duration_seconds: f64,
    /// Container-reported frame count, or `duration × fps` when the
    /// container does not report one.
    pub total_frames: u64,
}

/// Per-audio-stream characteristics, populated during probing.
#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
    pub bit_rate: usize,
    pub duration_seconds: f64,
}

/// Everything `analyze` learns about one file. The representative streams
/// are the *first* video and *first* audio stream in container order.
#[derive(Debug, Clone)]
pub struct MediaFileInfo {
    pub path: PathBuf,
    /// Container short name, e.g. "mov,mp4,m4a,3gp,3g2,mj2".
    pub container: String,
    pub container_long: String,
    pub duration_seconds: f64,
    /// Container-level bit rate in bits per second, 0 when unknown.
    pub bit_rate: i64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
    /// Raw container metadata tags (title, artist, ...).
    pub tags: HashMap<String, String>,
    /// True iff at least one stream has a registered decoder.
    pub is_valid: bool,
}
