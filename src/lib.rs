//! FFmpeg-backed media engine: probing, transcoding, thumbnailing, frame
//! extraction, and filter chains, run as concurrent cancellable jobs with
//! progress events.
//!
//! The entry point is [`MediaEngine`]; everything underneath is organized
//! so that unsafe libav access stays inside the module that owns the
//! corresponding native handle.

use std::sync::OnceLock;

pub mod audio;
pub mod capabilities;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod hwaccel;
pub mod ops;
pub mod options;
pub mod pipeline;
pub mod probe;

pub use engine::{EngineConfig, MediaEngine};
pub use error::{EngineError, Result};
pub use events::EngineEvent;
pub use hwaccel::HwAccel;
pub use ops::ProgressInfo;
pub use options::ConversionOptions;
pub use probe::{AudioStreamInfo, MediaFileInfo, VideoStreamInfo};

static FFMPEG_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();


/// Process-wide libav initialization, performed at most once. Every path
/// that touches a native handle goes through here first.
pub(crate) fn ffmpeg_init() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| ffmpeg_next::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(EngineError::InitializationFailed)
}
