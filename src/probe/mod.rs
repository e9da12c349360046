//! Container and stream inspection.

pub mod inspector;
pub mod media_info;

pub use inspector::{analyze, find_stream, open_input};
pub use media_info::{AudioStreamInfo, MediaFileInfo, VideoStreamInfo};
