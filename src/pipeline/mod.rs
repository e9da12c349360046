//! Job pipelines: the full transcode state machine plus the smaller
//! seek-and-grab pipelines for thumbnails and frame extraction.

pub mod frames;
pub mod still;
pub mod thumbnail;
pub mod transcode;

pub use frames::extract_frames;
pub use thumbnail::generate_thumbnail;
pub use transcode::{run_transcode, MediaSelection};
