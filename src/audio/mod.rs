//! Audio resampling and encoder frame packing.

pub mod packer;
pub mod resampler;

pub use packer::FramePacker;
pub use resampler::{AudioResampler, AudioTarget};
