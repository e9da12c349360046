//! Video filter graph construction and frame-by-frame driving.

pub mod graph;

pub use graph::{FilterInput, VideoFilterGraph};
