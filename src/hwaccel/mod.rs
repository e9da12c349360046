//! Hardware accelerator detection.

pub mod registry;

pub use registry::{detect, is_available, HwAccel};
