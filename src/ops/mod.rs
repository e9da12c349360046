//! Per-job state, the job registry, and progress accounting.

pub mod context;
pub mod progress;
pub mod registry;

pub use context::OperationContext;
pub use progress::{ProgressInfo, ProgressTracker};
pub use registry::{OperationHandle, OperationRegistry, Registration};
