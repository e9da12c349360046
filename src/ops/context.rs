//! The mutable state of one in-flight job. Exclusively owned by the job's
//! worker thread; the only cross-thread access is the atomic cancellation
//! flag, which the registry shares with callers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::options::ConversionOptions;

pub struct OperationContext {
    pub id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Copied at submission; never shared with the caller's copy.
    pub options: ConversionOptions,
    /// Set by `cancel`/`cancel_all` from any thread; once set it is never
    /// cleared. The transcode loop observes it once per input packet.
    cancel: Arc<AtomicBool>,
}

impl OperationContext {
    pub fn new(
        id: Uuid,
        input: PathBuf,
        output: PathBuf,
        options: ConversionOptions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            input,
            output,
            options,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
