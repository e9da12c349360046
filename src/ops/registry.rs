//! Mutex-guarded map of live jobs plus the concurrency ceiling. Jobs are
//! addressed by opaque id; the registry hands out shared handles, never
//! references into its own storage, so no job state is reachable after
//! removal. No lock is ever held across a blocking codec call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Poll interval for `wait_for_all`.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// The registry's view of one job: just the id, a label for diagnostics,
/// and the shared cancellation flag. Everything else stays thread-local in
/// the job's `OperationContext`.
pub struct OperationHandle {
    pub id: Uuid,
    pub label: &'static str,
    cancel: Arc<AtomicBool>,
}

impl OperationHandle {
    pub fn new(id: Uuid, label: &'static str) -> Self {
        Self {
            id,
            label,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag shared with the job's `OperationContext`.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

pub struct OperationRegistry {
    operations: Mutex<HashMap<Uuid, Arc<OperationHandle>>>,
    max_concurrent: usize,
}

impl OperationRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Insert a job, enforcing the concurrency ceiling. Rejection is
    /// immediate (`AllocationFailed`), never a block, and happens before
    /// the job allocates any native resource. The returned guard removes
    /// the entry on drop, on every exit path.
    pub fn register(
        self: &Arc<Self>,
        handle: Arc<OperationHandle>,
    ) -> Result<Registration> {
        let mut ops = self.lock();
        if ops.len() >= self.max_concurrent {
            return Err(EngineError::AllocationFailed(format!(
                "operation limit reached ({} active)",
                ops.len()
            )));
        }
        let id = handle.id;
        ops.insert(id, handle);
        drop(ops);
        Ok(Registration {
            registry: Arc::clone(self),
            id,
        })
    }

    /// Set the job's cancellation flag. Returns false for unknown ids.
    /// The job itself observes the flag at its next packet-loop check and
    /// emits the cancellation event; nothing is stopped synchronously.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.lock().get(&id) {
            Some(handle) => {
                tracing::debug!(%id, label = handle.label, "cancellation requested");
                handle.request_cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for handle in self.lock().values() {
            handle.request_cancel();
        }
    }

    pub fn active(&self) -> Vec<Uuid> {
        self.lock().keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Block until every job has deregistered. Used during shutdown after
    /// `cancel_all`; polls at a fixed short interval.
    pub fn wait_for_all(&self) {
        while !self.is_empty() {
            std::thread::sleep(DRAIN_POLL);
        }
    }

    /// Async twin of `wait_for_all` for runtime callers.
    pub async fn wait_for_all_async(&self) {
        while !self.is_empty() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<OperationHandle>>> {
        self.operations.lock().expect("operation registry lock poisoned")
    }

    fn remove(&self, id: Uuid) {
        self.lock().remove(&id);
    }
}

/// RAII registration: the registry entry lives exactly as long as this
/// guard, so cleanup happens on success, error, cancel, and panic alike.
pub struct Registration {
    registry: Arc<OperationRegistry>,
    id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max: usize) -> Arc<OperationRegistry> {
        Arc::new(OperationRegistry::new(max))
    }

    fn handle(label: &'static str) -> Arc<OperationHandle> {
        Arc::new(OperationHandle::new(Uuid::new_v4(), label))
    }

    #[test]
    fn rejects_registration_beyond_capacity() {
        let reg = registry(2);
        let _a = reg.register(handle("convert")).unwrap();
        let _b = reg.register(handle("convert")).unwrap();
        let err = reg.register(handle("convert")).err().unwrap();
        assert!(matches!(err, EngineError::AllocationFailed(_)));
    }

    #[test]
    fn slot_frees_when_guard_drops() {
        let reg = registry(1);
        let first = reg.register(handle("thumbnail")).unwrap();
        assert!(reg.register(handle("thumbnail")).is_err());
        drop(first);
        assert!(reg.register(handle("thumbnail")).is_ok());
    }

    #[test]
    fn cancel_sets_flag_without_removing_entry() {
        let reg = registry(4);
        let h = handle("convert");
        let id = h.id;
        let flag = h.cancel_flag();
        let _guard = reg.register(h).unwrap();

        assert!(reg.cancel(id));
        assert!(flag.load(Ordering::Relaxed));
        assert_eq!(reg.active(), vec![id]);
    }

    #[test]
    fn cancel_unknown_id_is_false() {
        let reg = registry(4);
        assert!(!reg.cancel(Uuid::new_v4()));
    }

    #[test]
    fn cancel_all_reaches_every_job() {
        let reg = registry(4);
        let handles: Vec<_> = (0..3).map(|_| handle("convert")).collect();
        let flags: Vec<_> = handles.iter().map(|h| h.cancel_flag()).collect();
        let _guards: Vec<_> = handles
            .into_iter()
            .map(|h| reg.register(h).unwrap())
            .collect();

        reg.cancel_all();
        assert!(flags.iter().all(|f| f.load(Ordering::Relaxed)));
    }

    #[test]
    fn wait_for_all_returns_once_registry_drains() {
        let reg = registry(2);
        let guard = reg.register(handle("convert")).unwrap();
        let reg2 = Arc::clone(&reg);
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(120));
            drop(guard);
        });
        reg2.wait_for_all();
        assert!(reg2.is_empty());
        t.join().unwrap();
    }
}
