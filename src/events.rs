//! Job lifecycle event stream. Collaborators subscribe to a crossbeam
//! channel; per job the order is always: started, zero or more progress,
//! then exactly one of completed / failed / cancelled.

use std::path::PathBuf;
use std::sync::Mutex;

use crossbeam::channel;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ops::ProgressInfo;

/// Notifications emitted while jobs run. Not persisted anywhere.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Started {
        id: Uuid,
        input: PathBuf,
    },
    Progress(ProgressInfo),
    Completed {
        id: Uuid,
        output: PathBuf,
    },
    Failed {
        id: Uuid,
        error: EngineError,
        /// Human-readable message: taxonomy member plus the native
        /// library's own detail where available.
        message: String,
    },
    Cancelled {
        id: Uuid,
    },
}

impl EngineEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            EngineEvent::Started { id, .. }
            | EngineEvent::Completed { id, .. }
            | EngineEvent::Failed { id, .. }
            | EngineEvent::Cancelled { id } => *id,
            EngineEvent::Progress(p) => p.id,
        }
    }
}

/// Fan-out bus. Every subscriber gets every event; subscribers that drop
/// their receiver are pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<channel::Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new subscription. Unbounded so a slow consumer never stalls
    /// a transcode loop.
    pub fn subscribe(&self) -> channel::Receiver<EngineEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    pub fn publish(&self, event: EngineEvent) {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: Uuid) -> EngineEvent {
        EngineEvent::Started {
            id,
            input: PathBuf::from("in.mp4"),
        }
    }

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.publish(started(id));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.job_id(), id);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.publish(started(Uuid::new_v4()));
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.publish(started(id));
        bus.publish(EngineEvent::Completed {
            id,
            output: PathBuf::from("out.mp4"),
        });
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Started { .. }));
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Completed { .. }));
    }
}
