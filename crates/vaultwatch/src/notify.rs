//! Notifier Bridge
//!
//! Interface to the external alerting collaborator. The reconciliation
//! engine calls `notify` synchronously after applying a triggering delta;
//! implementations are fire-and-forget and must never block or fail the
//! caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use ts_rs::TS;
use uuid::Uuid;

use crate::types::{ModuleId, SafeId};

pub const DOOR_OPENED: &str = "Door opened";
pub const LOCK_UNBLOCKED: &str = "Lock unblocked";
pub const LOCK_OPENED: &str = "Lock opened";
pub const MASTER_KEY_TURNED: &str = "Master key turned";
pub const SAFE_FAULTY: &str = "Safe faulty";

/// A raised critical notification.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub module_id: ModuleId,
    /// Absent for module-level conditions (master key).
    pub safe_id: Option<SafeId>,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: &str, module_id: &str, safe_id: Option<SafeId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.to_string(),
            module_id: module_id.to_string(),
            safe_id,
            raised_at: Utc::now(),
        }
    }
}

/// Alerting collaborator seam.
///
/// Called once per delta that newly opens a door, unblocks or opens a
/// lock, turns a master key, or marks a safe faulty.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, module_id: &str, safe_id: Option<SafeId>);
}

/// Notifier that records raised notifications in the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, module_id: &str, safe_id: Option<SafeId>) {
        match safe_id {
            Some(safe) => tracing::warn!(module = %module_id, safe, "{message}"),
            None => tracing::warn!(module = %module_id, "{message}"),
        }
    }
}

/// Notifier that fans notifications out on a broadcast channel, feeding
/// the server layer. Sends are non-blocking; with no subscribers the
/// notification is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, message: &str, module_id: &str, safe_id: Option<SafeId>) {
        let _ = self.tx.send(Notification::new(message, module_id, safe_id));
    }
}

/// Composite notifier delivering to every configured sink in order.
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, message: &str, module_id: &str, safe_id: Option<SafeId>) {
        for sink in &self.sinks {
            sink.notify(message, module_id, safe_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(String, String, Option<SafeId>)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, module_id: &str, safe_id: Option<SafeId>) {
            self.seen
                .lock()
                .push((message.to_string(), module_id.to_string(), safe_id));
        }
    }

    #[tokio::test]
    async fn test_broadcast_notifier_delivers() {
        let notifier = BroadcastNotifier::new(16);
        let mut rx = notifier.subscribe();

        notifier.notify(DOOR_OPENED, "M1", Some(7));

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.message, DOOR_OPENED);
        assert_eq!(notification.module_id, "M1");
        assert_eq!(notification.safe_id, Some(7));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(4);
        // Must not panic or block when nobody listens
        notifier.notify(SAFE_FAULTY, "M2", Some(1));
        notifier.notify(MASTER_KEY_TURNED, "M2", None);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(RecordingNotifier::default());
        let second = Arc::new(RecordingNotifier::default());
        let fanout = FanoutNotifier::new()
            .with(first.clone() as Arc<dyn Notifier>)
            .with(second.clone() as Arc<dyn Notifier>);

        fanout.notify(LOCK_OPENED, "M3", Some(2));

        assert_eq!(first.seen.lock().len(), 1);
        assert_eq!(second.seen.lock().len(), 1);
        assert_eq!(second.seen.lock()[0].0, LOCK_OPENED);
    }
}
