use crate::classifier::{ServiceStatus, classify};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Owned holder of the last observed [`ServiceStatus`].
///
/// `observe` is the only way to change the value. Clones share the same state, and
/// writes are serialised by the underlying watch channel.
#[derive(Debug, Clone)]
pub struct StatusCell {
    tx: Arc<watch::Sender<ServiceStatus>>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ServiceStatus::Unknown);
        Self { tx: Arc::new(tx) }
    }

    /// Classify `line` against the current value and store the outcome.
    ///
    /// Returns the new status only when it differs from the previous one.
    pub fn observe(&self, line: &str) -> Option<ServiceStatus> {
        let mut changed_to = None;
        self.tx.send_if_modified(|status| {
            let next = classify(line, *status);
            if next == *status {
                return false;
            }
            debug!(from = %status, to = %next, "Service status changed");
            *status = next;
            changed_to = Some(next);
            true
        });
        changed_to
    }

    pub fn current(&self) -> ServiceStatus {
        *self.tx.borrow()
    }

    /// Receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unknown() {
        assert_eq!(StatusCell::new().current(), ServiceStatus::Unknown);
    }

    #[test]
    fn test_observe_reports_changes_only() {
        let cell = StatusCell::new();
        assert_eq!(cell.observe("Status: running, pid=1234"), Some(ServiceStatus::Running));
        assert_eq!(cell.observe("listening on 127.0.0.1:18789"), None);
        assert_eq!(cell.observe("running, pid=1234"), None);
        assert_eq!(cell.current(), ServiceStatus::Running);
        assert_eq!(cell.observe("Service stopped."), Some(ServiceStatus::Stopped));
    }

    #[test]
    fn test_clones_share_state() {
        let cell = StatusCell::new();
        let other = cell.clone();
        other.observe("Gateway service missing");
        assert_eq!(cell.current(), ServiceStatus::Missing);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let cell = StatusCell::new();
        let mut rx = cell.subscribe();

        cell.observe("unrelated");
        assert!(!rx.has_changed().unwrap());

        cell.observe("Service stopped.");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ServiceStatus::Stopped);
    }
}
