//! The membership directory consumed by every node.

use crate::NodeError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tandem_core::Address;

/// External membership directory.
///
/// The tracker's list order is authoritative: index 0 is the primary and
/// index 1 the backup.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Append `address` unless it is already listed.
    async fn register(&self, address: Address) -> Result<(), NodeError>;

    async fn list_nodes(&self) -> Result<Vec<Address>, NodeError>;

    /// Replace the whole list.
    async fn update_list(&self, nodes: Vec<Address>) -> Result<(), NodeError>;
}

/// Tracker kept in process memory.
///
/// It can be switched offline to exercise the degraded paths.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    nodes: Mutex<Vec<Address>>,
    offline: AtomicBool,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Current list, regardless of the online switch.
    pub fn snapshot(&self) -> Vec<Address> {
        self.nodes
            .lock()
            .map(|nodes| nodes.clone())
            .unwrap_or_default()
    }

    fn with_nodes<T>(&self, f: impl FnOnce(&mut Vec<Address>) -> T) -> Result<T, NodeError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NodeError::TrackerUnreachable);
        }
        let mut nodes = self
            .nodes
            .lock()
            .map_err(|_| NodeError::TrackerUnreachable)?;
        Ok(f(&mut nodes))
    }
}

#[async_trait]
impl Tracker for InMemoryTracker {
    async fn register(&self, address: Address) -> Result<(), NodeError> {
        self.with_nodes(|nodes| {
            if !nodes.contains(&address) {
                nodes.push(address);
            }
        })
    }

    async fn list_nodes(&self) -> Result<Vec<Address>, NodeError> {
        self.with_nodes(|nodes| nodes.clone())
    }

    async fn update_list(&self, list: Vec<Address>) -> Result<(), NodeError> {
        self.with_nodes(|nodes| *nodes = list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_idempotent() {
        let tracker = InMemoryTracker::new();
        tracker.register(Address::local(1, "a")).await.unwrap();
        tracker.register(Address::local(2, "b")).await.unwrap();
        tracker.register(Address::local(1, "a")).await.unwrap();
        let nodes = tracker.list_nodes().await.unwrap();
        assert_eq!(nodes, vec![Address::local(1, "a"), Address::local(2, "b")]);
    }

    #[tokio::test]
    async fn offline_tracker_fails_every_call() {
        let tracker = InMemoryTracker::new();
        tracker.set_online(false);
        assert_eq!(
            tracker.list_nodes().await,
            Err(NodeError::TrackerUnreachable)
        );
        assert!(tracker.register(Address::local(1, "a")).await.is_err());
        tracker.set_online(true);
        assert!(tracker.list_nodes().await.unwrap().is_empty());
    }
}
