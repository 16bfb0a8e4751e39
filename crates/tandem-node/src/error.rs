//! Node errors.

use tandem_core::Address;

/// Errors surfaced by the replication protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// A peer did not answer: timeout, refused connection, or nothing served
    /// under its key.
    #[error("node {0} is unreachable")]
    Unreachable(Address),
    #[error("tracker is unreachable")]
    TrackerUnreachable,
    /// Local role or membership state contradicts the tracker.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// Neither primary, backup nor the tracker's current primary accepted the
    /// action within the attempt budget.
    #[error("session lost after {attempts} submission attempts")]
    SessionLost { attempts: usize },
    #[error("node is shutting down")]
    ShuttingDown,
}

impl NodeError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}
