//! Replication, membership and failover for Tandem sessions.
//!
//! A session is hosted by its participants. The node first in the tracker's
//! list is the primary: it owns the authoritative game state, applies every
//! action in arrival order and pushes the resulting snapshot to the action's
//! sender and to the backup, the second node in the list. Every other node is
//! a replica that forwards its player's actions to the primary.
//!
//! Failure handling is best effort and single-backup:
//! - a submitter that cannot reach the primary promotes the backup;
//! - the primary's heartbeat replaces a backup that stopped answering and
//!   removes every other unreachable member;
//! - a node whose role contradicts the tracker's order stops acting as
//!   primary and reports [`NodeStatus::Diverged`].
//!
//! This is not a consensus protocol. Two nodes can briefly both believe they
//! are primary during failover.

mod config;
mod error;
mod gateway;
mod heartbeat;
mod membership;
mod node;
mod processor;
mod receiver;
mod role;
mod submitter;
mod tracker;

pub use config::{ConfigError, NodeConfig};
pub use error::NodeError;
pub use gateway::{Gateway, LocalGateway, PeerHandle, within};
pub use membership::MembershipView;
pub use node::{GameNode, NodeEnv, NodeStatus};
pub use role::{RoleChange, RoleController};
pub use tracker::{InMemoryTracker, Tracker};

use tandem_core::Presenter;

/// Creates a node's presenter the first time there is something to render.
pub type PresenterFactory<G> = Box<dyn Fn() -> Box<dyn Presenter<G>> + Send + Sync>;
