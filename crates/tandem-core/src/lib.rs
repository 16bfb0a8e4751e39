//! Core types and traits for Tandem.
//!
//! This crate provides the protocol primitives. Applications bring their own
//! game state and presenter; this crate provides addresses, actions and
//! snapshot framing.

mod address;
mod game;
mod message;

pub use address::{Address, AddressParseError};
pub use game::{GameState, Presenter};
pub use message::{ActionKind, ActionMessage, Direction, PlayerInfo, StateSnapshot};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a node plays in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Passive receiver of snapshots.
    #[default]
    Replica,
    /// Hot standby holding a replicated copy of the state.
    Backup,
    /// Authoritative state owner accepting submissions.
    Primary,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replica => f.write_str("replica"),
            Self::Backup => f.write_str("backup"),
            Self::Primary => f.write_str("primary"),
        }
    }
}
