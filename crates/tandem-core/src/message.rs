//! Protocol messages.
//!
//! Actions travel from any node to the primary; snapshots travel back from the
//! primary. Snapshots are generic over the application's game state.

use crate::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a movement action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// What a player asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Enter the session.
    Join,
    /// Leave the session.
    Quit,
    /// Move one step.
    Move { direction: Direction },
    /// Do nothing, but still produce a fresh snapshot for the caller.
    Stay,
}

impl ActionKind {
    pub fn up() -> Self {
        Self::Move {
            direction: Direction::Up,
        }
    }

    pub fn down() -> Self {
        Self::Move {
            direction: Direction::Down,
        }
    }

    pub fn left() -> Self {
        Self::Move {
            direction: Direction::Left,
        }
    }

    pub fn right() -> Self {
        Self::Move {
            direction: Direction::Right,
        }
    }

    /// Movement and stay actions; these go straight to `GameState::apply`.
    pub fn is_movement(&self) -> bool {
        matches!(self, Self::Move { .. } | Self::Stay)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join => f.write_str("join"),
            Self::Quit => f.write_str("quit"),
            Self::Move { direction } => write!(f, "move {:?}", direction),
            Self::Stay => f.write_str("stay"),
        }
    }
}

/// An action submitted to the primary on behalf of `sender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub sender: Address,
    pub kind: ActionKind,
}

impl ActionMessage {
    pub fn new(sender: Address, kind: ActionKind) -> Self {
        Self { sender, kind }
    }
}

impl fmt::Display for ActionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.kind, self.sender)
    }
}

/// Full copy of the primary's state after applying an action.
///
/// Receivers overwrite their own state with it; there is no patching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot<S> {
    pub state: S,
}

impl<S> StateSnapshot<S> {
    pub fn new(state: S) -> Self {
        Self { state }
    }
}

/// The player record a node hands to the primary when it joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub address: Address,
}

impl PlayerInfo {
    /// Player record for the node at `address`, named after its user name.
    pub fn for_address(address: Address) -> Self {
        Self {
            name: address.user_name().to_string(),
            address,
        }
    }

    /// Participant id inside the game state.
    pub fn id(&self) -> &str {
        self.address.key()
    }
}
