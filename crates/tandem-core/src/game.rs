//! Seams to the application: the simulated game and its presentation.

use crate::{ActionKind, PlayerInfo};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Game state hosted by a session.
///
/// The protocol treats it as opaque: it only adds and removes participants,
/// applies movement actions, counts participants and copies whole states
/// between nodes. Participant ids are address keys.
pub trait GameState: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Add a participant. Adding an id that is already present replaces it.
    fn add_participant(&mut self, id: &str, player: PlayerInfo);

    /// Remove a participant. Unknown ids are ignored.
    fn remove_participant(&mut self, id: &str);

    /// Apply a movement or stay action for `actor_id`.
    fn apply(&mut self, actor_id: &str, action: ActionKind);

    /// Number of participants currently in the game.
    fn participant_count(&self) -> usize;

    /// Replace this state with `other`.
    fn overwrite_from(&mut self, other: &Self) {
        *self = other.clone();
    }
}

/// Rendering sink for a node's local view.
pub trait Presenter<S>: Send {
    fn render(&mut self, state: &S);

    fn close(&mut self);
}
