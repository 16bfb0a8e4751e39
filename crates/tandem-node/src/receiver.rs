//! Snapshot intake on non-primary nodes.

use crate::GameNode;
use std::sync::Weak;
use tandem_core::{GameState, StateSnapshot};
use tokio::sync::mpsc;

impl<G: GameState> GameNode<G> {
    pub(crate) async fn run_receiver(
        node: Weak<Self>,
        mut rx: mpsc::UnboundedReceiver<StateSnapshot<G>>,
    ) {
        while let Some(snapshot) = rx.recv().await {
            let Some(node) = node.upgrade() else { break };
            node.apply_snapshot(snapshot).await;
        }
    }

    /// Overwrite the local state with `snapshot` and render it.
    ///
    /// Applying the same snapshot again leaves the state unchanged.
    pub async fn apply_snapshot(&self, snapshot: StateSnapshot<G>) {
        let mut core = self.core.lock().await;
        core.game.overwrite_from(&snapshot.state);
        core.render(&self.presenter_factory);
        tracing::trace!("{} merged a snapshot", self.here);
    }
}
