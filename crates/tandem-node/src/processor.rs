//! Inbound action processing on the primary.
//!
//! Actions are applied one at a time in arrival order. After each mutation the
//! new state goes back to the sender and to the backup, and the primary
//! renders its own copy.

use crate::{GameNode, NodeError, PeerHandle};
use std::sync::Weak;
use tandem_core::{ActionKind, ActionMessage, Address, GameState, StateSnapshot};
use tokio::sync::mpsc;

impl<G: GameState> GameNode<G> {
    pub(crate) async fn run_processor(node: Weak<Self>, mut rx: mpsc::Receiver<ActionMessage>) {
        while let Some(message) = rx.recv().await {
            let Some(node) = node.upgrade() else { break };
            if let Err(e) = node.process_action(message).await {
                tracing::error!("{} failed to process an action: {}", node.here, e);
            }
        }
    }

    /// Apply one action and replicate the result.
    ///
    /// A sender that cannot be resolved is removed and its action dropped.
    pub async fn process_action(&self, message: ActionMessage) -> Result<(), NodeError> {
        tracing::debug!("{} processing {}", self.here, message);
        let sender = &message.sender;

        let peer = match self.gateway.resolve(sender).await {
            Ok(peer) => peer,
            Err(e) => {
                tracing::warn!("Dropping {}: {}", message, e);
                self.remove_node(sender).await;
                return Ok(());
            }
        };

        match message.kind {
            ActionKind::Join => {
                if !self.admit(sender, peer.as_ref()).await? {
                    return Ok(());
                }
            }
            ActionKind::Quit => {
                tracing::info!("{} left the session", sender);
                self.remove_node(sender).await;
                return Ok(());
            }
            kind => {
                self.core.lock().await.game.apply(sender.key(), kind);
            }
        }

        self.publish(sender, peer.as_ref()).await;
        Ok(())
    }

    /// Add a joining node. Returns `false` if it vanished while joining.
    async fn admit(&self, sender: &Address, peer: &dyn PeerHandle<G>) -> Result<bool, NodeError> {
        let player = match peer.identity().await {
            Ok(player) => player,
            Err(e) => {
                tracing::warn!("{} vanished while joining: {}", sender, e);
                self.remove_node(sender).await;
                return Ok(false);
            }
        };

        let (second, members) = {
            let _membership = self.membership_lock.lock().await;
            self.core
                .lock()
                .await
                .game
                .add_participant(sender.key(), player);

            let synced = match self.tracker.register(sender.clone()).await {
                Ok(()) => self.sync_membership().await,
                Err(e) => Err(e),
            };
            let mut core = self.core.lock().await;
            if let Err(e) = synced {
                // Without the tracker the joiner is appended to the cached
                // view and published once the tracker is back.
                tracing::warn!("{} joins without the tracker: {}", sender, e);
                core.mark_tracker_offline();
                core.unpublished = true;
                if !core.membership.contains(sender) {
                    let mut nodes = core.membership.to_vec();
                    nodes.push(sender.clone());
                    core.membership.replace(nodes);
                }
            }

            let (participants, members) = (core.game.participant_count(), core.membership.len());
            if participants != members {
                drop(core);
                return Err(self
                    .diverge(format!(
                        "{participants} participants but {members} members after {sender} joined"
                    ))
                    .await);
            }
            let second = members == 2 && *sender != self.here;
            if second {
                core.roles.believe_backup(Some(sender.clone()));
            }
            (second, members)
        };

        if second {
            if let Err(e) = peer.promote_to_backup().await {
                tracing::warn!("{} vanished before becoming backup: {}", sender, e);
                self.remove_node(sender).await;
                return Ok(false);
            }
            tracing::info!("{} is now backup", sender);
        }

        tracing::info!("{} joined ({} members)", sender, members);
        Ok(true)
    }

    /// Push the current state to `target` and the backup, then render.
    async fn publish(&self, target: &Address, peer: &dyn PeerHandle<G>) {
        let (snapshot, backup) = {
            let core = self.core.lock().await;
            (core.snapshot(), core.roles.backup().cloned())
        };

        if *target != self.here {
            let delivered = peer.push_snapshot(snapshot.clone()).await;
            if !matches!(delivered, Ok(true)) {
                tracing::warn!("Could not update {}; removing it", target);
                self.remove_node(target).await;
            }
        }

        if let Some(backup) = backup
            && backup != *target
            && backup != self.here
            && let Err(e) = self.push_snapshot_to(&backup, snapshot).await
        {
            tracing::warn!("Backup {} stopped working: {}", backup, e);
            self.remove_node(&backup).await;
        }

        self.core.lock().await.render(&self.presenter_factory);
    }

    /// Resolve `address` and push `snapshot` to it.
    pub(crate) async fn push_snapshot_to(
        &self,
        address: &Address,
        snapshot: StateSnapshot<G>,
    ) -> Result<(), NodeError> {
        let peer = self.gateway.resolve(address).await?;
        if peer.push_snapshot(snapshot).await? {
            Ok(())
        } else {
            Err(NodeError::Unreachable(address.clone()))
        }
    }
}
