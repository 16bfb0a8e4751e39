//! Primary-side liveness checking, node removal and backup election.
//!
//! While a node is primary it re-reads membership from the tracker every
//! heartbeat interval, checks that it sits at index 0 with its backup at
//! index 1, probes the backup and sweeps the remaining members. Unreachable
//! nodes are removed; losing the backup starts an election.

use crate::{GameNode, NodeError, NodeStatus};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tandem_core::{Address, GameState};

impl<G: GameState> GameNode<G> {
    async fn run_heartbeat(node: Weak<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            let Some(node) = node.upgrade() else { break };
            match node.heartbeat_cycle().await {
                Ok(()) => {}
                Err(NodeError::Invariant(_)) => break,
                Err(e) => tracing::warn!("{} heartbeat cycle failed: {}", node.here, e),
            }
        }
    }

    /// Start the heartbeat task unless one is already running.
    pub(crate) async fn ensure_heartbeat(self: &Arc<Self>) {
        if !self.is_running() {
            return;
        }
        let mut tasks = self.tasks.lock().await;
        let running = tasks
            .heartbeat
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if !running {
            let interval = self.config.heartbeat_interval();
            tasks.heartbeat = Some(tokio::spawn(Self::run_heartbeat(self.weak(), interval)));
            tracing::debug!("{} started heartbeat every {:?}", self.here, interval);
        }
    }

    pub(crate) async fn stop_heartbeat(&self) {
        if let Some(handle) = self.tasks.lock().await.heartbeat.take() {
            handle.abort();
            tracing::debug!("{} stopped heartbeat", self.here);
        }
    }

    /// Whether a heartbeat task is currently scheduled.
    pub async fn heartbeat_running(&self) -> bool {
        self.tasks
            .lock()
            .await
            .heartbeat
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one heartbeat check.
    ///
    /// Returns `NodeError::Invariant` if the tracker's order contradicts this
    /// node's role; the node is then marked diverged and demoted.
    pub async fn heartbeat_cycle(&self) -> Result<(), NodeError> {
        if !self.is_primary().await {
            return Ok(());
        }
        if self.refresh_membership().await.is_err() {
            tracing::warn!("{} checking against cached membership", self.here);
        }

        let (members, backup) = {
            let core = self.core.lock().await;
            (core.membership.to_vec(), core.roles.backup().cloned())
        };

        if members.first() != Some(&self.here) {
            return Err(self
                .diverge(format!(
                    "primary {} is not first in the tracker list",
                    self.here
                ))
                .await);
        }
        match &backup {
            Some(backup) if members.get(1) != Some(backup) => {
                return Err(self
                    .diverge(format!("backup {backup} is not second in the tracker list"))
                    .await);
            }
            Some(backup) => {
                if let Err(e) = self.gateway.probe(backup).await {
                    tracing::warn!("Backup {} stopped working: {}", backup, e);
                    self.remove_node(backup).await;
                }
            }
            None if members.len() > 1 => self.elect_backup(None).await,
            None => {}
        }

        let (members, backup) = {
            let core = self.core.lock().await;
            (core.membership.to_vec(), core.roles.backup().cloned())
        };
        for member in members
            .iter()
            .filter(|m| **m != self.here && Some(*m) != backup.as_ref())
        {
            if let Err(e) = self.gateway.probe(member).await {
                tracing::warn!("{} stopped responding: {}", member, e);
                self.remove_node(member).await;
            }
        }
        Ok(())
    }

    /// Remove `address` from the session, tell the tracker, re-sync or
    /// replace the backup, and render.
    pub async fn remove_node(&self, address: &Address) {
        if self.forget_member(address).await {
            self.elect_backup(Some(address)).await;
        } else {
            self.sync_backup().await;
        }
        self.core.lock().await.render(&self.presenter_factory);
    }

    /// Drop `address` from the game and membership and publish the new list.
    /// Returns whether it was the backup.
    async fn forget_member(&self, address: &Address) -> bool {
        if *address == self.here {
            return false;
        }
        let _membership = self.membership_lock.lock().await;
        let (nodes, was_backup) = {
            let mut core = self.core.lock().await;
            core.game.remove_participant(address.key());
            core.membership.remove(address);
            let was_backup = core.roles.forget_backup(address);
            (core.membership.to_vec(), was_backup)
        };
        self.notify_tracker(nodes).await;
        tracing::info!("Removed {} from the session", address);
        was_backup
    }

    /// Bring the backup up to date; replace it if it is gone.
    async fn sync_backup(&self) {
        let (backup, snapshot) = {
            let core = self.core.lock().await;
            (core.roles.backup().cloned(), core.snapshot())
        };
        let Some(backup) = backup.filter(|b| *b != self.here) else {
            return;
        };
        if let Err(e) = self.push_snapshot_to(&backup, snapshot).await {
            tracing::warn!("Backup {} stopped working: {}", backup, e);
            self.forget_member(&backup).await;
            self.elect_backup(Some(&backup)).await;
        }
    }

    /// Pick the first reachable member, in tracker order, as the new backup.
    ///
    /// Skips this node and `dead`. Unreachable candidates are removed on the
    /// way so that the chosen backup ends up second in the list.
    pub(crate) async fn elect_backup(&self, dead: Option<&Address>) {
        if !self.is_primary().await {
            return;
        }
        let _ = self.refresh_membership().await;

        let candidates: Vec<Address> = {
            let core = self.core.lock().await;
            core.membership
                .iter()
                .filter(|m| **m != self.here && Some(*m) != dead)
                .cloned()
                .collect()
        };

        for candidate in candidates {
            match self.recruit_backup(&candidate).await {
                Ok(()) => {
                    self.core
                        .lock()
                        .await
                        .roles
                        .believe_backup(Some(candidate.clone()));
                    tracing::info!("{} elected {} as backup", self.here, candidate);
                    return;
                }
                Err(e) => {
                    tracing::warn!("Backup candidate {} unreachable: {}", candidate, e);
                    self.forget_member(&candidate).await;
                }
            }
        }
        tracing::warn!("{} has no reachable backup candidate", self.here);
    }

    async fn recruit_backup(&self, candidate: &Address) -> Result<(), NodeError> {
        let snapshot = self.core.lock().await.snapshot();
        let peer = self.gateway.resolve(candidate).await?;
        if !peer.push_snapshot(snapshot).await? {
            return Err(NodeError::Unreachable(candidate.clone()));
        }
        peer.promote_to_backup().await
    }

    /// Stop trusting the local role after an invariant violation.
    pub(crate) async fn diverge(&self, reason: String) -> NodeError {
        tracing::error!("{}: {}; no longer acting as primary", self.here, reason);
        let change = {
            let mut core = self.core.lock().await;
            core.status = NodeStatus::Diverged;
            core.roles.demote()
        };
        if change.left_primary() {
            self.stop_heartbeat().await;
        }
        NodeError::Invariant(reason)
    }
}
