//! Client-side submission of local player actions.
//!
//! An action goes to the believed primary. If the primary is unreachable the
//! believed backup is promoted and the action resubmitted there; if that fails
//! too, membership is re-read from the tracker and the next attempt targets
//! the tracker's first node. Attempts are bounded.

use crate::{GameNode, NodeError};
use tandem_core::{ActionKind, ActionMessage, Address, GameState};

enum Delivery {
    Accepted,
    Rejected,
}

impl Delivery {
    fn from_accepted(accepted: bool) -> Self {
        if accepted { Self::Accepted } else { Self::Rejected }
    }
}

impl<G: GameState> GameNode<G> {
    /// Submit a local player action to the primary.
    ///
    /// A rejection by a full queue backs off and uses up an attempt. Returns
    /// `SessionLost` when the attempt budget is exhausted,
    /// `TrackerUnreachable` when membership could not be re-read, and
    /// `ShuttingDown` after [`shutdown`](Self::shutdown).
    pub async fn submit_local_action(&self, kind: ActionKind) -> Result<(), NodeError> {
        if !self.is_running() {
            return Err(NodeError::ShuttingDown);
        }
        let message = ActionMessage::new(self.here.clone(), kind);
        let attempts = self.config.max_submit_attempts.max(1);

        for attempt in 1..=attempts {
            let (primary, backup) = {
                let core = self.core.lock().await;
                (core.roles.primary().cloned(), core.roles.backup().cloned())
            };
            tracing::debug!(
                "{} submitting {} (attempt {}/{})",
                self.here,
                message.kind,
                attempt,
                attempts
            );

            if let Some(primary) = &primary {
                match self.deliver(primary, &message).await {
                    Ok(Delivery::Accepted) => return Ok(()),
                    Ok(Delivery::Rejected) => {
                        tokio::time::sleep(self.config.retry_backoff()).await;
                        continue;
                    }
                    Err(e) => tracing::warn!("Primary {} unreachable: {}", primary, e),
                }
            }

            if let Some(backup) = backup.filter(|b| Some(b) != primary.as_ref()) {
                match self.fail_over(&backup, &message).await {
                    Ok(Delivery::Accepted) => return Ok(()),
                    Ok(Delivery::Rejected) => {
                        tokio::time::sleep(self.config.retry_backoff()).await;
                        continue;
                    }
                    Err(e) => tracing::warn!("Backup {} unreachable too: {}", backup, e),
                }
            }

            self.refresh_membership().await?;
            let mut core = self.core.lock().await;
            let primary = core.membership.primary().cloned();
            let backup = core.membership.backup().cloned();
            core.roles.believe_primary(primary);
            core.roles.believe_backup(backup);
        }

        tracing::error!("{} lost the session: no primary accepted {}", self.here, message);
        Err(NodeError::SessionLost { attempts })
    }

    /// Submit to `target`, promoting it first if it does not know it is
    /// primary yet.
    async fn deliver(
        &self,
        target: &Address,
        message: &ActionMessage,
    ) -> Result<Delivery, NodeError> {
        let peer = self.gateway.resolve(target).await?;
        if !peer.is_primary().await? {
            tracing::info!("{} does not know it is primary; promoting it", target);
            peer.promote_to_primary().await?;
        }
        Ok(Delivery::from_accepted(
            peer.submit_action(message.clone()).await?,
        ))
    }

    /// Promote `backup` to primary and submit to it.
    async fn fail_over(
        &self,
        backup: &Address,
        message: &ActionMessage,
    ) -> Result<Delivery, NodeError> {
        let peer = self.gateway.resolve(backup).await?;
        peer.promote_to_primary().await?;
        {
            let mut core = self.core.lock().await;
            core.roles.believe_primary(Some(backup.clone()));
            core.roles.forget_backup(backup);
        }
        tracing::info!("{} failed over to {}", self.here, backup);
        Ok(Delivery::from_accepted(
            peer.submit_action(message.clone()).await?,
        ))
    }
}
