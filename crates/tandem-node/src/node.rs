//! A session node: shared state, lifecycle and the operations peers call.
//!
//! Everything a node knows (game state, role, membership, presenter, status)
//! lives in one [`NodeCore`] behind an async mutex. The lock is never held
//! across a remote call, so nodes in the same process can call into each
//! other freely.
//!
//! Changes to the tracker's list are read-modify-write sequences (register
//! then re-read, remove then publish). They run under a separate membership
//! lock so that a join and a removal cannot overwrite each other.

use crate::{
    Gateway, MembershipView, NodeConfig, NodeError, PresenterFactory, RoleController, Tracker,
};
use std::sync::{Arc, Weak};
use tandem_core::{
    ActionKind, ActionMessage, Address, GameState, NodeRole, PlayerInfo, Presenter, StateSnapshot,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// Health of a node's view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStatus {
    #[default]
    Active,
    /// The last tracker call failed; membership is served from the cache.
    TrackerOffline,
    /// Role state contradicted the tracker and the node stopped acting as
    /// primary.
    Diverged,
}

/// Collaborators a node is built with.
pub struct NodeEnv<G: GameState> {
    pub config: NodeConfig,
    pub tracker: Arc<dyn Tracker>,
    pub gateway: Arc<dyn Gateway<G>>,
    pub presenter: PresenterFactory<G>,
}

pub(crate) struct NodeCore<G: GameState> {
    pub(crate) game: G,
    pub(crate) roles: RoleController,
    pub(crate) membership: MembershipView,
    pub(crate) status: NodeStatus,
    /// The cached view holds changes the tracker has not accepted yet.
    pub(crate) unpublished: bool,
    presenter: Option<Box<dyn Presenter<G>>>,
}

impl<G: GameState> NodeCore<G> {
    /// Render the local view, creating the presenter on first use.
    pub(crate) fn render(&mut self, factory: &PresenterFactory<G>) {
        let presenter = self.presenter.get_or_insert_with(|| factory());
        presenter.render(&self.game);
    }

    pub(crate) fn snapshot(&self) -> StateSnapshot<G> {
        StateSnapshot::new(self.game.clone())
    }

    pub(crate) fn mark_tracker_offline(&mut self) {
        if self.status == NodeStatus::Active {
            self.status = NodeStatus::TrackerOffline;
        }
    }
}

#[derive(Default)]
pub(crate) struct Tasks {
    processor: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    pub(crate) heartbeat: Option<JoinHandle<()>>,
}

/// One participant process of a session.
pub struct GameNode<G: GameState> {
    pub(crate) here: Address,
    identity: PlayerInfo,
    pub(crate) config: NodeConfig,
    pub(crate) tracker: Arc<dyn Tracker>,
    pub(crate) gateway: Arc<dyn Gateway<G>>,
    pub(crate) presenter_factory: PresenterFactory<G>,
    pub(crate) core: Mutex<NodeCore<G>>,
    /// Held across every tracker read-modify-write; taken before `core`.
    pub(crate) membership_lock: Mutex<()>,
    pub(crate) tasks: Mutex<Tasks>,
    actions_tx: mpsc::Sender<ActionMessage>,
    actions_rx: Mutex<Option<mpsc::Receiver<ActionMessage>>>,
    snapshots_tx: mpsc::UnboundedSender<StateSnapshot<G>>,
    snapshots_rx: Mutex<Option<mpsc::UnboundedReceiver<StateSnapshot<G>>>>,
    shut_down: watch::Sender<bool>,
}

impl<G: GameState> GameNode<G> {
    /// Build a node at `here` that knows `members` as the current session.
    ///
    /// An empty `members` list makes this node the founder of a new session
    /// once [`init`](Self::init) runs. Nothing runs until then.
    pub fn new(here: Address, game: G, members: Vec<Address>, env: NodeEnv<G>) -> Arc<Self> {
        let membership = MembershipView::new(members);
        let roles = RoleController::new(
            here.clone(),
            membership.primary().cloned(),
            membership.backup().cloned(),
        );
        let (actions_tx, actions_rx) = mpsc::channel(env.config.queue_capacity.max(1));
        let (snapshots_tx, snapshots_rx) = mpsc::unbounded_channel();
        let (shut_down, _) = watch::channel(false);

        Arc::new(Self {
            identity: PlayerInfo::for_address(here.clone()),
            here,
            config: env.config,
            tracker: env.tracker,
            gateway: env.gateway,
            presenter_factory: env.presenter,
            core: Mutex::new(NodeCore {
                game,
                roles,
                membership,
                status: NodeStatus::Active,
                unpublished: false,
                presenter: None,
            }),
            membership_lock: Mutex::new(()),
            tasks: Mutex::new(Tasks::default()),
            actions_tx,
            actions_rx: Mutex::new(Some(actions_rx)),
            snapshots_tx,
            snapshots_rx: Mutex::new(Some(snapshots_rx)),
            shut_down,
        })
    }

    /// Start the queue consumers, then either found a session or join the
    /// existing one.
    pub async fn init(self: &Arc<Self>) -> Result<(), NodeError> {
        self.start().await;

        let founding = self.core.lock().await.membership.is_empty();
        if founding {
            self.found_session().await;
            Ok(())
        } else {
            self.submit_local_action(ActionKind::Join).await
        }
    }

    /// Spawn the action processor and snapshot receiver.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if tasks.processor.is_none()
            && let Some(rx) = self.actions_rx.lock().await.take()
        {
            tasks.processor = Some(tokio::spawn(Self::run_processor(Arc::downgrade(self), rx)));
        }
        if tasks.receiver.is_none()
            && let Some(rx) = self.snapshots_rx.lock().await.take()
        {
            tasks.receiver = Some(tokio::spawn(Self::run_receiver(Arc::downgrade(self), rx)));
        }
    }

    async fn found_session(self: &Arc<Self>) {
        {
            let mut core = self.core.lock().await;
            core.roles.promote_primary();
            core.game.add_participant(self.here.key(), self.identity.clone());
            core.membership.replace(vec![self.here.clone()]);
        }
        {
            let _membership = self.membership_lock.lock().await;
            if let Err(e) = self.tracker.register(self.here.clone()).await {
                tracing::warn!("Could not register {} with the tracker: {}", self.here, e);
                let mut core = self.core.lock().await;
                core.unpublished = true;
                core.mark_tracker_offline();
            }
            let _ = self.sync_membership().await;
        }
        self.core.lock().await.render(&self.presenter_factory);
        self.ensure_heartbeat().await;
        tracing::info!("{} started a new session as primary", self.here);
    }

    /// Stop all tasks and close the presenter. The node is unreachable
    /// afterwards.
    pub async fn shutdown(&self) {
        if self.shut_down.send_replace(true) {
            return;
        }
        {
            let mut tasks = self.tasks.lock().await;
            for handle in [
                tasks.processor.take(),
                tasks.receiver.take(),
                tasks.heartbeat.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
        }
        if let Some(mut presenter) = self.core.lock().await.presenter.take() {
            presenter.close();
        }
        tracing::info!("{} shut down", self.here);
    }

    /// Leave the session gracefully.
    ///
    /// A primary with a backup hands over by promoting it and sending `Quit`
    /// to it; any other node sends `Quit` to the primary. The node shuts down
    /// either way.
    pub async fn leave(self: &Arc<Self>) -> Result<(), NodeError> {
        let (primary, backup) = {
            let core = self.core.lock().await;
            (core.roles.is_primary(), core.roles.backup().cloned())
        };

        let result = match (primary, backup.filter(|b| *b != self.here)) {
            (true, Some(backup)) => match self.hand_over(&backup).await {
                Ok(()) => self.submit_local_action(ActionKind::Quit).await,
                Err(e) => Err(e),
            },
            (true, None) => Ok(()),
            (false, _) => self.submit_local_action(ActionKind::Quit).await,
        };

        self.shutdown().await;
        result
    }

    async fn hand_over(&self, backup: &Address) -> Result<(), NodeError> {
        let peer = self.gateway.resolve(backup).await?;
        peer.promote_to_primary().await?;
        self.core
            .lock()
            .await
            .roles
            .believe_primary(Some(backup.clone()));
        tracing::info!("{} handed the session over to {}", self.here, backup);
        Ok(())
    }

    /// Queue an action for processing; `false` when the queue is full.
    pub fn enqueue_action(&self, message: ActionMessage) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.actions_tx.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("{} rejected an action: {}", self.here, e);
                false
            }
        }
    }

    /// Queue a snapshot for merging; `false` once the node has shut down.
    pub fn enqueue_snapshot(&self, snapshot: StateSnapshot<G>) -> bool {
        self.is_running() && self.snapshots_tx.send(snapshot).is_ok()
    }

    /// Become primary: start the heartbeat and elect a backup.
    ///
    /// An explicit promotion also clears a previous divergence.
    pub async fn become_primary(self: &Arc<Self>) {
        let change = {
            let mut core = self.core.lock().await;
            let change = core.roles.promote_primary();
            if change.entered_primary() && core.status == NodeStatus::Diverged {
                core.status = NodeStatus::Active;
            }
            change
        };
        if change.entered_primary() {
            tracing::info!("{} is now primary (was {})", self.here, change.from);
        }
        self.ensure_heartbeat().await;
        self.elect_backup(None).await;
    }

    /// Become backup. Leaving the primary role stops the heartbeat.
    pub async fn become_backup(&self) {
        let change = self.core.lock().await.roles.promote_backup();
        if change.left_primary() {
            self.stop_heartbeat().await;
        }
        if change.from != NodeRole::Backup {
            tracing::info!("{} is now backup (was {})", self.here, change.from);
        }
    }

    pub fn address(&self) -> &Address {
        &self.here
    }

    pub fn identity(&self) -> &PlayerInfo {
        &self.identity
    }

    pub fn is_running(&self) -> bool {
        !*self.shut_down.borrow()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has run.
    pub async fn closed(&self) {
        let mut shut_down = self.shut_down.subscribe();
        let _ = shut_down.wait_for(|down| *down).await;
    }

    pub async fn is_primary(&self) -> bool {
        self.core.lock().await.roles.is_primary()
    }

    pub async fn role(&self) -> NodeRole {
        self.core.lock().await.roles.role()
    }

    pub async fn status(&self) -> NodeStatus {
        self.core.lock().await.status
    }

    pub async fn current_state(&self) -> G {
        self.core.lock().await.game.clone()
    }

    /// Cached membership, in tracker order.
    pub async fn membership(&self) -> Vec<Address> {
        self.core.lock().await.membership.to_vec()
    }

    /// Who this node believes is primary.
    pub async fn believed_primary(&self) -> Option<Address> {
        self.core.lock().await.roles.primary().cloned()
    }

    /// Who this node believes is backup.
    pub async fn believed_backup(&self) -> Option<Address> {
        self.core.lock().await.roles.backup().cloned()
    }

    /// Replace the cached membership with the tracker's list.
    ///
    /// A primary first publishes changes it made while the tracker was
    /// offline, so the tracker's stale list does not win.
    pub async fn refresh_membership(&self) -> Result<(), NodeError> {
        let _membership = self.membership_lock.lock().await;
        self.sync_membership().await
    }

    /// [`refresh_membership`](Self::refresh_membership) for callers already
    /// holding the membership lock.
    pub(crate) async fn sync_membership(&self) -> Result<(), NodeError> {
        let pending = {
            let mut core = self.core.lock().await;
            let unpublished = std::mem::take(&mut core.unpublished);
            (unpublished && core.roles.is_primary()).then(|| core.membership.to_vec())
        };
        if let Some(nodes) = pending {
            if let Err(e) = self.tracker.update_list(nodes).await {
                tracing::warn!("{} could not publish its membership: {}", self.here, e);
                let mut core = self.core.lock().await;
                core.unpublished = true;
                core.mark_tracker_offline();
                return Err(e);
            }
            tracing::info!("{} published membership changed while offline", self.here);
        }

        match self.tracker.list_nodes().await {
            Ok(nodes) => {
                let mut core = self.core.lock().await;
                core.membership.replace(nodes);
                if core.status == NodeStatus::TrackerOffline {
                    core.status = NodeStatus::Active;
                    tracing::info!("{} reached the tracker again", self.here);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} could not refresh membership: {}", self.here, e);
                self.core.lock().await.mark_tracker_offline();
                Err(e)
            }
        }
    }

    /// Publish `nodes` as the tracker's new list. Callers hold the
    /// membership lock.
    pub(crate) async fn notify_tracker(&self, nodes: Vec<Address>) {
        if let Err(e) = self.tracker.update_list(nodes).await {
            tracing::warn!("{} could not update the tracker: {}", self.here, e);
            let mut core = self.core.lock().await;
            core.unpublished = true;
            core.mark_tracker_offline();
        }
    }

    pub(crate) fn weak(self: &Arc<Self>) -> Weak<Self> {
        Arc::downgrade(self)
    }
}
