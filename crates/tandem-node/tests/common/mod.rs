//! Shared harness: a small grid game, a recording presenter, an in-process
//! cluster wired through `LocalGateway`, and doubles that slow down the
//! tracker or refuse snapshots.

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tandem_core::{
    ActionKind, ActionMessage, Address, Direction, GameState, PlayerInfo, Presenter,
    StateSnapshot,
};
use tandem_node::{
    GameNode, Gateway, InMemoryTracker, LocalGateway, NodeConfig, NodeEnv, NodeError, PeerHandle,
    Tracker,
};

/// Poll `$cond` until it holds, failing the test after five seconds.
macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if $cond {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {}", $what);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }};
}

/// Install a per-thread subscriber. Uses RUST_LOG, defaulting to debug.
pub fn init_tracing() -> impl Sized {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tandem_node=debug")),
        )
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spot {
    pub name: String,
    pub x: i32,
    pub y: i32,
}

/// Players on an unbounded grid, plus the log of applied movements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub players: BTreeMap<String, Spot>,
    pub moves: Vec<(String, ActionKind)>,
}

impl Grid {
    pub fn spot(&self, id: &str) -> Option<&Spot> {
        self.players.get(id)
    }
}

impl GameState for Grid {
    fn add_participant(&mut self, id: &str, player: PlayerInfo) {
        self.players.insert(
            id.to_string(),
            Spot {
                name: player.name,
                x: 0,
                y: 0,
            },
        );
    }

    fn remove_participant(&mut self, id: &str) {
        self.players.remove(id);
    }

    fn apply(&mut self, actor_id: &str, action: ActionKind) {
        let Some(spot) = self.players.get_mut(actor_id) else {
            return;
        };
        if let ActionKind::Move { direction } = action {
            match direction {
                Direction::Up => spot.y -= 1,
                Direction::Down => spot.y += 1,
                Direction::Left => spot.x -= 1,
                Direction::Right => spot.x += 1,
            }
        }
        self.moves.push((actor_id.to_string(), action));
    }

    fn participant_count(&self) -> usize {
        self.players.len()
    }
}

/// Everything a node's presenter was asked to show.
#[derive(Clone, Default)]
pub struct Screen {
    frames: Arc<Mutex<Vec<Grid>>>,
    closed: Arc<Mutex<bool>>,
}

impl Screen {
    pub fn last(&self) -> Option<Grid> {
        self.frames.lock().unwrap().last().cloned()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

struct ScreenPresenter(Screen);

impl Presenter<Grid> for ScreenPresenter {
    fn render(&mut self, state: &Grid) {
        self.0.frames.lock().unwrap().push(state.clone());
    }

    fn close(&mut self) {
        *self.0.closed.lock().unwrap() = true;
    }
}

pub fn address(i: usize) -> Address {
    Address::new("127.0.0.1", 9000 + i as u16, format!("n{i}"), format!("player{i}"))
}

/// Protocol settings for tests: the heartbeat never fires on its own.
pub fn test_config() -> NodeConfig {
    NodeConfig {
        heartbeat_interval_ms: 3_600_000,
        rpc_timeout_ms: 200,
        retry_backoff_ms: 5,
        ..NodeConfig::default()
    }
}

/// Tracker whose `list_nodes` answers late, widening the window between a
/// register and the re-read that follows it.
pub struct SlowTracker {
    inner: Arc<InMemoryTracker>,
    delay: Duration,
}

impl SlowTracker {
    pub fn new(inner: Arc<InMemoryTracker>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Tracker for SlowTracker {
    async fn register(&self, address: Address) -> Result<(), NodeError> {
        self.inner.register(address).await
    }

    async fn list_nodes(&self) -> Result<Vec<Address>, NodeError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_nodes().await
    }

    async fn update_list(&self, nodes: Vec<Address>) -> Result<(), NodeError> {
        self.inner.update_list(nodes).await
    }
}

/// Gateway that can make one address answer every snapshot push with
/// `false`, as a node does once it has shut down.
pub struct RefusingGateway {
    inner: Arc<LocalGateway<Grid>>,
    refused: Arc<Mutex<Option<Address>>>,
}

impl RefusingGateway {
    pub fn new(inner: Arc<LocalGateway<Grid>>) -> Self {
        Self {
            inner,
            refused: Arc::new(Mutex::new(None)),
        }
    }

    pub fn refuse_snapshots_to(&self, address: Address) {
        *self.refused.lock().unwrap() = Some(address);
    }
}

#[async_trait]
impl Gateway<Grid> for RefusingGateway {
    async fn resolve(&self, address: &Address) -> Result<Arc<dyn PeerHandle<Grid>>, NodeError> {
        Ok(Arc::new(RefusingPeer {
            address: address.clone(),
            inner: self.inner.resolve(address).await?,
            refused: self.refused.clone(),
        }))
    }
}

struct RefusingPeer {
    address: Address,
    inner: Arc<dyn PeerHandle<Grid>>,
    refused: Arc<Mutex<Option<Address>>>,
}

#[async_trait]
impl PeerHandle<Grid> for RefusingPeer {
    async fn submit_action(&self, message: ActionMessage) -> Result<bool, NodeError> {
        self.inner.submit_action(message).await
    }

    async fn push_snapshot(&self, snapshot: StateSnapshot<Grid>) -> Result<bool, NodeError> {
        if self.refused.lock().unwrap().as_ref() == Some(&self.address) {
            return Ok(false);
        }
        self.inner.push_snapshot(snapshot).await
    }

    async fn promote_to_primary(&self) -> Result<(), NodeError> {
        self.inner.promote_to_primary().await
    }

    async fn promote_to_backup(&self) -> Result<(), NodeError> {
        self.inner.promote_to_backup().await
    }

    async fn address(&self) -> Result<Address, NodeError> {
        self.inner.address().await
    }

    async fn identity(&self) -> Result<PlayerInfo, NodeError> {
        self.inner.identity().await
    }

    async fn current_state(&self) -> Result<Grid, NodeError> {
        self.inner.current_state().await
    }

    async fn is_primary(&self) -> Result<bool, NodeError> {
        self.inner.is_primary().await
    }
}

/// In-process nodes sharing one tracker and one gateway.
///
/// `tracker` and `gateway` are the real in-memory pieces, used to inspect
/// and to inject crashes. Nodes are built with `node_tracker` and
/// `node_gateway`, which default to the same objects and can be swapped for
/// doubles before the first node is built.
pub struct Cluster {
    pub tracker: Arc<InMemoryTracker>,
    pub gateway: Arc<LocalGateway<Grid>>,
    pub node_tracker: Arc<dyn Tracker>,
    pub node_gateway: Arc<dyn Gateway<Grid>>,
    pub nodes: Vec<Arc<GameNode<Grid>>>,
    pub screens: Vec<Screen>,
}

impl Cluster {
    pub fn new() -> Self {
        let tracker = Arc::new(InMemoryTracker::new());
        let gateway = Arc::new(LocalGateway::<Grid>::new());
        Self {
            node_tracker: tracker.clone(),
            node_gateway: gateway.clone(),
            tracker,
            gateway,
            nodes: Vec::new(),
            screens: Vec::new(),
        }
    }

    /// Start a session of `n` nodes, each joining after the previous join
    /// completed.
    pub async fn with_nodes(n: usize) -> Self {
        let mut cluster = Self::new();
        for _ in 0..n {
            cluster.join().await;
        }
        cluster
    }

    /// Build a node without starting it.
    pub fn build(
        &self,
        i: usize,
        members: Vec<Address>,
        config: NodeConfig,
    ) -> (Arc<GameNode<Grid>>, Screen) {
        let screen = Screen::default();
        let factory_screen = screen.clone();
        let node = GameNode::new(
            address(i),
            Grid::default(),
            members,
            NodeEnv {
                config,
                tracker: self.node_tracker.clone(),
                gateway: self.node_gateway.clone(),
                presenter: Box::new(move || Box::new(ScreenPresenter(factory_screen.clone()))),
            },
        );
        self.gateway.attach(&node);
        (node, screen)
    }

    /// Add the next node and wait until the primary has admitted it.
    pub async fn join(&mut self) -> Arc<GameNode<Grid>> {
        let i = self.nodes.len();
        let (node, screen) = self.build(i, self.tracker.snapshot(), test_config());
        node.init().await.unwrap();

        let tracker = self.tracker.clone();
        eventually!(format!("n{i} to be registered"), tracker.snapshot().len() == i + 1);
        eventually!(
            format!("n{i} to receive its first snapshot"),
            screen.frame_count() > 0
        );

        self.nodes.push(node.clone());
        self.screens.push(screen);
        node
    }

    /// Make node `i` unreachable and stop its tasks.
    pub async fn crash(&self, i: usize) {
        self.gateway.crash(&address(i));
        self.nodes[i].shutdown().await;
    }
}
