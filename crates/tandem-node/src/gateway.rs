//! Remote node gateway.
//!
//! All cross-process failure detection sits behind [`Gateway`]: resolving an
//! address yields a [`PeerHandle`], and any failure of a resolution or of a
//! call on a handle is reported as [`NodeError::Unreachable`]. Gateways never
//! retry; retry and removal policy belongs to the callers.
//!
//! [`LocalGateway`] connects nodes living in the same process and can mark
//! nodes as crashed. The WebSocket gateway lives in `tandem-net`.

use crate::{GameNode, NodeError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tandem_core::{ActionMessage, Address, GameState, PlayerInfo, StateSnapshot};

/// Operations a node exposes to its peers.
#[async_trait]
pub trait PeerHandle<G: GameState>: Send + Sync {
    /// Queue an action; `false` means the queue was full.
    async fn submit_action(&self, message: ActionMessage) -> Result<bool, NodeError>;

    /// Queue a snapshot for merging and rendering.
    async fn push_snapshot(&self, snapshot: StateSnapshot<G>) -> Result<bool, NodeError>;

    async fn promote_to_primary(&self) -> Result<(), NodeError>;

    async fn promote_to_backup(&self) -> Result<(), NodeError>;

    async fn address(&self) -> Result<Address, NodeError>;

    /// The peer's local player record.
    async fn identity(&self) -> Result<PlayerInfo, NodeError>;

    async fn current_state(&self) -> Result<G, NodeError>;

    async fn is_primary(&self) -> Result<bool, NodeError>;
}

/// Resolves addresses to callable peers.
#[async_trait]
pub trait Gateway<G: GameState>: Send + Sync {
    async fn resolve(&self, address: &Address) -> Result<Arc<dyn PeerHandle<G>>, NodeError>;

    /// Liveness probe: resolve and ask the peer for its address.
    async fn probe(&self, address: &Address) -> Result<(), NodeError> {
        let peer = self.resolve(address).await?;
        let reported = peer.address().await?;
        if &reported == address {
            Ok(())
        } else {
            Err(NodeError::Unreachable(address.clone()))
        }
    }
}

/// Run a remote call, turning a timeout into `Unreachable`.
pub async fn within<T, F>(timeout: Duration, address: &Address, call: F) -> Result<T, NodeError>
where
    F: Future<Output = Result<T, NodeError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!("Call to {} timed out after {:?}", address, timeout);
            Err(NodeError::Unreachable(address.clone()))
        }
    }
}

struct Registry<G: GameState> {
    nodes: HashMap<Address, Weak<GameNode<G>>>,
    crashed: HashSet<Address>,
}

impl<G: GameState> Registry<G> {
    fn live(&self, address: &Address) -> Option<Arc<GameNode<G>>> {
        if self.crashed.contains(address) {
            return None;
        }
        self.nodes
            .get(address)
            .and_then(Weak::upgrade)
            .filter(|node| node.is_running())
    }
}

type SharedRegistry<G> = Arc<Mutex<Registry<G>>>;

fn live_node<G: GameState>(
    registry: &SharedRegistry<G>,
    address: &Address,
) -> Result<Arc<GameNode<G>>, NodeError> {
    registry
        .lock()
        .ok()
        .and_then(|registry| registry.live(address))
        .ok_or_else(|| NodeError::Unreachable(address.clone()))
}

/// Gateway between nodes hosted in one process.
///
/// Nodes are held weakly; a dropped, shut down or crashed node is unreachable.
pub struct LocalGateway<G: GameState> {
    registry: SharedRegistry<G>,
}

impl<G: GameState> Default for LocalGateway<G> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                nodes: HashMap::new(),
                crashed: HashSet::new(),
            })),
        }
    }
}

impl<G: GameState> LocalGateway<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` resolvable under its address.
    pub fn attach(&self, node: &Arc<GameNode<G>>) {
        if let Ok(mut registry) = self.registry.lock() {
            registry
                .nodes
                .insert(node.address().clone(), Arc::downgrade(node));
        }
    }

    /// Make every call to `address` fail from now on, including calls on
    /// handles resolved earlier.
    pub fn crash(&self, address: &Address) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.crashed.insert(address.clone());
        }
        tracing::info!("Injected crash of {}", address);
    }

    pub fn revive(&self, address: &Address) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.crashed.remove(address);
        }
    }
}

#[async_trait]
impl<G: GameState> Gateway<G> for LocalGateway<G> {
    async fn resolve(&self, address: &Address) -> Result<Arc<dyn PeerHandle<G>>, NodeError> {
        live_node(&self.registry, address)?;
        Ok(Arc::new(LocalPeer {
            address: address.clone(),
            registry: self.registry.clone(),
        }))
    }
}

struct LocalPeer<G: GameState> {
    address: Address,
    registry: SharedRegistry<G>,
}

impl<G: GameState> LocalPeer<G> {
    fn node(&self) -> Result<Arc<GameNode<G>>, NodeError> {
        live_node(&self.registry, &self.address)
    }
}

#[async_trait]
impl<G: GameState> PeerHandle<G> for LocalPeer<G> {
    async fn submit_action(&self, message: ActionMessage) -> Result<bool, NodeError> {
        Ok(self.node()?.enqueue_action(message))
    }

    async fn push_snapshot(&self, snapshot: StateSnapshot<G>) -> Result<bool, NodeError> {
        Ok(self.node()?.enqueue_snapshot(snapshot))
    }

    async fn promote_to_primary(&self) -> Result<(), NodeError> {
        self.node()?.become_primary().await;
        Ok(())
    }

    async fn promote_to_backup(&self) -> Result<(), NodeError> {
        self.node()?.become_backup().await;
        Ok(())
    }

    async fn address(&self) -> Result<Address, NodeError> {
        Ok(self.node()?.address().clone())
    }

    async fn identity(&self) -> Result<PlayerInfo, NodeError> {
        Ok(self.node()?.identity().clone())
    }

    async fn current_state(&self) -> Result<G, NodeError> {
        Ok(self.node()?.current_state().await)
    }

    async fn is_primary(&self) -> Result<bool, NodeError> {
        Ok(self.node()?.is_primary().await)
    }
}
