//! Outbound side: a [`Gateway`] and a [`Tracker`] that talk WebSocket.
//!
//! Each call opens its own connection, sends one request and waits for one
//! reply, all bounded by the configured timeout.

use crate::NetError;
use crate::wire::{
    Envelope, NodeReply, NodeRequest, TrackerReply, TrackerRequest, encode, next_frame,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{ActionMessage, Address, GameState, PlayerInfo, StateSnapshot};
use tandem_node::{Gateway, NodeError, PeerHandle, Tracker, within};

/// Send `request` to `url` and wait for a single reply.
pub(crate) async fn exchange<Req, Rep>(url: &str, request: &Req) -> Result<Rep, NetError>
where
    Req: Serialize,
    Rep: DeserializeOwned,
{
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();
    sink.send(encode(request)?).await?;
    let reply = next_frame(&mut stream).await?.ok_or(NetError::Closed)?;
    let _ = sink.close().await;
    Ok(reply)
}

/// Gateway to nodes served by [`serve_node`](crate::serve_node).
///
/// Resolution is lazy: an address always resolves, and unreachability shows
/// up on the first call.
#[derive(Debug, Clone)]
pub struct RemoteGateway {
    timeout: Duration,
}

impl RemoteGateway {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl<G: GameState> Gateway<G> for RemoteGateway {
    async fn resolve(&self, address: &Address) -> Result<Arc<dyn PeerHandle<G>>, NodeError> {
        Ok(Arc::new(RemotePeer::<G> {
            address: address.clone(),
            url: address.endpoint(),
            timeout: self.timeout,
            _game: PhantomData,
        }))
    }
}

struct RemotePeer<G> {
    address: Address,
    url: String,
    timeout: Duration,
    _game: PhantomData<fn() -> G>,
}

impl<G: GameState> RemotePeer<G> {
    async fn call(&self, body: NodeRequest<G>) -> Result<NodeReply<G>, NodeError> {
        let envelope = Envelope {
            key: self.address.key().to_string(),
            body,
        };
        let reply = within(self.timeout, &self.address, async {
            exchange(&self.url, &envelope).await.map_err(|e| {
                tracing::debug!("Call to {} failed: {}", self.address, e);
                NodeError::Unreachable(self.address.clone())
            })
        })
        .await?;

        match reply {
            NodeReply::Error { message } => {
                tracing::debug!("{} answered with an error: {}", self.address, message);
                Err(NodeError::Unreachable(self.address.clone()))
            }
            reply => Ok(reply),
        }
    }

    fn unexpected(&self, reply: &NodeReply<G>) -> NodeError {
        tracing::warn!(
            "Unexpected reply from {}: {:?}",
            self.address,
            std::mem::discriminant(reply)
        );
        NodeError::Unreachable(self.address.clone())
    }
}

#[async_trait]
impl<G: GameState> PeerHandle<G> for RemotePeer<G> {
    async fn submit_action(&self, message: ActionMessage) -> Result<bool, NodeError> {
        match self.call(NodeRequest::SubmitAction { message }).await? {
            NodeReply::Accepted { accepted } => Ok(accepted),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn push_snapshot(&self, snapshot: StateSnapshot<G>) -> Result<bool, NodeError> {
        match self.call(NodeRequest::PushSnapshot { snapshot }).await? {
            NodeReply::Accepted { accepted } => Ok(accepted),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn promote_to_primary(&self) -> Result<(), NodeError> {
        match self.call(NodeRequest::PromoteToPrimary).await? {
            NodeReply::Done => Ok(()),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn promote_to_backup(&self) -> Result<(), NodeError> {
        match self.call(NodeRequest::PromoteToBackup).await? {
            NodeReply::Done => Ok(()),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn address(&self) -> Result<Address, NodeError> {
        match self.call(NodeRequest::Address).await? {
            NodeReply::Address { address } => Ok(address),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn identity(&self) -> Result<PlayerInfo, NodeError> {
        match self.call(NodeRequest::Identity).await? {
            NodeReply::Identity { player } => Ok(player),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn current_state(&self) -> Result<G, NodeError> {
        match self.call(NodeRequest::CurrentState).await? {
            NodeReply::State { state } => Ok(state),
            other => Err(self.unexpected(&other)),
        }
    }

    async fn is_primary(&self) -> Result<bool, NodeError> {
        match self.call(NodeRequest::IsPrimary).await? {
            NodeReply::IsPrimary { primary } => Ok(primary),
            other => Err(self.unexpected(&other)),
        }
    }
}

/// Tracker served by [`serve_tracker`](crate::serve_tracker).
#[derive(Debug, Clone)]
pub struct RemoteTracker {
    url: String,
    timeout: Duration,
}

impl RemoteTracker {
    /// `url` is the tracker's WebSocket endpoint, e.g. `ws://127.0.0.1:7000`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    async fn call(&self, request: TrackerRequest) -> Result<TrackerReply, NodeError> {
        let reply = tokio::time::timeout(self.timeout, exchange(&self.url, &request))
            .await
            .map_err(|_| {
                tracing::debug!("Tracker at {} timed out", self.url);
                NodeError::TrackerUnreachable
            })?
            .map_err(|e| {
                tracing::debug!("Tracker at {} failed: {}", self.url, e);
                NodeError::TrackerUnreachable
            })?;

        match reply {
            TrackerReply::Error { message } => {
                tracing::warn!("Tracker refused a request: {}", message);
                Err(NodeError::TrackerUnreachable)
            }
            reply => Ok(reply),
        }
    }
}

#[async_trait]
impl Tracker for RemoteTracker {
    async fn register(&self, address: Address) -> Result<(), NodeError> {
        match self.call(TrackerRequest::Register { address }).await? {
            TrackerReply::Done => Ok(()),
            _ => Err(NodeError::TrackerUnreachable),
        }
    }

    async fn list_nodes(&self) -> Result<Vec<Address>, NodeError> {
        match self.call(TrackerRequest::ListNodes).await? {
            TrackerReply::Nodes { nodes } => Ok(nodes),
            _ => Err(NodeError::TrackerUnreachable),
        }
    }

    async fn update_list(&self, nodes: Vec<Address>) -> Result<(), NodeError> {
        match self.call(TrackerRequest::UpdateList { nodes }).await? {
            TrackerReply::Done => Ok(()),
            _ => Err(NodeError::TrackerUnreachable),
        }
    }
}
