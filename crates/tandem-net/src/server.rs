//! Inbound side: accept loops serving a node or a tracker.

use crate::NetError;
use crate::wire::{
    Envelope, NodeReply, NodeRequest, TrackerReply, TrackerRequest, encode, next_frame,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tandem_core::{Address, GameState};
use tandem_node::{GameNode, Tracker};
use tokio::net::{TcpListener, TcpStream};

/// Bind a listener on the host and port of `address`.
pub async fn bind(address: &Address) -> Result<TcpListener, NetError> {
    Ok(TcpListener::bind((address.host(), address.port())).await?)
}

/// Serve `node` until it shuts down.
pub async fn serve_node<G: GameState>(
    listener: TcpListener,
    node: Arc<GameNode<G>>,
) -> Result<(), NetError> {
    tracing::info!("{} listening on ws://{}", node.address(), listener.local_addr()?);

    loop {
        let (stream, client_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            () = node.closed() => break,
        };
        let node = node.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_node_connection(stream, client_addr, node).await {
                tracing::warn!("Connection error: {}", e);
            }
        });
    }
    tracing::info!("{} stopped listening", node.address());
    Ok(())
}

async fn handle_node_connection<G: GameState>(
    stream: TcpStream,
    client_addr: SocketAddr,
    node: Arc<GameNode<G>>,
) -> Result<(), NetError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    tracing::trace!("New connection from {}", client_addr);

    while let Some(envelope) = next_frame::<Envelope<NodeRequest<G>>, _>(&mut stream).await? {
        let reply = if envelope.key != node.address().key() {
            NodeReply::Error {
                message: format!("no node with key {} here", envelope.key),
            }
        } else if !node.is_running() {
            NodeReply::Error {
                message: format!("{} has shut down", node.address()),
            }
        } else {
            dispatch(&node, envelope.body).await
        };
        sink.send(encode(&reply)?).await?;
    }
    Ok(())
}

async fn dispatch<G: GameState>(node: &Arc<GameNode<G>>, request: NodeRequest<G>) -> NodeReply<G> {
    match request {
        NodeRequest::SubmitAction { message } => NodeReply::Accepted {
            accepted: node.enqueue_action(message),
        },
        NodeRequest::PushSnapshot { snapshot } => NodeReply::Accepted {
            accepted: node.enqueue_snapshot(snapshot),
        },
        NodeRequest::PromoteToPrimary => {
            node.become_primary().await;
            NodeReply::Done
        }
        NodeRequest::PromoteToBackup => {
            node.become_backup().await;
            NodeReply::Done
        }
        NodeRequest::Address => NodeReply::Address {
            address: node.address().clone(),
        },
        NodeRequest::Identity => NodeReply::Identity {
            player: node.identity().clone(),
        },
        NodeRequest::CurrentState => NodeReply::State {
            state: node.current_state().await,
        },
        NodeRequest::IsPrimary => NodeReply::IsPrimary {
            primary: node.is_primary().await,
        },
    }
}

/// Serve `tracker` forever.
pub async fn serve_tracker(
    listener: TcpListener,
    tracker: Arc<dyn Tracker>,
) -> Result<(), NetError> {
    tracing::info!("Tracker listening on ws://{}", listener.local_addr()?);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let tracker = tracker.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_tracker_connection(stream, client_addr, tracker).await {
                tracing::warn!("Tracker connection error: {}", e);
            }
        });
    }
}

async fn handle_tracker_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    tracker: Arc<dyn Tracker>,
) -> Result<(), NetError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    tracing::trace!("New tracker connection from {}", client_addr);

    while let Some(request) = next_frame::<TrackerRequest, _>(&mut stream).await? {
        let result = match request {
            TrackerRequest::Register { address } => {
                tracing::info!("Registering {}", address);
                tracker.register(address).await.map(|()| TrackerReply::Done)
            }
            TrackerRequest::ListNodes => tracker
                .list_nodes()
                .await
                .map(|nodes| TrackerReply::Nodes { nodes }),
            TrackerRequest::UpdateList { nodes } => {
                tracing::info!("Membership is now {} nodes", nodes.len());
                tracker.update_list(nodes).await.map(|()| TrackerReply::Done)
            }
        };
        let reply = result.unwrap_or_else(|e| TrackerReply::Error {
            message: e.to_string(),
        });
        sink.send(encode(&reply)?).await?;
    }
    Ok(())
}
