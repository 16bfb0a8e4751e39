//! WebSocket transport for Tandem.
//!
//! Nodes and the tracker speak JSON text frames. [`serve_node`] and
//! [`serve_tracker`] expose a node or tracker on a listener;
//! [`RemoteGateway`] and [`RemoteTracker`] are the matching clients and plug
//! into a [`tandem_node::GameNode`] through its environment.

mod client;
mod error;
mod server;
pub mod wire;

pub use client::{RemoteGateway, RemoteTracker};
pub use error::NetError;
pub use server::{bind, serve_node, serve_tracker};
