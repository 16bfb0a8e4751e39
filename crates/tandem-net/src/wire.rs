//! Wire messages and framing.
//!
//! Every message is one JSON text frame. Node requests travel in an
//! [`Envelope`] naming the key of the node they are meant for.

use crate::NetError;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tandem_core::{ActionMessage, Address, PlayerInfo, StateSnapshot};
use tokio_tungstenite::tungstenite::{self, Message};

/// A request addressed to the node serving `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub key: String,
    pub body: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeRequest<G> {
    SubmitAction { message: ActionMessage },
    PushSnapshot { snapshot: StateSnapshot<G> },
    PromoteToPrimary,
    PromoteToBackup,
    Address,
    Identity,
    CurrentState,
    IsPrimary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeReply<G> {
    /// Answer to `submit_action` and `push_snapshot`.
    Accepted { accepted: bool },
    Done,
    Address { address: Address },
    Identity { player: PlayerInfo },
    State { state: G },
    IsPrimary { primary: bool },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerRequest {
    Register { address: Address },
    ListNodes,
    UpdateList { nodes: Vec<Address> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerReply {
    Done,
    Nodes { nodes: Vec<Address> },
    Error { message: String },
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Message, NetError> {
    Ok(Message::Text(serde_json::to_string(value)?.into()))
}

/// Read the next JSON frame, skipping pings and other control frames.
pub(crate) async fn next_frame<T, S>(stream: &mut S) -> Result<Option<T>, NetError>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::ActionKind;

    #[test]
    fn node_request_shape() {
        let sender: Address = "alice/a1@10.0.0.2:7001".parse().unwrap();
        let envelope = Envelope {
            key: "b2".to_string(),
            body: NodeRequest::<()>::SubmitAction {
                message: ActionMessage::new(sender, ActionKind::up()),
            },
        };

        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["key"], "b2");
        assert_eq!(json["body"]["type"], "submit_action");
        assert_eq!(json["body"]["message"]["sender"], "alice/a1@10.0.0.2:7001");
    }

    #[test]
    fn unit_requests_are_bare_tags() {
        let json = serde_json::to_string(&NodeRequest::<()>::PromoteToBackup).unwrap();
        assert_eq!(json, r#"{"type":"promote_to_backup"}"#);

        let parsed: NodeRequest<()> = serde_json::from_str(r#"{"type":"is_primary"}"#).unwrap();
        assert!(matches!(parsed, NodeRequest::IsPrimary));
    }

    #[test]
    fn error_reply_parses() {
        let reply: TrackerReply =
            serde_json::from_str(r#"{"type":"error","message":"offline"}"#).unwrap();
        assert!(matches!(reply, TrackerReply::Error { message } if message == "offline"));
    }

    #[test]
    fn state_reply_carries_game_state() {
        let reply = NodeReply::State {
            state: vec![1u32, 2, 3],
        };
        let json = serde_json::to_string(&reply).unwrap();
        let parsed: NodeReply<Vec<u32>> = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, NodeReply::State { state } if state == vec![1, 2, 3]));
    }
}
