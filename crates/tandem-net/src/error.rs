use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("connection closed before a reply arrived")]
    Closed,
    /// The other side answered with an error reply.
    #[error("remote error: {0}")]
    Remote(String),
}
