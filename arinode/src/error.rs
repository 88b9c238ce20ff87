//! Types d'erreurs pour arinode.

use tokio_tungstenite::tungstenite;

/// Errors raised by the audio-node client.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid node credentials: {0}")]
    Credentials(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error("node connection closed")]
    Closed,

    #[error("node payload error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type Result spécialisé pour arinode.
pub type Result<T> = std::result::Result<T, NodeError>;
