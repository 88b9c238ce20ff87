//! Types d'erreurs pour ariplayer.

/// Errors raised by player commands.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Store(#[from] arientry::StoreError),

    #[error(transparent)]
    Node(#[from] arinode::NodeError),

    #[error("metadata service error: {0}")]
    Metadata(String),

    #[error("state payload encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Type Result spécialisé pour ariplayer.
pub type Result<T> = std::result::Result<T, PlayerError>;
