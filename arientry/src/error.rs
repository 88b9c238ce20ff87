//! Types d'erreurs pour arientry.

/// Errors raised by entry-list backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entry not in list: {0}")]
    NotFound(String),

    #[error("entry payload decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("entry payload encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Type Result spécialisé pour arientry.
pub type Result<T> = std::result::Result<T, StoreError>;
