//! Types d'erreurs pour ariserver.

use serde_json::{Value, json};

/// Errors reported back over the RPC error channel.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("{message}")]
    InvalidArgument {
        message: String,
        /// Set when the argument has an enumerable domain.
        possible_values: Option<Vec<String>>,
    },

    #[error("no such procedure: {0}")]
    NoSuchProcedure(String),

    #[error(transparent)]
    Player(#[from] ariplayer::PlayerError),
}

impl RpcError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RpcError::InvalidArgument {
            message: message.into(),
            possible_values: None,
        }
    }

    pub fn invalid_choice(message: impl Into<String>, possible_values: &[&str]) -> Self {
        RpcError::InvalidArgument {
            message: message.into(),
            possible_values: Some(possible_values.iter().map(|v| v.to_string()).collect()),
        }
    }

    /// Error payload for the wire.
    pub fn as_payload(&self) -> Value {
        match self {
            RpcError::InvalidArgument {
                message,
                possible_values: Some(values),
            } => json!({"error": message, "possible_values": values}),
            other => json!({"error": other.to_string()}),
        }
    }
}

impl From<arientry::StoreError> for RpcError {
    fn from(err: arientry::StoreError) -> Self {
        RpcError::Player(err.into())
    }
}

/// Type Result spécialisé pour ariserver.
pub type Result<T> = std::result::Result<T, RpcError>;
