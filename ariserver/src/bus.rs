//! Bus-session contract.
//!
//! The message bus itself (transport, session management, realm join) is
//! an external collaborator; the server only needs an outbound surface:
//! publish an event, call a peer's procedure. The in-tree websocket
//! bridge implements this, a real bus client would too.

use serde_json::{Map, Value};

/// Outbound bus failures. Publication errors are logged and swallowed by
/// the callers, they never fail a command.
#[derive(Debug, thiserror::Error)]
#[error("bus error: {0}")]
pub struct BusError(pub String);

/// Outbound side of a bus session.
#[async_trait::async_trait]
pub trait BusSession: Send + Sync {
    /// Publish an event under a fully qualified URI.
    async fn publish(
        &self,
        uri: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<(), BusError>;

    /// Call a peer's procedure.
    async fn call(&self, uri: &str, args: Vec<Value>) -> Result<Value, BusError>;
}
