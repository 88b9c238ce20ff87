//! Audio-node client.
//!
//! The node is a remote service that decodes and transmits audio over the
//! voice transport; this process only sends it control operations and
//! consumes its event stream. [`AudioNode`] is the seam the rest of the
//! service programs against: backends implement the single `send`
//! primitive, every operation is a default method on top of it.

use std::sync::{Arc, OnceLock};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, info, warn};

use crate::error::{NodeError, Result};
use crate::model::outgoing::OutgoingOp;
use crate::model::{PlayTrack, PlayerUpdate, TrackEnd, VoiceServerUpdate};

/// Consumer of the node's event stream.
#[async_trait::async_trait]
pub trait NodeEventHandler: Send + Sync {
    /// The node pushed a fresh player snapshot for a guild.
    async fn on_player_update(&self, update: PlayerUpdate);

    /// A track stopped playing on the node.
    async fn on_track_end(&self, event: TrackEnd);
}

/// Control surface of the audio node. Safe for concurrent use from many
/// players.
#[async_trait::async_trait]
pub trait AudioNode: Send + Sync {
    /// Ship one operation to the node.
    async fn send(&self, op: OutgoingOp) -> Result<()>;

    async fn play(&self, guild_id: u64, play: PlayTrack) -> Result<()> {
        self.send(OutgoingOp::Play { guild_id, play }).await
    }

    async fn stop(&self, guild_id: u64) -> Result<()> {
        self.send(OutgoingOp::Stop { guild_id }).await
    }

    async fn pause(&self, guild_id: u64, pause: bool) -> Result<()> {
        self.send(OutgoingOp::Pause { guild_id, pause }).await
    }

    /// Position in seconds.
    async fn seek(&self, guild_id: u64, position: f64) -> Result<()> {
        self.send(OutgoingOp::Seek { guild_id, position }).await
    }

    async fn volume(&self, guild_id: u64, volume: f64) -> Result<()> {
        self.send(OutgoingOp::Volume { guild_id, volume }).await
    }

    async fn voice_server_update(&self, guild_id: u64, update: VoiceServerUpdate) -> Result<()> {
        self.send(OutgoingOp::VoiceServerUpdate { guild_id, update })
            .await
    }
}

/// Websocket connection to one andesite node.
///
/// Operations go through an unbounded channel to a writer task; a reader
/// task dispatches player updates and track events to the handler bound
/// with [`WsNode::bind_events`]. Frames arriving before a handler is bound
/// are dropped. Both tasks end when the connection drops, after which
/// every `send` fails with [`NodeError::Closed`].
///
/// The consumer of the event stream (the player manager) is itself built
/// around the node, so the handler is bound after construction rather
/// than passed in.
#[derive(Clone)]
pub struct WsNode {
    tx: mpsc::UnboundedSender<OutgoingOp>,
    handler: Arc<OnceLock<Arc<dyn NodeEventHandler>>>,
}

impl WsNode {
    pub async fn connect(url: &str, password: &str, user_id: u64) -> Result<Self> {
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", password.parse()?);
        headers.insert("User-Id", user_id.to_string().parse()?);

        let (stream, _) = connect_async(request).await?;
        info!(url, "connected to audio node");

        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<OutgoingOp>();
        let handler: Arc<OnceLock<Arc<dyn NodeEventHandler>>> = Arc::new(OnceLock::new());
        let read_handler = handler.clone();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let payload = match serde_json::to_string(&op) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(%err, "dropping unserializable node op");
                        continue;
                    }
                };

                if let Err(err) = sink.send(Message::text(payload)).await {
                    warn!(%err, "node write failed, stopping writer");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(payload)) => match read_handler.get() {
                        Some(handler) => dispatch_frame(payload.as_str(), handler.as_ref()).await,
                        None => debug!("no event handler bound yet, dropping node frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "node read failed");
                        break;
                    }
                }
            }
            warn!("audio node connection closed");
        });

        Ok(Self { tx, handler })
    }

    /// Bind the consumer of the node's event stream. Only the first call
    /// takes effect.
    pub fn bind_events(&self, handler: Arc<dyn NodeEventHandler>) {
        if self.handler.set(handler).is_err() {
            warn!("node event handler already bound");
        }
    }
}

async fn dispatch_frame(payload: &str, handler: &dyn NodeEventHandler) {
    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "undecodable node frame");
            return;
        }
    };

    match value["op"].as_str() {
        Some("playerUpdate") => match serde_json::from_value::<PlayerUpdate>(value.clone()) {
            Ok(update) => handler.on_player_update(update).await,
            Err(err) => warn!(%err, "undecodable player update"),
        },
        Some("event") => match value["type"].as_str() {
            Some("TrackEndEvent") => match serde_json::from_value::<TrackEnd>(value.clone()) {
                Ok(event) => handler.on_track_end(event).await,
                Err(err) => warn!(%err, "undecodable track end event"),
            },
            other => debug!(kind = ?other, "ignoring node event"),
        },
        other => debug!(op = ?other, "ignoring node frame"),
    }
}

#[async_trait::async_trait]
impl AudioNode for WsNode {
    async fn send(&self, op: OutgoingOp) -> Result<()> {
        self.tx.send(op).map_err(|_| NodeError::Closed)
    }
}
