//! Websocket bus bridge.
//!
//! A minimal in-tree transport implementing the bus contract over JSON
//! frames, so the service runs without an external router:
//!
//! ```text
//! peer → ari:  {"type": "call", "id": 1, "procedure": "enqueue", "args": […]}
//! ari → peer:  {"type": "result", "id": 1, "result": …}
//!              {"type": "error", "id": 1, "error": {…}}
//! peer → ari:  {"type": "publish", "uri": "com.discord.on_voice_state_update", "args": […]}
//! ari → peer:  {"type": "publish", "uri": "io.giesela.ari.on_play", "args": […], "kwargs": {…}}
//! ```
//!
//! Procedure names in calls are relative to the configured prefix, or
//! fully qualified. The frame shapes are symmetric: outbound calls
//! (`update_voice_state`, the metadata procedures) are broadcast as call
//! frames carrying an id minted here, and whichever peer serves the
//! procedure answers with a `result`/`error` frame echoing that id. The
//! reply resolves the pending call; no deadline is imposed beyond the
//! connection itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::bus::{BusError, BusSession};
use crate::server::AriServer;

const VOICE_STATE_URI: &str = "com.discord.on_voice_state_update";
const VOICE_SERVER_URI: &str = "com.discord.on_voice_server_update";

/// Outcome slot for one outbound call, resolved by the reply frame.
type PendingCall = oneshot::Sender<Result<Value, BusError>>;

/// Broadcast half of the bridge: every connected peer gets every outbound
/// frame. Outbound calls park a oneshot in `calls` under their minted id
/// until some peer's `result`/`error` frame resolves it.
#[derive(Clone, Default)]
pub struct Gateway {
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
    calls: Arc<Mutex<HashMap<u64, PendingCall>>>,
    next_call_id: Arc<AtomicU64>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many peers the frame reached.
    fn broadcast(&self, frame: &Value) -> usize {
        let payload = frame.to_string();
        let mut peers = self.peers.lock().unwrap();
        peers.retain(|peer| peer.send(payload.clone()).is_ok());
        peers.len()
    }

    fn attach(&self) -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().push(tx.clone());
        (tx, rx)
    }

    /// Hand a reply frame's outcome to whoever is awaiting the call.
    fn resolve_call(&self, id: u64, outcome: Result<Value, BusError>) {
        match self.calls.lock().unwrap().remove(&id) {
            Some(pending) => {
                let _ = pending.send(outcome);
            }
            None => debug!(id, "reply for an unknown call"),
        }
    }
}

#[async_trait::async_trait]
impl BusSession for Gateway {
    async fn publish(
        &self,
        uri: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<(), BusError> {
        self.broadcast(&json!({
            "type": "publish",
            "uri": uri,
            "args": args,
            "kwargs": kwargs,
        }));
        Ok(())
    }

    async fn call(&self, uri: &str, args: Vec<Value>) -> Result<Value, BusError> {
        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.calls.lock().unwrap().insert(id, tx);

        let delivered = self.broadcast(&json!({
            "type": "call",
            "id": id,
            "procedure": uri,
            "args": args,
        }));
        if delivered == 0 {
            self.calls.lock().unwrap().remove(&id);
            return Err(BusError(format!("no peer to serve {uri}")));
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BusError(format!("call to {uri} was dropped"))),
        }
    }
}

#[derive(Clone)]
struct GatewayState {
    server: Arc<AriServer>,
    gateway: Gateway,
    uri_prefix: String,
}

/// The bridge router, mountable next to anything else the process serves.
pub fn router(server: Arc<AriServer>, gateway: Gateway, uri_prefix: &str) -> Router {
    Router::new().route("/bus", get(bus_handler)).with_state(GatewayState {
        server,
        gateway,
        uri_prefix: uri_prefix.to_owned(),
    })
}

/// Serve the bridge until ctrl-c.
pub async fn serve(
    addr: &str,
    server: Arc<AriServer>,
    gateway: Gateway,
    uri_prefix: &str,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "bus bridge listening");

    axum::serve(listener, router(server, gateway, uri_prefix))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

/// `host:port` part of a transport URL.
pub fn bind_addr(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next()?;
    (!authority.is_empty()).then_some(authority)
}

async fn bus_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| peer_session(socket, state))
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    procedure: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

async fn peer_session(socket: WebSocket, state: GatewayState) {
    debug!("bus peer connected");
    let (mut sink, mut source) = socket.split();
    let (reply_to, mut outbound) = state.gateway.attach();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = source.next().await {
        let Ok(payload) = message.to_text() else {
            continue;
        };
        if payload.is_empty() {
            continue;
        }

        match serde_json::from_str::<InboundFrame>(payload) {
            Ok(frame) => handle_frame(frame, &state, &reply_to).await,
            Err(err) => warn!(%err, "undecodable bus frame"),
        }
    }

    debug!("bus peer disconnected");
    writer.abort();
}

async fn handle_frame(
    frame: InboundFrame,
    state: &GatewayState,
    reply_to: &mpsc::UnboundedSender<String>,
) {
    match frame.kind.as_str() {
        "call" => {
            let Some(procedure) = frame.procedure else {
                warn!("call frame without procedure");
                return;
            };

            // accept both fully qualified and relative names
            let relative = procedure
                .strip_prefix(&state.uri_prefix)
                .map_or(procedure.as_str(), |rest| rest.trim_start_matches('.'));

            let reply = match state.server.dispatch(relative, &frame.args).await {
                Ok(result) => json!({"type": "result", "id": frame.id, "result": result}),
                Err(err) => {
                    json!({"type": "error", "id": frame.id, "error": err.as_payload()})
                }
            };

            let _ = reply_to.send(reply.to_string());
        }
        "publish" => {
            let Some(uri) = frame.uri.as_deref() else {
                warn!("publish frame without uri");
                return;
            };
            let Some(payload) = frame.args.into_iter().next() else {
                warn!(uri, "publish frame without payload");
                return;
            };

            let handled = match uri {
                VOICE_STATE_URI => state.server.on_voice_state_update(payload).await,
                VOICE_SERVER_URI => state.server.on_voice_server_update(payload).await,
                _ => {
                    debug!(uri, "ignoring publication");
                    Ok(())
                }
            };

            if let Err(err) = handled {
                warn!(uri, %err, "voice event handling failed");
            }
        }
        "result" => {
            let Some(id) = frame.id else {
                warn!("result frame without id");
                return;
            };
            state
                .gateway
                .resolve_call(id, Ok(frame.result.unwrap_or(Value::Null)));
        }
        "error" => {
            let Some(id) = frame.id else {
                warn!("error frame without id");
                return;
            };
            let message = frame.error.as_ref().map_or_else(
                || "call failed".to_owned(),
                |error| {
                    error["error"]
                        .as_str()
                        .map_or_else(|| error.to_string(), str::to_owned)
                },
            );
            state.gateway.resolve_call(id, Err(BusError(message)));
        }
        other => warn!(kind = other, "unknown bus frame"),
    }
}
