//! Server façade: bus procedures and events in, player calls out.
//!
//! One procedure per player command, registered under the configured URI
//! prefix; one pump task publishing every player event back onto the bus.
//! Voice events from the Discord namespace feed the correlator. Nothing
//! here holds state of its own — the façade translates, the players do.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use arientry::{Entry, EntryList, EntryListMut, Whence, new_aid};
use arinode::AudioNode;
use ariplayer::{PlayerManager, VoiceCorrelator, VoiceState};

use crate::bus::BusSession;
use crate::error::{Result, RpcError};

const DEFAULT_ENTRIES_PER_PAGE: i64 = 50;

/// URI of the peer procedure that asks Discord for a voice-state change.
const UPDATE_VOICE_STATE: &str = "com.discord.update_voice_state";

/// The Ari server.
pub struct AriServer {
    manager: PlayerManager,
    correlator: VoiceCorrelator,
    session: Arc<dyn BusSession>,
    uri_prefix: String,
}

impl AriServer {
    /// Wire the façade: player events start flowing to the session
    /// immediately.
    pub fn new(
        manager: PlayerManager,
        node: Arc<dyn AudioNode>,
        session: Arc<dyn BusSession>,
        user_id: u64,
        uri_prefix: impl Into<String>,
    ) -> Arc<Self> {
        let correlator = VoiceCorrelator::new(user_id, manager.clone(), node);
        let server = Arc::new(Self {
            manager,
            correlator,
            session,
            uri_prefix: uri_prefix.into(),
        });

        server.spawn_event_pump();
        server
    }

    /// Forward player events to the bus. Publication failures are logged
    /// and swallowed; a missed event is a degradation, not a fault.
    fn spawn_event_pump(self: &Arc<Self>) {
        let mut events = self.manager.subscribe();
        let server = self.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let uri = format!("{}.{}", server.uri_prefix, event.event.uri());
                let args = event.event.args(event.guild_id);
                let kwargs = event.event.kwargs();

                debug!(%uri, "publishing event");
                if let Err(err) = server.session.publish(&uri, args, kwargs).await {
                    warn!(%uri, %err, "event publication failed");
                }
            }
        });
    }

    /// The procedure names served by [`dispatch`](Self::dispatch),
    /// relative to the URI prefix.
    pub fn procedures() -> &'static [&'static str] {
        &[
            "connect",
            "disconnect",
            "queue",
            "history",
            "enqueue",
            "dequeue",
            "move",
            "pause",
            "set_volume",
            "seek",
            "skip_next",
            "skip_next_chapter",
            "skip_previous",
            "skip_previous_chapter",
            "shuffle",
            "clear",
        ]
    }

    /// Handle one RPC invocation.
    pub async fn dispatch(&self, procedure: &str, args: &[Value]) -> Result<Value> {
        debug!(procedure, "dispatching");

        match procedure {
            "connect" => {
                let guild_id = snowflake_arg(args, 0, "guild_id")?;
                let channel_id = snowflake_arg(args, 1, "channel_id")?;
                self.call_peer(
                    UPDATE_VOICE_STATE,
                    vec![guild_id.to_string().into(), channel_id.to_string().into()],
                )
                .await?;
                Ok(Value::Null)
            }
            "disconnect" => {
                let guild_id = snowflake_arg(args, 0, "guild_id")?;
                self.call_peer(UPDATE_VOICE_STATE, vec![guild_id.to_string().into()])
                    .await?;
                Ok(Value::Null)
            }
            "queue" => {
                let (player, page, per_page) = self.page_args(args)?;
                let entries = player.queue().page(page, per_page).await?;
                Ok(entries_payload(&entries))
            }
            "history" => {
                let (player, page, per_page) = self.page_args(args)?;
                let entries = player.history().page(page, per_page).await?;
                Ok(entries_payload(&entries))
            }
            "enqueue" => {
                let player = self.player_arg(args)?;
                let eid = str_arg(args, 1, "eid")?;

                let entry = Entry::new(new_aid(), eid);
                let aid = entry.aid.clone();
                player.enqueue(entry).await?;

                Ok(Value::String(aid))
            }
            "dequeue" => {
                let player = self.player_arg(args)?;
                let aid = str_arg(args, 1, "aid")?;
                Ok(Value::Bool(player.dequeue(&aid).await?))
            }
            "move" => {
                let player = self.player_arg(args)?;
                let aid = str_arg(args, 1, "aid")?;
                let index = int_arg(args, 2, "index")?;
                let whence = str_arg(args, 3, "whence")?;

                let whence: Whence = whence.parse().map_err(|_| {
                    RpcError::invalid_choice(
                        format!("invalid whence: {whence}"),
                        &Whence::POSSIBLE_VALUES,
                    )
                })?;

                Ok(Value::Bool(player.move_entry(&aid, index, whence).await?))
            }
            "pause" => {
                let player = self.player_arg(args)?;
                let pause = bool_arg(args, 1, "pause")?;
                player.pause(pause).await?;
                Ok(Value::Null)
            }
            "set_volume" => {
                let player = self.player_arg(args)?;
                let volume = float_arg(args, 1, "volume")?;
                player.set_volume(volume).await?;
                Ok(Value::Null)
            }
            "seek" => {
                let player = self.player_arg(args)?;
                let position = float_arg(args, 1, "position")?;
                player.seek(position).await?;
                Ok(Value::Null)
            }
            "skip_next" => {
                self.player_arg(args)?.next().await?;
                Ok(Value::Null)
            }
            "skip_next_chapter" => {
                self.player_arg(args)?.next_chapter().await?;
                Ok(Value::Null)
            }
            "skip_previous" => {
                self.player_arg(args)?.previous().await?;
                Ok(Value::Null)
            }
            "skip_previous_chapter" => {
                self.player_arg(args)?.previous_chapter().await?;
                Ok(Value::Null)
            }
            "shuffle" => {
                self.player_arg(args)?.queue().shuffle(None).await?;
                Ok(Value::Null)
            }
            "clear" => {
                self.player_arg(args)?.queue().clear().await?;
                Ok(Value::Null)
            }
            other => Err(RpcError::NoSuchProcedure(other.to_owned())),
        }
    }

    /// Inbound `com.discord.on_voice_state_update`.
    pub async fn on_voice_state_update(&self, payload: Value) -> Result<()> {
        debug!("received voice state update");

        let update: VoiceState = serde_json::from_value(payload)
            .map_err(|err| RpcError::invalid(format!("invalid voice state: {err}")))?;

        Ok(self.correlator.on_voice_state_update(update).await?)
    }

    /// Inbound `com.discord.on_voice_server_update`.
    pub async fn on_voice_server_update(&self, payload: Value) -> Result<()> {
        debug!("received voice server update");

        let guild_id = snowflake_value(payload.get("guild_id"))
            .ok_or_else(|| RpcError::invalid("voice server update without guild_id"))?;

        Ok(self
            .correlator
            .on_voice_server_update(guild_id, payload)
            .await?)
    }

    async fn call_peer(&self, uri: &str, args: Vec<Value>) -> Result<Value> {
        self.session
            .call(uri, args)
            .await
            .map_err(|err| RpcError::invalid(err.to_string()))
    }

    fn player_arg(&self, args: &[Value]) -> Result<Arc<ariplayer::Player>> {
        let guild_id = snowflake_arg(args, 0, "guild_id")?;
        Ok(self.manager.get(guild_id))
    }

    fn page_args(&self, args: &[Value]) -> Result<(Arc<ariplayer::Player>, i64, i64)> {
        let player = self.player_arg(args)?;
        let page = int_arg(args, 1, "page")?;
        let per_page = match args.get(2) {
            Some(_) => int_arg(args, 2, "entries_per_page")?,
            None => DEFAULT_ENTRIES_PER_PAGE,
        };

        if page < 0 || per_page <= 0 {
            return Err(RpcError::invalid("page and entries_per_page must be positive"));
        }

        Ok((player, page, per_page))
    }
}

fn entries_payload(entries: &[Entry]) -> Value {
    Value::Array(entries.iter().map(Entry::as_dict).collect())
}

fn snowflake_value(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(raw) => raw.as_u64(),
        _ => None,
    }
}

fn snowflake_arg(args: &[Value], index: usize, name: &str) -> Result<u64> {
    snowflake_value(args.get(index))
        .ok_or_else(|| RpcError::invalid(format!("missing or invalid {name}")))
}

fn str_arg(args: &[Value], index: usize, name: &str) -> Result<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RpcError::invalid(format!("missing or invalid {name}")))
}

fn int_arg(args: &[Value], index: usize, name: &str) -> Result<i64> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::invalid(format!("missing or invalid {name}")))
}

fn float_arg(args: &[Value], index: usize, name: &str) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| RpcError::invalid(format!("missing or invalid {name}")))
}

fn bool_arg(args: &[Value], index: usize, name: &str) -> Result<bool> {
    args.get(index)
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::invalid(format!("missing or invalid {name}")))
}
