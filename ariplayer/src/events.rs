//! Player events and their publication layout.
//!
//! Every state change a client can observe is one of these variants. Each
//! variant maps to a publication URI suffix and splits its payload between
//! positional `args` and a `kwargs` mapping; the server publishes them
//! under the configured realm prefix. The guild id is stamped by the
//! player at emission, everything else is set at construction.

use arientry::Entry;
use serde_json::{Map, Value};

/// One player event, not yet bound to a guild.
#[derive(Debug, Clone, PartialEq)]
pub enum AriEvent {
    /// Voice channel joined (`Some`) or left (`None`).
    Connect { channel_id: Option<u64> },
    /// The playing view changed in some way.
    PlayUpdate {
        entry: Option<Entry>,
        paused: bool,
        position: Option<f64>,
    },
    /// A new entry started (or playback ended, `None`).
    Play { entry: Option<Entry> },
    Pause { paused: bool },
    Seek { position: f64 },
    VolumeChange { old: f64, new: f64 },
    Stop,
    QueueAdd { entry: Entry, position: i64 },
    QueueRemove { entry: Entry },
    QueueMove { entry: Entry, position: i64 },
    HistoryAdd { entry: Entry },
    HistoryRemove { entry: Entry },
}

/// An event stamped with the guild it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub guild_id: u64,
    pub event: AriEvent,
}

fn entry_arg(entry: &Option<Entry>) -> Value {
    entry.as_ref().map_or(Value::Null, Entry::as_dict)
}

impl AriEvent {
    /// Publication URI suffix.
    pub fn uri(&self) -> &'static str {
        match self {
            AriEvent::Connect { .. } => "on_connect",
            AriEvent::PlayUpdate { .. } => "on_play_update",
            AriEvent::Play { .. } => "on_play",
            AriEvent::Pause { .. } => "on_pause",
            AriEvent::Seek { .. } => "on_seek",
            AriEvent::VolumeChange { .. } => "on_volume_change",
            AriEvent::Stop => "on_stop",
            AriEvent::QueueAdd { .. } => "on_queue_add",
            AriEvent::QueueRemove { .. } => "on_queue_remove",
            AriEvent::QueueMove { .. } => "on_queue_move",
            AriEvent::HistoryAdd { .. } => "on_history_add",
            AriEvent::HistoryRemove { .. } => "on_history_remove",
        }
    }

    /// Positional publication arguments. Guild ids cross the bus as
    /// decimal strings.
    pub fn args(&self, guild_id: u64) -> Vec<Value> {
        let guild = Value::String(guild_id.to_string());

        match self {
            AriEvent::Connect { channel_id } => vec![
                guild,
                channel_id.map_or(Value::Null, |id| Value::String(id.to_string())),
            ],
            AriEvent::PlayUpdate { .. } => vec![guild],
            AriEvent::Play { entry } => vec![guild, entry_arg(entry)],
            AriEvent::Pause { paused } => vec![guild, Value::Bool(*paused)],
            AriEvent::Seek { position } => vec![guild, (*position).into()],
            AriEvent::VolumeChange { old, new } => vec![guild, (*old).into(), (*new).into()],
            AriEvent::Stop => vec![guild],
            AriEvent::QueueAdd { entry, .. }
            | AriEvent::QueueRemove { entry }
            | AriEvent::QueueMove { entry, .. }
            | AriEvent::HistoryAdd { entry }
            | AriEvent::HistoryRemove { entry } => vec![guild, entry.as_dict()],
        }
    }

    /// Keyword publication arguments.
    pub fn kwargs(&self) -> Map<String, Value> {
        let mut kwargs = Map::new();

        match self {
            AriEvent::PlayUpdate {
                entry,
                paused,
                position,
            } => {
                kwargs.insert("entry".into(), entry_arg(entry));
                kwargs.insert("paused".into(), Value::Bool(*paused));
                kwargs.insert(
                    "position".into(),
                    position.map_or(Value::Null, Into::into),
                );
            }
            AriEvent::QueueAdd { position, .. } | AriEvent::QueueMove { position, .. } => {
                kwargs.insert("position".into(), (*position).into());
            }
            _ => {}
        }

        kwargs
    }
}
