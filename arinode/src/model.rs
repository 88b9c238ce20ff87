//! Models to (de)serialize the audio-node websocket traffic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialize guild ids the way the node expects them: decimal strings.
pub(crate) mod guild_id_str {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Node-side view of one player, cached between player updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePlayer {
    /// Node-side timestamp of the snapshot, unix millis.
    #[serde(default)]
    pub time: Option<f64>,
    /// Track position in seconds at snapshot time. Absent when the node
    /// is not actually playing anything.
    #[serde(default)]
    pub position: Option<f64>,
    pub paused: bool,
    pub volume: f64,
    /// Position extrapolated to "now" by the node.
    #[serde(default)]
    pub live_position: Option<f64>,
}

impl Default for NodePlayer {
    fn default() -> Self {
        Self {
            time: None,
            position: None,
            paused: false,
            volume: 1.0,
            live_position: None,
        }
    }
}

/// Voice transport credentials forwarded to the node once both halves of
/// the Discord handshake arrived. `event` is the raw voice-server payload,
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceServerUpdate {
    pub session_id: String,
    pub event: Value,
}

/// Play request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayTrack {
    /// Opaque base64 track descriptor.
    pub track: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

pub mod outgoing {
    //! Operations sent to the node.

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(tag = "op", rename_all = "camelCase")]
    pub enum OutgoingOp {
        #[serde(rename_all = "camelCase")]
        Play {
            #[serde(with = "guild_id_str")]
            guild_id: u64,
            #[serde(flatten)]
            play: PlayTrack,
        },
        #[serde(rename_all = "camelCase")]
        Stop {
            #[serde(with = "guild_id_str")]
            guild_id: u64,
        },
        #[serde(rename_all = "camelCase")]
        Pause {
            #[serde(with = "guild_id_str")]
            guild_id: u64,
            pause: bool,
        },
        #[serde(rename_all = "camelCase")]
        Seek {
            #[serde(with = "guild_id_str")]
            guild_id: u64,
            /// Seconds.
            position: f64,
        },
        #[serde(rename_all = "camelCase")]
        Volume {
            #[serde(with = "guild_id_str")]
            guild_id: u64,
            volume: f64,
        },
        #[serde(rename_all = "camelCase")]
        VoiceServerUpdate {
            #[serde(with = "guild_id_str")]
            guild_id: u64,
            #[serde(flatten)]
            update: VoiceServerUpdate,
        },
    }
}

/// Why a track stopped playing, as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the player is allowed to start the next queued track after
    /// this kind of end.
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

/// A track finished, failed or was replaced on the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEnd {
    #[serde(with = "guild_id_str")]
    pub guild_id: u64,
    /// The descriptor that was playing.
    pub track: String,
    pub reason: TrackEndReason,
}

impl TrackEnd {
    pub fn may_start_next(&self) -> bool {
        self.reason.may_start_next()
    }
}

/// Snapshot push from the node for one guild.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(with = "guild_id_str")]
    pub guild_id: u64,
    pub state: NodePlayer,
}
