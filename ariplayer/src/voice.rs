//! Voice-session handshake correlation.
//!
//! Connecting to a voice channel produces two independent bus events: the
//! voice *state* update (are we in a channel, with which session) and the
//! voice *server* update (the transport credentials the node needs). They
//! arrive in either order; the node wants them as one message. The
//! correlator holds the first half per guild until the second one shows
//! up, then ships the pair and clears it. Disconnects short-circuit — no
//! server half is coming for those.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use arinode::{AudioNode, VoiceServerUpdate};

use crate::error::Result;
use crate::manager::PlayerManager;

fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(raw) => raw.parse().map_err(D::Error::custom),
        Value::Number(raw) => raw
            .as_u64()
            .ok_or_else(|| D::Error::custom("snowflake out of range")),
        other => Err(D::Error::custom(format!("invalid snowflake: {other}"))),
    }
}

fn opt_snowflake<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(raw) => raw.parse().map(Some).map_err(D::Error::custom),
        Value::Number(raw) => raw
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("snowflake out of range")),
        other => Err(D::Error::custom(format!("invalid snowflake: {other}"))),
    }
}

/// Discord voice-state update, reduced to the fields we correlate on.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceState {
    #[serde(deserialize_with = "snowflake")]
    pub user_id: u64,
    pub session_id: String,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub guild_id: Option<u64>,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub channel_id: Option<u64>,
}

#[derive(Default)]
struct PendingVoiceUpdate {
    state: Option<VoiceState>,
    server: Option<Value>,
}

/// Pairs voice-state and voice-server updates per guild.
pub struct VoiceCorrelator {
    /// Discord user id of the bot; everyone else's voice states are noise.
    user_id: u64,
    manager: PlayerManager,
    node: Arc<dyn AudioNode>,
    pending: Mutex<HashMap<u64, PendingVoiceUpdate>>,
}

impl VoiceCorrelator {
    pub fn new(user_id: u64, manager: PlayerManager, node: Arc<dyn AudioNode>) -> Self {
        Self {
            user_id,
            manager,
            node,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn on_voice_state_update(&self, update: VoiceState) -> Result<()> {
        if update.user_id != self.user_id {
            return Ok(());
        }

        let Some(guild_id) = update.guild_id else {
            debug!("voice state without guild, ignoring");
            return Ok(());
        };

        if update.channel_id.is_none() {
            // a disconnect needs no server half
            self.pending.lock().unwrap().remove(&guild_id);
            return self.manager.get(guild_id).on_disconnect().await;
        }

        let complete = {
            let mut pending = self.pending.lock().unwrap();
            let slot = pending.entry(guild_id).or_default();
            slot.state = Some(update);
            take_complete(&mut pending, guild_id)
        };

        match complete {
            Some((state, server)) => self.complete(guild_id, state, server).await,
            None => Ok(()),
        }
    }

    pub async fn on_voice_server_update(&self, guild_id: u64, payload: Value) -> Result<()> {
        let complete = {
            let mut pending = self.pending.lock().unwrap();
            let slot = pending.entry(guild_id).or_default();
            slot.server = Some(payload);
            take_complete(&mut pending, guild_id)
        };

        match complete {
            Some((state, server)) => self.complete(guild_id, state, server).await,
            None => Ok(()),
        }
    }

    /// Both halves arrived: tell the node, then the player.
    async fn complete(&self, guild_id: u64, state: VoiceState, server: Value) -> Result<()> {
        debug!(guild_id, "voice handshake complete");

        self.node
            .voice_server_update(
                guild_id,
                VoiceServerUpdate {
                    session_id: state.session_id,
                    event: server,
                },
            )
            .await?;

        let player = self.manager.get(guild_id);
        match state.channel_id {
            Some(channel_id) => player.on_connect(channel_id).await,
            None => player.on_disconnect().await,
        }
    }
}

/// Remove and return the pair when both halves are present.
fn take_complete(
    pending: &mut HashMap<u64, PendingVoiceUpdate>,
    guild_id: u64,
) -> Option<(VoiceState, Value)> {
    let slot = pending.get(&guild_id)?;
    if slot.state.is_none() || slot.server.is_none() {
        return None;
    }

    let slot = pending.remove(&guild_id)?;
    Some((slot.state?, slot.server?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn voice_state_parses_string_and_numeric_snowflakes() {
        let update: VoiceState = serde_json::from_value(json!({
            "user_id": "81384788765712384",
            "session_id": "af83",
            "guild_id": 7,
            "channel_id": "42"
        }))
        .unwrap();

        assert_eq!(update.user_id, 81384788765712384);
        assert_eq!(update.guild_id, Some(7));
        assert_eq!(update.channel_id, Some(42));
    }

    #[test]
    fn voice_state_tolerates_missing_and_null_fields() {
        let update: VoiceState = serde_json::from_value(json!({
            "user_id": 1,
            "session_id": "af83",
            "channel_id": null
        }))
        .unwrap();

        assert_eq!(update.guild_id, None);
        assert_eq!(update.channel_id, None);
    }

    #[test]
    fn pairs_complete_only_with_both_halves() {
        let mut pending: HashMap<u64, PendingVoiceUpdate> = HashMap::new();

        pending.entry(7).or_default().server = Some(json!({"token": "t"}));
        assert!(take_complete(&mut pending, 7).is_none());

        pending.entry(7).or_default().state = Some(VoiceState {
            user_id: 1,
            session_id: "af83".into(),
            guild_id: Some(7),
            channel_id: Some(42),
        });
        let (state, server) = take_complete(&mut pending, 7).unwrap();
        assert_eq!(state.channel_id, Some(42));
        assert_eq!(server["token"], "t");

        // consumed: the pair is gone
        assert!(take_complete(&mut pending, 7).is_none());
        assert!(!pending.contains_key(&7));
    }
}
