//! Per-player scalar state in Redis.
//!
//! Keys live under the player prefix (`<namespace>:<guild>`):
//!   - `:connected`       — `"1"` while the player sits in a voice channel,
//!   - `:current`         — the MessagePack-encoded current entry,
//!   - `:andesite:player` — cached JSON snapshot of the node-side player,
//!   - `:andesite:voice`  — cached JSON voice-server update,
//!   - `:andesite:track`  — the opaque base64 descriptor in flight.
//!
//! Every key is independently present or absent. Cached values that fail
//! to decode are logged and treated as absent; a stale cache must degrade,
//! not fail commands.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use arientry::Entry;
use arinode::{NodePlayer, VoiceServerUpdate};

use crate::error::Result;

/// Typed access to one player's scalar keys.
#[derive(Clone)]
pub struct PlayerState {
    conn: ConnectionManager,
    key: String,
}

impl PlayerState {
    pub fn new(conn: ConnectionManager, player_key: &str) -> Self {
        Self {
            conn,
            key: player_key.to_owned(),
        }
    }

    pub async fn connected(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        let flag: Option<String> = conn.get(format!("{}:connected", self.key)).await?;
        Ok(flag.is_some())
    }

    pub async fn set_connected(&self, connected: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = format!("{}:connected", self.key);

        if connected {
            let () = conn.set(key, "1").await?;
        } else {
            let () = conn.del(key).await?;
        }

        Ok(())
    }

    pub async fn current(&self) -> Result<Option<Entry>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(format!("{}:current", self.key)).await?;

        Ok(raw.and_then(|raw| match rmp_serde::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key = %self.key, %err, "couldn't decode current entry");
                None
            }
        }))
    }

    pub async fn set_current(&self, entry: Option<&Entry>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = format!("{}:current", self.key);

        match entry {
            Some(entry) => {
                let raw = rmp_serde::to_vec(entry)?;
                let () = conn.set(key, raw).await?;
            }
            None => {
                let () = conn.del(key).await?;
            }
        }

        Ok(())
    }

    pub async fn node_player(&self) -> Result<Option<NodePlayer>> {
        self.get_json(&format!("{}:andesite:player", self.key)).await
    }

    pub async fn set_node_player(&self, player: Option<&NodePlayer>) -> Result<()> {
        self.set_json(&format!("{}:andesite:player", self.key), player)
            .await
    }

    pub async fn voice_server_update(&self) -> Result<Option<VoiceServerUpdate>> {
        self.get_json(&format!("{}:andesite:voice", self.key)).await
    }

    pub async fn set_voice_server_update(&self, update: Option<&VoiceServerUpdate>) -> Result<()> {
        self.set_json(&format!("{}:andesite:voice", self.key), update)
            .await
    }

    pub async fn track(&self) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(format!("{}:andesite:track", self.key)).await?)
    }

    pub async fn set_track(&self, track: Option<&str>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = format!("{}:andesite:track", self.key);

        match track {
            Some(track) => {
                let () = conn.set(key, track).await?;
            }
            None => {
                let () = conn.del(key).await?;
            }
        }

        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;

        Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "couldn't decode cached value");
                None
            }
        }))
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: Option<&T>) -> Result<()> {
        let mut conn = self.conn.clone();

        match value {
            Some(value) => match serde_json::to_string(value) {
                Ok(raw) => {
                    let () = conn.set(key, raw).await?;
                }
                Err(err) => {
                    // an unencodable cache value is a degradation, not a failure
                    warn!(key, %err, "couldn't encode cached value");
                }
            },
            None => {
                let () = conn.del(key).await?;
            }
        }

        Ok(())
    }
}
