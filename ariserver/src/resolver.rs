//! Metadata service over the bus.

use std::sync::Arc;

use serde_json::{Value, json};

use arinode::{AudioSource, Chapter};
use ariplayer::{PlayerError, TrackResolver};

use crate::bus::BusSession;

/// Resolves eids by calling the metadata service's bus procedures
/// (`<prefix>.get_audio_source`, `<prefix>.get_chapters`).
pub struct BusTrackResolver {
    session: Arc<dyn BusSession>,
    uri_prefix: String,
}

impl BusTrackResolver {
    pub fn new(session: Arc<dyn BusSession>, uri_prefix: impl Into<String>) -> Self {
        Self {
            session,
            uri_prefix: uri_prefix.into(),
        }
    }

    async fn call(&self, procedure: &str, eid: &str) -> ariplayer::Result<Value> {
        self.session
            .call(&format!("{}.{procedure}", self.uri_prefix), vec![json!(eid)])
            .await
            .map_err(|err| PlayerError::Metadata(err.to_string()))
    }
}

#[async_trait::async_trait]
impl TrackResolver for BusTrackResolver {
    async fn resolve(&self, eid: &str) -> ariplayer::Result<AudioSource> {
        let raw = self.call("get_audio_source", eid).await?;

        serde_json::from_value(raw)
            .map_err(|err| PlayerError::Metadata(format!("invalid audio source for {eid}: {err}")))
    }

    async fn chapters(&self, eid: &str) -> ariplayer::Result<Option<Vec<Chapter>>> {
        let raw = self.call("get_chapters", eid).await?;
        if raw.is_null() {
            return Ok(None);
        }

        serde_json::from_value(raw)
            .map(Some)
            .map_err(|err| PlayerError::Metadata(format!("invalid chapters for {eid}: {err}")))
    }
}
