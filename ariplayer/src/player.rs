//! Per-guild player state machine.
//!
//! A player owns two entry lists (queue and history), its scalar state and
//! nothing else: the audio node does the playing, Redis does the
//! remembering. Commands are serialized through a per-guild mutex so the
//! RPC dispatcher and the voice correlator cannot interleave, and every
//! mutation is delegated to an atomic Redis primitive, so a cancelled
//! command can at worst lose an event, never tear the state.
//!
//! An entry travels queue → current → history; `previous` is the only way
//! back.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::try_join;
use tracing::debug;

use arientry::{Entry, EntryList, EntryListMut, RedisEntryList, StoreError, Whence};
use arinode::{AudioNode, PlayTrack, TrackEnd, encode_track};

use crate::bus::EventBus;
use crate::error::Result;
use crate::events::{AriEvent, PlayerEvent};
use crate::manager::ConnectedPlayers;
use crate::resolver::TrackResolver;
use crate::state::PlayerState;

/// Don't step back into the chapter the listener barely left.
const PREVIOUS_CHAPTER_GRACE: f64 = 5.0;

/// Player of one guild.
pub struct Player {
    guild_id: u64,
    queue: RedisEntryList,
    history: RedisEntryList,
    state: PlayerState,
    node: Arc<dyn AudioNode>,
    resolver: Arc<dyn TrackResolver>,
    events: EventBus,
    connected_players: ConnectedPlayers,
    lock: Mutex<()>,
}

impl Player {
    pub(crate) fn new(
        guild_id: u64,
        conn: ConnectionManager,
        player_key: &str,
        node: Arc<dyn AudioNode>,
        resolver: Arc<dyn TrackResolver>,
        events: EventBus,
        connected_players: ConnectedPlayers,
    ) -> Self {
        Self {
            guild_id,
            queue: RedisEntryList::new(conn.clone(), &format!("{player_key}:queue")),
            history: RedisEntryList::new(conn.clone(), &format!("{player_key}:history")),
            state: PlayerState::new(conn, player_key),
            node,
            resolver,
            events,
            connected_players,
            lock: Mutex::new(()),
        }
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    /// Queued entries. Read-only from the outside.
    pub fn queue(&self) -> &RedisEntryList {
        &self.queue
    }

    /// Played entries, most recent first. Read-only from the outside.
    pub fn history(&self) -> &RedisEntryList {
        &self.history
    }

    pub async fn current(&self) -> Result<Option<Entry>> {
        self.state.current().await
    }

    fn emit(&self, event: AriEvent) {
        self.events.emit(PlayerEvent {
            guild_id: self.guild_id,
            event,
        });
    }

    // ---- commands -------------------------------------------------------

    /// The voice transport connected to a channel.
    pub async fn on_connect(&self, channel_id: u64) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!(guild_id = self.guild_id, channel_id, "player connected");

        self.state.set_connected(true).await?;
        self.connected_players.add(self.guild_id).await?;

        self.emit(AriEvent::Connect {
            channel_id: Some(channel_id),
        });

        self.update(true).await
    }

    /// The voice transport left the channel.
    pub async fn on_disconnect(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!(guild_id = self.guild_id, "player disconnected");

        self.state.set_connected(false).await?;
        self.connected_players.remove(self.guild_id).await?;
        self.state.set_voice_server_update(None).await?;
        self.pause_inner(true).await?;

        self.emit(AriEvent::Connect { channel_id: None });
        Ok(())
    }

    /// The node reported the end of the current track.
    pub async fn on_track_end(&self, event: &TrackEnd) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!(guild_id = self.guild_id, reason = ?event.reason, "track ended");

        if let Some(current) = self.state.current().await? {
            self.history.add_start(&current).await?;
            self.emit(AriEvent::HistoryAdd { entry: current });
        }

        if event.may_start_next() {
            self.next_inner().await?;
        }

        Ok(())
    }

    pub async fn pause(&self, pause: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.pause_inner(pause).await
    }

    /// Seek the current track to the given position in seconds.
    pub async fn seek(&self, position: f64) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.seek_inner(position).await
    }

    /// Stop playing and drop the whole queue.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        let (stop, clear) = tokio::join!(self.node.stop(self.guild_id), self.queue.clear());
        stop?;
        clear?;
        self.state.set_current(None).await?;

        self.emit(AriEvent::Stop);
        Ok(())
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        let _guard = self.lock.lock().await;

        let old = self
            .state
            .node_player()
            .await?
            .map_or(1.0, |player| player.volume);

        self.node.volume(self.guild_id, volume).await?;

        self.emit(AriEvent::VolumeChange { old, new: volume });
        Ok(())
    }

    /// Append an entry to the queue.
    pub async fn enqueue(&self, entry: Entry) -> Result<()> {
        let _guard = self.lock.lock().await;

        self.queue.add_end(&entry).await?;
        let position = self.queue.length().await? - 1;
        self.emit(AriEvent::QueueAdd { entry, position });

        self.update(false).await
    }

    /// Remove an entry from the queue. True iff it was queued.
    pub async fn dequeue(&self, aid: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;

        let Some(entry) = self.queue.get_by_aid(aid).await? else {
            return Ok(false);
        };

        let removed = self.queue.remove(aid).await?;
        if removed {
            self.emit(AriEvent::QueueRemove { entry });
        }

        Ok(removed)
    }

    /// Move a queued entry. True iff the move happened.
    pub async fn move_entry(&self, aid: &str, index: i64, whence: Whence) -> Result<bool> {
        let _guard = self.lock.lock().await;

        let Some(entry) = self.queue.get_by_aid(aid).await? else {
            return Ok(false);
        };

        // settled position, computed against the pre-move order
        let position = match self.queue.to_absolute_index(aid, index, whence).await {
            Ok(position) => position,
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        let moved = self.queue.move_entry(aid, index, whence).await?;
        if moved {
            self.emit(AriEvent::QueueMove { entry, position });
        }

        Ok(moved)
    }

    /// Play the next entry from the queue.
    pub async fn next(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.next_inner().await
    }

    /// Play the previous entry from the history, pushing the current one
    /// back onto the queue.
    pub async fn previous(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.previous_inner().await
    }

    /// Step to the next chapter of the current entry, or to the next entry
    /// when there are no chapters (left).
    pub async fn next_chapter(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some((chapters, position)) = self.current_chapters().await? {
            let target = chapters
                .iter()
                .map(|chapter| chapter.start)
                .filter(|start| *start > position)
                .fold(None, |best: Option<f64>, start| {
                    Some(best.map_or(start, |best| best.min(start)))
                });

            if let Some(target) = target {
                return self.seek_inner(target).await;
            }
        }

        self.next_inner().await
    }

    /// Step to the previous chapter of the current entry, or to the
    /// previous entry when there is none.
    pub async fn previous_chapter(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some((chapters, position)) = self.current_chapters().await? {
            let target = chapters
                .iter()
                .map(|chapter| chapter.start)
                .filter(|start| *start <= position - PREVIOUS_CHAPTER_GRACE)
                .fold(None, |best: Option<f64>, start| {
                    Some(best.map_or(start, |best| best.max(start)))
                });

            if let Some(target) = target {
                return self.seek_inner(target.max(0.0)).await;
            }
        }

        self.previous_inner().await
    }

    /// Replay the cached node-side state after a process restart: voice
    /// credentials first, then the track at its last known position.
    pub async fn recover_state(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        debug!(guild_id = self.guild_id, "recovering node state");

        let (voice, snapshot, track) = try_join!(
            self.state.voice_server_update(),
            self.state.node_player(),
            self.state.track(),
        )?;

        if let Some(voice) = voice {
            self.node.voice_server_update(self.guild_id, voice).await?;
        }

        if let Some(track) = track {
            let snapshot = snapshot.unwrap_or_default();
            self.node
                .play(
                    self.guild_id,
                    PlayTrack {
                        track,
                        start: snapshot.position,
                        end: None,
                        pause: Some(snapshot.paused),
                        volume: Some(snapshot.volume),
                    },
                )
                .await?;
        }

        self.update(false).await
    }

    // ---- internals ------------------------------------------------------

    async fn pause_inner(&self, pause: bool) -> Result<()> {
        self.node.pause(self.guild_id, pause).await?;

        self.emit(AriEvent::Pause { paused: pause });
        self.emit_play_update(Some(pause), None).await
    }

    async fn seek_inner(&self, position: f64) -> Result<()> {
        self.node.seek(self.guild_id, position).await?;

        self.emit(AriEvent::Seek { position });
        self.emit_play_update(None, Some(position)).await
    }

    async fn next_inner(&self) -> Result<()> {
        let entry = self.queue.pop_start().await?;
        if let Some(entry) = &entry {
            self.emit(AriEvent::QueueRemove {
                entry: entry.clone(),
            });
        }

        self.play(entry).await
    }

    async fn previous_inner(&self) -> Result<()> {
        let entry = self.history.pop_start().await?;
        if let Some(entry) = &entry {
            self.emit(AriEvent::HistoryRemove {
                entry: entry.clone(),
            });
        }

        if let Some(current) = self.state.current().await? {
            self.queue.add_start(&current).await?;
            self.emit(AriEvent::QueueAdd {
                entry: current,
                position: 0,
            });
        }

        self.play(entry).await
    }

    /// Start playing an entry, or stop when there is none.
    async fn play(&self, entry: Option<Entry>) -> Result<()> {
        let mut started_at = None;

        match &entry {
            Some(entry) => {
                let audio = self.resolver.resolve(&entry.eid).await?;
                let track = encode_track(&audio);
                started_at = Some(audio.start_offset);

                self.node
                    .play(
                        self.guild_id,
                        PlayTrack {
                            track,
                            start: Some(audio.start_offset),
                            end: Some(audio.end_offset),
                            pause: None,
                            volume: None,
                        },
                    )
                    .await?;
                self.state.set_current(Some(entry)).await?;
            }
            None => {
                self.node.stop(self.guild_id).await?;
                self.state.set_current(None).await?;
            }
        }

        self.emit(AriEvent::Play { entry });
        self.emit_play_update(started_at.map(|_| false), started_at)
            .await
    }

    /// Reconcile the desired and the actual playing state.
    ///
    /// With `resume` a paused-but-connected player unpauses; otherwise a
    /// connected, idle, unpaused player starts the next queued entry.
    async fn update(&self, resume: bool) -> Result<()> {
        let (connected, current, snapshot) = try_join!(
            self.state.connected(),
            self.state.current(),
            self.state.node_player(),
        )?;

        let snapshot = snapshot.unwrap_or_default();
        let paused = snapshot.paused;
        // a snapshot without a position means the node isn't actually
        // playing, whatever the current key claims
        let current = if snapshot.position.is_none() {
            None
        } else {
            current
        };

        if resume && connected && paused {
            self.pause_inner(false).await
        } else if connected && current.is_none() && !paused {
            self.next_inner().await
        } else {
            Ok(())
        }
    }

    async fn emit_play_update(&self, paused: Option<bool>, position: Option<f64>) -> Result<()> {
        let (entry, snapshot) = try_join!(self.state.current(), self.state.node_player())?;
        let snapshot = snapshot.unwrap_or_default();

        self.emit(AriEvent::PlayUpdate {
            entry,
            paused: paused.unwrap_or(snapshot.paused),
            position: position.or(snapshot.live_position).or(snapshot.position),
        });

        Ok(())
    }

    async fn current_chapters(&self) -> Result<Option<(Vec<arinode::Chapter>, f64)>> {
        let Some(current) = self.state.current().await? else {
            return Ok(None);
        };

        let Some(chapters) = self.resolver.chapters(&current.eid).await? else {
            return Ok(None);
        };
        if chapters.is_empty() {
            return Ok(None);
        }

        let position = self
            .state
            .node_player()
            .await?
            .and_then(|snapshot| snapshot.live_position.or(snapshot.position))
            .unwrap_or(0.0);

        Ok(Some((chapters, position)))
    }
}
