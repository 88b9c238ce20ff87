//! Player registry and crash recovery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use arinode::{AudioNode, NodeEventHandler, PlayerUpdate, TrackEnd};

use crate::bus::EventBus;
use crate::error::Result;
use crate::events::PlayerEvent;
use crate::player::Player;
use crate::resolver::TrackResolver;
use crate::state::PlayerState;

/// The Redis set of guilds whose players were connected at some point
/// since their last clean disconnect. Only crash recovery reads it.
#[derive(Clone)]
pub struct ConnectedPlayers {
    conn: ConnectionManager,
    key: String,
}

impl ConnectedPlayers {
    fn new(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            key: format!("{prefix}:connected_players"),
        }
    }

    pub(crate) async fn add(&self, guild_id: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.sadd(&self.key, guild_id).await?;
        Ok(())
    }

    pub(crate) async fn remove(&self, guild_id: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.srem(&self.key, guild_id).await?;
        Ok(())
    }

    /// All remembered guild ids, gathered with SSCAN.
    pub(crate) async fn scan(&self) -> Result<Vec<u64>> {
        let mut conn = self.conn.clone();
        let mut guilds = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, members): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(&self.key)
                .arg(cursor)
                .query_async(&mut conn)
                .await?;

            guilds.extend(members.iter().filter_map(|member| member.parse::<u64>().ok()));

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(guilds)
    }
}

struct ManagerInner {
    conn: ConnectionManager,
    prefix: String,
    node: Arc<dyn AudioNode>,
    resolver: Arc<dyn TrackResolver>,
    players: StdMutex<HashMap<u64, Weak<Player>>>,
    events: EventBus,
    connected: ConnectedPlayers,
}

/// Registry of live players, at most one per guild.
///
/// Players are held weakly: when the last strong reference goes away the
/// in-memory object is discarded, the Redis state stays, and the next
/// [`get`](PlayerManager::get) rehydrates from it. The manager is also the
/// node's event handler — snapshot pushes refresh the cached node-side
/// state, track ends drive the players.
#[derive(Clone)]
pub struct PlayerManager {
    inner: Arc<ManagerInner>,
}

/// Recoveries running at once after a crash.
const RECOVERY_CONCURRENCY: usize = 10;

impl PlayerManager {
    pub fn new(
        conn: ConnectionManager,
        prefix: impl Into<String>,
        node: Arc<dyn AudioNode>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        let prefix = prefix.into();
        let connected = ConnectedPlayers::new(conn.clone(), &prefix);

        Self {
            inner: Arc::new(ManagerInner {
                conn,
                prefix,
                node,
                resolver,
                players: StdMutex::new(HashMap::new()),
                events: EventBus::new(),
                connected,
            }),
        }
    }

    /// Receive every event emitted by every player of this manager.
    pub fn subscribe(&self) -> UnboundedReceiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    /// The live player for a guild, creating one when needed.
    pub fn get(&self, guild_id: u64) -> Arc<Player> {
        let mut players = self.inner.players.lock().unwrap();
        players.retain(|_, weak| weak.strong_count() > 0);

        if let Some(player) = players.get(&guild_id).and_then(Weak::upgrade) {
            return player;
        }

        debug!(guild_id, "creating player");
        let player = Arc::new(Player::new(
            guild_id,
            self.inner.conn.clone(),
            &self.player_key(guild_id),
            self.inner.node.clone(),
            self.inner.resolver.clone(),
            self.inner.events.clone(),
            self.inner.connected.clone(),
        ));
        players.insert(guild_id, Arc::downgrade(&player));

        player
    }

    fn player_key(&self, guild_id: u64) -> String {
        format!("{}:{guild_id}", self.inner.prefix)
    }

    /// Rebuild node-side state for every player that was connected when
    /// the process last died. Runs before the server accepts calls.
    pub async fn recover_state(&self) -> Result<()> {
        let guilds = self.inner.connected.scan().await?;
        info!(players = guilds.len(), "recovering connected players");

        let semaphore = Arc::new(Semaphore::new(RECOVERY_CONCURRENCY));
        let mut recoveries = Vec::with_capacity(guilds.len());

        for guild_id in guilds {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let player = self.get(guild_id);

            recoveries.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = player.recover_state().await {
                    warn!(guild_id, %err, "player recovery failed");
                }
            }));
        }

        for recovery in recoveries {
            let _ = recovery.await;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl NodeEventHandler for PlayerManager {
    async fn on_player_update(&self, update: PlayerUpdate) {
        let state = PlayerState::new(self.inner.conn.clone(), &self.player_key(update.guild_id));

        if let Err(err) = state.set_node_player(Some(&update.state)).await {
            warn!(guild_id = update.guild_id, %err, "couldn't cache player update");
        }
    }

    async fn on_track_end(&self, event: TrackEnd) {
        let player = self.get(event.guild_id);

        if let Err(err) = player.on_track_end(&event).await {
            warn!(guild_id = event.guild_id, %err, "track end handling failed");
        }
    }
}
