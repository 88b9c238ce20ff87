//! Tests d'intégration du Player et du PlayerManager.
//!
//! Redis-backed like the entry-list suite: connects to
//! `redis://127.0.0.1/` (override with `ARI_TEST_REDIS`) and passes
//! vacuously when no server is reachable. The audio node is a recording
//! mock, the metadata service a canned resolver.

use std::sync::{Arc, Mutex};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc::UnboundedReceiver;

use arientry::{Entry, EntryList, Whence, new_aid};
use arinode::model::outgoing::OutgoingOp;
use arinode::{AudioNode, AudioSource, Chapter, NodePlayer, TrackEnd, TrackEndReason};
use ariplayer::{AriEvent, PlayerEvent, PlayerManager, PlayerState, TrackResolver, VoiceCorrelator, VoiceState};

#[derive(Clone, Default)]
struct MockNode {
    ops: Arc<Mutex<Vec<OutgoingOp>>>,
}

impl MockNode {
    fn ops(&self) -> Vec<OutgoingOp> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AudioNode for MockNode {
    async fn send(&self, op: OutgoingOp) -> arinode::Result<()> {
        self.ops.lock().unwrap().push(op);
        Ok(())
    }
}

struct CannedResolver;

#[async_trait::async_trait]
impl TrackResolver for CannedResolver {
    async fn resolve(&self, eid: &str) -> ariplayer::Result<AudioSource> {
        Ok(AudioSource {
            source: "test".into(),
            identifier: eid.into(),
            uri: format!("https://tracks.invalid/{eid}"),
            start_offset: 0.0,
            end_offset: 180.0,
            is_live: false,
        })
    }

    async fn chapters(&self, _eid: &str) -> ariplayer::Result<Option<Vec<Chapter>>> {
        Ok(None)
    }
}

struct Fixture {
    manager: PlayerManager,
    node: MockNode,
    events: UnboundedReceiver<PlayerEvent>,
    conn: ConnectionManager,
    prefix: String,
}

async fn fixture() -> Option<Fixture> {
    let address =
        std::env::var("ARI_TEST_REDIS").unwrap_or_else(|_| "redis://127.0.0.1/".to_owned());
    let client = redis::Client::open(address).ok()?;
    let conn = match client.get_connection_manager().await {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("skipping: no redis instance ({err})");
            return None;
        }
    };

    let prefix = format!("ari:tests:players:{}", rand::random::<u32>());
    let node = MockNode::default();
    let manager = PlayerManager::new(
        conn.clone(),
        prefix.clone(),
        Arc::new(node.clone()),
        Arc::new(CannedResolver),
    );
    let events = manager.subscribe();

    Some(Fixture {
        manager,
        node,
        events,
        conn,
        prefix,
    })
}

fn drain(events: &mut UnboundedReceiver<PlayerEvent>) -> Vec<AriEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event.event);
    }
    drained
}

fn entry(eid: &str) -> Entry {
    Entry::new(new_aid(), eid)
}

/// What the node would push once it actually plays: a snapshot with a
/// position. Without one, the player treats itself as idle.
async fn simulate_playing(fx: &Fixture, guild_id: u64) {
    let state = PlayerState::new(fx.conn.clone(), &format!("{}:{guild_id}", fx.prefix));
    state
        .set_node_player(Some(&NodePlayer {
            position: Some(1.0),
            live_position: Some(1.0),
            ..NodePlayer::default()
        }))
        .await
        .unwrap();
}

fn track_end(guild_id: u64, reason: TrackEndReason) -> TrackEnd {
    TrackEnd {
        guild_id,
        track: String::new(),
        reason,
    }
}

#[tokio::test]
async fn test_player_connect_starts_the_queue() {
    let Some(mut fx) = fixture().await else { return };
    let guild_id = 7;
    let player = fx.manager.get(guild_id);
    let e1 = entry("entry-1");

    player.enqueue(e1.clone()).await.unwrap();
    assert_eq!(
        drain(&mut fx.events),
        [AriEvent::QueueAdd {
            entry: e1.clone(),
            position: 0
        }]
    );

    player.on_connect(42).await.unwrap();
    let events = drain(&mut fx.events);
    assert_eq!(events[0], AriEvent::Connect { channel_id: Some(42) });
    assert_eq!(events[1], AriEvent::QueueRemove { entry: e1.clone() });
    assert_eq!(events[2], AriEvent::Play { entry: Some(e1.clone()) });
    assert!(matches!(
        &events[3],
        AriEvent::PlayUpdate { entry: Some(current), paused: false, position: Some(p) }
            if current == &e1 && *p == 0.0
    ));
    assert_eq!(events.len(), 4);

    // the node was told to play the synthesized descriptor
    let ops = fx.node.ops();
    assert!(
        matches!(&ops[..], [OutgoingOp::Play { guild_id: 7, play }] if !play.track.is_empty())
    );

    assert_eq!(player.current().await.unwrap(), Some(e1.clone()));
    assert_eq!(player.queue().length().await.unwrap(), 0);

    // track ends, nothing queued: history grows, playback stops
    player
        .on_track_end(&track_end(guild_id, TrackEndReason::Finished))
        .await
        .unwrap();
    let events = drain(&mut fx.events);
    assert_eq!(events[0], AriEvent::HistoryAdd { entry: e1.clone() });
    assert_eq!(events[1], AriEvent::Play { entry: None });
    assert!(matches!(&events[2], AriEvent::PlayUpdate { entry: None, .. }));

    assert_eq!(player.current().await.unwrap(), None);
    assert_eq!(
        player.history().get_by_index(0).await.unwrap(),
        Some(e1)
    );
}

#[tokio::test]
async fn test_track_end_without_autostart_keeps_the_queue() {
    let Some(mut fx) = fixture().await else { return };
    let player = fx.manager.get(7);
    let (e1, e2) = (entry("entry-1"), entry("entry-2"));

    player.enqueue(e1.clone()).await.unwrap();
    player.on_connect(42).await.unwrap();
    simulate_playing(&fx, 7).await;
    player.enqueue(e2.clone()).await.unwrap();
    drain(&mut fx.events);

    player
        .on_track_end(&track_end(7, TrackEndReason::Stopped))
        .await
        .unwrap();

    // only the history bookkeeping, no next Play
    assert_eq!(
        drain(&mut fx.events),
        [AriEvent::HistoryAdd { entry: e1 }]
    );
    assert_eq!(player.queue().length().await.unwrap(), 1);
}

#[tokio::test]
async fn test_previous_requeues_the_current_entry() {
    let Some(mut fx) = fixture().await else { return };
    let player = fx.manager.get(7);
    let (e1, e2) = (entry("entry-1"), entry("entry-2"));

    player.enqueue(e1.clone()).await.unwrap();
    player.on_connect(42).await.unwrap();
    simulate_playing(&fx, 7).await;
    player.enqueue(e2.clone()).await.unwrap();
    player
        .on_track_end(&track_end(7, TrackEndReason::Finished))
        .await
        .unwrap();
    // now playing e2, history [e1]
    drain(&mut fx.events);

    player.previous().await.unwrap();

    let events = drain(&mut fx.events);
    assert_eq!(events[0], AriEvent::HistoryRemove { entry: e1.clone() });
    assert_eq!(
        events[1],
        AriEvent::QueueAdd {
            entry: e2.clone(),
            position: 0
        }
    );
    assert_eq!(events[2], AriEvent::Play { entry: Some(e1.clone()) });

    assert_eq!(player.current().await.unwrap(), Some(e1));
    assert_eq!(player.queue().get_by_index(0).await.unwrap(), Some(e2));
}

#[tokio::test]
async fn test_dequeue_and_move_report_positions() {
    let Some(mut fx) = fixture().await else { return };
    let player = fx.manager.get(7);
    let entries: Vec<Entry> = (1..=4).map(|i| entry(&format!("entry-{i}"))).collect();

    for e in &entries {
        player.enqueue(e.clone()).await.unwrap();
    }
    drain(&mut fx.events);

    assert!(!player.dequeue("missing").await.unwrap());
    assert!(player.dequeue(&entries[1].aid).await.unwrap());
    assert_eq!(
        drain(&mut fx.events),
        [AriEvent::QueueRemove {
            entry: entries[1].clone()
        }]
    );

    // queue is now [e1, e3, e4]; move e1 after the last entry
    assert!(
        player
            .move_entry(&entries[0].aid, 2, Whence::After)
            .await
            .unwrap()
    );
    assert_eq!(
        drain(&mut fx.events),
        [AriEvent::QueueMove {
            entry: entries[0].clone(),
            position: 2
        }]
    );
    assert_eq!(player.queue().index(&entries[0].aid).await.unwrap(), 2);

    assert!(!player.move_entry("missing", 0, Whence::Absolute).await.unwrap());
}

#[tokio::test]
async fn test_disconnect_pauses_and_clears_voice_state() {
    let Some(mut fx) = fixture().await else { return };
    let player = fx.manager.get(7);

    player.on_connect(42).await.unwrap();
    drain(&mut fx.events);

    player.on_disconnect().await.unwrap();

    let events = drain(&mut fx.events);
    assert_eq!(events[0], AriEvent::Pause { paused: true });
    assert!(matches!(&events[1], AriEvent::PlayUpdate { .. }));
    assert_eq!(events[2], AriEvent::Connect { channel_id: None });

    let state = PlayerState::new(fx.conn.clone(), &format!("{}:{}", fx.prefix, 7));
    assert!(!state.connected().await.unwrap());
    assert_eq!(state.voice_server_update().await.unwrap(), None);
}

#[tokio::test]
async fn test_set_volume_defaults_the_old_value() {
    let Some(mut fx) = fixture().await else { return };
    let player = fx.manager.get(7);

    player.set_volume(0.5).await.unwrap();
    assert_eq!(
        drain(&mut fx.events),
        [AriEvent::VolumeChange { old: 1.0, new: 0.5 }]
    );

    let state = PlayerState::new(fx.conn.clone(), &format!("{}:{}", fx.prefix, 7));
    state
        .set_node_player(Some(&NodePlayer {
            volume: 0.5,
            ..NodePlayer::default()
        }))
        .await
        .unwrap();

    player.set_volume(0.8).await.unwrap();
    assert_eq!(
        drain(&mut fx.events),
        [AriEvent::VolumeChange { old: 0.5, new: 0.8 }]
    );
}

#[tokio::test]
async fn test_stop_clears_queue_and_current() {
    let Some(mut fx) = fixture().await else { return };
    let player = fx.manager.get(7);

    player.enqueue(entry("entry-1")).await.unwrap();
    player.on_connect(42).await.unwrap();
    player.enqueue(entry("entry-2")).await.unwrap();
    drain(&mut fx.events);

    player.stop().await.unwrap();

    assert_eq!(drain(&mut fx.events), [AriEvent::Stop]);
    assert_eq!(player.queue().length().await.unwrap(), 0);
    assert_eq!(player.current().await.unwrap(), None);
    assert!(matches!(
        fx.node.ops().last(),
        Some(OutgoingOp::Stop { guild_id: 7 })
    ));
}

#[tokio::test]
async fn test_manager_keeps_one_player_per_guild() {
    let Some(fx) = fixture().await else { return };

    let first = fx.manager.get(7);
    let second = fx.manager.get(7);
    assert!(Arc::ptr_eq(&first, &second));

    let other = fx.manager.get(8);
    assert!(!Arc::ptr_eq(&first, &other));
}

#[tokio::test]
async fn test_recover_state_replays_the_cached_node_state() {
    let Some(fx) = fixture().await else { return };
    let guild_id = 7;

    // what a crashed process would have left behind
    let state = PlayerState::new(fx.conn.clone(), &format!("{}:{guild_id}", fx.prefix));
    state
        .set_voice_server_update(Some(&arinode::VoiceServerUpdate {
            session_id: "af83".into(),
            event: serde_json::json!({"token": "t", "endpoint": "eu"}),
        }))
        .await
        .unwrap();
    state
        .set_node_player(Some(&NodePlayer {
            position: Some(42.5),
            paused: true,
            volume: 0.7,
            ..NodePlayer::default()
        }))
        .await
        .unwrap();
    state.set_track(Some("QAAA-cached")).await.unwrap();

    let mut conn = fx.conn.clone();
    let () = conn
        .sadd(format!("{}:connected_players", fx.prefix), guild_id)
        .await
        .unwrap();

    fx.manager.recover_state().await.unwrap();

    let ops = fx.node.ops();
    assert!(matches!(
        &ops[0],
        OutgoingOp::VoiceServerUpdate { guild_id: 7, update } if update.session_id == "af83"
    ));
    assert!(matches!(
        &ops[1],
        OutgoingOp::Play { guild_id: 7, play }
            if play.track == "QAAA-cached"
                && play.start == Some(42.5)
                && play.pause == Some(true)
                && play.volume == Some(0.7)
    ));
}

#[tokio::test]
async fn test_correlator_pairs_the_voice_handshake() {
    let Some(mut fx) = fixture().await else { return };
    let correlator = VoiceCorrelator::new(1, fx.manager.clone(), Arc::new(fx.node.clone()));

    // the server half alone does nothing
    correlator
        .on_voice_server_update(7, serde_json::json!({"token": "t"}))
        .await
        .unwrap();
    assert!(fx.node.ops().is_empty());

    // a foreign user's state is ignored entirely
    correlator
        .on_voice_state_update(VoiceState {
            user_id: 999,
            session_id: "other".into(),
            guild_id: Some(7),
            channel_id: Some(42),
        })
        .await
        .unwrap();
    assert!(fx.node.ops().is_empty());

    // our state completes the pair: node update, then player connect
    correlator
        .on_voice_state_update(VoiceState {
            user_id: 1,
            session_id: "af83".into(),
            guild_id: Some(7),
            channel_id: Some(42),
        })
        .await
        .unwrap();

    assert!(matches!(
        &fx.node.ops()[..],
        [OutgoingOp::VoiceServerUpdate { guild_id: 7, update }, ..]
            if update.session_id == "af83" && update.event["token"] == "t"
    ));
    let events = drain(&mut fx.events);
    assert_eq!(events[0], AriEvent::Connect { channel_id: Some(42) });

    // a disconnect needs no server half and clears the player
    correlator
        .on_voice_state_update(VoiceState {
            user_id: 1,
            session_id: "af83".into(),
            guild_id: Some(7),
            channel_id: None,
        })
        .await
        .unwrap();
    let events = drain(&mut fx.events);
    assert!(events.contains(&AriEvent::Connect { channel_id: None }));
}
