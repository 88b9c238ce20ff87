//! Tests d'intégration du façade RPC.
//!
//! Same Redis gating as the other suites; the bus session and the audio
//! node are recording mocks.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};

use arinode::AudioNode;
use arinode::model::outgoing::OutgoingOp;
use ariplayer::{PlayerManager, TrackResolver};
use ariserver::{AriServer, BusError, BusSession, RpcError};

#[derive(Clone, Default)]
struct MockNode {
    ops: Arc<Mutex<Vec<OutgoingOp>>>,
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
    async fn resolve(&self, eid: &str) -> ariplayer::Result<arinode::AudioSource> {
        Ok(arinode::AudioSource {
            source: "test".into(),
            identifier: eid.into(),
            uri: format!("https://tracks.invalid/{eid}"),
            start_offset: 0.0,
            end_offset: 60.0,
            is_live: false,
        })
    }

    async fn chapters(&self, _eid: &str) -> ariplayer::Result<Option<Vec<arinode::Chapter>>> {
        Ok(None)
    }
}

#[derive(Clone, Default)]
struct MockSession {
    published: Arc<Mutex<Vec<(String, Vec<Value>, Map<String, Value>)>>>,
    called: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

#[async_trait::async_trait]
impl BusSession for MockSession {
    async fn publish(
        &self,
        uri: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<(), BusError> {
        self.published.lock().unwrap().push((uri.to_owned(), args, kwargs));
        Ok(())
    }

    async fn call(&self, uri: &str, args: Vec<Value>) -> Result<Value, BusError> {
        self.called.lock().unwrap().push((uri.to_owned(), args));
        Ok(Value::Null)
    }
}

struct Fixture {
    server: Arc<AriServer>,
    session: MockSession,
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

    let prefix = format!("ari:tests:server:{}", rand::random::<u32>());
    let node = MockNode::default();
    let manager = PlayerManager::new(
        conn,
        prefix,
        Arc::new(node.clone()),
        Arc::new(CannedResolver),
    );

    let session = MockSession::default();
    let server = AriServer::new(
        manager,
        Arc::new(node),
        Arc::new(session.clone()),
        1,
        "io.giesela.ari",
    );

    Some(Fixture { server, session })
}

#[tokio::test]
async fn test_enqueue_returns_the_minted_aid_and_queue_pages() {
    let Some(fx) = fixture().await else { return };

    let aid = fx
        .server
        .dispatch("enqueue", &[json!("7"), json!("eid-1")])
        .await
        .unwrap();
    let aid = aid.as_str().unwrap().to_owned();
    assert_eq!(aid.len(), 32);

    for i in 2..=3 {
        fx.server
            .dispatch("enqueue", &[json!("7"), json!(format!("eid-{i}"))])
            .await
            .unwrap();
    }

    let page = fx
        .server
        .dispatch("queue", &[json!("7"), json!(0)])
        .await
        .unwrap();
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(page[0]["aid"], json!(aid));
    assert_eq!(page[0]["eid"], "eid-1");
    assert!(page[0].get("meta").is_none());

    // explicit page size
    let short = fx
        .server
        .dispatch("queue", &[json!("7"), json!(1), json!(2)])
        .await
        .unwrap();
    assert_eq!(short.as_array().unwrap().len(), 1);

    // dequeue through the façade
    let removed = fx
        .server
        .dispatch("dequeue", &[json!("7"), json!(aid)])
        .await
        .unwrap();
    assert_eq!(removed, json!(true));
}

#[tokio::test]
async fn test_move_validates_whence() {
    let Some(fx) = fixture().await else { return };

    let err = fx
        .server
        .dispatch("move", &[json!("7"), json!("aid"), json!(0), json!("between")])
        .await
        .unwrap_err();

    match err {
        RpcError::InvalidArgument {
            possible_values: Some(values),
            ..
        } => assert_eq!(values, ["absolute", "before", "after"]),
        other => panic!("expected InvalidArgument, got {other:?}"),
    }

    // a well-formed move on an unknown aid is just false
    let moved = fx
        .server
        .dispatch("move", &[json!("7"), json!("aid"), json!(0), json!("absolute")])
        .await
        .unwrap();
    assert_eq!(moved, json!(false));
}

#[tokio::test]
async fn test_unknown_procedures_and_bad_args_are_rejected() {
    let Some(fx) = fixture().await else { return };

    assert!(matches!(
        fx.server.dispatch("destroy", &[]).await.unwrap_err(),
        RpcError::NoSuchProcedure(name) if name == "destroy"
    ));

    assert!(matches!(
        fx.server.dispatch("enqueue", &[json!("not-a-guild")]).await.unwrap_err(),
        RpcError::InvalidArgument { .. }
    ));

    assert!(matches!(
        fx.server.dispatch("pause", &[json!("7")]).await.unwrap_err(),
        RpcError::InvalidArgument { .. }
    ));
}

#[tokio::test]
async fn test_connect_forwards_to_the_discord_peer() {
    let Some(fx) = fixture().await else { return };

    fx.server
        .dispatch("connect", &[json!("7"), json!("42")])
        .await
        .unwrap();
    fx.server.dispatch("disconnect", &[json!("7")]).await.unwrap();

    let called = fx.session.called.lock().unwrap().clone();
    assert_eq!(
        called,
        [
            (
                "com.discord.update_voice_state".to_owned(),
                vec![json!("7"), json!("42")]
            ),
            ("com.discord.update_voice_state".to_owned(), vec![json!("7")]),
        ]
    );
}

#[tokio::test]
async fn test_player_events_are_published_under_the_prefix() {
    let Some(fx) = fixture().await else { return };

    fx.server
        .dispatch("enqueue", &[json!("7"), json!("eid-1")])
        .await
        .unwrap();

    // the pump runs on its own task
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let published = fx.session.published.lock().unwrap().clone();
    let (uri, args, kwargs) = &published[0];
    assert_eq!(uri, "io.giesela.ari.on_queue_add");
    assert_eq!(args[0], json!("7"));
    assert_eq!(args[1]["eid"], "eid-1");
    assert_eq!(kwargs["position"], json!(0));
}

#[tokio::test]
async fn test_voice_events_reach_the_correlator() {
    let Some(fx) = fixture().await else { return };

    fx.server
        .on_voice_server_update(json!({"guild_id": "7", "token": "t", "endpoint": "eu"}))
        .await
        .unwrap();
    fx.server
        .on_voice_state_update(json!({
            "user_id": "1",
            "session_id": "af83",
            "guild_id": "7",
            "channel_id": "42"
        }))
        .await
        .unwrap();

    // both halves arrived: the player connected and said so
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let published = fx.session.published.lock().unwrap().clone();
    assert!(
        published
            .iter()
            .any(|(uri, args, _)| uri == "io.giesela.ari.on_connect" && args[1] == json!("42"))
    );
}
