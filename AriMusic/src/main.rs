use std::sync::Arc;

use anyhow::Context;
use redis::IntoConnectionInfo;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arinode::{AudioNode, WsNode};
use ariplayer::PlayerManager;
use ariserver::{AriServer, BusSession, BusTrackResolver, Gateway};

/// Bus procedures of the metadata service.
const ELAKSHI_URI: &str = "io.giesela.elakshi";

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // ========== Phase 1 : configuration ==========
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ARI_CONFIG").ok())
        .unwrap_or_else(|| "config.yml".to_owned());
    let config = ariconfig::load_config(&config_path)?;
    info!(path = %config_path, realm = %config.realm, "configuration loaded");

    // ========== Phase 2 : collaborators ==========
    let mut connection_info = config
        .redis
        .address
        .as_str()
        .into_connection_info()
        .context("invalid redis address")?;
    connection_info.redis.db = config.redis.database;
    let conn = redis::Client::open(connection_info)?
        .get_connection_manager()
        .await
        .context("couldn't reach redis")?;
    info!(address = %config.redis.address, "redis connected");

    let node_config = config
        .andesite
        .nodes
        .first()
        .context("no andesite node configured")?;
    let ws_node = WsNode::connect(
        &node_config.url,
        &node_config.password,
        config.andesite.user_id,
    )
    .await
    .context("couldn't reach the audio node")?;
    let node: Arc<dyn AudioNode> = Arc::new(ws_node.clone());

    let gateway = Gateway::new();
    let session: Arc<dyn BusSession> = Arc::new(gateway.clone());
    let resolver = Arc::new(BusTrackResolver::new(session.clone(), ELAKSHI_URI));

    // ========== Phase 3 : players ==========
    let manager = PlayerManager::new(
        conn,
        config.redis.namespace.clone(),
        node.clone(),
        resolver,
    );
    ws_node.bind_events(Arc::new(manager.clone()));

    // the Redis state is the source of truth; rebuild the node side of it
    // before accepting any call
    manager.recover_state().await?;
    info!("player state recovered");

    // ========== Phase 4 : serve ==========
    let server = AriServer::new(
        manager,
        node,
        session,
        config.andesite.user_id,
        config.uri_prefix.clone(),
    );

    let transports = config.transports.urls();
    let addr = transports
        .first()
        .and_then(|url| ariserver::bind_addr(url))
        .unwrap_or(DEFAULT_BIND);

    ariserver::serve(addr, server, gateway, &config.uri_prefix).await
}
