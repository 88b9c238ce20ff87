//! # ariconfig — configuration for Ari
//!
//! Configuration comes from a YAML file merged with `ARI_`-prefixed
//! environment variables; the environment wins. Nested keys use `__` as
//! the section separator (`ARI_REDIS__ADDRESS` → `redis.address`) and
//! values are parsed as YAML scalars, so numbers and booleans — and, for
//! the adventurous, whole node lists — come through typed.
//!
//! ```no_run
//! let config = ariconfig::load_config("config.yml")?;
//! println!("redis at {}", config.redis.address);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::info;

/// Config for redis.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// e.g. `redis://127.0.0.1/`.
    pub address: String,
    /// Key prefix for everything the service stores.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub database: i64,
}

/// Config for one andesite node.
#[derive(Debug, Clone, Deserialize)]
pub struct AndesiteNode {
    pub url: String,
    pub password: String,
}

/// Config for the andesite nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct AndesiteConfig {
    /// Discord user id of the bot; voice states of anyone else are
    /// ignored.
    pub user_id: u64,
    pub nodes: Vec<AndesiteNode>,
}

/// One bus transport endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Transport {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Either a bare URL or a list of typed transports.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Transports {
    Url(String),
    List(Vec<Transport>),
}

impl Default for Transports {
    fn default() -> Self {
        Transports::List(Vec::new())
    }
}

impl Transports {
    pub fn urls(&self) -> Vec<&str> {
        match self {
            Transports::Url(url) => vec![url.as_str()],
            Transports::List(transports) => {
                transports.iter().map(|t| t.url.as_str()).collect()
            }
        }
    }
}

/// Ari configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub redis: RedisConfig,
    pub andesite: AndesiteConfig,
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Prefix under which procedures are registered and events published.
    #[serde(default = "default_uri_prefix")]
    pub uri_prefix: String,
    #[serde(default)]
    pub transports: Transports,
}

fn default_namespace() -> String {
    "ari".to_owned()
}

fn default_realm() -> String {
    "internal".to_owned()
}

fn default_uri_prefix() -> String {
    "io.giesela.ari".to_owned()
}

/// Load the configuration from a YAML file plus the process environment.
///
/// A missing file is not an error; the environment alone can carry a full
/// configuration.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();

    let mut root = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("couldn't read {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid yaml in {}", path.display()))?
    } else {
        info!(path = %path.display(), "config file not found, using environment only");
        Value::Mapping(serde_yaml::Mapping::new())
    };

    apply_env(&mut root, std::env::vars(), "ARI_");

    serde_yaml::from_value(root).context("invalid configuration")
}

/// Overlay environment variables onto the YAML tree.
fn apply_env(root: &mut Value, vars: impl Iterator<Item = (String, String)>, prefix: &str) {
    for (key, raw) in vars {
        let Some(stripped) = key.strip_prefix(prefix) else {
            continue;
        };

        let path: Vec<String> = stripped
            .split("__")
            .map(|part| part.to_lowercase())
            .collect();

        // YAML-parse the value so numbers and booleans keep their type
        let value: Value =
            serde_yaml::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
        set_path(root, &path, value);
    }
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    if !matches!(root, Value::Mapping(_)) {
        *root = Value::Mapping(serde_yaml::Mapping::new());
    }
    let Value::Mapping(mapping) = root else {
        return;
    };

    let key = Value::String(head.clone());
    if rest.is_empty() {
        mapping.insert(key, value);
        return;
    }

    let child = mapping
        .entry(key)
        .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
    set_path(child, rest, value);
}
