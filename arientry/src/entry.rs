//! Entrée de liste : valeur immuable `(aid, eid, meta)`.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to an entry by the metadata service.
pub type EntryMeta = Map<String, Value>;

/// A single playable entry.
///
/// `aid` is the primary key within any one list; two entries compare equal
/// iff their `aid` matches. Entries are immutable after creation, mutation
/// means replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Ari entry id, 128 random bits as 32 hex chars.
    pub aid: String,
    /// External (metadata service) track id. Opaque.
    pub eid: String,
    /// Optional metadata mapping. Omitted on the wire when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EntryMeta>,
}

impl Entry {
    pub fn new(aid: impl Into<String>, eid: impl Into<String>) -> Self {
        Self {
            aid: aid.into(),
            eid: eid.into(),
            meta: None,
        }
    }

    pub fn with_meta(aid: impl Into<String>, eid: impl Into<String>, meta: EntryMeta) -> Self {
        Self {
            aid: aid.into(),
            eid: eid.into(),
            meta: if meta.is_empty() { None } else { Some(meta) },
        }
    }

    /// Wire representation: `{aid, eid, meta?}`, `meta` omitted when empty.
    pub fn as_dict(&self) -> Value {
        let mut map = Map::new();
        map.insert("aid".into(), Value::String(self.aid.clone()));
        map.insert("eid".into(), Value::String(self.eid.clone()));
        if let Some(meta) = &self.meta {
            if !meta.is_empty() {
                map.insert("meta".into(), Value::Object(meta.clone()));
            }
        }
        Value::Object(map)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.aid == other.aid
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.aid.hash(state);
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EID({}) #{}", self.eid, self.aid)
    }
}

/// Mint a new, unique ari entry id.
pub fn new_aid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
