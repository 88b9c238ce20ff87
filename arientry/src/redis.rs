//! Redis backend for the ordered entry list.
//!
//! Layout: two keys per list.
//!   - `K:order` — a Redis list of aids giving the order,
//!   - `K:info`  — a hash from aid to the MessagePack payload `(eid, meta)`.
//!
//! The split keeps index/range queries cheap (no payload materialization)
//! and makes aid uniqueness checkable through the hash. Everything that
//! touches both keys goes through a MULTI/EXEC pipeline; everything that
//! has to consult positions (move, shuffle, pop) runs as a server-side Lua
//! script so concurrent writers cannot interleave.

use once_cell::sync::Lazy;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::entry::{Entry, EntryMeta};
use crate::error::{Result, StoreError};
use crate::list::{EntryList, EntryListMut, Slice, Whence};

/// Fetch a range of aids together with their payloads.
static GET_ENTRIES: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local klist, khash = KEYS[1], KEYS[2]
local start, stop = ARGV[1], ARGV[2]

local aids = redis.call("LRANGE", klist, start, stop)
if #aids == 0 then
    return {aids, {}}
end

local infos = redis.call("HMGET", khash, unpack(aids))

return {aids, infos}
"#,
    )
});

/// Move one aid relative to the entry at a pivot index. Returns 1 on
/// success, 0 when either the pivot or the aid is missing.
static MOVE_ENTRY: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local function get_index(key, value)
    local l = redis.call("LRANGE", key, 0, -1)
    for i = 1, #l do
        if l[i] == value then
            return i - 1
        end
    end

    return -1
end

local klist = KEYS[1]
local aid, index, whence = ARGV[1], tonumber(ARGV[2]), ARGV[3]

local pivot = redis.call("LINDEX", klist, index)
if not pivot then return 0 end

-- moving relative to itself: already settled
if pivot == aid then return 1 end

if whence == "absolute" then
    local current_index = get_index(klist, aid)
    if current_index == -1 then return 0 end

    if current_index > index then   whence = "BEFORE"
    else                            whence = "AFTER"
    end
elseif whence == "before" or whence == "after" then
    whence = whence:upper()
else                            return 0
end

redis.call("LREM", klist, 1, aid)
redis.call("LINSERT", klist, whence, pivot, aid)

return 1
"#,
    )
});

/// Pop one end of the list and drop the payload with it.
static POP_ENTRY: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local klist, khash = KEYS[1], KEYS[2]
local pop_command = ARGV[1]

local aid = redis.call(pop_command, klist)
if not aid then return nil end

local info = redis.call("HGET", khash, aid)
redis.call("HDEL", khash, aid)

return {aid, info}
"#,
    )
});

/// Seeded Fisher-Yates over the order list. Payload hash untouched.
static SHUFFLE_ENTRIES: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local function shuffle(l)
    for i = #l, 2, -1 do
        local j = math.random(i)
        l[i], l[j] = l[j], l[i]
    end
end

local klist = KEYS[1]
local seed = tonumber(ARGV[1])

math.randomseed(seed)

local aids = redis.call("LRANGE", klist, 0, -1)
if #aids == 0 then return end

shuffle(aids)
redis.call("DEL", klist)
redis.call("RPUSH", klist, unpack(aids))
"#,
    )
});

/// MessagePack payload stored in `K:info`: the `(eid, meta)` tuple.
fn encode_entry_info(entry: &Entry) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(&(&entry.eid, &entry.meta))?)
}

fn decode_entry_info(aid: String, raw: &[u8]) -> Result<Entry> {
    let (eid, meta): (String, Option<EntryMeta>) = rmp_serde::from_slice(raw)?;
    Ok(Entry { aid, eid, meta })
}

/// Entry list stored in Redis.
#[derive(Clone)]
pub struct RedisEntryList {
    conn: ConnectionManager,
    order_key: String,
    info_key: String,
}

impl RedisEntryList {
    pub fn new(conn: ConnectionManager, key: &str) -> Self {
        Self {
            conn,
            order_key: format!("{key}:order"),
            info_key: format!("{key}:info"),
        }
    }
}

#[async_trait::async_trait]
impl EntryList for RedisEntryList {
    async fn length(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(&self.order_key).await?)
    }

    async fn get_by_index(&self, index: i64) -> Result<Option<Entry>> {
        let mut conn = self.conn.clone();
        let aid: Option<String> = conn.lindex(&self.order_key, index as isize).await?;

        match aid {
            Some(aid) => self.get_by_aid(&aid).await,
            None => Ok(None),
        }
    }

    async fn get_by_aid(&self, aid: &str) -> Result<Option<Entry>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.hget(&self.info_key, aid).await?;

        match raw {
            Some(raw) => Ok(Some(decode_entry_info(aid.to_owned(), &raw)?)),
            None => Ok(None),
        }
    }

    async fn slice(&self, slice: Slice) -> Result<Vec<Entry>> {
        let (start, stop, _) = slice.fetch_bounds();

        let mut conn = self.conn.clone();
        let (aids, infos): (Vec<String>, Vec<Vec<u8>>) = GET_ENTRIES
            .key(&self.order_key)
            .key(&self.info_key)
            .arg(start)
            .arg(stop)
            .invoke_async(&mut conn)
            .await?;

        let window = aids
            .into_iter()
            .zip(infos)
            .map(|(aid, raw)| decode_entry_info(aid, &raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(slice.apply_step(window))
    }

    async fn index(&self, aid: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let pos: Option<i64> = conn
            .lpos(&self.order_key, aid, redis::LposOptions::default())
            .await?;

        pos.ok_or_else(|| StoreError::NotFound(aid.to_owned()))
    }
}

#[async_trait::async_trait]
impl EntryListMut for RedisEntryList {
    async fn add_start(&self, entry: &Entry) -> Result<()> {
        let info = encode_entry_info(entry)?;
        let mut conn = self.conn.clone();

        let () = redis::pipe()
            .atomic()
            .lpush(&self.order_key, &entry.aid)
            .ignore()
            .hset(&self.info_key, &entry.aid, info)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn add_end(&self, entry: &Entry) -> Result<()> {
        let info = encode_entry_info(entry)?;
        let mut conn = self.conn.clone();

        let () = redis::pipe()
            .atomic()
            .rpush(&self.order_key, &entry.aid)
            .ignore()
            .hset(&self.info_key, &entry.aid, info)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn pop_start(&self) -> Result<Option<Entry>> {
        self.pop("LPOP").await
    }

    async fn pop_end(&self) -> Result<Option<Entry>> {
        self.pop("RPOP").await
    }

    async fn remove(&self, aid: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let (removed,): (i64,) = redis::pipe()
            .atomic()
            .lrem(&self.order_key, 1, aid)
            .hdel(&self.info_key, aid)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(removed > 0)
    }

    async fn move_entry(&self, aid: &str, index: i64, whence: Whence) -> Result<bool> {
        let mut conn = self.conn.clone();

        let moved: i64 = MOVE_ENTRY
            .key(&self.order_key)
            .arg(aid)
            .arg(index)
            .arg(whence.as_str())
            .invoke_async(&mut conn)
            .await?;

        Ok(moved == 1)
    }

    async fn to_absolute_index(&self, aid: &str, index: i64, whence: Whence) -> Result<i64> {
        let length = self.length().await?;

        Ok(match whence {
            Whence::Absolute => index.clamp(0, (length - 1).max(0)),
            Whence::Before => {
                // removing the source shifts the pivot left when the pivot
                // sits later in the list
                let source = self.index(aid).await?;
                if index > source {
                    (index - 1).max(0)
                } else {
                    index
                }
            }
            Whence::After => (index + 1).min((length - 1).max(0)),
        })
    }

    async fn shuffle(&self, seed: Option<u16>) -> Result<()> {
        let seed = seed.unwrap_or_else(rand::random::<u16>);
        let mut conn = self.conn.clone();

        let () = SHUFFLE_ENTRIES
            .key(&self.order_key)
            .arg(seed)
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .del(&[self.order_key.as_str(), self.info_key.as_str()][..])
            .await?;
        Ok(())
    }
}

impl RedisEntryList {
    async fn pop(&self, pop_command: &str) -> Result<Option<Entry>> {
        let mut conn = self.conn.clone();

        let raw: Option<(String, Vec<u8>)> = POP_ENTRY
            .key(&self.order_key)
            .key(&self.info_key)
            .arg(pop_command)
            .invoke_async(&mut conn)
            .await?;

        match raw {
            Some((aid, info)) => Ok(Some(decode_entry_info(aid, &info)?)),
            None => Ok(None),
        }
    }
}
