//! # arientry — ordered entry lists for Ari
//!
//! An entry is a `(aid, eid, meta)` value; an entry list is a durable
//! ordered sequence of entries with by-aid access, stored in Redis as an
//! order list plus a payload hash. Queues and histories of every player
//! are instances of the same store.
//!
//! The crate exposes:
//!
//! - [`Entry`] and [`new_aid`] — the value type and its id minting,
//! - [`EntryList`] / [`EntryListMut`] — the backend contract,
//! - [`RedisEntryList`] — the Redis backend (Lua scripts for everything
//!   position-dependent, MULTI/EXEC for every order/payload pair),
//! - [`Slice`] and [`Whence`] — range and move-target semantics.

mod entry;
mod error;
mod list;
mod redis;

pub use entry::{Entry, EntryMeta, new_aid};
pub use error::{Result, StoreError};
pub use list::{EntryList, EntryListMut, Slice, Whence};
pub use self::redis::RedisEntryList;
