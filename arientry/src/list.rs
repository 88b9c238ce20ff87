//! Generic ordered-entry-list abstraction.
//!
//! This module defines:
//!   - the read-only `EntryList` trait and its mutable extension
//!     `EntryListMut`,
//!   - the `Whence` enum describing how a move target index is interpreted,
//!   - the `Slice` value with its normalization rules,
//!   - the `page` helper used by the RPC surface.
//!
//! Backends only implement a small set of primitives; paging is provided as
//! a default method. The only backend shipped here is the Redis one
//! (`RedisEntryList`), everything else in the service goes through these
//! traits.

use async_trait::async_trait;

use crate::entry::Entry;
use crate::error::Result;

/// How a move target index is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// The entry ends up at exactly the given position.
    Absolute,
    /// The entry is placed immediately before the entry at the position.
    Before,
    /// The entry is placed immediately after the entry at the position.
    After,
}

impl Whence {
    pub const POSSIBLE_VALUES: [&'static str; 3] = ["absolute", "before", "after"];

    pub fn as_str(self) -> &'static str {
        match self {
            Whence::Absolute => "absolute",
            Whence::Before => "before",
            Whence::After => "after",
        }
    }
}

impl std::str::FromStr for Whence {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "absolute" => Ok(Whence::Absolute),
            "before" => Ok(Whence::Before),
            "after" => Ok(Whence::After),
            _ => Err(()),
        }
    }
}

/// A `[start:stop:step]` range over an entry list.
///
/// Semantics are the half-open `[start, stop)` with an arbitrary non-zero
/// step; negative bounds count from the end of the list. A reversed range
/// (`start > stop` with `step < 0`) is fetched as `(stop + 1, start)` and
/// the output reversed before the step is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: i64,
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Self {
        debug_assert!(step != 0, "slice step must be non-zero");
        Self { start, stop, step }
    }

    /// The full list.
    pub fn all() -> Self {
        Self::new(None, None, 1)
    }

    /// Bounds for the backing range fetch, as an *inclusive* `(start, stop)`
    /// pair the way Redis `LRANGE` expects, plus whether the fetched window
    /// must be reversed before stepping.
    pub fn fetch_bounds(&self) -> (i64, i64, bool) {
        let mut start = self.start.unwrap_or(0);
        let mut stop = self.stop.unwrap_or(0);

        if start > stop && self.step < 0 {
            let new_start = stop + 1;
            stop = start;
            start = new_start;
        } else {
            // half-open [start, stop) to inclusive [start, stop]
            stop -= 1;
        }

        (start, stop, self.step < 0)
    }

    /// Applies direction and step width to a fetched window.
    pub fn apply_step<T>(&self, window: Vec<T>) -> Vec<T> {
        let width = self.step.unsigned_abs() as usize;
        let iter: Box<dyn Iterator<Item = T>> = if self.step < 0 {
            Box::new(window.into_iter().rev())
        } else {
            Box::new(window.into_iter())
        };

        iter.step_by(width).collect()
    }
}

/// Read access to an ordered sequence of entries.
#[async_trait]
pub trait EntryList: Send + Sync {
    /// Amount of entries currently in the list.
    async fn length(&self) -> Result<i64>;

    /// Entry at the given position, `None` when out of range. Negative
    /// indices count from the end (`-1` is the last entry).
    async fn get_by_index(&self, index: i64) -> Result<Option<Entry>>;

    /// Entry with the given aid, `None` when not in the list.
    async fn get_by_aid(&self, aid: &str) -> Result<Option<Entry>>;

    /// Entries selected by the slice, in slice order.
    async fn slice(&self, slice: Slice) -> Result<Vec<Entry>>;

    /// Position of the entry with the given aid. Fails with `NotFound`
    /// when the aid is not in the list.
    async fn index(&self, aid: &str) -> Result<i64>;

    /// One page of entries: `[page * per_page, (page + 1) * per_page)`.
    async fn page(&self, page: i64, per_page: i64) -> Result<Vec<Entry>> {
        let start = page * per_page;
        self.slice(Slice::new(Some(start), Some(start + per_page), 1))
            .await
    }
}

/// Write access to an ordered sequence of entries.
#[async_trait]
pub trait EntryListMut: EntryList {
    /// Prepend an entry. The aid must not already be in the list.
    async fn add_start(&self, entry: &Entry) -> Result<()>;

    /// Append an entry. The aid must not already be in the list.
    async fn add_end(&self, entry: &Entry) -> Result<()>;

    /// Remove and return the first entry, `None` when empty.
    async fn pop_start(&self) -> Result<Option<Entry>>;

    /// Remove and return the last entry, `None` when empty.
    async fn pop_end(&self) -> Result<Option<Entry>>;

    /// Remove one occurrence of the aid. True iff something was removed.
    async fn remove(&self, aid: &str) -> Result<bool>;

    /// Move the entry so it settles relative to the entry currently at
    /// `index`, as described by `whence`. True iff the move happened.
    async fn move_entry(&self, aid: &str, index: i64, whence: Whence) -> Result<bool>;

    /// The absolute position a move with the same arguments settles at,
    /// clamped to the list bounds. Used to report positions in events.
    async fn to_absolute_index(&self, aid: &str, index: i64, whence: Whence) -> Result<i64>;

    /// Server-side Fisher-Yates. Equal seeds over equal lists give equal
    /// results; without a seed an arbitrary one is used.
    async fn shuffle(&self, seed: Option<u16>) -> Result<()>;

    /// Drop the whole list.
    async fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Model of the backing fetch: Redis LRANGE index resolution over an
    /// in-memory list (negative indices from the end, bounds clamped,
    /// inclusive stop, empty when start ends up past stop).
    fn lrange_model<T: Clone>(items: &[T], start: i64, stop: i64) -> Vec<T> {
        let len = items.len() as i64;
        let resolve = |i: i64| if i < 0 { i + len } else { i };

        let start = resolve(start).max(0);
        let stop = resolve(stop).min(len - 1);
        if start > stop || start >= len || stop < 0 {
            return Vec::new();
        }

        items[start as usize..=stop as usize].to_vec()
    }

    fn run_slice(items: &[i64], slice: Slice) -> Vec<i64> {
        let (start, stop, _) = slice.fetch_bounds();
        slice.apply_step(lrange_model(items, start, stop))
    }

    #[test]
    fn forward_slices_match_python_ranges() {
        let items = [0, 1, 2, 3];

        assert_eq!(run_slice(&items, Slice::all()), vec![0, 1, 2, 3]);
        assert_eq!(run_slice(&items, Slice::new(None, Some(2), 1)), vec![0, 1]);
        assert_eq!(run_slice(&items, Slice::new(Some(2), Some(2), 1)), Vec::<i64>::new());
        // stop=None means "to the end" for forward slices with start > 0
        assert_eq!(run_slice(&items, Slice::new(Some(2), None, 1)), vec![2, 3]);
        assert_eq!(run_slice(&items, Slice::new(Some(1), Some(-1), 1)), vec![1, 2]);
        assert_eq!(run_slice(&items, Slice::new(None, None, 2)), vec![0, 2]);
        assert_eq!(run_slice(&items, Slice::new(Some(1), None, 2)), vec![1, 3]);
    }

    #[test]
    fn reverse_slices_follow_the_swap_rule() {
        let items = [0, 1, 2, 3];

        assert_eq!(run_slice(&items, Slice::new(None, None, -1)), vec![3, 2, 1, 0]);
        assert_eq!(run_slice(&items, Slice::new(Some(3), Some(1), -1)), vec![3, 2]);
        assert_eq!(
            run_slice(&items, Slice::new(Some(-1), Some(-5), -1)),
            vec![3, 2, 1, 0]
        );
        assert_eq!(run_slice(&items, Slice::new(None, None, -2)), vec![3, 1]);
        assert_eq!(run_slice(&items, Slice::new(Some(-1), Some(-5), -2)), vec![3, 1]);
    }

    #[test]
    fn forward_slice_grid_matches_the_range_law() {
        // store[a:b:c] == [store[i] for i in range(a, b, c)] for forward
        // steps; the model implements exactly that law. stop == 0 is the
        // "open" stop (whole tail), so the grid starts at b = 1.
        let items: Vec<i64> = (0..6).collect();
        let len = items.len() as i64;

        for a in 0..len {
            for b in 1..=len {
                for c in 1..4 {
                    let expect: Vec<i64> = (a..b).step_by(c as usize).collect();
                    let got = run_slice(&items, Slice::new(Some(a), Some(b), c));
                    assert_eq!(got, expect, "[{a}:{b}:{c}]");
                }
            }
        }
    }

    #[test]
    fn whence_parses_its_wire_names() {
        for name in Whence::POSSIBLE_VALUES {
            let whence: Whence = name.parse().unwrap();
            assert_eq!(whence.as_str(), name);
        }
        assert!("between".parse::<Whence>().is_err());
    }
}
