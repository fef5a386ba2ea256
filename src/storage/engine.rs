//! Sharded Storage Engine with Expiry Support
//!
//! This module implements one numbered [`Database`]: a fixed set of shards,
//! each a `HashMap` behind its own reader-writer lock, plus per-key expiry.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: a key is routed to `xxh64(key) % shard_count`, so
//!    writers on different shards never contend.
//! 2. **Lazy Expiry**: lookups treat an element past its deadline as absent;
//!    the element itself is pruned by the next sweep or write on that key.
//! 3. **Watermarks**: each shard tracks the earliest deadline it may hold,
//!    letting the background sweep skip shards with nothing due.
//! 4. **Database Gate**: a database-wide `RwLock<()>` that regular commands
//!    hold shared and EXEC holds exclusively.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Database (gate: RwLock<()>)                │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐        ┌─────────┐      │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │  ...   │ Shard N │      │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │        │ RwLock  │      │
//! │  │ HashMap │ │ HashMap │ │ HashMap │        │ HashMap │      │
//! │  │ next_exp│ │ next_exp│ │ next_exp│        │ next_exp│      │
//! │  └─────────┘ └─────────┘ └─────────┘        └─────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations touching two shards (rename, move) always lock them in a fixed
//! order: lower shard index first within a database, lower database index
//! first across databases.

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh64::xxh64;

use crate::protocol::Value;
use crate::storage::glob::{GlobPattern, PatternError};

/// Default number of shards per database.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Watermark value meaning "no deadline in this shard".
const NEVER: u64 = u64::MAX;

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The stored record for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// The stored value
    pub value: Value,
    /// Creation time, milliseconds since the epoch
    pub created_at: u64,
    /// Deadline, milliseconds since the epoch (None = never expires)
    pub expires_at: Option<u64>,
}

impl Element {
    /// Creates an element that never expires.
    pub fn new(value: Value, now: u64) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: None,
        }
    }

    /// Creates an element living `ttl_ms` from `now`. A non-positive TTL
    /// means the element never expires.
    pub fn with_ttl(value: Value, ttl_ms: i64, now: u64) -> Self {
        let expires_at = (ttl_ms > 0).then(|| now.saturating_add(ttl_ms as u64));
        Self {
            value,
            created_at: now,
            expires_at,
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Remaining lifetime in milliseconds, or -1 if the element never expires.
    pub fn ttl_millis(&self, now: u64) -> i64 {
        match self.expires_at {
            Some(deadline) => deadline.saturating_sub(now).min(i64::MAX as u64) as i64,
            None => -1,
        }
    }
}

/// Write condition for [`Database::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Create or overwrite
    #[default]
    Any,
    /// Only overwrite an existing key
    IfExists,
    /// Only create a missing key
    IfNotExists,
}

/// Result of a successful lookup of the rename source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The element moved to a previously free key
    Renamed,
    /// The element replaced an existing destination
    Overwritten,
    /// The destination exists and overwriting was not allowed; nothing changed
    TargetExists,
}

/// A single shard containing a portion of the key space.
#[derive(Debug)]
struct Shard {
    map: RwLock<HashMap<Bytes, Element>>,
    /// Lower bound on the earliest deadline in `map`
    next_expiry: AtomicU64,
}

impl Shard {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            next_expiry: AtomicU64::new(NEVER),
        }
    }

    /// Lowers the watermark. Must be called with the map lock held.
    #[inline]
    fn note_expiry(&self, deadline: Option<u64>) {
        if let Some(deadline) = deadline {
            self.next_expiry.fetch_min(deadline, Ordering::AcqRel);
        }
    }
}

/// Removes `key` if it is present but past its deadline.
fn purge_expired(map: &mut HashMap<Bytes, Element>, key: &[u8], now: u64) {
    if map.get(key).is_some_and(|e| e.is_expired_at(now)) {
        map.remove(key);
    }
}

/// A value that should not be kept under a key.
fn is_vacant(value: &Value) -> bool {
    match value {
        Value::Null | Value::NullArray => true,
        Value::Array(items) => items.is_empty(),
        Value::Dictionary(dict) => dict.is_empty(),
        _ => false,
    }
}

/// One numbered key space.
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// connection tasks and its sweep tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use rapidkv::protocol::Value;
/// use rapidkv::storage::{Database, SetMode};
/// use bytes::Bytes;
///
/// let db = Database::new(0, 4);
///
/// db.set(Bytes::from("name"), Value::bulk_string("Ariz"), SetMode::Any, 0);
/// assert_eq!(db.get(b"name"), Some(Value::bulk_string("Ariz")));
///
/// // Expires in one minute
/// db.set(Bytes::from("session"), Value::bulk_string("abc123"), SetMode::Any, 60_000);
/// ```
pub struct Database {
    index: i64,
    shards: Vec<Shard>,
    gate: RwLock<()>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("index", &self.index)
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl Database {
    /// Creates an empty database with `shard_count` shards (at least one).
    pub fn new(index: i64, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1)).map(|_| Shard::new()).collect();
        Self {
            index,
            shards,
            gate: RwLock::new(()),
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        (xxh64(key, 0) % self.shards.len() as u64) as usize
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Shared hold on the whole database, taken by regular commands.
    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read()
    }

    /// Exclusive hold on the whole database, taken by EXEC.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    /// Shared hold taken by a session working on a database it has not
    /// selected (MOVE target, FLUSHALL). Waits for a running EXEC but not
    /// for one that is only queued for the gate.
    pub fn shared_recursive(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read_recursive()
    }

    /// Returns a copy of the live value stored under `key`.
    ///
    /// Bulk payloads are reference counted, so copying a string is cheap.
    /// Use [`Database::view`] to inspect large aggregates without copying.
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.view(key, |element| element.value.clone())
    }

    /// Runs `f` against the live element under the shard's read lock.
    pub fn view<R>(&self, key: &[u8], f: impl FnOnce(&Element) -> R) -> Option<R> {
        let now = now_millis();
        let map = self.shard(key).map.read();
        map.get(key)
            .filter(|element| !element.is_expired_at(now))
            .map(f)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.view(key, |_| ()).is_some()
    }

    /// Stores `value` under `key` according to `mode`.
    ///
    /// A successful write resets the creation time and sets the deadline from
    /// `ttl_ms` (non-positive = never). Returns the previous live value and
    /// whether the write happened.
    pub fn set(
        &self,
        key: Bytes,
        value: Value,
        mode: SetMode,
        ttl_ms: i64,
    ) -> (Option<Value>, bool) {
        let now = now_millis();
        let shard = self.shard(&key);
        let mut map = shard.map.write();

        let live = map.get(&key).is_some_and(|e| !e.is_expired_at(now));
        match mode {
            SetMode::IfExists if !live => return (None, false),
            SetMode::IfNotExists if live => return (None, false),
            _ => {}
        }

        let element = Element::with_ttl(value, ttl_ms, now);
        shard.note_expiry(element.expires_at);
        let previous = map
            .insert(key, element)
            .filter(|old| !old.is_expired_at(now))
            .map(|old| old.value);
        (previous, true)
    }

    /// Deletes a key, reporting whether a live element was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let now = now_millis();
        let mut map = self.shard(key).map.write();
        map.remove(key).is_some_and(|e| !e.is_expired_at(now))
    }

    /// Read-modify-write on one key under its shard's exclusive lock.
    ///
    /// If the key is missing and `create` is set, `f` receives a fresh
    /// element holding `Value::Null` with no expiry; that element is stored
    /// only when `f` asks for it to be persisted. Returns `None` when the key
    /// is missing and `create` is false.
    ///
    /// An element left holding `Null` or an empty list or hash is removed.
    pub fn mutate<R>(
        &self,
        key: &Bytes,
        create: bool,
        f: impl FnOnce(&mut Element) -> (R, bool),
    ) -> Option<R> {
        let now = now_millis();
        let shard = self.shard(key);
        let mut map = shard.map.write();
        purge_expired(&mut map, key, now);

        if let Some(element) = map.get_mut(key.as_ref()) {
            let (result, _) = f(element);
            shard.note_expiry(element.expires_at);
            let vacant = is_vacant(&element.value);
            if vacant {
                map.remove(key.as_ref());
            }
            return Some(result);
        }

        if !create {
            return None;
        }

        let mut element = Element::new(Value::Null, now);
        let (result, persist) = f(&mut element);
        if persist && !is_vacant(&element.value) {
            shard.note_expiry(element.expires_at);
            map.insert(key.clone(), element);
        }
        Some(result)
    }

    /// Sets the lifetime of an existing key.
    ///
    /// A negative `millis` means the key is already expired and it is deleted.
    /// Otherwise the deadline becomes `now + millis`; a deadline that is not
    /// in the future also deletes the key. Returns whether the key existed.
    pub fn set_ttl(&self, key: &[u8], millis: i64) -> bool {
        let now = now_millis();
        let shard = self.shard(key);
        let mut map = shard.map.write();
        purge_expired(&mut map, key, now);

        let Some(element) = map.get_mut(key) else {
            return false;
        };

        let deadline = if millis < 0 {
            None
        } else {
            Some(now.saturating_add(millis as u64)).filter(|deadline| *deadline > now)
        };

        match deadline {
            Some(deadline) => {
                element.expires_at = Some(deadline);
                shard.note_expiry(Some(deadline));
            }
            None => {
                map.remove(key);
            }
        }
        true
    }

    /// Remaining lifetime in milliseconds: `Some(-1)` for a key without a
    /// deadline, `None` for a missing key.
    pub fn get_ttl(&self, key: &[u8]) -> Option<i64> {
        let now = now_millis();
        self.view(key, |element| element.ttl_millis(now))
    }

    /// Clears the deadline of a key, reporting whether one was removed.
    pub fn persist(&self, key: &[u8]) -> bool {
        let now = now_millis();
        let mut map = self.shard(key).map.write();
        match map.get_mut(key) {
            Some(element) if !element.is_expired_at(now) => element.expires_at.take().is_some(),
            _ => false,
        }
    }

    /// Moves the element under `old` to `new` within this database.
    ///
    /// Returns `None` if `old` does not exist. The element keeps its
    /// timestamps and deadline.
    pub fn rename(&self, old: &Bytes, new: &Bytes, overwrite: bool) -> Option<RenameOutcome> {
        let now = now_millis();
        let from = self.shard_index(old);
        let to = self.shard_index(new);

        if from == to {
            let mut map = self.shards[from].map.write();
            purge_expired(&mut map, old, now);
            purge_expired(&mut map, new, now);
            if !map.contains_key(old.as_ref()) {
                return None;
            }
            if old == new {
                return Some(if overwrite {
                    RenameOutcome::Overwritten
                } else {
                    RenameOutcome::TargetExists
                });
            }
            let outcome = match (map.contains_key(new.as_ref()), overwrite) {
                (true, false) => return Some(RenameOutcome::TargetExists),
                (true, true) => RenameOutcome::Overwritten,
                (false, _) => RenameOutcome::Renamed,
            };
            let element = map.remove(old.as_ref())?;
            map.insert(new.clone(), element);
            return Some(outcome);
        }

        let (first, second) = (from.min(to), from.max(to));
        let mut low = self.shards[first].map.write();
        let mut high = self.shards[second].map.write();
        let (src, dst) = if from < to {
            (&mut *low, &mut *high)
        } else {
            (&mut *high, &mut *low)
        };

        purge_expired(src, old, now);
        purge_expired(dst, new, now);
        if !src.contains_key(old.as_ref()) {
            return None;
        }
        let outcome = match (dst.contains_key(new.as_ref()), overwrite) {
            (true, false) => return Some(RenameOutcome::TargetExists),
            (true, true) => RenameOutcome::Overwritten,
            (false, _) => RenameOutcome::Renamed,
        };
        let element = src.remove(old.as_ref())?;
        self.shards[to].note_expiry(element.expires_at);
        dst.insert(new.clone(), element);
        Some(outcome)
    }

    /// Stores every entry only if none of the keys holds a live element.
    ///
    /// The owning shards are write-locked in ascending index order and held
    /// across the check and the writes. Returns whether anything was written.
    pub fn set_all_if_absent(&self, entries: Vec<(Bytes, Value)>) -> bool {
        let now = now_millis();
        let mut indexes: Vec<usize> = entries
            .iter()
            .map(|(key, _)| self.shard_index(key))
            .collect();
        indexes.sort_unstable();
        indexes.dedup();

        let mut maps: Vec<_> = indexes
            .iter()
            .map(|&index| self.shards[index].map.write())
            .collect();
        let slot = |key: &[u8]| indexes.binary_search(&self.shard_index(key)).ok();

        let taken = entries.iter().any(|(key, _)| {
            slot(&key[..])
                .and_then(|i| maps[i].get(key))
                .is_some_and(|element| !element.is_expired_at(now))
        });
        if taken {
            return false;
        }

        for (key, value) in entries {
            if let Some(i) = slot(&key[..]) {
                maps[i].insert(key, Element::new(value, now));
            }
        }
        true
    }

    /// Moves `key` into `target`, only if it exists here and is absent there.
    ///
    /// Holds the target database's gate shared for the duration, then locks
    /// both shards in database index order.
    pub fn move_to(&self, key: &Bytes, target: &Database) -> bool {
        if std::ptr::eq(self, target) || self.index == target.index {
            return false;
        }

        let now = now_millis();
        let _gate = target.shared_recursive();
        let src_shard = self.shard(key);
        let dst_shard = target.shard(key);

        let (mut src, mut dst) = if self.index < target.index {
            let src = src_shard.map.write();
            let dst = dst_shard.map.write();
            (src, dst)
        } else {
            let dst = dst_shard.map.write();
            let src = src_shard.map.write();
            (src, dst)
        };

        purge_expired(&mut src, key, now);
        purge_expired(&mut dst, key, now);
        if dst.contains_key(key.as_ref()) {
            return false;
        }
        match src.remove(key.as_ref()) {
            Some(element) => {
                dst_shard.note_expiry(element.expires_at);
                dst.insert(key.clone(), element);
                true
            }
            None => false,
        }
    }

    /// Returns every live key matching the glob `pattern`.
    ///
    /// Shards are scanned one after another, so the result is not a snapshot
    /// of a single instant when writers are active.
    ///
    /// **Warning**: This operation scans all keys and can be slow on large databases.
    pub fn keys(&self, pattern: &[u8]) -> Result<Vec<Bytes>, PatternError> {
        let pattern = GlobPattern::new(pattern)?;
        let now = now_millis();
        let mut result = Vec::new();

        for shard in &self.shards {
            let map = shard.map.read();
            result.extend(
                map.iter()
                    .filter(|(key, element)| !element.is_expired_at(now) && pattern.matches(key))
                    .map(|(key, _)| key.clone()),
            );
        }

        Ok(result)
    }

    /// Number of live keys, summed shard by shard.
    pub fn count(&self) -> usize {
        let now = now_millis();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .map
                    .read()
                    .values()
                    .filter(|element| !element.is_expired_at(now))
                    .count()
            })
            .sum()
    }

    /// Clears every shard.
    pub fn flush(&self) {
        for shard in &self.shards {
            let mut map = shard.map.write();
            map.clear();
            shard.next_expiry.store(NEVER, Ordering::Release);
        }
    }

    /// Removes expired elements from one shard if its watermark says any may
    /// be due, then recomputes the watermark exactly. Returns the number of
    /// elements removed.
    pub fn sweep_shard(&self, index: usize, now: u64) -> usize {
        let Some(shard) = self.shards.get(index) else {
            return 0;
        };
        if shard.next_expiry.load(Ordering::Acquire) > now {
            return 0;
        }

        let mut map = shard.map.write();
        let before = map.len();
        map.retain(|_, element| !element.is_expired_at(now));

        let next = map
            .values()
            .filter_map(|element| element.expires_at)
            .min()
            .unwrap_or(NEVER);
        shard.next_expiry.store(next, Ordering::Release);

        before - map.len()
    }

    /// Sweeps every shard once.
    pub fn sweep(&self) -> usize {
        let now = now_millis();
        (0..self.shards.len()).map(|i| self.sweep_shard(i, now)).sum()
    }

    #[cfg(test)]
    fn watermark(&self, index: usize) -> u64 {
        self.shards[index].next_expiry.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.shards.iter().map(|shard| shard.map.read().len()).sum()
    }
}
