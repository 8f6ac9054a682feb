//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the in-memory store for driftkv. It owns two
//! independent namespaces:
//!
//! - **strings**: key → value with an optional absolute deadline
//! - **hashes**: key → (field → value), no expiry
//!
//! The same key name may exist in both namespaces at once; nothing cross-checks
//! them.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ strings │ │ strings │ │ strings │ │ strings │            │
//! │  │ hashes  │ │ hashes  │ │ hashes  │ │ hashes  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function. Every operation
//! takes the owning shard's lock once and performs its whole check-then-act
//! sequence under it, so operations on the same key are atomic with respect
//! to each other.
//!
//! Expired string entries are never observable: every read path checks the
//! deadline and evicts the entry when it has passed.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// Field → value map stored under a hash-namespace key.
pub type FieldMap = HashMap<Bytes, Bytes>;

/// Represents a stored string value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// Remaining lifetime of a string key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// No live entry (never set, deleted, or expired)
    Missing,
    /// Live entry without a deadline
    Persistent,
    /// Live entry with this much time left
    Remaining(Duration),
}

/// Converts a relative expiry in milliseconds into an absolute deadline.
///
/// Non-positive values yield a deadline of "now", which is already expired.
/// A deadline too far in the future to represent yields `None` (never expires).
pub fn deadline_in_millis(millis: i64) -> Option<Instant> {
    let now = Instant::now();
    if millis <= 0 {
        return Some(now);
    }
    now.checked_add(Duration::from_millis(millis as u64))
}

/// A single shard containing a portion of both namespaces.
#[derive(Debug, Default)]
struct Shard {
    strings: RwLock<HashMap<Bytes, Entry>>,
    hashes: RwLock<HashMap<Bytes, FieldMap>>,
}

/// The main storage engine for driftkv.
///
/// Designed to be wrapped in an `Arc` and shared by every connection task,
/// the replay feed and the expiry sweeper.
///
/// # Example
///
/// ```
/// use driftkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
///
/// assert!(engine.hset(Bytes::from("user"), Bytes::from("email"), Bytes::from("a@b.c")));
/// assert!(!engine.hset(Bytes::from("user"), Bytes::from("email"), Bytes::from("x@y.z")));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Number of entries in the string namespace (expired-but-unevicted included)
    key_count: AtomicU64,

    /// Number of keys in the hash namespace
    hash_key_count: AtomicU64,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys evicted (lazily or by the sweeper)
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("hash_key_count", &self.hash_key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
            hash_key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    fn record_evictions(&self, count: u64) {
        self.key_count.fetch_sub(count, Ordering::Relaxed);
        self.expired_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Runs `read` against the live entry for `key`.
    ///
    /// Takes a read lock first; only when the entry turns out to be expired
    /// does it retake the shard with a write lock to evict it.
    fn read_live<R>(&self, key: &Bytes, read: impl FnOnce(&Entry) -> R) -> Option<R> {
        let shard = self.get_shard(key);

        {
            let strings = shard.strings.read();
            match strings.get(key) {
                Some(entry) if !entry.is_expired() => return Some(read(entry)),
                Some(_) => {}
                None => return None,
            }
        }

        let mut strings = shard.strings.write();
        match strings.get(key) {
            Some(entry) if entry.is_expired() => {
                strings.remove(key);
                self.record_evictions(1);
                None
            }
            // Replaced by a concurrent SET between the two locks
            Some(entry) => Some(read(entry)),
            None => None,
        }
    }

    // ========================================================================
    // STRING NAMESPACE
    // ========================================================================

    /// Sets a key-value pair without expiry.
    ///
    /// Returns `true` if a new key was created, `false` if an existing entry
    /// (live or expired) was replaced.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.set_with_deadline(key, value, None)
    }

    /// Sets a key-value pair that expires after `ttl`.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.set_with_deadline(key, value, Instant::now().checked_add(ttl))
    }

    /// Installs a wholly new entry, replacing any prior value and deadline.
    pub fn set_with_deadline(&self, key: Bytes, value: Bytes, expires_at: Option<Instant>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(&key);
        let mut strings = shard.strings.write();

        let is_new = strings
            .insert(key, Entry { value, expires_at })
            .is_none();

        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        is_new
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired; an expired
    /// entry is removed as a side effect.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.read_live(key, |entry| entry.value.clone())
    }

    /// Deletes a key from the string namespace.
    ///
    /// Returns `true` only if the key existed and was not already expired.
    /// An expired entry is still removed.
    pub fn delete(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);
        let mut strings = shard.strings.write();

        match strings.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.record_evictions(1);
                false
            }
            Some(_) => {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Deletes multiple keys, returning how many live keys were removed.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    /// Checks if a live string entry exists for the key.
    pub fn exists(&self, key: &Bytes) -> bool {
        self.read_live(key, |_| ()).is_some()
    }

    /// Replaces the deadline of a live key, keeping its value.
    ///
    /// Returns `false` (and evicts) if the key is missing or already expired.
    pub fn expire_at(&self, key: &Bytes, expires_at: Option<Instant>) -> bool {
        let shard = self.get_shard(key);
        let mut strings = shard.strings.write();

        match strings.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                strings.remove(key);
                self.record_evictions(1);
                false
            }
            Some(entry) => {
                entry.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Sets the key to expire `ttl` from now.
    pub fn expire(&self, key: &Bytes, ttl: Duration) -> bool {
        self.expire_at(key, Instant::now().checked_add(ttl))
    }

    /// Reports the remaining lifetime of a key.
    pub fn ttl(&self, key: &Bytes) -> Ttl {
        let now = Instant::now();
        match self.read_live(key, |entry| entry.expires_at) {
            None => Ttl::Missing,
            Some(None) => Ttl::Persistent,
            Some(Some(exp)) => Ttl::Remaining(exp.saturating_duration_since(now)),
        }
    }

    /// Removes every string entry whose deadline has passed.
    ///
    /// This is called by the background expiry sweeper. The hash namespace
    /// is never touched.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were evicted.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut strings = shard.strings.write();
            let now = Instant::now();
            let before = strings.len();

            strings.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - strings.len()) as u64;
        }

        if cleaned > 0 {
            self.record_evictions(cleaned);
        }

        cleaned
    }

    // ========================================================================
    // HASH NAMESPACE
    // ========================================================================

    /// Sets `field` on the hash stored at `key`, creating the hash if needed.
    ///
    /// Returns `true` if the field is new, `false` if an existing field was
    /// overwritten. The check and the insert happen under one write lock.
    pub fn hset(&self, key: Bytes, field: Bytes, value: Bytes) -> bool {
        let shard = self.get_shard(&key);
        let mut hashes = shard.hashes.write();

        let fields = hashes.entry(key).or_insert_with(|| {
            self.hash_key_count.fetch_add(1, Ordering::Relaxed);
            FieldMap::new()
        });

        fields.insert(field, value).is_none()
    }

    /// Gets a field from the hash stored at `key`.
    pub fn hget(&self, key: &Bytes, field: &Bytes) -> Option<Bytes> {
        let shard = self.get_shard(key);
        let hashes = shard.hashes.read();

        hashes.get(key).and_then(|fields| fields.get(field)).cloned()
    }

    /// Removes a field from the hash stored at `key`.
    ///
    /// The (possibly now empty) hash itself stays in place.
    pub fn hdel(&self, key: &Bytes, field: &Bytes) -> bool {
        let shard = self.get_shard(key);
        let mut hashes = shard.hashes.write();

        hashes
            .get_mut(key)
            .map(|fields| fields.remove(field).is_some())
            .unwrap_or(false)
    }

    // ========================================================================
    // WHOLE-KEYSPACE OPERATIONS
    // ========================================================================

    /// Returns the union of live string keys and hash keys, deduplicated.
    ///
    /// Read locks on every shard are held together while the snapshot is
    /// taken, so the result reflects a single instant. Order is unspecified.
    pub fn keys(&self) -> Vec<Bytes> {
        let strings: Vec<_> = self.shards.iter().map(|s| s.strings.read()).collect();
        let hashes: Vec<_> = self.shards.iter().map(|s| s.hashes.read()).collect();
        let now = Instant::now();

        let mut seen = HashSet::new();
        for shard in &strings {
            for (key, entry) in shard.iter() {
                if !entry.is_expired_at(now) {
                    seen.insert(key.clone());
                }
            }
        }
        for shard in &hashes {
            seen.extend(shard.keys().cloned());
        }

        seen.into_iter().collect()
    }

    /// Returns the approximate number of entries in the string namespace.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if both namespaces are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.hash_key_count.load(Ordering::Relaxed) == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            hash_keys: self.hash_key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries in the string namespace
    pub keys: u64,
    /// Keys in the hash namespace
    pub hash_keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired keys evicted
    pub expired: u64,
}
