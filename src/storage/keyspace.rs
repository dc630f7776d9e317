//! Keyspace: one numbered database
//!
//! This module implements the per-database key table. It maps binary keys to
//! entries carrying a typed value, an optional expiry deadline and a change
//! version, and it owns the change listeners that blocking commands hang off.
//!
//! ## Design Decisions
//!
//! 1. **No internal locking**: every keyspace lives inside the server state
//!    and is only reachable while the server lock is held.
//! 2. **Lazy + swept expiry**: every read path drops an expired entry before
//!    looking at it; `sweep_expired` reclaims the rest in bulk.
//! 3. **Change versions**: every mutation stamps the entry with a fresh value
//!    from a monotonic counter. WATCH compares these stamps.
//! 4. **Coarse notification**: a command that modified anything triggers
//!    every registered listener once it finishes. Listeners re-check their
//!    own precondition.
//!
//! ## Mutation Protocol
//!
//! ```text
//!   handler ──> get_or_create / value_mut ──> mark_modified(key)
//!                                                   │
//!   dispatcher ──> finish_command() ────────────────┘
//!                     │  prune containers left empty
//!                     └─ notify listeners (registration order)
//! ```

use super::value::{Value, ValueKind};
use crate::error::{CommandError, CommandResult};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::sorted_set::SortedSet;

/// Identifies a registered change listener.
pub type ListenerId = u64;

/// What a change listener wants done with itself after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    Keep,
    Remove,
}

/// A change listener. Runs with the server lock held and may mutate the
/// keyspace it is registered on.
pub type ChangeListener = Box<dyn FnMut(&mut Keyspace) -> ListenerAction + Send>;

/// A stored value with expiry and change tracking.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expire_at: Option<Instant>,
    /// Stamp of the last mutation
    pub version: u64,
}

impl Entry {
    fn new(value: Value, version: u64) -> Self {
        Self {
            value,
            expire_at: None,
            version,
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Remaining time to live, None if the entry never expires.
    pub fn ttl(&self) -> Option<Duration> {
        self.expire_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

macro_rules! typed_container {
    ($get:ident, $get_mut:ident, $or_create:ident, $as_ref:ident, $as_mut:ident, $kind:expr, $ty:ty) => {
        /// Reads the container, `WRONGTYPE` if the key holds another kind.
        pub fn $get(&mut self, key: &[u8]) -> CommandResult<Option<&$ty>> {
            self.value(key).map(Value::$as_ref).transpose()
        }

        /// Mutable access without creating the key.
        pub fn $get_mut(&mut self, key: &[u8]) -> CommandResult<Option<&mut $ty>> {
            self.value_mut(key).map(Value::$as_mut).transpose()
        }

        /// Mutable access, creating an empty container if the key is absent.
        pub fn $or_create(&mut self, key: &Bytes) -> CommandResult<&mut $ty> {
            self.get_or_create(key, $kind)?.$as_mut()
        }
    };
}

/// A single numbered database.
pub struct Keyspace {
    index: usize,
    entries: BTreeMap<Bytes, Entry>,
    /// Source of change versions
    version_counter: u64,
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener_id: ListenerId,
    /// Set by any mutation, consumed by `finish_command`
    changed: bool,
    /// Keys auto-created by the running command
    vivified: Vec<Bytes>,
    /// Statistics: number of expired keys removed
    expired_count: u64,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("index", &self.index)
            .field("keys", &self.entries.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Keyspace {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            entries: BTreeMap::new(),
            version_counter: 0,
            listeners: Vec::new(),
            next_listener_id: 0,
            changed: false,
            vivified: Vec::new(),
            expired_count: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn next_version(&mut self) -> u64 {
        self.version_counter += 1;
        self.version_counter
    }

    /// Drops the entry if it has expired.
    fn expire_if_needed(&mut self, key: &[u8]) {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.is_expired(Instant::now()))
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
            self.expired_count += 1;
        }
    }

    /// Gets the live entry for a key.
    pub fn get(&mut self, key: &[u8]) -> Option<&Entry> {
        self.expire_if_needed(key);
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.expire_if_needed(key);
        self.entries.get_mut(key)
    }

    pub fn value(&mut self, key: &[u8]) -> Option<&Value> {
        self.get(key).map(|e| &e.value)
    }

    pub fn value_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.get_mut(key).map(|e| &mut e.value)
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn kind_of(&mut self, key: &[u8]) -> Option<ValueKind> {
        self.value(key).map(Value::kind)
    }

    /// Change version of a live key, None if absent.
    pub fn version(&mut self, key: &[u8]) -> Option<u64> {
        self.get(key).map(|e| e.version)
    }

    /// Returns the value for `key`, creating an empty container of `kind`
    /// if the key is absent. Fails with `WRONGTYPE` on a kind mismatch.
    pub fn get_or_create(&mut self, key: &Bytes, kind: ValueKind) -> CommandResult<&mut Value> {
        self.expire_if_needed(key);
        let version = self.next_version();
        let mut created = false;
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            created = true;
            Entry::new(Value::empty(kind), version)
        });
        if created {
            self.vivified.push(key.clone());
        }
        if entry.value.kind() != kind {
            return Err(CommandError::WrongType);
        }
        Ok(&mut entry.value)
    }

    typed_container!(string, string_mut, string_or_create, as_string, as_string_mut, ValueKind::String, Bytes);
    typed_container!(hash, hash_mut, hash_or_create, as_hash, as_hash_mut, ValueKind::Hash, BTreeMap<Bytes, Bytes>);
    typed_container!(members, members_mut, set_or_create, as_set, as_set_mut, ValueKind::Set, BTreeSet<Bytes>);
    typed_container!(zset, zset_mut, zset_or_create, as_zset, as_zset_mut, ValueKind::SortedSet, SortedSet);
    typed_container!(list, list_mut, list_or_create, as_list, as_list_mut, ValueKind::List, VecDeque<Bytes>);

    /// Stores a value, replacing whatever the key held (and its expiry).
    pub fn set(&mut self, key: Bytes, value: Value, expire_at: Option<Instant>) {
        let version = self.next_version();
        let mut entry = Entry::new(value, version);
        entry.expire_at = expire_at;
        self.entries.insert(key, entry);
        self.changed = true;
    }

    /// Deletes a key, returning its entry if it was live.
    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.expire_if_needed(key);
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    /// Moves an entry to a new name, keeping its value and expiry. Returns
    /// false if `from` does not exist.
    pub fn rename(&mut self, from: &[u8], to: Bytes) -> bool {
        match self.remove(from) {
            Some(entry) => {
                self.set(to, entry.value, entry.expire_at);
                true
            }
            None => false,
        }
    }

    /// Declares that the running command modified `key`: stamps a new
    /// version, or removes the key if its container is now empty.
    pub fn mark_modified(&mut self, key: &[u8]) {
        let version = self.next_version();
        let now_empty = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.version = version;
                entry.value.is_empty_container()
            }
            None => false,
        };
        if now_empty {
            self.entries.remove(key);
        }
        self.changed = true;
    }

    /// Sets or clears the expiry deadline. Returns false if the key is absent.
    pub fn set_expiry(&mut self, key: &[u8], expire_at: Option<Instant>) -> bool {
        match self.get_mut(key) {
            Some(entry) => {
                entry.expire_at = expire_at;
                self.mark_modified(key);
                true
            }
            None => false,
        }
    }

    /// All live keys, in key order.
    pub fn keys(&mut self) -> Vec<Bytes> {
        self.sweep_expired();
        self.entries.keys().cloned().collect()
    }

    /// Number of live keys.
    pub fn len(&mut self) -> usize {
        self.sweep_expired();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Clears all data from the database.
    ///
    /// This is equivalent to the FLUSHDB command.
    pub fn flush(&mut self) {
        if !self.entries.is_empty() {
            self.changed = true;
        }
        self.entries.clear();
    }

    /// Exchanges contents with another database (SWAPDB). Every moved key
    /// gets a fresh version so WATCH notices the swap.
    pub fn swap_contents(&mut self, other: &mut Keyspace) {
        std::mem::swap(&mut self.entries, &mut other.entries);
        for ks in [&mut *self, &mut *other] {
            let mut version = ks.version_counter;
            for entry in ks.entries.values_mut() {
                version += 1;
                entry.version = version;
            }
            ks.version_counter = version;
            ks.changed = true;
        }
    }

    /// Removes every expired key.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn sweep_expired(&mut self) -> u64 {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - self.entries.len()) as u64;
        if removed > 0 {
            self.expired_count += removed;
            debug!(db = self.index, removed, "Expired keys cleaned up");
        }
        removed
    }

    /// Total number of keys removed by expiry so far.
    pub fn expired_count(&self) -> u64 {
        self.expired_count
    }

    // ========================================================================
    // Change notification
    // ========================================================================

    /// Registers a listener, run after every command that modifies this
    /// database until it asks to be removed.
    pub fn add_change_listener(&mut self, listener: ChangeListener) -> ListenerId {
        self.next_listener_id += 1;
        let id = self.next_listener_id;
        self.listeners.push((id, listener));
        trace!(db = self.index, listener = id, "Change listener registered");
        id
    }

    /// Deregisters a listener. Returns false if it was already gone.
    pub fn remove_change_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        let removed = self.listeners.len() != before;
        if removed {
            trace!(db = self.index, listener = id, "Change listener removed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }

    /// Completes a command: drops containers the command auto-created but
    /// left empty, then notifies listeners if anything changed.
    pub fn finish_command(&mut self) {
        self.prune_vivified();
        self.notify_change();
    }

    /// Drops containers auto-created by the running command that ended up
    /// empty (a failed write, a pop from a missing key).
    pub fn prune_vivified(&mut self) {
        for key in std::mem::take(&mut self.vivified) {
            let empty = self
                .entries
                .get(&key)
                .map(|e| e.value.is_empty_container())
                .unwrap_or(false);
            if empty {
                self.entries.remove(&key);
            }
        }
    }

    /// Runs listeners in registration order while changes are pending. A
    /// listener that mutates the keyspace (a blocked pop that got its
    /// element) causes another pass, so later listeners see the effect.
    pub fn notify_change(&mut self) {
        while std::mem::take(&mut self.changed) {
            if self.listeners.is_empty() {
                break;
            }
            let mut pending = std::mem::take(&mut self.listeners);
            let mut kept = Vec::with_capacity(pending.len());
            for (id, mut listener) in pending.drain(..) {
                if listener(self) == ListenerAction::Keep {
                    kept.push((id, listener));
                }
            }
            kept.append(&mut self.listeners);
            self.listeners = kept;
        }
        self.changed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_get() {
        let mut ks = Keyspace::new(0);
        ks.set(b("key"), Value::String(b("value")), None);
        assert_eq!(ks.string(b"key").unwrap(), Some(&b("value")));
        assert_eq!(ks.kind_of(b"key"), Some(ValueKind::String));
    }

    #[test]
    fn test_wrong_type() {
        let mut ks = Keyspace::new(0);
        ks.set(b("key"), Value::String(b("value")), None);
        assert_eq!(ks.hash(b"key").unwrap_err(), CommandError::WrongType);
        assert!(ks.list_or_create(&b("key")).is_err());
    }

    #[test]
    fn test_expiry() {
        let mut ks = Keyspace::new(0);
        ks.set(
            b("key"),
            Value::String(b("value")),
            Some(Instant::now() + Duration::from_millis(30)),
        );
        assert!(ks.contains(b"key"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(!ks.contains(b"key"));
        assert_eq!(ks.expired_count(), 1);
    }

    #[test]
    fn test_sweep_expired() {
        let mut ks = Keyspace::new(0);
        let soon = Some(Instant::now() + Duration::from_millis(10));
        ks.set(b("key1"), Value::String(b("v")), soon);
        ks.set(b("key2"), Value::String(b("v")), soon);
        ks.set(b("key3"), Value::String(b("v")), None);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ks.sweep_expired(), 2);
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_versions_increase() {
        let mut ks = Keyspace::new(0);
        ks.set(b("k"), Value::String(b("1")), None);
        let v1 = ks.version(b"k").unwrap();
        ks.mark_modified(b"k");
        let v2 = ks.version(b"k").unwrap();
        assert!(v2 > v1);
        ks.remove(b"k");
        assert_eq!(ks.version(b"k"), None);
    }

    #[test]
    fn test_vivified_empty_container_is_dropped() {
        let mut ks = Keyspace::new(0);
        ks.hash_or_create(&b("h")).unwrap();
        assert!(ks.contains(b"h"));
        ks.finish_command();
        assert!(!ks.contains(b"h"));
    }

    #[test]
    fn test_mark_modified_removes_empty() {
        let mut ks = Keyspace::new(0);
        ks.set_or_create(&b("s")).unwrap().insert(b("m"));
        ks.finish_command();
        ks.members_mut(b"s").unwrap().unwrap().remove(&b("m"));
        ks.mark_modified(b"s");
        assert!(!ks.contains(b"s"));
    }

    #[test]
    fn test_listeners_run_in_order_until_removed() {
        let mut ks = Keyspace::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        ks.add_change_listener(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            ListenerAction::Remove
        }));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in [1, 2] {
            let order = Arc::clone(&order);
            ks.add_change_listener(Box::new(move |_| {
                order.lock().push(tag);
                ListenerAction::Keep
            }));
        }

        // no change, no notification
        ks.finish_command();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        ks.set(b("k"), Value::String(b("v")), None);
        ks.finish_command();
        ks.set(b("k"), Value::String(b("w")), None);
        ks.finish_command();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock(), vec![1, 2, 1, 2]);
        assert_eq!(ks.listener_count(), 2);
    }

    #[test]
    fn test_listener_mutation_triggers_another_pass() {
        let mut ks = Keyspace::new(0);
        // first listener moves "src" to "dst" once it appears
        ks.add_change_listener(Box::new(|ks| {
            if ks.rename(b"src", b("dst")) {
                ListenerAction::Remove
            } else {
                ListenerAction::Keep
            }
        }));
        let saw_dst = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&saw_dst);
        ks.add_change_listener(Box::new(move |ks| {
            if ks.contains(b"dst") {
                s.fetch_add(1, Ordering::SeqCst);
                ListenerAction::Remove
            } else {
                ListenerAction::Keep
            }
        }));

        ks.set(b("src"), Value::String(b("v")), None);
        ks.finish_command();
        assert_eq!(saw_dst.load(Ordering::SeqCst), 1);
        assert_eq!(ks.listener_count(), 0);
    }

    #[test]
    fn test_swap_contents_bumps_versions() {
        let mut a = Keyspace::new(0);
        let mut b_ks = Keyspace::new(1);
        a.set(b("x"), Value::String(b("1")), None);
        let before = a.version(b"x").unwrap();
        b_ks.set(b("y"), Value::String(b("2")), None);
        a.swap_contents(&mut b_ks);
        assert!(a.contains(b"y"));
        assert!(b_ks.version(b"x").unwrap() > before);
    }
}
