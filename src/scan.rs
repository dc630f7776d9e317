//! Scan Cursor Engine
//!
//! SCAN, HSCAN, SSCAN and ZSCAN page through a snapshot of names captured
//! when a scan starts at cursor 0. The cursor is simply the index into that
//! snapshot.
//!
//! ```text
//!   SCAN 0      capture [a b c d e f g]    -> page [a b c], cursor 3
//!   SCAN 3                 ^               -> page [d e f], cursor 6
//!   SCAN 6                       ^         -> page [g],     cursor 0 (discard)
//! ```
//!
//! The snapshot fixes which names are candidates and in which order, not
//! whether they still exist: callers drop names that vanished since the
//! snapshot was taken. Every name present for the whole scan is therefore
//! returned exactly once. Names added after the scan started are not
//! returned. This is looser than the real server's hash-table cursor but
//! gives the same guarantee clients rely on.

use bytes::Bytes;
use std::collections::HashMap;

/// What a snapshot enumerates. Collection scans carry their key, so
/// scanning two hashes at once does not mix their snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Keys { db: usize },
    HashFields { db: usize, key: Bytes },
    SetMembers { db: usize, key: Bytes },
    SortedSetMembers { db: usize, key: Bytes },
}

/// One page of candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWindow {
    /// Cursor to pass next, 0 once the snapshot is exhausted
    pub next_cursor: u64,
    /// Snapshot entries in this page, still to be filtered by the caller
    pub candidates: Vec<Bytes>,
}

/// Per-session scan snapshots.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    snapshots: HashMap<ScanKind, Vec<Bytes>>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the candidates in `[cursor, cursor + count)` of the snapshot
    /// for `kind`.
    ///
    /// Cursor 0 (re)captures the snapshot with `capture`. A nonzero cursor
    /// with no snapshot (one this session never started, or one already
    /// finished) captures a fresh one and pages from the given position.
    pub fn window<F>(&mut self, kind: ScanKind, cursor: u64, count: usize, capture: F) -> ScanWindow
    where
        F: FnOnce() -> Vec<Bytes>,
    {
        if cursor == 0 {
            self.snapshots.remove(&kind);
        }
        let snapshot = self.snapshots.entry(kind.clone()).or_insert_with(capture);

        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(snapshot.len());
        let end = start.saturating_add(count.max(1)).min(snapshot.len());
        let candidates = snapshot[start..end].to_vec();

        let next_cursor = if end >= snapshot.len() {
            self.snapshots.remove(&kind);
            0
        } else {
            end as u64
        };

        ScanWindow {
            next_cursor,
            candidates,
        }
    }

    pub fn has_snapshot(&self, kind: &ScanKind) -> bool {
        self.snapshots.contains_key(kind)
    }

    /// Number of scans in progress.
    pub fn active(&self) -> usize {
        self.snapshots.len()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
