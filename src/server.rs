//! Server and Server Registry
//!
//! A `Server` is the shared root every session attaches to. It owns the
//! numbered databases and the pub/sub registry behind a single lock, the
//! connectivity flag used to simulate a network outage, and the command
//! registry.
//!
//! ## Locking
//!
//! ```text
//!   Session A ──┐
//!   Session B ──┼──> Server::lock() ──> ServerState { dbs, pubsub }
//!   Sweeper   ──┘        (one parking_lot::Mutex)
//! ```
//!
//! Every command body runs with the lock held, so commands are atomic with
//! respect to each other. Nothing waits while holding it: blocked commands
//! release it and are retried from change listeners.
//!
//! Servers are plain values; tests that need isolation just build two. The
//! `ServerRegistry` exists for callers that want "same address, same data"
//! behavior.

use crate::commands::CommandRegistry;
use crate::config::ServerConfig;
use crate::pubsub::{PubSubRegistry, SessionId};
use crate::storage::Keyspace;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::info;

/// Everything protected by the server lock.
#[derive(Debug)]
pub struct ServerState {
    dbs: Vec<Keyspace>,
    pub pubsub: PubSubRegistry,
}

impl ServerState {
    fn new(databases: usize) -> Self {
        Self {
            dbs: (0..databases).map(Keyspace::new).collect(),
            pubsub: PubSubRegistry::new(),
        }
    }

    /// The database at `index`. Indexes are validated by SELECT, so an out
    /// of range index here is a programming error.
    pub fn db(&mut self, index: usize) -> &mut Keyspace {
        &mut self.dbs[index]
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    pub fn dbs_mut(&mut self) -> impl Iterator<Item = &mut Keyspace> {
        self.dbs.iter_mut()
    }

    /// Exchanges the contents of two databases. Listeners stay with their
    /// database index.
    pub fn swap_dbs(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (left, right) = self.dbs.split_at_mut(hi);
        left[lo].swap_contents(&mut right[0]);
    }

    /// Stored entries across all databases, counting expired ones not yet
    /// reclaimed.
    pub fn stored_len(&self) -> usize {
        self.dbs.iter().map(Keyspace::stored_len).sum()
    }

    /// Removes expired keys everywhere. Returns how many were removed.
    pub fn sweep_expired(&mut self) -> u64 {
        self.dbs.iter_mut().map(Keyspace::sweep_expired).sum()
    }

    /// Drops empty auto-created containers in every database.
    pub fn prune_vivified(&mut self) {
        for db in &mut self.dbs {
            db.prune_vivified();
        }
    }

    /// Completes a command in every database it may have touched.
    pub fn finish_command(&mut self) {
        for db in &mut self.dbs {
            db.finish_command();
        }
    }
}

/// Identity under which a server is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerKey {
    /// A `host:port` pair
    Address { host: String, port: u16 },
    /// A unix socket path or similar file-system-like identifier
    Path(String),
    /// The default key when no target is given
    Shared,
}

impl ServerKey {
    /// Derives the key from a connection target, preferring a path when
    /// both are given.
    pub fn from_target(host: Option<&str>, port: Option<u16>, path: Option<&str>) -> Self {
        match (path, host, port) {
            (Some(path), _, _) => ServerKey::Path(path.to_string()),
            (None, None, None) => ServerKey::Shared,
            (None, host, port) => ServerKey::Address {
                host: host.unwrap_or("localhost").to_string(),
                port: port.unwrap_or(6379),
            },
        }
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKey::Address { host, port } => write!(f, "{}:{}", host, port),
            ServerKey::Path(path) => f.write_str(path),
            ServerKey::Shared => f.write_str("shared"),
        }
    }
}

/// An in-memory server.
pub struct Server {
    state: Mutex<ServerState>,
    connected: AtomicBool,
    config: ServerConfig,
    commands: CommandRegistry,
    next_session_id: AtomicU64,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("databases", &self.config.databases)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Server {
    /// Creates a server with empty databases.
    pub fn new(config: ServerConfig) -> Self {
        let databases = config.databases.max(1);
        info!(databases, "Server created");
        Self {
            state: Mutex::new(ServerState::new(databases)),
            connected: AtomicBool::new(true),
            commands: CommandRegistry::standard(),
            config,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Acquires the server lock.
    pub fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Simulates the network going down (false) or coming back (true).
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        info!(connected, "Server connectivity changed");
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Hands out shared servers by identity.
///
/// The registry only holds weak references, so a server is dropped once
/// the last session using it goes away.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: Mutex<HashMap<ServerKey, Weak<Server>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live server for `key`, creating one with `config` if
    /// none exists.
    pub fn get_or_create(&self, key: ServerKey, config: ServerConfig) -> Arc<Server> {
        let mut servers = self.servers.lock();
        if let Some(server) = servers.get(&key).and_then(Weak::upgrade) {
            return server;
        }
        servers.retain(|_, weak| weak.strong_count() > 0);
        info!(key = %key, "Creating server");
        let server = Arc::new(Server::new(config));
        servers.insert(key, Arc::downgrade(&server));
        server
    }

    /// Like `get_or_create` with the default configuration.
    pub fn server(&self, key: ServerKey) -> Arc<Server> {
        self.get_or_create(key, ServerConfig::default())
    }

    /// Number of servers still alive.
    pub fn len(&self) -> usize {
        self.servers
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;
    use bytes::Bytes;

    #[test]
    fn test_server_key_display() {
        assert_eq!(
            ServerKey::from_target(Some("10.0.0.1"), Some(7000), None).to_string(),
            "10.0.0.1:7000"
        );
        assert_eq!(
            ServerKey::from_target(None, Some(7000), None).to_string(),
            "localhost:7000"
        );
        assert_eq!(
            ServerKey::from_target(Some("h"), None, Some("/tmp/redis.sock")).to_string(),
            "/tmp/redis.sock"
        );
        assert_eq!(ServerKey::from_target(None, None, None), ServerKey::Shared);
    }

    #[test]
    fn test_registry_shares_by_key() {
        let registry = ServerRegistry::new();
        let a = registry.server(ServerKey::Shared);
        let b = registry.server(ServerKey::Shared);
        let c = registry.server(ServerKey::Path("other".into()));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_drops_unused_servers() {
        let registry = ServerRegistry::new();
        let first = registry.server(ServerKey::Shared);
        first
            .lock()
            .db(0)
            .set(Bytes::from("k"), Value::String(Bytes::from("v")), None);
        drop(first);
        assert!(registry.is_empty());

        let second = registry.server(ServerKey::Shared);
        assert!(!second.lock().db(0).contains(b"k"));
    }

    #[test]
    fn test_swap_dbs() {
        let server = Server::default();
        let mut state = server.lock();
        state
            .db(0)
            .set(Bytes::from("k"), Value::String(Bytes::from("v")), None);
        state.swap_dbs(0, 5);
        assert!(!state.db(0).contains(b"k"));
        assert!(state.db(5).contains(b"k"));
        state.swap_dbs(5, 0);
        assert!(state.db(0).contains(b"k"));
    }

    #[test]
    fn test_connected_flag() {
        let server = Server::default();
        assert!(server.is_connected());
        server.set_connected(false);
        assert!(!server.is_connected());
    }
}
