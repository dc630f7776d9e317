//! # fakeredis - An In-Process Redis Test Double
//!
//! fakeredis is an in-memory engine that answers Redis commands with the
//! same replies and the same errors a real server would, without a network
//! or a server process. Tests open a `Session` on a `Server` and run
//! commands against it directly.
//!
//! ## Features
//!
//! - **Redis semantics**: strings, hashes, lists, sets and sorted sets,
//!   key expiry, numbered databases, glob-style KEYS/SCAN
//! - **Transactions**: MULTI/EXEC/DISCARD with optimistic WATCH
//! - **Blocking commands**: BLPOP, BRPOP, BRPOPLPUSH, BLMOVE, BZPOPMIN and
//!   BZPOPMAX, from threads or async tasks
//! - **Pub/Sub**: channel and pattern subscriptions
//! - **Connectivity simulation**: a server can be marked disconnected
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              fakeredis                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Session   │───>│ Dispatcher  │───>│  Registry   │                  │
//! │  │ ClientState │    │ arity, type │    │ CommandSpec │                  │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘                  │
//! │         │ wait             │ lock                                       │
//! │         ▼                  ▼                                            │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │ BlockedCall │<───│                 Server                       │   │
//! │  │  WaitSlot   │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  └─────────────┘    │  │  DB 0  │ │  DB 1  │ │  DB 2  │ │ ...N   │ │   │
//! │   change listener   │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     │              PubSubRegistry                  │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper (optional)              │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use fakeredis::{Reply, Server, ServerKey, ServerRegistry, Session};
//!
//! let registry = ServerRegistry::new();
//! let server = registry.server(ServerKey::from_target(Some("localhost"), Some(6379), None));
//!
//! let mut a = Session::connect(server.clone()).unwrap();
//! let mut b = Session::connect(server).unwrap();
//!
//! a.execute("RPUSH", ["jobs", "first"]).unwrap();
//! assert_eq!(b.execute("LPOP", ["jobs"]), Ok(Reply::bulk("first")));
//! ```
//!
//! ## Module Overview
//!
//! - [`server`]: the shared server, its databases and the identity registry
//! - [`connection`]: sessions and per-connection state
//! - [`commands`]: registry, dispatcher and command handlers
//! - [`storage`]: keyspaces, typed values and expiry
//! - [`blocking`]: waiting for blocking commands
//! - [`pubsub`], [`scan`], [`pattern`]: subsystems used by the commands
//! - [`reply`], [`error`]: what commands hand back
//!
//! ## Design Highlights
//!
//! ### One Lock
//!
//! Every command runs under a single server lock, which makes each command
//! and each EXEC atomic. Blocking commands never wait while holding it.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: every read path treats an expired key as absent
//! 2. **Active**: an optional background task sweeps expired keys

pub mod blocking;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod pattern;
pub mod pubsub;
pub mod reply;
pub mod scan;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{dispatch, CommandRegistry, Outcome};
pub use config::ServerConfig;
pub use connection::Session;
pub use error::{CommandError, CommandResult, ErrorKind};
pub use reply::Reply;
pub use server::{Server, ServerKey, ServerRegistry};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};

/// Version of fakeredis
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
