//! Storage Module
//!
//! This module provides the typed data model of the engine: the value kinds
//! a key can hold, the per-database keyspace with expiry and change
//! notification, and the background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ServerState (behind one lock)              │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐        │
//! │  │Keyspace 0│ │Keyspace 1│ │Keyspace 2│ │ ...N-1   │        │
//! │  │ entries  │ │ entries  │ │ entries  │ │          │        │
//! │  │listeners │ │listeners │ │listeners │ │          │        │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Typed values**: string, hash, set, sorted set and list containers
//! - **TTL Support**: keys can carry an expiry deadline
//! - **Lazy Expiry**: expired keys are dropped on access
//! - **Active Expiry**: the background sweeper reclaims orphaned expired keys
//! - **Change versions and listeners**: the hooks WATCH and blocking
//!   commands are built on
//!
//! ## Example
//!
//! ```
//! use fakeredis::storage::{Keyspace, Value};
//! use bytes::Bytes;
//!
//! let mut db = Keyspace::new(0);
//! db.set(Bytes::from("name"), Value::String(Bytes::from("Ariz")), None);
//! assert_eq!(db.string(b"name").unwrap(), Some(&Bytes::from("Ariz")));
//!
//! // a wrong-kind read fails instead of returning nothing
//! assert!(db.hash(b"name").is_err());
//! ```

pub mod expiry;
pub mod keyspace;
pub mod sorted_set;
pub mod value;

// Re-export commonly used types
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use keyspace::{ChangeListener, Entry, Keyspace, ListenerAction, ListenerId};
pub use sorted_set::{ScoreBound, SortedSet};
pub use value::{Value, ValueKind};
