//! Connection Module
//!
//! A connection here is an in-process `Session` rather than a socket. Each
//! session carries its own `ClientState` and runs commands on the calling
//! thread or task; many sessions may share one `Server`.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────┐
//! │   Session 1   │  │   Session 2   │  │   Session 3   │
//! │  ClientState  │  │  ClientState  │  │  ClientState  │
//! │  (db, MULTI,  │  │               │  │               │
//! │  WATCH, subs) │  │               │  │               │
//! └───────┬───────┘  └───────┬───────┘  └───────┬───────┘
//!         │ dispatch         │                  │
//!         ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Server (one lock)                       │
//! │    Keyspace 0 .. N-1          PubSubRegistry            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use fakeredis::connection::Session;
//! use fakeredis::reply::Reply;
//! use fakeredis::server::Server;
//! use std::sync::Arc;
//!
//! let server = Arc::new(Server::default());
//! let mut session = Session::connect(server).unwrap();
//! session.execute("SET", ["greeting", "hello"]).unwrap();
//! assert_eq!(session.execute("GET", ["greeting"]), Ok(Reply::bulk("hello")));
//! ```

mod session;
mod state;

pub use session::Session;
pub use state::{ClientState, QueuedCommand, Transaction, WatchedKey};
