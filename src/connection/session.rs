//! Client Session
//!
//! A `Session` is one client connection to an in-process server. It owns
//! the per-connection state (selected database, transaction queue, watched
//! keys, scan cursors, subscriptions) and is the only way commands reach
//! the dispatcher.
//!
//! ## Command Lifecycle
//!
//! ```text
//!   execute(name, args)
//!        │
//!        ├── server disconnected? ──> ConnectionUnavailable
//!        ▼
//!   dispatch ──> Done(result) ─────────────────────────────> result
//!        │
//!        └────> Blocked(wait) ──> park thread / await task
//!                                      │
//!                          listener fired or deadline hit
//!                                      ▼
//!                                   resolve ────────────────> result
//! ```
//!
//! Dropping a session disconnects it: any pending wait is deregistered
//! (the `BlockedCall` guard does that) and its pub/sub subscriptions are
//! removed from the server.

use super::state::ClientState;
use crate::blocking::BlockedCall;
use crate::commands::{dispatch, Outcome};
use crate::error::{CommandError, CommandResult};
use crate::pubsub::{PubSubMessage, SessionId};
use crate::server::Server;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A client connection to a `Server`.
pub struct Session {
    server: Arc<Server>,
    client: ClientState,
    /// Pub/sub messages addressed to this session
    inbox: mpsc::UnboundedReceiver<PubSubMessage>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.client.id)
            .field("db", &self.client.db)
            .field("in_transaction", &self.client.in_transaction())
            .finish()
    }
}

impl Session {
    /// Opens a session on `server`.
    ///
    /// # Returns
    ///
    /// `ConnectionUnavailable` if the server is marked disconnected.
    pub fn connect(server: Arc<Server>) -> Result<Self, CommandError> {
        if !server.is_connected() {
            return Err(CommandError::ConnectionUnavailable);
        }
        let (client, inbox) = ClientState::new(server.next_session_id());
        info!(session = client.id, "Session opened");
        Ok(Self {
            server,
            client,
            inbox,
        })
    }

    pub fn id(&self) -> SessionId {
        self.client.id
    }

    /// The selected database index.
    pub fn db(&self) -> usize {
        self.client.db
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    fn ensure_connected(&self) -> CommandResult<()> {
        if self.server.is_connected() {
            Ok(())
        } else {
            Err(CommandError::ConnectionUnavailable)
        }
    }

    /// Executes one command. A blocking command parks the calling thread
    /// until it is satisfied or times out.
    ///
    /// # Arguments
    ///
    /// * `name` - The command name, any case
    /// * `args` - The arguments, without the name
    pub fn execute<N, I, A>(&mut self, name: N, args: I) -> CommandResult
    where
        N: AsRef<[u8]>,
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        self.ensure_connected()?;
        let args = args.into_iter().map(Into::into).collect();
        match dispatch(&self.server, &mut self.client, name.as_ref(), args) {
            Outcome::Done(result) => result,
            Outcome::Blocked(wait) => {
                debug!(session = self.client.id, "Session waiting on blocking command");
                BlockedCall::new(&self.server, wait).wait()
            }
        }
    }

    /// Async counterpart of `execute`: a blocking command suspends the
    /// task instead of the thread. Dropping the future cancels the wait.
    pub async fn execute_async<N, I, A>(&mut self, name: N, args: I) -> CommandResult
    where
        N: AsRef<[u8]>,
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        self.ensure_connected()?;
        let args = args.into_iter().map(Into::into).collect();
        match dispatch(&self.server, &mut self.client, name.as_ref(), args) {
            Outcome::Done(result) => result,
            Outcome::Blocked(wait) => {
                debug!(session = self.client.id, "Session waiting on blocking command");
                BlockedCall::new(&self.server, wait).wait_async().await
            }
        }
    }

    /// Splits `line` on whitespace and executes it. Handy in tests and the
    /// REPL; arguments cannot contain spaces.
    pub fn execute_str(&mut self, line: &str) -> CommandResult {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<Bytes> = parts.map(|p| Bytes::copy_from_slice(p.as_bytes())).collect();
        self.execute(name, args)
    }

    /// Next pending pub/sub message, if any.
    pub fn try_recv_message(&mut self) -> Option<PubSubMessage> {
        self.inbox.try_recv().ok()
    }

    /// Waits for the next pub/sub message.
    pub async fn recv_message(&mut self) -> Option<PubSubMessage> {
        self.inbox.recv().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut state = self.server.lock();
        state.pubsub.remove_session(self.client.id);
        drop(state);
        info!(session = self.client.id, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::Reply;
    use std::time::{Duration, Instant};

    #[test]
    fn test_connect_refused_when_disconnected() {
        let server = Arc::new(Server::default());
        server.set_connected(false);
        assert_eq!(
            Session::connect(Arc::clone(&server)).unwrap_err(),
            CommandError::ConnectionUnavailable
        );
        server.set_connected(true);
        assert!(Session::connect(server).is_ok());
    }

    #[test]
    fn test_execute_fails_while_disconnected() {
        let server = Arc::new(Server::default());
        let mut s = Session::connect(Arc::clone(&server)).unwrap();
        s.execute_str("SET k v").unwrap();
        server.set_connected(false);
        assert_eq!(s.execute_str("GET k"), Err(CommandError::ConnectionUnavailable));
        server.set_connected(true);
        assert_eq!(s.execute_str("GET k"), Ok(Reply::bulk("v")));
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let server = Arc::new(Server::default());
        let a = Session::connect(Arc::clone(&server)).unwrap();
        let b = Session::connect(server).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_execute_binary_args() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        let value = Bytes::from_static(b"\x00\xff bin");
        s.execute("SET", [Bytes::from_static(b"k"), value.clone()]).unwrap();
        assert_eq!(s.execute("GET", ["k"]), Ok(Reply::Bulk(value)));
    }

    #[test]
    fn test_blocking_timeout_on_thread() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        let start = Instant::now();
        assert_eq!(s.execute_str("BLPOP l 0.1"), Ok(Reply::NilArray));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(s.server().lock().db(0).listener_count(), 0);
    }

    #[test]
    fn test_execute_async_ready_without_waiting() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        tokio_test::block_on(s.execute_async("RPUSH", ["l", "a"])).unwrap();
        let reply = tokio_test::block_on(s.execute_async("BLPOP", ["l", "0"]));
        assert_eq!(reply, Ok(Reply::bulk_array(["l", "a"])));
    }

    #[tokio::test]
    async fn test_blocking_timeout_async() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        let reply = s.execute_async("BRPOPLPUSH", ["a", "b", "0.05"]).await;
        assert_eq!(reply, Ok(Reply::Nil));
    }

    #[tokio::test]
    async fn test_cancelled_wait_deregisters() {
        let server = Arc::new(Server::default());
        let mut s = Session::connect(Arc::clone(&server)).unwrap();
        let pending = s.execute_async("BLPOP", ["l", "0"]);
        let result = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(result.is_err());
        assert_eq!(server.lock().db(0).listener_count(), 0);
    }
}
