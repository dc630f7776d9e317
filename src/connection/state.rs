//! Per-session state the dispatcher reads and writes.

use crate::commands::CommandSpec;
use crate::pubsub::{MessageSink, PubSubMessage, SessionId};
use crate::scan::CursorRegistry;
use bytes::Bytes;
use std::collections::BTreeSet;
use tokio::sync::mpsc;

/// A command accepted by MULTI and waiting for EXEC.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub spec: &'static CommandSpec,
    pub args: Vec<Bytes>,
}

/// An open MULTI block.
#[derive(Debug, Default)]
pub struct Transaction {
    pub queue: Vec<QueuedCommand>,
    /// Set when a command failed validation while queuing
    pub failed: bool,
}

/// A WATCHed key and the change version it had when watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedKey {
    pub db: usize,
    pub key: Bytes,
    pub version: Option<u64>,
}

/// Everything a session carries between commands.
#[derive(Debug)]
pub struct ClientState {
    pub id: SessionId,
    /// Selected database
    pub db: usize,
    pub transaction: Option<Transaction>,
    pub watched: Vec<WatchedKey>,
    pub cursors: CursorRegistry,
    pub channels: BTreeSet<Bytes>,
    pub patterns: BTreeSet<Bytes>,
    /// Handed to the pub/sub registry on subscribe
    pub sink: MessageSink,
}

impl ClientState {
    /// Creates the state and the receiving end of its message inbox.
    pub fn new(id: SessionId) -> (Self, mpsc::UnboundedReceiver<PubSubMessage>) {
        let (sink, inbox) = mpsc::unbounded_channel();
        let state = Self {
            id,
            db: 0,
            transaction: None,
            watched: Vec::new(),
            cursors: CursorRegistry::new(),
            channels: BTreeSet::new(),
            patterns: BTreeSet::new(),
            sink,
        };
        (state, inbox)
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Number of channel and pattern subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription_count() > 0
    }

    /// Marks an open transaction as failed; no-op outside MULTI.
    pub fn fail_transaction(&mut self) {
        if let Some(tx) = self.transaction.as_mut() {
            tx.failed = true;
        }
    }
}
