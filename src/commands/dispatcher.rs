//! Command Dispatcher
//!
//! Turns a command name and raw arguments into a reply:
//!
//! ```text
//!   name ──> normalize ──> lookup ──> arity ──> subscribed? ──> MULTI? ──┐
//!                            │          │                        queue  │
//!                       UnknownCommand  WrongArgsCount                  │
//!                                                                       ▼
//!        reply <── finish_command <── handler <── coerce args <── lock server
//!                  (prune, notify)
//! ```
//!
//! Errors raised by a handler come back as `Err(CommandError)`; they never
//! unwind through the server state. A blocking handler that found nothing
//! leaves a `PendingWait` in the context and the dispatcher hands it back to
//! the session, which waits with the lock released.

use super::args::{parse_float, parse_int, Args};
use super::registry::{normalize_name, ArgSpec, CommandSpec, PUBSUB, TX_CONTROL};
use crate::blocking::{PendingWait, WaitSlot};
use crate::config::ServerConfig;
use crate::connection::{ClientState, QueuedCommand};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use crate::server::{Server, ServerState};
use crate::storage::{Keyspace, ListenerAction};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Result of dispatching one command.
#[derive(Debug)]
pub enum Outcome {
    /// The command finished
    Done(CommandResult),
    /// The command is waiting for data; the caller must suspend on it
    Blocked(PendingWait),
}

/// What a handler gets to work with. Only exists while the server lock is
/// held.
pub struct CommandContext<'a> {
    pub state: &'a mut ServerState,
    pub client: &'a mut ClientState,
    pub server: &'a Server,
    in_exec: bool,
    pending: Option<PendingWait>,
}

impl<'a> CommandContext<'a> {
    pub fn new(server: &'a Server, state: &'a mut ServerState, client: &'a mut ClientState) -> Self {
        Self {
            state,
            client,
            server,
            in_exec: false,
            pending: None,
        }
    }

    /// The session's selected database.
    pub fn db(&mut self) -> &mut Keyspace {
        self.state.db(self.client.db)
    }

    pub fn config(&self) -> &ServerConfig {
        self.server.config()
    }

    /// True while running the body of an EXEC.
    pub fn in_exec(&self) -> bool {
        self.in_exec
    }

    /// Validates arguments against the command descriptor, then runs the handler.
    pub fn run(&mut self, spec: &CommandSpec, args: &Args) -> CommandResult {
        self.coerce(spec, args)?;
        (spec.handler)(self, args)
    }

    /// Checks every argument in order, failing on the first bad one.
    fn coerce(&mut self, spec: &CommandSpec, args: &Args) -> CommandResult<()> {
        for (index, arg) in args.all().iter().enumerate() {
            match spec.arg_spec(index) {
                Some(ArgSpec::Int) => {
                    parse_int(arg)?;
                }
                Some(ArgSpec::Float) => {
                    parse_float(arg)?;
                }
                Some(ArgSpec::Key(Some(kind))) => {
                    if let Some(actual) = self.db().kind_of(arg) {
                        if actual != kind {
                            return Err(CommandError::WrongType);
                        }
                    }
                }
                Some(ArgSpec::Key(None)) | Some(ArgSpec::Bytes) | None => {}
            }
        }
        Ok(())
    }

    /// Runs a queued command as part of EXEC, under the lock already held.
    pub fn run_queued(&mut self, command: &QueuedCommand) -> CommandResult {
        let mut nested = CommandContext {
            state: &mut *self.state,
            client: &mut *self.client,
            server: self.server,
            in_exec: true,
            pending: None,
        };
        let result = nested.run(command.spec, &Args::new(command.args.clone()));
        self.state.prune_vivified();
        result
    }

    /// Runs the blocking protocol for one command.
    ///
    /// `attempt` is the non-blocking variant: `Ok(Some(reply))` when it
    /// could do its work, `Ok(None)` when there is nothing to take yet. It
    /// runs once now; if it comes back empty it is re-run after every
    /// change to the database until it succeeds or the session gives up.
    ///
    /// # Arguments
    ///
    /// * `timeout` - How long to wait, None for forever
    /// * `timeout_reply` - The reply when the deadline passes
    /// * `attempt` - The non-blocking operation
    pub fn block_on<F>(
        &mut self,
        timeout: Option<Duration>,
        timeout_reply: Reply,
        mut attempt: F,
    ) -> CommandResult
    where
        F: FnMut(&mut Keyspace) -> CommandResult<Option<Reply>> + Send + 'static,
    {
        let db_index = self.client.db;
        let db = self.state.db(db_index);

        if let Some(reply) = attempt(db)? {
            return Ok(reply);
        }
        // a transaction cannot suspend
        if self.in_exec {
            return Ok(timeout_reply);
        }

        let slot = Arc::new(WaitSlot::new());
        let target = Arc::clone(&slot);
        let listener = db.add_change_listener(Box::new(move |ks| match attempt(ks) {
            Ok(None) => ListenerAction::Keep,
            Ok(Some(reply)) => {
                target.complete(Ok(reply));
                ListenerAction::Remove
            }
            Err(err) => {
                target.complete(Err(err));
                ListenerAction::Remove
            }
        }));

        debug!(
            session = self.client.id,
            db = db_index,
            listener,
            timeout = ?timeout,
            "Blocking command waiting"
        );

        self.pending = Some(PendingWait {
            db: db_index,
            listener,
            slot,
            deadline: timeout.map(|t| Instant::now() + t),
            timeout_reply,
        });
        Ok(Reply::Nil)
    }
}

/// Dispatches one command for a session.
///
/// # Arguments
///
/// * `server` - The server to run against
/// * `client` - The calling session's state
/// * `name` - Command name, any case
/// * `args` - Raw arguments, without the name
pub fn dispatch(server: &Server, client: &mut ClientState, name: &[u8], args: Vec<Bytes>) -> Outcome {
    let normalized = normalize_name(name);
    let Some(spec) = server.commands().lookup(&normalized) else {
        client.fail_transaction();
        let shown = &name[..name.iter().position(|&b| b == 0).unwrap_or(name.len())];
        return Outcome::Done(Err(CommandError::unknown_command(shown, &args)));
    };

    if let Err(err) = spec.check_arity(args.len()) {
        client.fail_transaction();
        return Outcome::Done(Err(err));
    }

    if client.is_subscribed() && !spec.has_flag(PUBSUB) {
        return Outcome::Done(Err(CommandError::SubscribedContext(spec.name.to_string())));
    }

    if let Some(tx) = client.transaction.as_mut() {
        if !spec.has_flag(TX_CONTROL) {
            trace!(session = client.id, command = spec.name, "Command queued");
            tx.queue.push(QueuedCommand { spec, args });
            return Outcome::Done(Ok(Reply::queued()));
        }
    }

    trace!(
        session = client.id,
        command = spec.name,
        args = args.len(),
        "Dispatching command"
    );

    let args = Args::new(args);
    let mut state = server.lock();
    let mut ctx = CommandContext::new(server, &mut state, client);
    let result = ctx.run(spec, &args);
    let pending = ctx.pending.take();
    state.finish_command();

    match pending {
        Some(wait) => Outcome::Blocked(wait),
        None => Outcome::Done(result),
    }
}
