//! MULTI / EXEC / DISCARD / WATCH / UNWATCH.
//!
//! MULTI, EXEC, DISCARD and WATCH are control commands: the dispatcher runs
//! them even while a transaction is queuing. UNWATCH is queued like any
//! other command.

use super::args::Args;
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, KEY, TX_CONTROL};
use crate::connection::{Transaction, WatchedKey};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use tracing::debug;

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("multi", &[], multi).flags(TX_CONTROL),
    CommandSpec::new("exec", &[], exec).flags(TX_CONTROL),
    CommandSpec::new("discard", &[], discard).flags(TX_CONTROL),
    CommandSpec::new("watch", &[KEY], watch).variadic(&[KEY]).flags(TX_CONTROL),
    CommandSpec::new("unwatch", &[], unwatch),
];

fn multi(ctx: &mut CommandContext<'_>, _args: &Args) -> CommandResult {
    if ctx.client.in_transaction() {
        return Err(CommandError::NestedMulti);
    }
    ctx.client.transaction = Some(Transaction::default());
    Ok(Reply::ok())
}

/// Runs the queue atomically. The lock is already held for the whole of
/// EXEC, so nothing else can interleave.
fn exec(ctx: &mut CommandContext<'_>, _args: &Args) -> CommandResult {
    let tx = ctx
        .client
        .transaction
        .take()
        .ok_or(CommandError::ExecWithoutMulti)?;
    let watched = std::mem::take(&mut ctx.client.watched);

    if tx.failed {
        return Err(CommandError::ExecAbort);
    }

    for w in &watched {
        if ctx.state.db(w.db).version(&w.key) != w.version {
            debug!(
                session = ctx.client.id,
                db = w.db,
                key = ?w.key,
                "Transaction aborted by watched key"
            );
            return Ok(Reply::NilArray);
        }
    }

    let mut replies = Vec::with_capacity(tx.queue.len());
    for command in &tx.queue {
        replies.push(ctx.run_queued(command).unwrap_or_else(Reply::from));
    }
    Ok(Reply::array(replies))
}

fn discard(ctx: &mut CommandContext<'_>, _args: &Args) -> CommandResult {
    if ctx.client.transaction.take().is_none() {
        return Err(CommandError::DiscardWithoutMulti);
    }
    ctx.client.watched.clear();
    Ok(Reply::ok())
}

/// Records the current change version of each key; a missing key is
/// recorded as absent.
fn watch(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    if ctx.client.in_transaction() {
        return Err(CommandError::WatchInsideMulti);
    }
    let db = ctx.client.db;
    for key in args.all() {
        let version = ctx.state.db(db).version(key);
        ctx.client.watched.push(WatchedKey {
            db,
            key: key.clone(),
            version,
        });
    }
    Ok(Reply::ok())
}

fn unwatch(ctx: &mut CommandContext<'_>, _args: &Args) -> CommandResult {
    ctx.client.watched.clear();
    Ok(Reply::ok())
}

#[cfg(test)]
mod tests {
    use crate::connection::Session;
    use crate::error::CommandError;
    use crate::reply::Reply;
    use crate::server::Server;
    use std::sync::Arc;

    #[test]
    fn test_queue_and_exec() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        assert_eq!(s.execute_str("MULTI"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("SET a 1"), Ok(Reply::queued()));
        assert_eq!(s.execute_str("INCR a"), Ok(Reply::queued()));
        assert_eq!(s.execute_str("HSET a f v"), Ok(Reply::queued()));
        assert_eq!(
            s.execute_str("EXEC"),
            Ok(Reply::array(vec![
                Reply::ok(),
                Reply::integer(2),
                Reply::from(CommandError::WrongType),
            ]))
        );
        assert_eq!(s.execute_str("GET a"), Ok(Reply::bulk("2")));
    }

    #[test]
    fn test_queue_error_aborts() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        s.execute_str("MULTI").unwrap();
        s.execute_str("SET a 1").unwrap();
        assert_eq!(
            s.execute_str("GET"),
            Err(CommandError::wrong_args("get"))
        );
        assert!(s.execute_str("NOSUCHCMD").is_err());
        assert_eq!(s.execute_str("EXEC"), Err(CommandError::ExecAbort));
        assert_eq!(s.execute_str("GET a"), Ok(Reply::Nil));
    }

    #[test]
    fn test_control_misuse() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        assert_eq!(s.execute_str("EXEC"), Err(CommandError::ExecWithoutMulti));
        assert_eq!(s.execute_str("DISCARD"), Err(CommandError::DiscardWithoutMulti));
        s.execute_str("MULTI").unwrap();
        assert_eq!(s.execute_str("MULTI"), Err(CommandError::NestedMulti));
        assert_eq!(s.execute_str("WATCH k"), Err(CommandError::WatchInsideMulti));
        s.execute_str("SET k v").unwrap();
        assert_eq!(s.execute_str("DISCARD"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("GET k"), Ok(Reply::Nil));
    }

    #[test]
    fn test_watch_aborts_on_foreign_write() {
        let server = Arc::new(Server::default());
        let mut a = Session::connect(Arc::clone(&server)).unwrap();
        let mut b = Session::connect(server).unwrap();
        a.execute_str("SET k 1").unwrap();
        a.execute_str("WATCH k").unwrap();
        b.execute_str("SET k 2").unwrap();
        a.execute_str("MULTI").unwrap();
        a.execute_str("SET k 3").unwrap();
        assert_eq!(a.execute_str("EXEC"), Ok(Reply::NilArray));
        assert_eq!(a.execute_str("GET k"), Ok(Reply::bulk("2")));

        // the watch set is cleared by EXEC
        a.execute_str("MULTI").unwrap();
        a.execute_str("SET k 3").unwrap();
        assert_eq!(a.execute_str("EXEC"), Ok(Reply::array(vec![Reply::ok()])));
    }

    #[test]
    fn test_watch_missing_key_then_created() {
        let server = Arc::new(Server::default());
        let mut a = Session::connect(Arc::clone(&server)).unwrap();
        let mut b = Session::connect(server).unwrap();
        a.execute_str("WATCH k").unwrap();
        b.execute_str("SET k x").unwrap();
        a.execute_str("MULTI").unwrap();
        assert_eq!(a.execute_str("EXEC"), Ok(Reply::NilArray));
    }

    #[test]
    fn test_unwatch_and_untouched_watch() {
        let mut s = Session::connect(Arc::new(Server::default())).unwrap();
        s.execute_str("SET k 1").unwrap();
        s.execute_str("WATCH k other").unwrap();
        s.execute_str("GET k").unwrap();
        s.execute_str("MULTI").unwrap();
        s.execute_str("UNWATCH").unwrap();
        assert_eq!(
            s.execute_str("EXEC"),
            Ok(Reply::array(vec![Reply::ok()]))
        );
    }
}
