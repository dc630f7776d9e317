//! Connection and server commands.

use super::args::Args;
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, INT, PUBSUB};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("ping", &[], ping).variadic(&[ARG]).flags(PUBSUB),
    CommandSpec::new("echo", &[ARG], echo),
    CommandSpec::new("select", &[INT], select),
    CommandSpec::new("dbsize", &[], dbsize),
    CommandSpec::new("flushdb", &[], flushdb).variadic(&[ARG]),
    CommandSpec::new("flushall", &[], flushall).variadic(&[ARG]),
    CommandSpec::new("swapdb", &[INT, INT], swapdb),
    CommandSpec::new("time", &[], time),
];

/// PING [message]
///
/// In subscribed mode the reply is `["pong", message]` instead.
fn ping(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    if args.len() > 1 {
        return Err(CommandError::wrong_args("ping"));
    }
    if ctx.client.is_subscribed() {
        let msg = args.all().first().cloned().unwrap_or_default();
        return Ok(Reply::array(vec![Reply::bulk("pong"), Reply::Bulk(msg)]));
    }
    Ok(match args.all().first() {
        Some(msg) => Reply::Bulk(msg.clone()),
        None => Reply::pong(),
    })
}

fn echo(_ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    Ok(Reply::Bulk(args.bytes(0).clone()))
}

fn db_index(ctx: &CommandContext<'_>, raw: i64) -> CommandResult<usize> {
    usize::try_from(raw)
        .ok()
        .filter(|&i| i < ctx.state.db_count())
        .ok_or(CommandError::DbIndexOutOfRange)
}

fn select(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let index = db_index(ctx, args.int(0)?)?;
    ctx.client.db = index;
    Ok(Reply::ok())
}

fn dbsize(ctx: &mut CommandContext<'_>, _args: &Args) -> CommandResult {
    Ok(Reply::integer(ctx.db().len() as i64))
}

/// Accepts the ASYNC/SYNC modifier of FLUSHDB and FLUSHALL.
fn flush_mode(args: &Args) -> CommandResult<()> {
    match args.len() {
        0 => Ok(()),
        1 if args.is(0, "async") || args.is(0, "sync") => Ok(()),
        _ => Err(CommandError::Syntax),
    }
}

fn flushdb(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    flush_mode(args)?;
    ctx.db().flush();
    Ok(Reply::ok())
}

fn flushall(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    flush_mode(args)?;
    for db in ctx.state.dbs_mut() {
        db.flush();
    }
    Ok(Reply::ok())
}

fn swapdb(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let a = db_index(ctx, args.int(0)?)?;
    let b = db_index(ctx, args.int(1)?)?;
    ctx.state.swap_dbs(a, b);
    Ok(Reply::ok())
}

/// TIME: `[seconds, microseconds]` since the Unix epoch.
fn time(_ctx: &mut CommandContext<'_>, _args: &Args) -> CommandResult {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Ok(Reply::array(vec![
        Reply::Bulk(Bytes::from(now.as_secs().to_string())),
        Reply::Bulk(Bytes::from(now.subsec_micros().to_string())),
    ]))
}

#[cfg(test)]
mod tests {
    use crate::connection::Session;
    use crate::error::CommandError;
    use crate::reply::Reply;
    use crate::server::Server;
    use std::sync::Arc;

    fn session() -> Session {
        Session::connect(Arc::new(Server::default())).unwrap()
    }

    #[test]
    fn test_ping_echo() {
        let mut s = session();
        assert_eq!(s.execute_str("PING"), Ok(Reply::pong()));
        assert_eq!(s.execute_str("PING hi"), Ok(Reply::bulk("hi")));
        assert_eq!(s.execute_str("ECHO hello"), Ok(Reply::bulk("hello")));
        assert_eq!(
            s.execute_str("PING a b"),
            Err(CommandError::wrong_args("ping"))
        );
    }

    #[test]
    fn test_select_isolates_databases() {
        let mut s = session();
        s.execute_str("SET k zero").unwrap();
        assert_eq!(s.execute_str("SELECT 1"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("GET k"), Ok(Reply::Nil));
        assert_eq!(s.execute_str("DBSIZE"), Ok(Reply::integer(0)));
        assert_eq!(
            s.execute_str("SELECT 16"),
            Err(CommandError::DbIndexOutOfRange)
        );
        assert_eq!(
            s.execute_str("SELECT -1"),
            Err(CommandError::DbIndexOutOfRange)
        );
        s.execute_str("SELECT 0").unwrap();
        assert_eq!(s.execute_str("GET k"), Ok(Reply::bulk("zero")));
    }

    #[test]
    fn test_flush_and_swap() {
        let mut s = session();
        s.execute_str("SET a 1").unwrap();
        s.execute_str("SWAPDB 0 2").unwrap();
        assert_eq!(s.execute_str("DBSIZE"), Ok(Reply::integer(0)));
        s.execute_str("SELECT 2").unwrap();
        assert_eq!(s.execute_str("GET a"), Ok(Reply::bulk("1")));
        assert_eq!(s.execute_str("FLUSHDB"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("DBSIZE"), Ok(Reply::integer(0)));
        s.execute_str("SET b 1").unwrap();
        s.execute_str("SELECT 3").unwrap();
        s.execute_str("SET c 1").unwrap();
        assert_eq!(s.execute_str("FLUSHALL ASYNC"), Ok(Reply::ok()));
        s.execute_str("SELECT 2").unwrap();
        assert_eq!(s.execute_str("DBSIZE"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("FLUSHDB LATER"), Err(CommandError::Syntax));
    }

    #[test]
    fn test_time_shape() {
        let mut s = session();
        let reply = s.execute_str("TIME").unwrap();
        let parts = reply.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        let secs: u64 = std::str::from_utf8(parts[0].as_bytes().unwrap())
            .unwrap()
            .parse()
            .unwrap();
        assert!(secs > 1_600_000_000);
    }
}
