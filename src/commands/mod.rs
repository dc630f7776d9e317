//! Command Module
//!
//! This module contains the command registry, the dispatcher and the
//! handlers for every supported command, grouped by data type.
//!
//! ## Supported Commands
//!
//! ### Connection / Server
//! - `PING`, `ECHO`, `SELECT`, `DBSIZE`, `FLUSHDB`, `FLUSHALL`, `SWAPDB`, `TIME`
//!
//! ### Keys
//! - `DEL`, `UNLINK`, `EXISTS`, `TYPE`, `KEYS`, `SCAN`, `RENAME`, `RENAMENX`
//! - `EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`, `TTL`, `PTTL`, `PERSIST`
//!
//! ### Strings
//! - `GET`, `SET`, `SETNX`, `SETEX`, `PSETEX`, `GETSET`, `GETDEL`, `MGET`,
//!   `MSET`, `MSETNX`, `APPEND`, `STRLEN`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`, `INCRBYFLOAT`
//!
//! ### Hashes
//! - `HSET`, `HSETNX`, `HMSET`, `HGET`, `HMGET`, `HGETALL`, `HDEL`, `HEXISTS`,
//!   `HKEYS`, `HVALS`, `HLEN`, `HSTRLEN`, `HINCRBY`, `HINCRBYFLOAT`, `HSCAN`
//!
//! ### Lists
//! - `LPUSH`, `RPUSH`, `LPUSHX`, `RPUSHX`, `LPOP`, `RPOP`, `LLEN`, `LINDEX`,
//!   `LRANGE`, `LSET`, `LREM`, `LTRIM`, `LINSERT`, `RPOPLPUSH`, `LMOVE`
//! - blocking: `BLPOP`, `BRPOP`, `BRPOPLPUSH`, `BLMOVE`
//!
//! ### Sets
//! - `SADD`, `SREM`, `SMEMBERS`, `SISMEMBER`, `SCARD`, `SMOVE`, `SINTER`,
//!   `SUNION`, `SDIFF`, `SINTERSTORE`, `SUNIONSTORE`, `SDIFFSTORE`, `SSCAN`
//!
//! ### Sorted Sets
//! - `ZADD`, `ZREM`, `ZSCORE`, `ZCARD`, `ZINCRBY`, `ZCOUNT`, `ZRANK`,
//!   `ZREVRANK`, `ZRANGE`, `ZREVRANGE`, `ZRANGEBYSCORE`, `ZPOPMIN`,
//!   `ZPOPMAX`, `ZSCAN`
//! - blocking: `BZPOPMIN`, `BZPOPMAX`
//!
//! ### Transactions
//! - `MULTI`, `EXEC`, `DISCARD`, `WATCH`, `UNWATCH`
//!
//! ### Pub/Sub
//! - `PUBLISH`, `SUBSCRIBE`, `UNSUBSCRIBE`, `PSUBSCRIBE`, `PUNSUBSCRIBE`

pub mod args;
pub mod dispatcher;
pub mod registry;

mod hash;
mod keys;
mod list;
mod pubsub;
mod server;
mod set;
mod string;
mod transaction;
mod zset;

pub use args::{format_float, parse_float, parse_int, Args};
pub use dispatcher::{dispatch, CommandContext, Outcome};
pub use registry::{ArgSpec, CommandRegistry, CommandSpec, Handler};

use crate::error::{CommandError, CommandResult};
use crate::pattern::Pattern;
use crate::reply::Reply;
use crate::scan::{ScanKind, ScanWindow};
use crate::storage::Keyspace;
use bytes::Bytes;

/// Options shared by the SCAN family.
#[derive(Debug)]
pub(crate) struct ScanOptions {
    pub cursor: u64,
    pub pattern: Option<Pattern>,
    pub count: usize,
    /// Only used by SCAN
    pub kind: Option<Vec<u8>>,
}

impl ScanOptions {
    /// Parses `cursor [MATCH pattern] [COUNT count] [TYPE type]` starting
    /// at `start`. `TYPE` is accepted only when `allow_type` is set.
    pub fn parse(args: &Args, start: usize, default_count: usize, allow_type: bool) -> CommandResult<Self> {
        let cursor = args.int(start).map_err(|_| CommandError::InvalidCursor)?;
        let cursor = u64::try_from(cursor).map_err(|_| CommandError::InvalidCursor)?;
        let mut options = Self {
            cursor,
            pattern: None,
            count: default_count,
            kind: None,
        };

        let mut i = start + 1;
        while i < args.len() {
            if i + 1 >= args.len() {
                return Err(CommandError::Syntax);
            }
            if args.is(i, "match") {
                let pattern = Pattern::compile(args.bytes(i + 1));
                options.pattern = (!pattern.matches_everything()).then_some(pattern);
            } else if args.is(i, "count") {
                let count = args.int(i + 1)?;
                if count < 1 {
                    return Err(CommandError::Syntax);
                }
                options.count = count as usize;
            } else if allow_type && args.is(i, "type") {
                options.kind = Some(args.bytes(i + 1).to_ascii_lowercase());
            } else {
                return Err(CommandError::Syntax);
            }
            i += 2;
        }
        Ok(options)
    }

    pub fn matches(&self, name: &[u8]) -> bool {
        self.pattern.as_ref().map(|p| p.matches(name)).unwrap_or(true)
    }
}

/// Runs one page of a collection scan and builds the `[cursor, [...]]`
/// reply. `lookup` returns the reply items for a still-present name.
pub(crate) fn scan_collection<C, L>(
    ctx: &mut CommandContext<'_>,
    kind: ScanKind,
    options: &ScanOptions,
    capture: C,
    mut lookup: L,
) -> CommandResult
where
    C: FnOnce(&mut Keyspace) -> CommandResult<Vec<Bytes>>,
    L: FnMut(&mut Keyspace, &Bytes) -> CommandResult<Option<Vec<Reply>>>,
{
    let db_index = ctx.client.db;
    let db = ctx.state.db(db_index);
    let captured = if options.cursor == 0 || !ctx.client.cursors.has_snapshot(&kind) {
        Some(capture(db)?)
    } else {
        None
    };
    let ScanWindow {
        next_cursor,
        candidates,
    } = ctx
        .client
        .cursors
        .window(kind, options.cursor, options.count, || captured.unwrap_or_default());

    let db = ctx.state.db(db_index);
    let mut items = Vec::new();
    for name in candidates.iter().filter(|n| options.matches(n)) {
        if let Some(found) = lookup(db, name)? {
            items.extend(found);
        }
    }
    Ok(scan_reply(next_cursor, items))
}

pub(crate) fn scan_reply(cursor: u64, items: Vec<Reply>) -> Reply {
    Reply::array(vec![
        Reply::bulk(cursor.to_string()),
        Reply::array(items),
    ])
}
