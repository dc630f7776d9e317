//! Generic key commands: existence, type, enumeration, expiry, renaming.

use super::args::Args;
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, INT, KEY};
use super::{scan_collection, ScanOptions};
use crate::error::{CommandError, CommandResult};
use crate::pattern::Pattern;
use crate::reply::Reply;
use crate::scan::ScanKind;
use crate::storage::Keyspace;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("del", &[KEY], del).variadic(&[KEY]),
    CommandSpec::new("unlink", &[KEY], del).variadic(&[KEY]),
    CommandSpec::new("exists", &[KEY], exists).variadic(&[KEY]),
    CommandSpec::new("type", &[KEY], key_type),
    CommandSpec::new("keys", &[ARG], keys),
    CommandSpec::new("scan", &[ARG], scan).variadic(&[ARG]),
    CommandSpec::new("expire", &[KEY, INT], expire),
    CommandSpec::new("pexpire", &[KEY, INT], pexpire),
    CommandSpec::new("expireat", &[KEY, INT], expireat),
    CommandSpec::new("pexpireat", &[KEY, INT], pexpireat),
    CommandSpec::new("ttl", &[KEY], ttl),
    CommandSpec::new("pttl", &[KEY], pttl),
    CommandSpec::new("persist", &[KEY], persist),
    CommandSpec::new("rename", &[KEY, KEY], rename),
    CommandSpec::new("renamenx", &[KEY, KEY], renamenx),
];

fn del(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let removed = args
        .all()
        .iter()
        .filter(|key| db.remove(key).is_some())
        .count();
    Ok(Reply::integer(removed as i64))
}

/// EXISTS counts a key once per mention.
fn exists(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let found = args.all().iter().filter(|key| db.contains(key)).count();
    Ok(Reply::integer(found as i64))
}

fn key_type(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let name = ctx
        .db()
        .kind_of(args.bytes(0))
        .map(|kind| kind.as_str())
        .unwrap_or("none");
    Ok(Reply::status(name))
}

fn keys(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let pattern = Pattern::compile(args.bytes(0));
    let matching = ctx
        .db()
        .keys()
        .into_iter()
        .filter(|key| pattern.matches(key));
    Ok(Reply::bulk_array(matching))
}

/// SCAN cursor [MATCH pattern] [COUNT count] [TYPE type]
fn scan(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let options = ScanOptions::parse(args, 0, ctx.config().scan_batch, true)?;
    let kind = ScanKind::Keys { db: ctx.client.db };
    let type_filter = options.kind.clone();
    scan_collection(
        ctx,
        kind,
        &options,
        |db| Ok(db.keys()),
        |db, key| {
            let Some(kind) = db.kind_of(key) else {
                return Ok(None);
            };
            if let Some(wanted) = &type_filter {
                if kind.as_str().as_bytes() != wanted.as_slice() {
                    return Ok(None);
                }
            }
            Ok(Some(vec![Reply::Bulk(key.clone())]))
        },
    )
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Applies an expiry `delay_ms` from now. A deadline already in the past
/// deletes the key.
fn expire_in(db: &mut Keyspace, key: &[u8], delay_ms: i64) -> Reply {
    if !db.contains(key) {
        return Reply::integer(0);
    }
    if delay_ms <= 0 {
        db.remove(key);
    } else {
        let deadline = Instant::now() + Duration::from_millis(delay_ms as u64);
        db.set_expiry(key, Some(deadline));
    }
    Reply::integer(1)
}

fn to_millis(seconds: i64, command: &str) -> CommandResult<i64> {
    seconds
        .checked_mul(1000)
        .ok_or_else(|| CommandError::InvalidExpireTime(command.to_string()))
}

fn expire(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let delay = to_millis(args.int(1)?, "expire")?;
    Ok(expire_in(ctx.db(), args.bytes(0), delay))
}

fn pexpire(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    Ok(expire_in(ctx.db(), args.bytes(0), args.int(1)?))
}

fn expireat(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let at = to_millis(args.int(1)?, "expireat")?;
    Ok(expire_in(ctx.db(), args.bytes(0), at.saturating_sub(now_unix_ms())))
}

fn pexpireat(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let at = args.int(1)?;
    Ok(expire_in(ctx.db(), args.bytes(0), at.saturating_sub(now_unix_ms())))
}

/// Remaining TTL in milliseconds: -2 if the key is missing, -1 if it has
/// no expiry.
fn remaining_ms(db: &mut Keyspace, key: &[u8]) -> i64 {
    match db.get(key) {
        None => -2,
        Some(entry) => match entry.ttl() {
            None => -1,
            Some(left) => left.as_millis() as i64,
        },
    }
}

fn ttl(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let ms = remaining_ms(ctx.db(), args.bytes(0));
    Ok(Reply::integer(if ms < 0 { ms } else { (ms + 500) / 1000 }))
}

fn pttl(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    Ok(Reply::integer(remaining_ms(ctx.db(), args.bytes(0))))
}

fn persist(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let key = args.bytes(0);
    let has_expiry = db.get(key).map(|e| e.expire_at.is_some()).unwrap_or(false);
    if has_expiry {
        db.set_expiry(key, None);
    }
    Ok(Reply::from_bool(has_expiry))
}

fn rename(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let (src, dst) = (args.bytes(0), args.bytes(1));
    let db = ctx.db();
    if !db.contains(src) {
        return Err(CommandError::NoSuchKey);
    }
    if src != dst {
        db.rename(src, dst.clone());
    }
    Ok(Reply::ok())
}

fn renamenx(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let (src, dst) = (args.bytes(0), args.bytes(1));
    let db = ctx.db();
    if !db.contains(src) {
        return Err(CommandError::NoSuchKey);
    }
    if db.contains(dst) {
        return Ok(Reply::integer(0));
    }
    db.rename(src, dst.clone());
    Ok(Reply::integer(1))
}
