//! Hash commands.
//!
//! A hash is stored as an ordered field map, so HGETALL, HKEYS, HVALS and
//! HSCAN enumerate fields in byte order. Removing the last field deletes
//! the key.

use super::args::{format_float, parse_float, parse_int, Args};
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, FLOAT, HASH_KEY, INT};
use super::{scan_collection, ScanOptions};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use crate::scan::ScanKind;
use bytes::Bytes;

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("hdel", &[HASH_KEY, ARG], hdel).variadic(&[ARG]),
    CommandSpec::new("hexists", &[HASH_KEY, ARG], hexists),
    CommandSpec::new("hget", &[HASH_KEY, ARG], hget),
    CommandSpec::new("hgetall", &[HASH_KEY], hgetall),
    CommandSpec::new("hincrby", &[HASH_KEY, ARG, INT], hincrby),
    CommandSpec::new("hincrbyfloat", &[HASH_KEY, ARG, FLOAT], hincrbyfloat),
    CommandSpec::new("hkeys", &[HASH_KEY], hkeys),
    CommandSpec::new("hlen", &[HASH_KEY], hlen),
    CommandSpec::new("hmget", &[HASH_KEY, ARG], hmget).variadic(&[ARG]),
    CommandSpec::new("hmset", &[HASH_KEY, ARG, ARG], hmset).variadic(&[ARG, ARG]),
    CommandSpec::new("hscan", &[HASH_KEY, ARG], hscan).variadic(&[ARG]),
    CommandSpec::new("hset", &[HASH_KEY, ARG, ARG], hset).variadic(&[ARG, ARG]),
    CommandSpec::new("hsetnx", &[HASH_KEY, ARG, ARG], hsetnx),
    CommandSpec::new("hstrlen", &[HASH_KEY, ARG], hstrlen),
    CommandSpec::new("hvals", &[HASH_KEY], hvals),
];

fn hdel(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let Some(hash) = db.hash_mut(key)? else {
        return Ok(Reply::integer(0));
    };
    let removed = args
        .rest(1)
        .iter()
        .filter(|field| hash.remove(*field).is_some())
        .count();
    if removed > 0 {
        db.mark_modified(key);
    }
    Ok(Reply::integer(removed as i64))
}

fn hexists(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let found = ctx
        .db()
        .hash(args.bytes(0))?
        .map(|h| h.contains_key(args.bytes(1)))
        .unwrap_or(false);
    Ok(Reply::from_bool(found))
}

fn hget(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let value = ctx
        .db()
        .hash(args.bytes(0))?
        .and_then(|h| h.get(args.bytes(1)).cloned());
    Ok(Reply::from_option(value))
}

/// Flattened `[field, value, field, value, ...]`.
fn hgetall(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let items = ctx
        .db()
        .hash(args.bytes(0))?
        .map(|h| {
            h.iter()
                .flat_map(|(f, v)| [Reply::Bulk(f.clone()), Reply::Bulk(v.clone())])
                .collect()
        })
        .unwrap_or_default();
    Ok(Reply::array(items))
}

fn hincrby(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let (key, field) = (args.bytes(0), args.bytes(1));
    let delta = args.int(2)?;
    let db = ctx.db();
    let hash = db.hash_or_create(key)?;
    let current = match hash.get(field) {
        Some(raw) => parse_int(raw)?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
    hash.insert(field.clone(), Bytes::from(next.to_string()));
    db.mark_modified(key);
    Ok(Reply::integer(next))
}

/// Adds a float increment. A non-finite result is rejected and leaves the
/// field as it was.
fn hincrbyfloat(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let (key, field) = (args.bytes(0), args.bytes(1));
    let delta = args.float(2)?;
    let db = ctx.db();
    let hash = db.hash_or_create(key)?;
    let current = match hash.get(field) {
        Some(raw) => parse_float(raw)?,
        None => 0.0,
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(CommandError::NonFiniteResult);
    }
    let encoded = format_float(next);
    hash.insert(field.clone(), encoded.clone());
    db.mark_modified(key);
    Ok(Reply::Bulk(encoded))
}

fn hkeys(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let keys: Vec<Bytes> = ctx
        .db()
        .hash(args.bytes(0))?
        .map(|h| h.keys().cloned().collect())
        .unwrap_or_default();
    Ok(Reply::bulk_array(keys))
}

fn hlen(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let len = ctx.db().hash(args.bytes(0))?.map(|h| h.len()).unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

fn hmget(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let hash = ctx.db().hash(args.bytes(0))?;
    let values = args
        .rest(1)
        .iter()
        .map(|field| Reply::from_option(hash.and_then(|h| h.get(field).cloned())))
        .collect();
    Ok(Reply::array(values))
}

fn hmset(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    hset(ctx, args)?;
    Ok(Reply::ok())
}

/// HSCAN key cursor [MATCH pattern] [COUNT count]
///
/// Replies `[cursor, [field, value, ...]]`.
fn hscan(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0).clone();
    let options = ScanOptions::parse(args, 1, ctx.config().scan_batch, false)?;
    let kind = ScanKind::HashFields {
        db: ctx.client.db,
        key: key.clone(),
    };
    scan_collection(
        ctx,
        kind,
        &options,
        |db| Ok(db.hash(&key)?.map(|h| h.keys().cloned().collect()).unwrap_or_default()),
        |db, field| {
            Ok(db.hash(&key)?.and_then(|h| h.get(field)).map(|value| {
                vec![Reply::Bulk(field.clone()), Reply::Bulk(value.clone())]
            }))
        },
    )
}

/// Upserts field/value pairs, returning how many fields are new.
fn hset(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let hash = db.hash_or_create(key)?;
    let created = args
        .rest(1)
        .chunks(2)
        .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
        .count();
    db.mark_modified(key);
    Ok(Reply::integer(created as i64))
}

fn hsetnx(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let hash = db.hash_or_create(key)?;
    if hash.contains_key(args.bytes(1)) {
        return Ok(Reply::integer(0));
    }
    hash.insert(args.bytes(1).clone(), args.bytes(2).clone());
    db.mark_modified(key);
    Ok(Reply::integer(1))
}

fn hstrlen(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let len = ctx
        .db()
        .hash(args.bytes(0))?
        .and_then(|h| h.get(args.bytes(1)).map(|v| v.len()))
        .unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

fn hvals(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let values: Vec<Bytes> = ctx
        .db()
        .hash(args.bytes(0))?
        .map(|h| h.values().cloned().collect())
        .unwrap_or_default();
    Ok(Reply::bulk_array(values))
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
    fn test_hset_counts_new_fields() {
        let mut s = session();
        assert_eq!(s.execute_str("HSET k f1 v1 f2 v2"), Ok(Reply::integer(2)));
        assert_eq!(s.execute_str("HSET k f1 v3"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("HGET k f1"), Ok(Reply::bulk("v3")));
        assert_eq!(s.execute_str("HLEN k"), Ok(Reply::integer(2)));
    }

    #[test]
    fn test_hdel_last_field_deletes_key() {
        let mut s = session();
        s.execute_str("HSET k f1 v1 f2 v2").unwrap();
        assert_eq!(s.execute_str("HDEL k f1 nope"), Ok(Reply::integer(1)));
        assert_eq!(s.execute_str("EXISTS k"), Ok(Reply::integer(1)));
        assert_eq!(s.execute_str("HDEL k f2"), Ok(Reply::integer(1)));
        assert_eq!(s.execute_str("EXISTS k"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("HEXISTS k f2"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("HDEL k f2"), Ok(Reply::integer(0)));
    }

    #[test]
    fn test_hincrbyfloat() {
        let mut s = session();
        s.execute_str("HSET k f 10").unwrap();
        assert_eq!(s.execute_str("HINCRBYFLOAT k f 0.1"), Ok(Reply::bulk("10.1")));
        assert_eq!(
            s.execute_str("HINCRBYFLOAT k f +inf"),
            Err(CommandError::NonFiniteResult)
        );
        assert_eq!(s.execute_str("HGET k f"), Ok(Reply::bulk("10.1")));
        assert_eq!(
            s.execute_str("HINCRBYFLOAT k f abc"),
            Err(CommandError::NotAFloat)
        );
    }

    #[test]
    fn test_nonfinite_on_fresh_key_leaves_nothing() {
        let mut s = session();
        assert_eq!(
            s.execute_str("HINCRBYFLOAT k f inf"),
            Err(CommandError::NonFiniteResult)
        );
        assert_eq!(s.execute_str("EXISTS k"), Ok(Reply::integer(0)));
    }

    #[test]
    fn test_hincrby() {
        let mut s = session();
        assert_eq!(s.execute_str("HINCRBY k n 5"), Ok(Reply::integer(5)));
        assert_eq!(s.execute_str("HINCRBY k n -7"), Ok(Reply::integer(-2)));
        s.execute_str("HSET k s abc").unwrap();
        assert_eq!(
            s.execute_str("HINCRBY k s 1"),
            Err(CommandError::NotAnInteger)
        );
    }

    #[test]
    fn test_enumeration() {
        let mut s = session();
        s.execute_str("HSET k b 2 a 1").unwrap();
        assert_eq!(
            s.execute_str("HGETALL k"),
            Ok(Reply::bulk_array(["a", "1", "b", "2"]))
        );
        assert_eq!(s.execute_str("HKEYS k"), Ok(Reply::bulk_array(["a", "b"])));
        assert_eq!(s.execute_str("HVALS k"), Ok(Reply::bulk_array(["1", "2"])));
        assert_eq!(
            s.execute_str("HMGET k a zz"),
            Ok(Reply::array(vec![Reply::bulk("1"), Reply::Nil]))
        );
        assert_eq!(s.execute_str("HGETALL nope"), Ok(Reply::array(vec![])));
    }

    #[test]
    fn test_hsetnx_hmset_hstrlen() {
        let mut s = session();
        assert_eq!(s.execute_str("HMSET k a hello b x"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("HSETNX k a other"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("HSETNX k c new"), Ok(Reply::integer(1)));
        assert_eq!(s.execute_str("HSTRLEN k a"), Ok(Reply::integer(5)));
        assert_eq!(s.execute_str("HSTRLEN k zz"), Ok(Reply::integer(0)));
    }

    #[test]
    fn test_hscan() {
        let mut s = session();
        for i in 0..15 {
            s.execute_str(&format!("HSET h f{:02} v{}", i, i)).unwrap();
        }
        let page = s.execute_str("HSCAN h 0 COUNT 10").unwrap().into_array().unwrap();
        assert_eq!(page[0], Reply::bulk("10"));
        assert_eq!(page[1].as_array().unwrap().len(), 20);
        let page = s.execute_str("HSCAN h 10 MATCH f1*").unwrap().into_array().unwrap();
        assert_eq!(page[0], Reply::bulk("0"));
        // f10..f14
        assert_eq!(page[1].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_wrong_type() {
        let mut s = session();
        s.execute_str("SET k v").unwrap();
        assert_eq!(s.execute_str("HSET k f v"), Err(CommandError::WrongType));
        assert_eq!(s.execute_str("HGETALL k"), Err(CommandError::WrongType));
    }
}
