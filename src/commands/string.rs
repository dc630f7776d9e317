//! String commands.

use super::args::{format_float, parse_float, parse_int, Args};
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, FLOAT, INT, KEY, STRING_KEY};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use crate::storage::{Keyspace, Value};
use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("get", &[STRING_KEY], get),
    CommandSpec::new("set", &[KEY, ARG], set).variadic(&[ARG]),
    CommandSpec::new("setnx", &[KEY, ARG], setnx),
    CommandSpec::new("setex", &[KEY, INT, ARG], setex),
    CommandSpec::new("psetex", &[KEY, INT, ARG], psetex),
    CommandSpec::new("getset", &[STRING_KEY, ARG], getset),
    CommandSpec::new("getdel", &[STRING_KEY], getdel),
    CommandSpec::new("mget", &[KEY], mget).variadic(&[KEY]),
    CommandSpec::new("mset", &[KEY, ARG], mset).variadic(&[KEY, ARG]),
    CommandSpec::new("msetnx", &[KEY, ARG], msetnx).variadic(&[KEY, ARG]),
    CommandSpec::new("append", &[STRING_KEY, ARG], append),
    CommandSpec::new("strlen", &[STRING_KEY], strlen),
    CommandSpec::new("incr", &[STRING_KEY], incr),
    CommandSpec::new("decr", &[STRING_KEY], decr),
    CommandSpec::new("incrby", &[STRING_KEY, INT], incrby),
    CommandSpec::new("decrby", &[STRING_KEY, INT], decrby),
    CommandSpec::new("incrbyfloat", &[STRING_KEY, FLOAT], incrbyfloat),
];

fn get_string(db: &mut Keyspace, key: &[u8]) -> CommandResult<Option<Bytes>> {
    Ok(db.string(key)?.cloned())
}

/// Replaces the string value of `key` without touching its expiry.
fn store_keep_ttl(db: &mut Keyspace, key: &Bytes, value: Bytes) {
    match db.get_mut(key) {
        Some(entry) => {
            entry.value = Value::String(value);
            db.mark_modified(key);
        }
        None => db.set(key.clone(), Value::String(value), None),
    }
}

fn get(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    Ok(Reply::from_option(get_string(ctx.db(), args.bytes(0))?))
}

#[derive(Debug, Default)]
struct SetOptions {
    expire: Option<Duration>,
    nx: bool,
    xx: bool,
    keep_ttl: bool,
    get: bool,
}

impl SetOptions {
    fn parse(args: &Args) -> CommandResult<Self> {
        let mut opts = Self::default();
        let mut i = 2;
        while i < args.len() {
            if args.is(i, "nx") {
                opts.nx = true;
            } else if args.is(i, "xx") {
                opts.xx = true;
            } else if args.is(i, "keepttl") && opts.expire.is_none() {
                opts.keep_ttl = true;
            } else if args.is(i, "get") {
                opts.get = true;
            } else if (args.is(i, "ex") || args.is(i, "px"))
                && opts.expire.is_none()
                && !opts.keep_ttl
                && i + 1 < args.len()
            {
                let amount = args.int(i + 1)?;
                if amount <= 0 {
                    return Err(CommandError::InvalidExpireTime("set".into()));
                }
                let ms = if args.is(i, "ex") {
                    amount
                        .checked_mul(1000)
                        .ok_or_else(|| CommandError::InvalidExpireTime("set".into()))?
                } else {
                    amount
                };
                opts.expire = Some(Duration::from_millis(ms as u64));
                i += 1;
            } else {
                return Err(CommandError::Syntax);
            }
            i += 1;
        }
        if opts.nx && opts.xx {
            return Err(CommandError::Syntax);
        }
        Ok(opts)
    }
}

/// SET key value [EX seconds | PX milliseconds | KEEPTTL] [NX | XX] [GET]
fn set(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let opts = SetOptions::parse(args)?;
    let key = args.bytes(0);
    let db = ctx.db();

    let old = if opts.get {
        get_string(db, key)?
    } else {
        None
    };
    let exists = db.contains(key);
    let skipped = (opts.nx && exists) || (opts.xx && !exists);

    if !skipped {
        let expire_at = if opts.keep_ttl {
            db.get(key).and_then(|e| e.expire_at)
        } else {
            opts.expire.map(|d| Instant::now() + d)
        };
        db.set(key.clone(), Value::String(args.bytes(1).clone()), expire_at);
    }

    Ok(if opts.get {
        Reply::from_option(old)
    } else if skipped {
        Reply::Nil
    } else {
        Reply::ok()
    })
}

fn setnx(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    if db.contains(args.bytes(0)) {
        return Ok(Reply::integer(0));
    }
    db.set(args.bytes(0).clone(), Value::String(args.bytes(1).clone()), None);
    Ok(Reply::integer(1))
}

fn set_with_expiry(ctx: &mut CommandContext<'_>, args: &Args, ms: Option<i64>, command: &str) -> CommandResult {
    let ms = ms
        .filter(|&ms| ms > 0)
        .ok_or_else(|| CommandError::InvalidExpireTime(command.to_string()))?;
    let deadline = Instant::now() + Duration::from_millis(ms as u64);
    ctx.db().set(
        args.bytes(0).clone(),
        Value::String(args.bytes(2).clone()),
        Some(deadline),
    );
    Ok(Reply::ok())
}

fn setex(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let ms = args.int(1)?.checked_mul(1000);
    set_with_expiry(ctx, args, ms, "setex")
}

fn psetex(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let ms = Some(args.int(1)?);
    set_with_expiry(ctx, args, ms, "psetex")
}

fn getset(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let old = get_string(db, args.bytes(0))?;
    db.set(args.bytes(0).clone(), Value::String(args.bytes(1).clone()), None);
    Ok(Reply::from_option(old))
}

fn getdel(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let old = get_string(db, args.bytes(0))?;
    if old.is_some() {
        db.remove(args.bytes(0));
    }
    Ok(Reply::from_option(old))
}

/// MGET answers nil for keys holding other kinds instead of failing.
fn mget(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let values = args
        .all()
        .iter()
        .map(|key| Reply::from_option(get_string(db, key).ok().flatten()))
        .collect();
    Ok(Reply::array(values))
}

fn mset(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    for pair in args.all().chunks(2) {
        db.set(pair[0].clone(), Value::String(pair[1].clone()), None);
    }
    Ok(Reply::ok())
}

fn msetnx(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    if args.all().chunks(2).any(|pair| db.contains(&pair[0])) {
        return Ok(Reply::integer(0));
    }
    for pair in args.all().chunks(2) {
        db.set(pair[0].clone(), Value::String(pair[1].clone()), None);
    }
    Ok(Reply::integer(1))
}

fn append(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let db = ctx.db();
    let key = args.bytes(0);
    let current = get_string(db, key)?.unwrap_or_default();
    let mut joined = BytesMut::with_capacity(current.len() + args.bytes(1).len());
    joined.extend_from_slice(&current);
    joined.extend_from_slice(args.bytes(1));
    let len = joined.len();
    store_keep_ttl(db, key, joined.freeze());
    Ok(Reply::integer(len as i64))
}

fn strlen(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let len = get_string(ctx.db(), args.bytes(0))?.map(|v| v.len()).unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

/// Adds `delta` to the integer stored at `key`, treating a missing key as 0.
fn incr_by(ctx: &mut CommandContext<'_>, key: &Bytes, delta: i64) -> CommandResult {
    let db = ctx.db();
    let current = match get_string(db, key)? {
        Some(raw) => parse_int(&raw)?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
    store_keep_ttl(db, key, Bytes::from(next.to_string()));
    Ok(Reply::integer(next))
}

fn incr(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    incr_by(ctx, args.bytes(0), 1)
}

fn decr(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    incr_by(ctx, args.bytes(0), -1)
}

fn incrby(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    incr_by(ctx, args.bytes(0), args.int(1)?)
}

fn decrby(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let delta = args.int(1)?.checked_neg().ok_or(CommandError::Overflow)?;
    incr_by(ctx, args.bytes(0), delta)
}

fn incrbyfloat(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let current = match get_string(db, key)? {
        Some(raw) => parse_float(&raw)?,
        None => 0.0,
    };
    let next = current + args.float(1)?;
    if !next.is_finite() {
        return Err(CommandError::NonFiniteResult);
    }
    let encoded = format_float(next);
    store_keep_ttl(db, key, encoded.clone());
    Ok(Reply::Bulk(encoded))
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
    fn test_get_set() {
        let mut s = session();
        assert_eq!(s.execute_str("GET k"), Ok(Reply::Nil));
        assert_eq!(s.execute_str("SET k v"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("GET k"), Ok(Reply::bulk("v")));
        s.execute_str("HSET h f v").unwrap();
        assert_eq!(s.execute_str("GET h"), Err(CommandError::WrongType));
        // SET overwrites any kind
        assert_eq!(s.execute_str("SET h v"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("TYPE h"), Ok(Reply::status("string")));
    }

    #[test]
    fn test_set_options() {
        let mut s = session();
        assert_eq!(s.execute_str("SET k v XX"), Ok(Reply::Nil));
        assert_eq!(s.execute_str("SET k v NX"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("SET k w NX"), Ok(Reply::Nil));
        assert_eq!(s.execute_str("SET k w XX GET"), Ok(Reply::bulk("v")));
        assert_eq!(s.execute_str("SET k x EX 100"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("TTL k"), Ok(Reply::integer(100)));
        assert_eq!(s.execute_str("SET k y KEEPTTL"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("TTL k"), Ok(Reply::integer(100)));
        assert_eq!(s.execute_str("SET k z"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("TTL k"), Ok(Reply::integer(-1)));
        assert_eq!(s.execute_str("SET k v NX XX"), Err(CommandError::Syntax));
        assert_eq!(s.execute_str("SET k v EX"), Err(CommandError::Syntax));
        assert_eq!(
            s.execute_str("SET k v EX 0"),
            Err(CommandError::InvalidExpireTime("set".into()))
        );
        assert_eq!(s.execute_str("SET k v EX 1 PX 1"), Err(CommandError::Syntax));
    }

    #[test]
    fn test_setnx_setex_getset_getdel() {
        let mut s = session();
        assert_eq!(s.execute_str("SETNX k 1"), Ok(Reply::integer(1)));
        assert_eq!(s.execute_str("SETNX k 2"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("GETSET k 3"), Ok(Reply::bulk("1")));
        assert_eq!(s.execute_str("GETDEL k"), Ok(Reply::bulk("3")));
        assert_eq!(s.execute_str("GETDEL k"), Ok(Reply::Nil));
        assert_eq!(s.execute_str("SETEX t 50 v"), Ok(Reply::ok()));
        assert_eq!(s.execute_str("TTL t"), Ok(Reply::integer(50)));
        assert_eq!(
            s.execute_str("PSETEX t 0 v"),
            Err(CommandError::InvalidExpireTime("psetex".into()))
        );
    }

    #[test]
    fn test_mget_mset() {
        let mut s = session();
        assert_eq!(s.execute_str("MSET a 1 b 2"), Ok(Reply::ok()));
        s.execute_str("RPUSH l x").unwrap();
        assert_eq!(
            s.execute_str("MGET a b l missing"),
            Ok(Reply::array(vec![
                Reply::bulk("1"),
                Reply::bulk("2"),
                Reply::Nil,
                Reply::Nil
            ]))
        );
        assert_eq!(s.execute_str("MSETNX c 3 a 9"), Ok(Reply::integer(0)));
        assert_eq!(s.execute_str("GET c"), Ok(Reply::Nil));
        assert_eq!(s.execute_str("MSETNX c 3 d 4"), Ok(Reply::integer(1)));
        assert_eq!(
            s.execute_str("MSET a"),
            Err(CommandError::wrong_args("mset"))
        );
    }

    #[test]
    fn test_append_strlen() {
        let mut s = session();
        assert_eq!(s.execute_str("APPEND k hello"), Ok(Reply::integer(5)));
        s.execute_str("EXPIRE k 100").unwrap();
        assert_eq!(s.execute_str("APPEND k world"), Ok(Reply::integer(10)));
        assert_eq!(s.execute_str("GET k"), Ok(Reply::bulk("helloworld")));
        assert_eq!(s.execute_str("TTL k"), Ok(Reply::integer(100)));
        assert_eq!(s.execute_str("STRLEN k"), Ok(Reply::integer(10)));
        assert_eq!(s.execute_str("STRLEN nope"), Ok(Reply::integer(0)));
    }

    #[test]
    fn test_counters() {
        let mut s = session();
        assert_eq!(s.execute_str("INCR n"), Ok(Reply::integer(1)));
        assert_eq!(s.execute_str("INCRBY n 10"), Ok(Reply::integer(11)));
        assert_eq!(s.execute_str("DECR n"), Ok(Reply::integer(10)));
        assert_eq!(s.execute_str("DECRBY n 20"), Ok(Reply::integer(-10)));
        s.execute_str("SET text abc").unwrap();
        assert_eq!(s.execute_str("INCR text"), Err(CommandError::NotAnInteger));
        s.execute_str("SET big 9223372036854775807").unwrap();
        assert_eq!(s.execute_str("INCR big"), Err(CommandError::Overflow));
        assert_eq!(s.execute_str("GET big"), Ok(Reply::bulk("9223372036854775807")));
    }

    #[test]
    fn test_incrbyfloat() {
        let mut s = session();
        s.execute_str("SET f 10").unwrap();
        assert_eq!(s.execute_str("INCRBYFLOAT f 0.1"), Ok(Reply::bulk("10.1")));
        assert_eq!(s.execute_str("INCRBYFLOAT f -0.1"), Ok(Reply::bulk("10")));
        assert_eq!(
            s.execute_str("INCRBYFLOAT f inf"),
            Err(CommandError::NonFiniteResult)
        );
        assert_eq!(s.execute_str("GET f"), Ok(Reply::bulk("10")));
        assert_eq!(s.execute_str("INCRBYFLOAT new 2.5"), Ok(Reply::bulk("2.5")));
    }

    #[test]
    fn test_non_canonical_integers_rejected() {
        let mut s = session();
        assert_eq!(s.execute_str("INCRBY k 007"), Err(CommandError::NotAnInteger));
        assert_eq!(s.execute_str("INCRBY k -0"), Err(CommandError::NotAnInteger));
        s.execute_str("SET n 010").unwrap();
        assert_eq!(s.execute_str("INCR n"), Err(CommandError::NotAnInteger));
        assert_eq!(s.execute_str("INCRBY k 0"), Ok(Reply::integer(0)));
    }
}
