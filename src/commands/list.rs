//! List commands, including the blocking pops.
//!
//! Lists are deques; an operation that leaves a list empty deletes the key
//! (through `mark_modified`). The blocking variants share their pop and
//! move logic with the plain commands and hand it to `block_on` as the
//! retry attempt.

use super::args::{parse_timeout, resolve_index, resolve_range, Args};
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, INT, LIST_KEY};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use crate::storage::Keyspace;
use bytes::Bytes;

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("lpush", &[LIST_KEY, ARG], lpush).variadic(&[ARG]),
    CommandSpec::new("rpush", &[LIST_KEY, ARG], rpush).variadic(&[ARG]),
    CommandSpec::new("lpushx", &[LIST_KEY, ARG], lpushx).variadic(&[ARG]),
    CommandSpec::new("rpushx", &[LIST_KEY, ARG], rpushx).variadic(&[ARG]),
    CommandSpec::new("lpop", &[LIST_KEY], lpop).variadic(&[INT]),
    CommandSpec::new("rpop", &[LIST_KEY], rpop).variadic(&[INT]),
    CommandSpec::new("llen", &[LIST_KEY], llen),
    CommandSpec::new("lindex", &[LIST_KEY, INT], lindex),
    CommandSpec::new("lrange", &[LIST_KEY, INT, INT], lrange),
    CommandSpec::new("lset", &[LIST_KEY, INT, ARG], lset),
    CommandSpec::new("lrem", &[LIST_KEY, INT, ARG], lrem),
    CommandSpec::new("ltrim", &[LIST_KEY, INT, INT], ltrim),
    CommandSpec::new("linsert", &[LIST_KEY, ARG, ARG, ARG], linsert),
    CommandSpec::new("rpoplpush", &[LIST_KEY, LIST_KEY], rpoplpush),
    CommandSpec::new("lmove", &[LIST_KEY, LIST_KEY, ARG, ARG], lmove),
    CommandSpec::new("blpop", &[LIST_KEY, ARG], blpop).variadic(&[ARG]),
    CommandSpec::new("brpop", &[LIST_KEY, ARG], brpop).variadic(&[ARG]),
    CommandSpec::new("brpoplpush", &[LIST_KEY, LIST_KEY, ARG], brpoplpush),
    CommandSpec::new("blmove", &[LIST_KEY, LIST_KEY, ARG, ARG, ARG], blmove),
];

/// One end of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Left,
    Right,
}

impl End {
    fn parse(args: &Args, index: usize) -> CommandResult<Self> {
        if args.is(index, "left") {
            Ok(End::Left)
        } else if args.is(index, "right") {
            Ok(End::Right)
        } else {
            Err(CommandError::Syntax)
        }
    }
}

// ============================================================================
// Shared primitives
// ============================================================================

fn pop(db: &mut Keyspace, key: &[u8], end: End) -> CommandResult<Option<Bytes>> {
    let Some(list) = db.list_mut(key)? else {
        return Ok(None);
    };
    let popped = match end {
        End::Left => list.pop_front(),
        End::Right => list.pop_back(),
    };
    if popped.is_some() {
        db.mark_modified(key);
    }
    Ok(popped)
}

/// Pops from `src` and pushes onto `dst`. Both keys are type checked before
/// anything moves.
fn move_element(
    db: &mut Keyspace,
    src: &Bytes,
    dst: &Bytes,
    from: End,
    to: End,
) -> CommandResult<Option<Bytes>> {
    db.list(dst)?;
    if src == dst {
        return rotate(db, src, from, to);
    }
    let Some(element) = pop(db, src, from)? else {
        return Ok(None);
    };
    let list = db.list_or_create(dst)?;
    match to {
        End::Left => list.push_front(element.clone()),
        End::Right => list.push_back(element.clone()),
    }
    db.mark_modified(dst);
    Ok(Some(element))
}

/// Moves an element between the ends of one list without letting it go
/// empty, so the key keeps its expiry.
fn rotate(db: &mut Keyspace, key: &Bytes, from: End, to: End) -> CommandResult<Option<Bytes>> {
    let Some(list) = db.list_mut(key)? else {
        return Ok(None);
    };
    let element = match from {
        End::Left => list.pop_front(),
        End::Right => list.pop_back(),
    };
    let Some(element) = element else {
        return Ok(None);
    };
    match to {
        End::Left => list.push_front(element.clone()),
        End::Right => list.push_back(element.clone()),
    }
    db.mark_modified(key);
    Ok(Some(element))
}

/// First non-empty list among `keys`, popped from `end`, as `[key, element]`.
fn pop_first(db: &mut Keyspace, keys: &[Bytes], end: End) -> CommandResult<Option<Reply>> {
    for key in keys {
        if let Some(element) = pop(db, key, end)? {
            return Ok(Some(Reply::array(vec![
                Reply::Bulk(key.clone()),
                Reply::Bulk(element),
            ])));
        }
    }
    Ok(None)
}

// ============================================================================
// Push / pop
// ============================================================================

fn push(ctx: &mut CommandContext<'_>, args: &Args, end: End, only_existing: bool) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let list = if only_existing {
        match db.list_mut(key)? {
            Some(list) => list,
            None => return Ok(Reply::integer(0)),
        }
    } else {
        db.list_or_create(key)?
    };
    for element in args.rest(1) {
        match end {
            End::Left => list.push_front(element.clone()),
            End::Right => list.push_back(element.clone()),
        }
    }
    let len = list.len();
    db.mark_modified(key);
    Ok(Reply::integer(len as i64))
}

fn lpush(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    push(ctx, args, End::Left, false)
}

fn rpush(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    push(ctx, args, End::Right, false)
}

fn lpushx(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    push(ctx, args, End::Left, true)
}

fn rpushx(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    push(ctx, args, End::Right, true)
}

/// LPOP/RPOP key [count]
///
/// Without a count the reply is one element or nil; with a count it is an
/// array of up to `count` elements, or a nil array if the key is missing.
fn pop_command(ctx: &mut CommandContext<'_>, args: &Args, end: End) -> CommandResult {
    let key = args.bytes(0);
    if args.len() > 2 {
        return Err(CommandError::Syntax);
    }
    if args.len() == 1 {
        return Ok(Reply::from_option(pop(ctx.db(), key, end)?));
    }

    let count = args.int(1)?;
    if count < 0 {
        return Err(CommandError::NotPositive);
    }
    let db = ctx.db();
    if !db.contains(key) {
        return Ok(Reply::NilArray);
    }
    let mut popped = Vec::new();
    while (popped.len() as i64) < count {
        match pop(db, key, end)? {
            Some(element) => popped.push(element),
            None => break,
        }
    }
    Ok(Reply::bulk_array(popped))
}

fn lpop(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    pop_command(ctx, args, End::Left)
}

fn rpop(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    pop_command(ctx, args, End::Right)
}

// ============================================================================
// Inspection and in-place edits
// ============================================================================

fn llen(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let len = ctx.db().list(args.bytes(0))?.map(|l| l.len()).unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

fn lindex(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let index = args.int(1)?;
    let element = ctx
        .db()
        .list(args.bytes(0))?
        .and_then(|l| resolve_index(index, l.len()).and_then(|i| l.get(i).cloned()));
    Ok(Reply::from_option(element))
}

fn lrange(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let (start, stop) = (args.int(1)?, args.int(2)?);
    let elements: Vec<Bytes> = ctx
        .db()
        .list(args.bytes(0))?
        .map(|l| l.range(resolve_range(start, stop, l.len())).cloned().collect())
        .unwrap_or_default();
    Ok(Reply::bulk_array(elements))
}

fn lset(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let index = args.int(1)?;
    let db = ctx.db();
    let list = db.list_mut(key)?.ok_or(CommandError::NoSuchKey)?;
    let slot = resolve_index(index, list.len())
        .and_then(|i| list.get_mut(i))
        .ok_or(CommandError::IndexOutOfRange)?;
    *slot = args.bytes(2).clone();
    db.mark_modified(key);
    Ok(Reply::ok())
}

/// LREM key count element
///
/// A positive count removes from the head, negative from the tail, zero
/// removes every occurrence.
fn lrem(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let count = args.int(1)?;
    let target = args.bytes(2);
    let db = ctx.db();
    let Some(list) = db.list_mut(key)? else {
        return Ok(Reply::integer(0));
    };

    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
    let mut positions: Vec<usize> = list
        .iter()
        .enumerate()
        .filter(|(_, e)| *e == target)
        .map(|(i, _)| i)
        .collect();
    if count < 0 {
        positions.reverse();
    }
    positions.truncate(limit);
    positions.sort_unstable();
    for &i in positions.iter().rev() {
        list.remove(i);
    }

    if !positions.is_empty() {
        db.mark_modified(key);
    }
    Ok(Reply::integer(positions.len() as i64))
}

fn ltrim(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let (start, stop) = (args.int(1)?, args.int(2)?);
    let db = ctx.db();
    if let Some(list) = db.list_mut(key)? {
        let keep = resolve_range(start, stop, list.len());
        list.truncate(keep.end);
        list.drain(..keep.start.min(list.len()));
        db.mark_modified(key);
    }
    Ok(Reply::ok())
}

/// LINSERT key BEFORE|AFTER pivot element
///
/// Returns the new length, -1 when the pivot is missing, 0 when the key is.
fn linsert(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let after = if args.is(1, "before") {
        false
    } else if args.is(1, "after") {
        true
    } else {
        return Err(CommandError::Syntax);
    };
    let (pivot, element) = (args.bytes(2), args.bytes(3));

    let db = ctx.db();
    let Some(list) = db.list_mut(key)? else {
        return Ok(Reply::integer(0));
    };
    let Some(position) = list.iter().position(|e| e == pivot) else {
        return Ok(Reply::integer(-1));
    };
    list.insert(position + after as usize, element.clone());
    let len = list.len();
    db.mark_modified(key);
    Ok(Reply::integer(len as i64))
}

fn rpoplpush(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let moved = move_element(ctx.db(), args.bytes(0), args.bytes(1), End::Right, End::Left)?;
    Ok(Reply::from_option(moved))
}

fn lmove(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let from = End::parse(args, 2)?;
    let to = End::parse(args, 3)?;
    let moved = move_element(ctx.db(), args.bytes(0), args.bytes(1), from, to)?;
    Ok(Reply::from_option(moved))
}

// ============================================================================
// Blocking variants
// ============================================================================

/// BLPOP/BRPOP key [key ...] timeout
///
/// Replies `[key, element]`, or a nil array on timeout.
fn blocking_pop(ctx: &mut CommandContext<'_>, args: &Args, end: End) -> CommandResult {
    let last = args.len() - 1;
    let timeout = parse_timeout(args.bytes(last))?;
    let keys = args.all()[..last].to_vec();
    ctx.block_on(timeout, Reply::NilArray, move |db| pop_first(db, &keys, end))
}

fn blpop(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    blocking_pop(ctx, args, End::Left)
}

fn brpop(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    blocking_pop(ctx, args, End::Right)
}

fn blocking_move(
    ctx: &mut CommandContext<'_>,
    args: &Args,
    from: End,
    to: End,
    timeout_index: usize,
) -> CommandResult {
    let timeout = parse_timeout(args.bytes(timeout_index))?;
    let src = args.bytes(0).clone();
    let dst = args.bytes(1).clone();
    ctx.block_on(timeout, Reply::Nil, move |db| {
        Ok(move_element(db, &src, &dst, from, to)?.map(Reply::Bulk))
    })
}

fn brpoplpush(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    blocking_move(ctx, args, End::Right, End::Left, 2)
}

fn blmove(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let from = End::parse(args, 2)?;
    let to = End::parse(args, 3)?;
    blocking_move(ctx, args, from, to, 4)
}
