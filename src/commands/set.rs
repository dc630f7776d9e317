//! Set commands.

use super::args::Args;
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, KEY, SET_KEY};
use super::{scan_collection, ScanOptions};
use crate::error::CommandResult;
use crate::reply::Reply;
use crate::scan::ScanKind;
use crate::storage::{Keyspace, Value};
use bytes::Bytes;
use std::collections::BTreeSet;

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("sadd", &[SET_KEY, ARG], sadd).variadic(&[ARG]),
    CommandSpec::new("srem", &[SET_KEY, ARG], srem).variadic(&[ARG]),
    CommandSpec::new("smembers", &[SET_KEY], smembers),
    CommandSpec::new("sismember", &[SET_KEY, ARG], sismember),
    CommandSpec::new("scard", &[SET_KEY], scard),
    CommandSpec::new("smove", &[SET_KEY, SET_KEY, ARG], smove),
    CommandSpec::new("sinter", &[SET_KEY], sinter).variadic(&[SET_KEY]),
    CommandSpec::new("sunion", &[SET_KEY], sunion).variadic(&[SET_KEY]),
    CommandSpec::new("sdiff", &[SET_KEY], sdiff).variadic(&[SET_KEY]),
    CommandSpec::new("sinterstore", &[KEY, SET_KEY], sinterstore).variadic(&[SET_KEY]),
    CommandSpec::new("sunionstore", &[KEY, SET_KEY], sunionstore).variadic(&[SET_KEY]),
    CommandSpec::new("sdiffstore", &[KEY, SET_KEY], sdiffstore).variadic(&[SET_KEY]),
    CommandSpec::new("sscan", &[SET_KEY, ARG], sscan).variadic(&[ARG]),
];

fn sadd(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let set = db.set_or_create(key)?;
    let added = args
        .rest(1)
        .iter()
        .filter(|member| set.insert((*member).clone()))
        .count();
    db.mark_modified(key);
    Ok(Reply::integer(added as i64))
}

fn srem(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let Some(set) = db.members_mut(key)? else {
        return Ok(Reply::integer(0));
    };
    let removed = args.rest(1).iter().filter(|member| set.remove(*member)).count();
    if removed > 0 {
        db.mark_modified(key);
    }
    Ok(Reply::integer(removed as i64))
}

fn smembers(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let members = members_of(ctx.db(), args.bytes(0))?;
    Ok(Reply::bulk_array(members))
}

fn sismember(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let found = ctx
        .db()
        .members(args.bytes(0))?
        .map(|s| s.contains(args.bytes(1)))
        .unwrap_or(false);
    Ok(Reply::from_bool(found))
}

fn scard(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let len = ctx.db().members(args.bytes(0))?.map(|s| s.len()).unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

/// SMOVE source destination member
fn smove(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let (src, dst, member) = (args.bytes(0), args.bytes(1), args.bytes(2));
    let db = ctx.db();
    let removed = match db.members_mut(src)? {
        Some(set) => set.remove(member),
        None => false,
    };
    if !removed {
        return Ok(Reply::integer(0));
    }
    db.mark_modified(src);
    db.set_or_create(dst)?.insert(member.clone());
    db.mark_modified(dst);
    Ok(Reply::integer(1))
}

// ============================================================================
// Algebra
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Inter,
    Union,
    Diff,
}

fn members_of(db: &mut Keyspace, key: &[u8]) -> CommandResult<BTreeSet<Bytes>> {
    Ok(db.members(key)?.cloned().unwrap_or_default())
}

/// Folds the sets at `keys` left to right. Missing keys are empty sets.
fn combine(db: &mut Keyspace, keys: &[Bytes], op: SetOp) -> CommandResult<BTreeSet<Bytes>> {
    let mut result = members_of(db, &keys[0])?;
    for key in &keys[1..] {
        let other = members_of(db, key)?;
        result = match op {
            SetOp::Inter => result.intersection(&other).cloned().collect(),
            SetOp::Union => result.union(&other).cloned().collect(),
            SetOp::Diff => result.difference(&other).cloned().collect(),
        };
    }
    Ok(result)
}

fn algebra(ctx: &mut CommandContext<'_>, args: &Args, op: SetOp) -> CommandResult {
    let members = combine(ctx.db(), args.all(), op)?;
    Ok(Reply::bulk_array(members))
}

/// Stores the result at the destination, replacing it whatever its kind.
/// An empty result deletes the destination.
fn algebra_store(ctx: &mut CommandContext<'_>, args: &Args, op: SetOp) -> CommandResult {
    let dst = args.bytes(0).clone();
    let db = ctx.db();
    let members = combine(db, args.rest(1), op)?;
    let len = members.len();
    if members.is_empty() {
        db.remove(&dst);
    } else {
        db.set(dst, Value::Set(members), None);
    }
    Ok(Reply::integer(len as i64))
}

fn sinter(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    algebra(ctx, args, SetOp::Inter)
}

fn sunion(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    algebra(ctx, args, SetOp::Union)
}

fn sdiff(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    algebra(ctx, args, SetOp::Diff)
}

fn sinterstore(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    algebra_store(ctx, args, SetOp::Inter)
}

fn sunionstore(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    algebra_store(ctx, args, SetOp::Union)
}

fn sdiffstore(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    algebra_store(ctx, args, SetOp::Diff)
}

/// SSCAN key cursor [MATCH pattern] [COUNT count]
fn sscan(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0).clone();
    let options = ScanOptions::parse(args, 1, ctx.config().scan_batch, false)?;
    let kind = ScanKind::SetMembers {
        db: ctx.client.db,
        key: key.clone(),
    };
    scan_collection(
        ctx,
        kind,
        &options,
        |db| Ok(members_of(db, &key)?.into_iter().collect()),
        |db, member| {
            let present = db.members(&key)?.map(|s| s.contains(member)).unwrap_or(false);
            Ok(present.then(|| vec![Reply::Bulk(member.clone())]))
        },
    )
}
