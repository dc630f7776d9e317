//! Sorted set commands.
//!
//! Scores go out as bulk strings in the shortest form that reads back to
//! the same float (`1`, `2.5`, `inf`). Ranges are ordered by
//! `(score, member)`; the REV variants walk the same order backwards.

use super::args::{format_float, parse_float, parse_score_bound, parse_timeout, resolve_range, Args};
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, FLOAT, INT, ZSET_KEY};
use super::{scan_collection, ScanOptions};
use crate::error::{CommandError, CommandResult};
use crate::reply::Reply;
use crate::scan::ScanKind;
use crate::storage::{Keyspace, SortedSet};
use bytes::Bytes;

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("zadd", &[ZSET_KEY, ARG, ARG], zadd).variadic(&[ARG]),
    CommandSpec::new("zrem", &[ZSET_KEY, ARG], zrem).variadic(&[ARG]),
    CommandSpec::new("zscore", &[ZSET_KEY, ARG], zscore),
    CommandSpec::new("zcard", &[ZSET_KEY], zcard),
    CommandSpec::new("zincrby", &[ZSET_KEY, FLOAT, ARG], zincrby),
    CommandSpec::new("zcount", &[ZSET_KEY, ARG, ARG], zcount),
    CommandSpec::new("zrank", &[ZSET_KEY, ARG], zrank),
    CommandSpec::new("zrevrank", &[ZSET_KEY, ARG], zrevrank),
    CommandSpec::new("zrange", &[ZSET_KEY, INT, INT], zrange).variadic(&[ARG]),
    CommandSpec::new("zrevrange", &[ZSET_KEY, INT, INT], zrevrange).variadic(&[ARG]),
    CommandSpec::new("zrangebyscore", &[ZSET_KEY, ARG, ARG], zrangebyscore).variadic(&[ARG]),
    CommandSpec::new("zpopmin", &[ZSET_KEY], zpopmin).variadic(&[INT]),
    CommandSpec::new("zpopmax", &[ZSET_KEY], zpopmax).variadic(&[INT]),
    CommandSpec::new("bzpopmin", &[ZSET_KEY, ARG], bzpopmin).variadic(&[ARG]),
    CommandSpec::new("bzpopmax", &[ZSET_KEY, ARG], bzpopmax).variadic(&[ARG]),
    CommandSpec::new("zscan", &[ZSET_KEY, ARG], zscan).variadic(&[ARG]),
];

fn score_reply(score: f64) -> Reply {
    Reply::Bulk(format_float(score))
}

/// `[member, score, ...]` or just `[member, ...]`.
fn members_reply<'a>(items: impl Iterator<Item = (&'a Bytes, f64)>, with_scores: bool) -> Reply {
    let mut out = Vec::new();
    for (member, score) in items {
        out.push(Reply::Bulk(member.clone()));
        if with_scores {
            out.push(score_reply(score));
        }
    }
    Reply::array(out)
}

// ============================================================================
// ZADD
// ============================================================================

#[derive(Debug, Default)]
struct ZaddOptions {
    nx: bool,
    xx: bool,
    gt: bool,
    lt: bool,
    ch: bool,
    incr: bool,
}

impl ZaddOptions {
    /// Consumes leading flags; returns the options and the index of the
    /// first score.
    fn parse(args: &Args) -> CommandResult<(Self, usize)> {
        let mut opts = Self::default();
        let mut i = 1;
        while i < args.len() {
            let flag = match args.bytes(i).to_ascii_lowercase().as_slice() {
                b"nx" => &mut opts.nx,
                b"xx" => &mut opts.xx,
                b"gt" => &mut opts.gt,
                b"lt" => &mut opts.lt,
                b"ch" => &mut opts.ch,
                b"incr" => &mut opts.incr,
                _ => break,
            };
            *flag = true;
            i += 1;
        }

        let pairs = args.len() - i;
        if pairs == 0 || pairs % 2 != 0 {
            return Err(CommandError::Syntax);
        }
        if opts.nx && opts.xx {
            return Err(CommandError::XxAndNx);
        }
        if (opts.gt && opts.lt) || ((opts.gt || opts.lt) && opts.nx) {
            return Err(CommandError::GtLtNx);
        }
        if opts.incr && pairs != 2 {
            return Err(CommandError::IncrPair);
        }
        Ok((opts, i))
    }

    /// Whether a member with `current` score may take `next`.
    fn allows(&self, current: Option<f64>, next: f64) -> bool {
        match current {
            None => !self.xx,
            Some(current) => {
                !self.nx && (!self.gt || next > current) && (!self.lt || next < current)
            }
        }
    }
}

/// ZADD key [NX|XX] [GT|LT] [CH] [INCR] score member [score member ...]
fn zadd(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let (opts, first) = ZaddOptions::parse(args)?;

    // every score must parse before anything is written
    let mut pairs = Vec::with_capacity((args.len() - first) / 2);
    for pair in args.rest(first).chunks(2) {
        pairs.push((parse_float(&pair[0])?, pair[1].clone()));
    }

    let db = ctx.db();
    let zset = db.zset_or_create(key)?;

    if opts.incr {
        let (delta, member) = pairs.remove(0);
        let current = zset.score(&member);
        let next = current.unwrap_or(0.0) + delta;
        if next.is_nan() {
            return Err(CommandError::ScoreNan);
        }
        if !opts.allows(current, next) {
            return Ok(Reply::Nil);
        }
        zset.insert(member, next);
        db.mark_modified(key);
        return Ok(score_reply(next));
    }

    let mut added = 0;
    let mut changed = 0;
    for (score, member) in pairs {
        let current = zset.score(&member);
        if !opts.allows(current, score) {
            continue;
        }
        match current {
            None => added += 1,
            Some(old) if old != score => changed += 1,
            Some(_) => {}
        }
        zset.insert(member, score);
    }
    db.mark_modified(key);
    Ok(Reply::integer(if opts.ch { added + changed } else { added }))
}

// ============================================================================
// Point operations
// ============================================================================

fn zrem(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let db = ctx.db();
    let Some(zset) = db.zset_mut(key)? else {
        return Ok(Reply::integer(0));
    };
    let removed = args
        .rest(1)
        .iter()
        .filter(|member| zset.remove(member).is_some())
        .count();
    if removed > 0 {
        db.mark_modified(key);
    }
    Ok(Reply::integer(removed as i64))
}

fn zscore(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let score = ctx.db().zset(args.bytes(0))?.and_then(|z| z.score(args.bytes(1)));
    Ok(score.map(score_reply).unwrap_or(Reply::Nil))
}

fn zcard(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let len = ctx.db().zset(args.bytes(0))?.map(|z| z.len()).unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

fn zincrby(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0);
    let delta = args.float(1)?;
    let member = args.bytes(2);
    let db = ctx.db();
    let zset = db.zset_or_create(key)?;
    let next = zset.score(member).unwrap_or(0.0) + delta;
    if next.is_nan() {
        return Err(CommandError::ScoreNan);
    }
    zset.insert(member.clone(), next);
    db.mark_modified(key);
    Ok(score_reply(next))
}

fn zcount(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let min = parse_score_bound(args.bytes(1))?;
    let max = parse_score_bound(args.bytes(2))?;
    let count = ctx
        .db()
        .zset(args.bytes(0))?
        .map(|z| z.range_by_score(min, max).count())
        .unwrap_or(0);
    Ok(Reply::integer(count as i64))
}

fn rank_reply(ctx: &mut CommandContext<'_>, args: &Args, reverse: bool) -> CommandResult {
    let rank = ctx.db().zset(args.bytes(0))?.and_then(|z| {
        z.rank(args.bytes(1))
            .map(|r| if reverse { z.len() - 1 - r } else { r })
    });
    Ok(rank.map(|r| Reply::integer(r as i64)).unwrap_or(Reply::Nil))
}

fn zrank(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    rank_reply(ctx, args, false)
}

fn zrevrank(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    rank_reply(ctx, args, true)
}

// ============================================================================
// Ranges
// ============================================================================

/// ZRANGE/ZREVRANGE key start stop [WITHSCORES]
fn range_by_rank(ctx: &mut CommandContext<'_>, args: &Args, reverse: bool) -> CommandResult {
    let with_scores = match args.len() {
        3 => false,
        4 if args.is(3, "withscores") => true,
        _ => return Err(CommandError::Syntax),
    };
    let (start, stop) = (args.int(1)?, args.int(2)?);
    let Some(zset) = ctx.db().zset(args.bytes(0))? else {
        return Ok(Reply::array(vec![]));
    };
    let range = resolve_range(start, stop, zset.len());
    let window = range.end - range.start;
    Ok(if reverse {
        members_reply(zset.iter().rev().skip(range.start).take(window), with_scores)
    } else {
        members_reply(zset.iter().skip(range.start).take(window), with_scores)
    })
}

fn zrange(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    range_by_rank(ctx, args, false)
}

fn zrevrange(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    range_by_rank(ctx, args, true)
}

/// ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]
///
/// A negative LIMIT count returns everything after the offset; a negative
/// offset returns nothing.
fn zrangebyscore(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let min = parse_score_bound(args.bytes(1))?;
    let max = parse_score_bound(args.bytes(2))?;

    let mut with_scores = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut i = 3;
    while i < args.len() {
        if args.is(i, "withscores") {
            with_scores = true;
            i += 1;
        } else if args.is(i, "limit") && i + 2 < args.len() {
            limit = Some((args.int(i + 1)?, args.int(i + 2)?));
            i += 3;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let Some(zset) = ctx.db().zset(args.bytes(0))? else {
        return Ok(Reply::array(vec![]));
    };
    let matching = zset.range_by_score(min, max);
    Ok(match limit {
        Some((offset, _)) if offset < 0 => Reply::array(vec![]),
        Some((offset, count)) => {
            let count = usize::try_from(count).unwrap_or(usize::MAX);
            members_reply(matching.skip(offset as usize).take(count), with_scores)
        }
        None => members_reply(matching, with_scores),
    })
}

// ============================================================================
// Pops
// ============================================================================

fn pop_extreme(zset: &mut SortedSet, max: bool) -> Option<(Bytes, f64)> {
    if max {
        zset.pop_max()
    } else {
        zset.pop_min()
    }
}

/// ZPOPMIN/ZPOPMAX key [count]
fn pop_command(ctx: &mut CommandContext<'_>, args: &Args, max: bool) -> CommandResult {
    if args.len() > 2 {
        return Err(CommandError::Syntax);
    }
    let count = if args.len() == 2 { args.int(1)? } else { 1 };
    let key = args.bytes(0);
    let db = ctx.db();
    let Some(zset) = db.zset_mut(key)? else {
        return Ok(Reply::array(vec![]));
    };
    let mut out = Vec::new();
    for _ in 0..count.max(0) {
        let Some((member, score)) = pop_extreme(zset, max) else {
            break;
        };
        out.push(Reply::Bulk(member));
        out.push(score_reply(score));
    }
    if !out.is_empty() {
        db.mark_modified(key);
    }
    Ok(Reply::array(out))
}

fn zpopmin(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    pop_command(ctx, args, false)
}

fn zpopmax(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    pop_command(ctx, args, true)
}

/// `[key, member, score]` from the first non-empty sorted set.
fn pop_first(db: &mut Keyspace, keys: &[Bytes], max: bool) -> CommandResult<Option<Reply>> {
    for key in keys {
        let popped = db.zset_mut(key)?.and_then(|z| pop_extreme(z, max));
        if let Some((member, score)) = popped {
            db.mark_modified(key);
            return Ok(Some(Reply::array(vec![
                Reply::Bulk(key.clone()),
                Reply::Bulk(member),
                score_reply(score),
            ])));
        }
    }
    Ok(None)
}

/// BZPOPMIN/BZPOPMAX key [key ...] timeout
fn blocking_pop(ctx: &mut CommandContext<'_>, args: &Args, max: bool) -> CommandResult {
    let last = args.len() - 1;
    let timeout = parse_timeout(args.bytes(last))?;
    let keys = args.all()[..last].to_vec();
    ctx.block_on(timeout, Reply::NilArray, move |db| pop_first(db, &keys, max))
}

fn bzpopmin(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    blocking_pop(ctx, args, false)
}

fn bzpopmax(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    blocking_pop(ctx, args, true)
}

/// ZSCAN key cursor [MATCH pattern] [COUNT count]
///
/// Replies `[cursor, [member, score, ...]]`.
fn zscan(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let key = args.bytes(0).clone();
    let options = ScanOptions::parse(args, 1, ctx.config().scan_batch, false)?;
    let kind = ScanKind::SortedSetMembers {
        db: ctx.client.db,
        key: key.clone(),
    };
    scan_collection(
        ctx,
        kind,
        &options,
        |db| Ok(db.zset(&key)?.map(|z| z.members()).unwrap_or_default()),
        |db, member| {
            let score = db.zset(&key)?.and_then(|z| z.score(member));
            Ok(score.map(|s| vec![Reply::Bulk(member.clone()), score_reply(s)]))
        },
    )
}
