//! Pub/Sub commands.
//!
//! Subscription replies are arrays of `[kind, channel, count]` triples, one
//! per channel or pattern named, where `count` is the session's total
//! number of subscriptions after that step.

use super::args::Args;
use super::dispatcher::CommandContext;
use super::registry::{CommandSpec, ARG, PUBSUB};
use crate::error::CommandResult;
use crate::reply::Reply;
use bytes::Bytes;

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("publish", &[ARG, ARG], publish),
    CommandSpec::new("subscribe", &[ARG], subscribe).variadic(&[ARG]).flags(PUBSUB),
    CommandSpec::new("unsubscribe", &[], unsubscribe).variadic(&[ARG]).flags(PUBSUB),
    CommandSpec::new("psubscribe", &[ARG], psubscribe).variadic(&[ARG]).flags(PUBSUB),
    CommandSpec::new("punsubscribe", &[], punsubscribe).variadic(&[ARG]).flags(PUBSUB),
];

fn confirmation(kind: &'static str, name: Option<Bytes>, count: usize) -> Reply {
    Reply::array(vec![
        Reply::bulk(kind),
        Reply::from_option(name),
        Reply::integer(count as i64),
    ])
}

/// PUBLISH channel message
///
/// Returns the number of subscribers the message was delivered to.
fn publish(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let delivered = ctx.state.pubsub.publish(args.bytes(0), args.bytes(1));
    Ok(Reply::integer(delivered as i64))
}

fn subscribe(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let mut replies = Vec::with_capacity(args.len());
    for channel in args.all() {
        ctx.state
            .pubsub
            .subscribe(channel.clone(), ctx.client.id, &ctx.client.sink);
        ctx.client.channels.insert(channel.clone());
        replies.push(confirmation(
            "subscribe",
            Some(channel.clone()),
            ctx.client.subscription_count(),
        ));
    }
    Ok(Reply::array(replies))
}

fn psubscribe(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let mut replies = Vec::with_capacity(args.len());
    for pattern in args.all() {
        ctx.state
            .pubsub
            .psubscribe(pattern.clone(), ctx.client.id, &ctx.client.sink);
        ctx.client.patterns.insert(pattern.clone());
        replies.push(confirmation(
            "psubscribe",
            Some(pattern.clone()),
            ctx.client.subscription_count(),
        ));
    }
    Ok(Reply::array(replies))
}

/// UNSUBSCRIBE [channel ...]
///
/// Without arguments, leaves every channel. With nothing to leave the
/// reply is a single triple with a nil channel.
fn unsubscribe(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let targets: Vec<Bytes> = if args.is_empty() {
        ctx.client.channels.iter().cloned().collect()
    } else {
        args.all().to_vec()
    };
    if targets.is_empty() {
        return Ok(Reply::array(vec![confirmation(
            "unsubscribe",
            None,
            ctx.client.subscription_count(),
        )]));
    }

    let mut replies = Vec::with_capacity(targets.len());
    for channel in targets {
        ctx.state.pubsub.unsubscribe(&channel, ctx.client.id);
        ctx.client.channels.remove(&channel);
        replies.push(confirmation(
            "unsubscribe",
            Some(channel),
            ctx.client.subscription_count(),
        ));
    }
    Ok(Reply::array(replies))
}

fn punsubscribe(ctx: &mut CommandContext<'_>, args: &Args) -> CommandResult {
    let targets: Vec<Bytes> = if args.is_empty() {
        ctx.client.patterns.iter().cloned().collect()
    } else {
        args.all().to_vec()
    };
    if targets.is_empty() {
        return Ok(Reply::array(vec![confirmation(
            "punsubscribe",
            None,
            ctx.client.subscription_count(),
        )]));
    }

    let mut replies = Vec::with_capacity(targets.len());
    for pattern in targets {
        ctx.state.pubsub.punsubscribe(&pattern, ctx.client.id);
        ctx.client.patterns.remove(&pattern);
        replies.push(confirmation(
            "punsubscribe",
            Some(pattern),
            ctx.client.subscription_count(),
        ));
    }
    Ok(Reply::array(replies))
}
