/*!
 * Pub/Sub commands. Subscription acknowledgements are push frames (plain
 * arrays on RESP2), one per channel, carrying the session's subscription
 * count after the change.
 */

use crate::commands::{lower, Ctx, Outcome};
use crate::errors::CmdError;
use crate::protocol::Reply;

fn ack(kind: &str, channel: Option<Vec<u8>>, count: usize) -> Reply {
    Reply::Push(vec![
        Reply::bulk(kind),
        channel.map(Reply::Bulk).unwrap_or(Reply::Null),
        Reply::Int(count as i64),
    ])
}

pub fn cmd_subscribe(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let id = ctx.session.id;
    let mut frames = Vec::with_capacity(argv.len() - 1);
    let mut registry = ctx.server.pubsub.lock();
    for channel in &argv[1..] {
        registry.subscribe(channel, id);
        ctx.session.channels.insert(channel.clone());
        frames.push(ack("subscribe", Some(channel.clone()), ctx.session.sub_count()));
    }
    Ok(Outcome::Multi(frames))
}

pub fn cmd_unsubscribe(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let id = ctx.session.id;
    let targets: Vec<Vec<u8>> = if argv.len() > 1 {
        argv[1..].to_vec()
    } else {
        ctx.session.channels.iter().cloned().collect()
    };
    let mut registry = ctx.server.pubsub.lock();
    if targets.is_empty() {
        return Ok(Outcome::Multi(vec![ack("unsubscribe", None, 0)]));
    }
    let mut frames = Vec::with_capacity(targets.len());
    for channel in targets {
        registry.unsubscribe(&channel, id);
        ctx.session.channels.remove(&channel);
        frames.push(ack("unsubscribe", Some(channel), ctx.session.sub_count()));
    }
    Ok(Outcome::Multi(frames))
}

pub fn cmd_psubscribe(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let id = ctx.session.id;
    let mut frames = Vec::with_capacity(argv.len() - 1);
    let mut registry = ctx.server.pubsub.lock();
    for pattern in &argv[1..] {
        registry.psubscribe(pattern, id);
        ctx.session.patterns.insert(pattern.clone());
        frames.push(ack("psubscribe", Some(pattern.clone()), ctx.session.sub_count()));
    }
    Ok(Outcome::Multi(frames))
}

pub fn cmd_punsubscribe(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let id = ctx.session.id;
    let targets: Vec<Vec<u8>> = if argv.len() > 1 {
        argv[1..].to_vec()
    } else {
        ctx.session.patterns.iter().cloned().collect()
    };
    let mut registry = ctx.server.pubsub.lock();
    if targets.is_empty() {
        return Ok(Outcome::Multi(vec![ack("punsubscribe", None, 0)]));
    }
    let mut frames = Vec::with_capacity(targets.len());
    for pattern in targets {
        registry.punsubscribe(&pattern, id);
        ctx.session.patterns.remove(&pattern);
        frames.push(ack("punsubscribe", Some(pattern), ctx.session.sub_count()));
    }
    Ok(Outcome::Multi(frames))
}

pub fn cmd_publish(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let receivers = ctx.server.publish(&argv[1], &argv[2]);
    Ok(Reply::Int(receivers as i64).into())
}

pub fn cmd_pubsub(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let registry = ctx.server.pubsub.lock();
    match lower(&argv[1]).as_str() {
        "channels" => {
            let channels = registry.active_channels(argv.get(2).map(|p| p.as_slice()));
            Ok(Reply::bulk_array(channels).into())
        }
        "numsub" => {
            let mut out = Vec::with_capacity((argv.len() - 2) * 2);
            for channel in &argv[2..] {
                out.push(Reply::Bulk(channel.clone()));
                out.push(Reply::Int(registry.subscriber_count(channel) as i64));
            }
            Ok(Reply::Array(out).into())
        }
        "numpat" => Ok(Reply::Int(registry.pattern_count() as i64).into()),
        other => Err(CmdError::custom(format!(
            "ERR Unknown PUBSUB subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}
