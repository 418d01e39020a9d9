/*!
 * MULTI/EXEC transactions with WATCH-based optimistic concurrency.
 *
 * Queued commands re-enter the normal dispatch pipeline at EXEC time with
 * the transaction state cleared, so arity/ACL/type failures land in place
 * inside the reply array without aborting the batch.
 */

use crate::commands::{dispatch, Ctx, Outcome};
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::session::TxState;

pub fn cmd_multi(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if ctx.session.in_tx() {
        return Err(CmdError::NestedMulti);
    }
    ctx.session.tx = TxState::Queueing;
    Ok(Reply::ok().into())
}

pub fn cmd_discard(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if !ctx.session.in_tx() {
        return Err(CmdError::WithoutMulti("DISCARD"));
    }
    release_watches(ctx);
    ctx.session.clear_tx();
    Ok(Reply::ok().into())
}

pub fn cmd_watch(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if ctx.session.tx == TxState::Queueing {
        return Err(CmdError::custom("ERR WATCH inside MULTI is not allowed"));
    }
    let db_index = ctx.session.db_index;
    let mut db = ctx.db();
    for key in &argv[1..] {
        let version = db.watch_key(key);
        ctx.session.watched.push((db_index, key.clone(), version));
    }
    Ok(Reply::ok().into())
}

pub fn cmd_unwatch(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    release_watches(ctx);
    Ok(Reply::ok().into())
}

pub fn cmd_exec(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    match ctx.session.tx {
        TxState::None => Err(CmdError::WithoutMulti("EXEC")),
        TxState::DirtyExec => {
            release_watches(ctx);
            ctx.session.clear_tx();
            Err(CmdError::ExecAbort)
        }
        TxState::Queueing => {
            let clean = watches_clean(ctx);
            release_watches(ctx);
            let queue = std::mem::take(&mut ctx.session.queued);
            ctx.session.tx = TxState::None;
            if !clean {
                return Ok(Reply::NullArray.into());
            }
            let mut replies = Vec::with_capacity(queue.len());
            let was_in_exec = ctx.in_exec;
            ctx.in_exec = true;
            for argv in queue {
                let reply = match dispatch(ctx, &argv) {
                    Outcome::Reply(r) => r,
                    Outcome::Multi(mut frames) => frames.drain(..).next().unwrap_or(Reply::Null),
                    Outcome::NoReply => Reply::ok(),
                    // dispatch degrades blocking outcomes while in_exec
                    Outcome::Block(b) => b.timeout_reply(),
                };
                replies.push(reply);
            }
            ctx.in_exec = was_in_exec;
            Ok(Reply::Array(replies).into())
        }
    }
}

/// Drop every watch registration this session holds.
pub fn release_watches(ctx: &mut Ctx) {
    for (db_index, key, _) in std::mem::take(&mut ctx.session.watched) {
        ctx.server.dbs[db_index].write().unwatch_key(&key);
    }
}

/// True when no watched key has been modified since WATCH observed it.
/// Touching the key first lets lazy expiry bump the version of a key that
/// timed out while watched.
fn watches_clean(ctx: &Ctx) -> bool {
    ctx.session
        .watched
        .iter()
        .all(|(db_index, key, version)| {
            let mut db = ctx.server.dbs[*db_index].write();
            db.contains(key);
            db.watch_version(key) == *version
        })
}
