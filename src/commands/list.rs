/*!
 * List commands, including the blocking variants. Blocking handlers try the
 * non-blocking operation first and park the session only when every watched
 * key is empty.
 */

use crate::blocking::{try_serve, BlockKind, BlockedState};
use crate::commands::{lower, parse_int, parse_timeout, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::{now_ms, Db};
use crate::value::list::End;
use crate::value::{ListVal, Value};

fn read_list<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a ListVal>, CmdError> {
    match db.get(key) {
        Some(v) => v.as_list().map(Some),
        None => Ok(None),
    }
}

/// WRONGTYPE probe that treats a missing key as fine.
fn check_list_type(db: &mut Db, key: &[u8]) -> Result<(), CmdError> {
    if let Some(v) = db.get(key) {
        v.as_list()?;
    }
    Ok(())
}

fn push_event(end: End) -> &'static str {
    match end {
        End::Left => "lpush",
        End::Right => "rpush",
    }
}

pub fn cmd_push(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let end = if name.starts_with('l') { End::Left } else { End::Right };
    let require_existing = name.ends_with('x');
    let mut db = ctx.db();
    if require_existing && !db.contains(&argv[1]) {
        check_list_type(&mut db, &argv[1])?;
        return Ok(Reply::Int(0).into());
    }
    let list = db
        .entry_or_insert_with(&argv[1], || Value::List(ListVal::new()))
        .as_list_mut()?;
    for elem in &argv[2..] {
        list.push(end, elem.clone());
    }
    let len = list.len();
    db.notify_mutation(&argv[1]);
    db.signal_ready(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::LIST, push_event(end), &argv[1]);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_pop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let end = if name == "lpop" { End::Left } else { End::Right };
    let count = match argv.get(2) {
        Some(b) => {
            let n = parse_int(b)?;
            if n < 0 {
                return Err(CmdError::OutOfRange("value is out of range, must be positive"));
            }
            Some(n as usize)
        }
        None => None,
    };
    let mut db = ctx.db();
    let list = match db.get_mut(&argv[1]) {
        Some(v) => v.as_list_mut()?,
        None => {
            return Ok(match count {
                Some(_) => Reply::NullArray.into(),
                None => Reply::Null.into(),
            })
        }
    };
    let reply = match count {
        None => list.pop(end).map(Reply::Bulk).unwrap_or(Reply::Null),
        Some(n) => Reply::Array(list.pop_count(end, n).into_iter().map(Reply::Bulk).collect()),
    };
    db.notify_mutation(&argv[1]);
    db.delete_if_drained(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::LIST, if end == End::Left { "lpop" } else { "rpop" }, &argv[1]);
    Ok(reply.into())
}

pub fn cmd_llen(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_list(&mut db, &argv[1])?.map(|l| l.len()).unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_lrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let mut db = ctx.db();
    let items = read_list(&mut db, &argv[1])?
        .map(|l| l.range(start, stop))
        .unwrap_or_default();
    Ok(Reply::bulk_array(items).into())
}

pub fn cmd_lindex(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let index = parse_int(&argv[2])?;
    let mut db = ctx.db();
    let item = read_list(&mut db, &argv[1])?.and_then(|l| l.index(index).cloned());
    Ok(item.map(Reply::Bulk).unwrap_or(Reply::Null).into())
}

pub fn cmd_lset(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let index = parse_int(&argv[2])?;
    let mut db = ctx.db();
    let list = match db.get_mut(&argv[1]) {
        Some(v) => v.as_list_mut()?,
        None => return Err(CmdError::NoSuchKey),
    };
    list.set(index, argv[3].clone())?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::LIST, "lset", &argv[1]);
    Ok(Reply::ok().into())
}

pub fn cmd_linsert(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let before = if argv[2].eq_ignore_ascii_case(b"before") {
        true
    } else if argv[2].eq_ignore_ascii_case(b"after") {
        false
    } else {
        return Err(CmdError::Syntax);
    };
    let mut db = ctx.db();
    let list = match db.get_mut(&argv[1]) {
        Some(v) => v.as_list_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    let len = list.insert(before, &argv[3], argv[4].clone());
    if len > 0 {
        db.notify_mutation(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::LIST, "linsert", &argv[1]);
    }
    Ok(Reply::Int(len).into())
}

pub fn cmd_lrem(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let count = parse_int(&argv[2])?;
    let mut db = ctx.db();
    let list = match db.get_mut(&argv[1]) {
        Some(v) => v.as_list_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    let removed = list.rem(count, &argv[3]);
    if removed > 0 {
        db.notify_mutation(&argv[1]);
        db.delete_if_drained(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::LIST, "lrem", &argv[1]);
    }
    Ok(Reply::Int(removed as i64).into())
}

pub fn cmd_ltrim(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let mut db = ctx.db();
    if let Some(v) = db.get_mut(&argv[1]) {
        v.as_list_mut()?.trim(start, stop);
        db.notify_mutation(&argv[1]);
        db.delete_if_drained(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::LIST, "ltrim", &argv[1]);
    }
    Ok(Reply::ok().into())
}

pub fn cmd_lpos(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let elem = cur.next_owned()?;
    let mut rank = 1i64;
    let mut count: Option<usize> = None;
    let mut maxlen = 0usize;
    while !cur.done() {
        if cur.match_token("rank") {
            rank = cur.next_int()?;
            if rank == 0 {
                return Err(CmdError::custom(
                    "ERR RANK can't be zero: use 1 to start searching from the first matching element, or the negative rank to start searching from the end.",
                ));
            }
        } else if cur.match_token("count") {
            let n = cur.next_int()?;
            if n < 0 {
                return Err(CmdError::OutOfRange("COUNT can't be negative"));
            }
            count = Some(n as usize);
        } else if cur.match_token("maxlen") {
            let n = cur.next_int()?;
            if n < 0 {
                return Err(CmdError::OutOfRange("MAXLEN can't be negative"));
            }
            maxlen = n as usize;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let mut db = ctx.db();
    let hits = read_list(&mut db, &key)?
        .map(|l| l.pos(&elem, rank, count.unwrap_or(1), maxlen))
        .unwrap_or_default();
    let reply = match count {
        None => hits
            .first()
            .map(|&i| Reply::Int(i as i64))
            .unwrap_or(Reply::Null),
        Some(_) => Reply::Array(hits.into_iter().map(|i| Reply::Int(i as i64)).collect()),
    };
    Ok(reply.into())
}

fn parse_end(b: &[u8]) -> Result<End, CmdError> {
    if b.eq_ignore_ascii_case(b"left") {
        Ok(End::Left)
    } else if b.eq_ignore_ascii_case(b"right") {
        Ok(End::Right)
    } else {
        Err(CmdError::Syntax)
    }
}

/// LMOVE / RPOPLPUSH.
pub fn cmd_lmove(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let (src, dst, from, to) = if lower(&argv[0]) == "rpoplpush" {
        (&argv[1], &argv[2], End::Right, End::Left)
    } else {
        (&argv[1], &argv[2], parse_end(&argv[3])?, parse_end(&argv[4])?)
    };
    let mut db = ctx.db();
    check_list_type(&mut db, src)?;
    check_list_type(&mut db, dst)?;
    let state = BlockedState {
        kind: BlockKind::ListMove { dst: dst.clone(), from, to },
        db: ctx.session.db_index,
        keys: vec![src.clone()],
        deadline: None,
    };
    match try_serve(&state, src, &mut db) {
        Some(reply) => {
            drop(db);
            ctx.notify(NotifyFlags::LIST, if from == End::Left { "lpop" } else { "rpop" }, src);
            ctx.notify(NotifyFlags::LIST, push_event(to), dst);
            Ok(reply.into())
        }
        None => Ok(Reply::Null.into()),
    }
}

pub fn cmd_lmpop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let (keys, end, count) = parse_mpop_tail(&mut cur)?;
    let mut db = ctx.db();
    for key in &keys {
        check_list_type(&mut db, key)?;
    }
    let state = BlockedState {
        kind: BlockKind::ListMpop { end, count },
        db: ctx.session.db_index,
        keys: keys.clone(),
        deadline: None,
    };
    for key in &keys {
        if let Some(reply) = try_serve(&state, key, &mut db) {
            drop(db);
            ctx.notify(NotifyFlags::LIST, if end == End::Left { "lpop" } else { "rpop" }, key);
            return Ok(reply.into());
        }
    }
    Ok(Reply::NullArray.into())
}

/// `numkeys key... LEFT|RIGHT [COUNT n]` tail shared by LMPOP and BLMPOP.
fn parse_mpop_tail(cur: &mut ArgCursor) -> Result<(Vec<Vec<u8>>, End, usize), CmdError> {
    let numkeys = cur.next_int()?;
    if numkeys <= 0 {
        return Err(CmdError::OutOfRange("numkeys should be greater than 0"));
    }
    let mut keys = Vec::with_capacity(numkeys as usize);
    for _ in 0..numkeys {
        keys.push(cur.next_owned()?);
    }
    let end = parse_end(cur.next_bytes()?)?;
    let count = if cur.match_token("count") {
        let n = cur.next_int()?;
        if n <= 0 {
            return Err(CmdError::OutOfRange("count should be greater than 0"));
        }
        n as usize
    } else {
        1
    };
    if !cur.done() {
        return Err(CmdError::Syntax);
    }
    Ok((keys, end, count))
}

/// BLPOP / BRPOP.
pub fn cmd_bpop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let end = if lower(&argv[0]) == "blpop" { End::Left } else { End::Right };
    let deadline = parse_timeout(&argv[argv.len() - 1], now_ms())?;
    let keys: Vec<Vec<u8>> = argv[1..argv.len() - 1].to_vec();
    let state = BlockedState {
        kind: BlockKind::ListPop { end },
        db: ctx.session.db_index,
        keys: keys.clone(),
        deadline,
    };
    let mut db = ctx.db();
    for key in &keys {
        check_list_type(&mut db, key)?;
    }
    for key in &keys {
        if let Some(reply) = try_serve(&state, key, &mut db) {
            drop(db);
            ctx.notify(NotifyFlags::LIST, if end == End::Left { "lpop" } else { "rpop" }, key);
            return Ok(reply.into());
        }
    }
    if !ctx.may_block() {
        return Ok(state.timeout_reply().into());
    }
    Ok(Outcome::Block(state))
}

/// BLMOVE / BRPOPLPUSH.
pub fn cmd_blmove(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let (src, dst, from, to, timeout_arg) = if lower(&argv[0]) == "brpoplpush" {
        (&argv[1], &argv[2], End::Right, End::Left, &argv[3])
    } else {
        (&argv[1], &argv[2], parse_end(&argv[3])?, parse_end(&argv[4])?, &argv[5])
    };
    let deadline = parse_timeout(timeout_arg, now_ms())?;
    let state = BlockedState {
        kind: BlockKind::ListMove { dst: dst.clone(), from, to },
        db: ctx.session.db_index,
        keys: vec![src.clone()],
        deadline,
    };
    let mut db = ctx.db();
    check_list_type(&mut db, src)?;
    check_list_type(&mut db, dst)?;
    if let Some(reply) = try_serve(&state, src, &mut db) {
        drop(db);
        ctx.notify(NotifyFlags::LIST, if from == End::Left { "lpop" } else { "rpop" }, src);
        ctx.notify(NotifyFlags::LIST, push_event(to), dst);
        return Ok(reply.into());
    }
    if !ctx.may_block() {
        return Ok(state.timeout_reply().into());
    }
    Ok(Outcome::Block(state))
}

pub fn cmd_blmpop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let deadline = parse_timeout(cur.next_bytes()?, now_ms())?;
    let (keys, end, count) = parse_mpop_tail(&mut cur)?;
    let state = BlockedState {
        kind: BlockKind::ListMpop { end, count },
        db: ctx.session.db_index,
        keys: keys.clone(),
        deadline,
    };
    let mut db = ctx.db();
    for key in &keys {
        check_list_type(&mut db, key)?;
    }
    for key in &keys {
        if let Some(reply) = try_serve(&state, key, &mut db) {
            drop(db);
            ctx.notify(NotifyFlags::LIST, if end == End::Left { "lpop" } else { "rpop" }, key);
            return Ok(reply.into());
        }
    }
    if !ctx.may_block() {
        return Ok(state.timeout_reply().into());
    }
    Ok(Outcome::Block(state))
}
