/*!
 * Generic keyspace commands: existence, deletion, renaming, expiry, SCAN.
 */

use crate::commands::{lower, parse_int, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::now_ms;

pub fn cmd_del(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let mut removed = 0;
    let mut gone = Vec::new();
    for key in &argv[1..] {
        if db.remove(key).is_some() {
            removed += 1;
            gone.push(key.clone());
        }
    }
    drop(db);
    for key in gone {
        ctx.notify(NotifyFlags::GENERIC, "del", &key);
    }
    Ok(Reply::Int(removed).into())
}

pub fn cmd_exists(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let count = argv[1..].iter().filter(|k| db.contains(k)).count();
    Ok(Reply::Int(count as i64).into())
}

pub fn cmd_type(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let name = db.get(&argv[1]).map(|v| v.type_name()).unwrap_or("none");
    Ok(Reply::simple(name).into())
}

pub fn cmd_keys(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let keys = db.keys_matching(&argv[1]);
    Ok(Reply::bulk_array(keys).into())
}

pub fn cmd_scan(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let cursor = cur
        .next_str()?
        .parse::<u64>()
        .map_err(|_| CmdError::custom("ERR invalid cursor"))?;
    let mut pattern: Option<Vec<u8>> = None;
    let mut count = 10usize;
    let mut type_filter: Option<String> = None;
    while !cur.done() {
        if cur.match_token("match") {
            pattern = Some(cur.next_owned()?);
        } else if cur.match_token("count") {
            let n = cur.next_int()?;
            if n <= 0 {
                return Err(CmdError::Syntax);
            }
            count = n as usize;
        } else if cur.match_token("type") {
            type_filter = Some(cur.next_str()?.to_lowercase());
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let mut db = ctx.db();
    let (next, keys) = db.scan(cursor, pattern.as_deref(), count, type_filter.as_deref());
    Ok(Reply::Array(vec![
        Reply::bulk(next.to_string()),
        Reply::bulk_array(keys),
    ])
    .into())
}

pub fn cmd_rename(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    if !db.contains(&argv[1]) {
        return Err(CmdError::NoSuchKey);
    }
    db.rename(&argv[1], &argv[2]);
    db.signal_ready(&argv[2]);
    drop(db);
    ctx.notify(NotifyFlags::GENERIC, "rename_from", &argv[1]);
    ctx.notify(NotifyFlags::GENERIC, "rename_to", &argv[2]);
    Ok(Reply::ok().into())
}

pub fn cmd_renamenx(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    if !db.contains(&argv[1]) {
        return Err(CmdError::NoSuchKey);
    }
    if db.contains(&argv[2]) {
        return Ok(Reply::Int(0).into());
    }
    db.rename(&argv[1], &argv[2]);
    db.signal_ready(&argv[2]);
    drop(db);
    ctx.notify(NotifyFlags::GENERIC, "rename_from", &argv[1]);
    ctx.notify(NotifyFlags::GENERIC, "rename_to", &argv[2]);
    Ok(Reply::Int(1).into())
}

pub fn cmd_randomkey(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut rng = rand::thread_rng();
    let mut db = ctx.db();
    Ok(db
        .random_key(&mut rng)
        .map(Reply::Bulk)
        .unwrap_or(Reply::Null)
        .into())
}

pub fn cmd_touch(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let count = argv[1..].iter().filter(|k| db.contains(k)).count();
    Ok(Reply::Int(count as i64).into())
}

pub fn cmd_copy(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let src = cur.next_owned()?;
    let dst = cur.next_owned()?;
    let mut dest_db: Option<usize> = None;
    let mut replace = false;
    while !cur.done() {
        if cur.match_token("db") {
            let n = cur.next_int()?;
            if n < 0 || n as usize >= ctx.server.db_count() {
                return Err(CmdError::OutOfRange("DB index is out of range"));
            }
            dest_db = Some(n as usize);
        } else if cur.match_token("replace") {
            replace = true;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let target_index = dest_db.unwrap_or(ctx.session.db_index);
    let same_db = target_index == ctx.session.db_index;
    if same_db && src == dst {
        return Err(CmdError::custom("ERR source and destination objects are the same"));
    }

    let mut src_guard = ctx.db();
    let value = match src_guard.get(&src) {
        Some(v) => v.clone(),
        None => return Ok(Reply::Int(0).into()),
    };
    let ttl = src_guard.expiry(&src);
    if same_db {
        if src_guard.contains(&dst) && !replace {
            return Ok(Reply::Int(0).into());
        }
        src_guard.set(dst.clone(), value);
        if let Some(at) = ttl {
            src_guard.set_expiry(&dst, at);
        }
        src_guard.signal_ready(&dst);
    } else {
        drop(src_guard);
        let mut dst_guard = ctx.db_at(target_index);
        if dst_guard.contains(&dst) && !replace {
            return Ok(Reply::Int(0).into());
        }
        dst_guard.set(dst.clone(), value);
        if let Some(at) = ttl {
            dst_guard.set_expiry(&dst, at);
        }
        dst_guard.signal_ready(&dst);
    }
    ctx.notify(NotifyFlags::GENERIC, "copy_to", &dst);
    Ok(Reply::Int(1).into())
}

pub fn cmd_move(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let target = parse_int(&argv[2])?;
    if target < 0 || target as usize >= ctx.server.db_count() {
        return Err(CmdError::OutOfRange("DB index is out of range"));
    }
    let target = target as usize;
    if target == ctx.session.db_index {
        return Err(CmdError::custom("ERR source and destination objects are the same"));
    }
    let mut src_guard = ctx.db();
    if !src_guard.contains(&argv[1]) {
        return Ok(Reply::Int(0).into());
    }
    // locked in index order would matter with concurrent movers; the
    // reactor is the only client executor so plain ordering is fine
    let mut dst_guard = ctx.db_at(target);
    if dst_guard.contains(&argv[1]) {
        return Ok(Reply::Int(0).into());
    }
    let ttl = src_guard.expiry(&argv[1]);
    let value = src_guard.remove(&argv[1]).unwrap();
    dst_guard.set(argv[1].clone(), value);
    if let Some(at) = ttl {
        dst_guard.set_expiry(&argv[1], at);
    }
    dst_guard.signal_ready(&argv[1]);
    drop(dst_guard);
    drop(src_guard);
    ctx.notify(NotifyFlags::GENERIC, "move_from", &argv[1]);
    Ok(Reply::Int(1).into())
}

/// EXPIRE / PEXPIRE / EXPIREAT / PEXPIREAT with NX/XX/GT/LT gates.
pub fn cmd_expire(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let amount = parse_int(&argv[2])?;
    let now = now_ms();
    let when = match name.as_str() {
        "expire" => now as i64 + amount.saturating_mul(1000),
        "pexpire" => now as i64 + amount,
        "expireat" => amount.saturating_mul(1000),
        _ => amount,
    };
    let gate = match argv.get(3) {
        None => None,
        Some(b) if b.eq_ignore_ascii_case(b"nx") => Some("nx"),
        Some(b) if b.eq_ignore_ascii_case(b"xx") => Some("xx"),
        Some(b) if b.eq_ignore_ascii_case(b"gt") => Some("gt"),
        Some(b) if b.eq_ignore_ascii_case(b"lt") => Some("lt"),
        Some(_) => return Err(CmdError::Syntax),
    };
    let mut db = ctx.db();
    if !db.contains(&argv[1]) {
        return Ok(Reply::Int(0).into());
    }
    let current = db.expiry(&argv[1]);
    let allowed = match gate {
        None => true,
        Some("nx") => current.is_none(),
        Some("xx") => current.is_some(),
        // a key without TTL counts as infinitely far in the future
        Some("gt") => current.map(|c| when > c as i64).unwrap_or(false),
        _ => current.map(|c| when < c as i64).unwrap_or(true),
    };
    if !allowed {
        return Ok(Reply::Int(0).into());
    }
    let expired_now = when <= now as i64;
    db.set_expiry(&argv[1], when.max(0) as u64);
    drop(db);
    if expired_now {
        ctx.notify(NotifyFlags::GENERIC, "del", &argv[1]);
    } else {
        ctx.notify(NotifyFlags::GENERIC, "expire", &argv[1]);
    }
    Ok(Reply::Int(1).into())
}

/// TTL / PTTL.
pub fn cmd_ttl(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let seconds = lower(&argv[0]) == "ttl";
    let mut db = ctx.db();
    if !db.contains(&argv[1]) {
        return Ok(Reply::Int(-2).into());
    }
    let reply = match db.expiry(&argv[1]) {
        None => Reply::Int(-1),
        Some(at) => {
            let left = at.saturating_sub(now_ms());
            Reply::Int(if seconds { ((left + 999) / 1000) as i64 } else { left as i64 })
        }
    };
    Ok(reply.into())
}

/// EXPIRETIME / PEXPIRETIME.
pub fn cmd_expiretime(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let seconds = lower(&argv[0]) == "expiretime";
    let mut db = ctx.db();
    if !db.contains(&argv[1]) {
        return Ok(Reply::Int(-2).into());
    }
    let reply = match db.expiry(&argv[1]) {
        None => Reply::Int(-1),
        Some(at) => Reply::Int(if seconds { (at / 1000) as i64 } else { at as i64 }),
    };
    Ok(reply.into())
}

pub fn cmd_persist(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let had = db.persist(&argv[1]);
    if had {
        drop(db);
        ctx.notify(NotifyFlags::GENERIC, "persist", &argv[1]);
    }
    Ok(Reply::Int(had as i64).into())
}

pub fn cmd_dump(_ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    Err(CmdError::NotImplemented("DUMP"))
}

pub fn cmd_restore(_ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    Err(CmdError::NotImplemented("RESTORE"))
}
