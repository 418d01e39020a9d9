/*!
 * String commands: GET/SET and variants, counters, ranges, and the bit
 * operations.
 */

use crate::commands::{lower, parse_int, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::server::Stats;
use crate::storage::{now_ms, Db};
use crate::value::string::{bitop, BitOp, BitUnit};
use crate::value::{StrVal, Value};

/// Fetch a key expecting a string (or nothing).
fn read_string<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a StrVal>, CmdError> {
    match db.get(key) {
        Some(v) => v.as_str().map(Some),
        None => Ok(None),
    }
}

/// Fetch-or-create the string under `key` for in-place edits.
fn string_entry<'a>(db: &'a mut Db, key: &[u8]) -> Result<&'a mut StrVal, CmdError> {
    let v = db.entry_or_insert_with(key, || Value::Str(StrVal::new(Vec::new())));
    v.as_str_mut()
}

pub fn cmd_get(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    match read_string(&mut db, &argv[1])? {
        Some(s) => {
            Stats::bump(&ctx.server.stats.keyspace_hits);
            Ok(Reply::Bulk(s.to_bytes()).into())
        }
        None => {
            Stats::bump(&ctx.server.stats.keyspace_misses);
            Ok(Reply::Null.into())
        }
    }
}

/// Expiry options shared by SET and GETEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ExpireOpt {
    #[default]
    None,
    At(u64),
    KeepTtl,
    Persist,
}

fn parse_expire_opt(cur: &mut ArgCursor, cmd: &'static str, allow_persist: bool) -> Result<Option<ExpireOpt>, CmdError> {
    let invalid = move || CmdError::custom(format!("ERR invalid expire time in '{}' command", cmd));
    let now = now_ms();
    if cur.match_token("ex") {
        let secs = cur.next_int()?;
        if secs <= 0 {
            return Err(invalid());
        }
        Ok(Some(ExpireOpt::At(now + secs as u64 * 1000)))
    } else if cur.match_token("px") {
        let ms = cur.next_int()?;
        if ms <= 0 {
            return Err(invalid());
        }
        Ok(Some(ExpireOpt::At(now + ms as u64)))
    } else if cur.match_token("exat") {
        let at = cur.next_int()?;
        if at <= 0 {
            return Err(invalid());
        }
        Ok(Some(ExpireOpt::At(at as u64 * 1000)))
    } else if cur.match_token("pxat") {
        let at = cur.next_int()?;
        if at <= 0 {
            return Err(invalid());
        }
        Ok(Some(ExpireOpt::At(at as u64)))
    } else if cur.match_token("keepttl") {
        Ok(Some(ExpireOpt::KeepTtl))
    } else if allow_persist && cur.match_token("persist") {
        Ok(Some(ExpireOpt::Persist))
    } else {
        Ok(None)
    }
}

pub fn cmd_set(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let value = cur.next_owned()?;
    let mut nx = false;
    let mut xx = false;
    let mut get = false;
    let mut expire = ExpireOpt::None;
    while !cur.done() {
        if cur.match_token("nx") {
            nx = true;
        } else if cur.match_token("xx") {
            xx = true;
        } else if cur.match_token("get") {
            get = true;
        } else if let Some(e) = parse_expire_opt(&mut cur, "set", false)? {
            expire = e;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    if nx && xx {
        return Err(CmdError::Syntax);
    }

    let mut db = ctx.db();
    let old = if get {
        read_string(&mut db, &key)?.map(|s| s.to_bytes())
    } else {
        None
    };
    let exists = db.contains(&key);
    if (nx && exists) || (xx && !exists) {
        let reply = if get {
            old.map(Reply::Bulk).unwrap_or(Reply::Null)
        } else {
            Reply::Null
        };
        return Ok(reply.into());
    }
    match expire {
        ExpireOpt::KeepTtl => db.set_keep_ttl(key.clone(), Value::Str(StrVal::new(value))),
        _ => db.set(key.clone(), Value::Str(StrVal::new(value))),
    }
    if let ExpireOpt::At(at) = expire {
        db.set_expiry(&key, at);
    }
    drop(db);
    ctx.notify(NotifyFlags::STRING, "set", &key);
    let reply = if get {
        old.map(Reply::Bulk).unwrap_or(Reply::Null)
    } else {
        Reply::ok()
    };
    Ok(reply.into())
}

pub fn cmd_setnx(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    if db.contains(&argv[1]) {
        return Ok(Reply::Int(0).into());
    }
    db.set(argv[1].clone(), Value::Str(StrVal::new(argv[2].clone())));
    drop(db);
    ctx.notify(NotifyFlags::STRING, "set", &argv[1]);
    Ok(Reply::Int(1).into())
}

pub fn cmd_setex(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let amount = parse_int(&argv[2])?;
    if amount <= 0 {
        return Err(CmdError::custom(format!("ERR invalid expire time in '{}' command", name)));
    }
    let ms = if name == "setex" { amount as u64 * 1000 } else { amount as u64 };
    let mut db = ctx.db();
    db.set(argv[1].clone(), Value::Str(StrVal::new(argv[3].clone())));
    db.set_expiry(&argv[1], now_ms() + ms);
    drop(db);
    ctx.notify(NotifyFlags::STRING, "set", &argv[1]);
    Ok(Reply::ok().into())
}

pub fn cmd_getset(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let old = read_string(&mut db, &argv[1])?.map(|s| s.to_bytes());
    db.set(argv[1].clone(), Value::Str(StrVal::new(argv[2].clone())));
    drop(db);
    ctx.notify(NotifyFlags::STRING, "set", &argv[1]);
    Ok(old.map(Reply::Bulk).unwrap_or(Reply::Null).into())
}

pub fn cmd_getdel(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let old = read_string(&mut db, &argv[1])?.map(|s| s.to_bytes());
    if old.is_some() {
        db.remove(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::GENERIC, "del", &argv[1]);
    }
    Ok(old.map(Reply::Bulk).unwrap_or(Reply::Null).into())
}

pub fn cmd_getex(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let mut expire = ExpireOpt::None;
    if !cur.done() {
        expire = parse_expire_opt(&mut cur, "getex", true)?.ok_or(CmdError::Syntax)?;
        if expire == ExpireOpt::KeepTtl || !cur.done() {
            return Err(CmdError::Syntax);
        }
    }
    let mut db = ctx.db();
    let value = match read_string(&mut db, &key)? {
        Some(s) => s.to_bytes(),
        None => return Ok(Reply::Null.into()),
    };
    match expire {
        ExpireOpt::At(at) => {
            db.set_expiry(&key, at);
        }
        ExpireOpt::Persist => {
            db.persist(&key);
        }
        _ => {}
    }
    Ok(Reply::Bulk(value).into())
}

pub fn cmd_mget(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let mut out = Vec::with_capacity(argv.len() - 1);
    for key in &argv[1..] {
        // non-string values read as nil here rather than failing
        let item = match db.get(key) {
            Some(Value::Str(s)) => Reply::Bulk(s.to_bytes()),
            _ => Reply::Null,
        };
        out.push(item);
    }
    Ok(Reply::Array(out).into())
}

pub fn cmd_mset(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if (argv.len() - 1) % 2 != 0 {
        return Err(CmdError::WrongArity("mset".into()));
    }
    let mut db = ctx.db();
    for pair in argv[1..].chunks(2) {
        db.set(pair[0].clone(), Value::Str(StrVal::new(pair[1].clone())));
    }
    drop(db);
    for pair in argv[1..].chunks(2) {
        ctx.notify(NotifyFlags::STRING, "set", &pair[0]);
    }
    Ok(Reply::ok().into())
}

pub fn cmd_msetnx(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if (argv.len() - 1) % 2 != 0 {
        return Err(CmdError::WrongArity("msetnx".into()));
    }
    let mut db = ctx.db();
    let any_exists = argv[1..].chunks(2).any(|pair| db.contains(&pair[0]));
    if any_exists {
        return Ok(Reply::Int(0).into());
    }
    for pair in argv[1..].chunks(2) {
        db.set(pair[0].clone(), Value::Str(StrVal::new(pair[1].clone())));
    }
    Ok(Reply::Int(1).into())
}

pub fn cmd_append(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let s = string_entry(&mut db, &argv[1])?;
    let len = s.append(&argv[2])?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::STRING, "append", &argv[1]);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_strlen(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_string(&mut db, &argv[1])?.map(|s| s.len()).unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

/// INCR / DECR / INCRBY / DECRBY, switched on the command name.
pub fn cmd_incr(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let delta = match name.as_str() {
        "incr" => 1,
        "decr" => -1,
        "incrby" => parse_int(&argv[2])?,
        _ => parse_int(&argv[2])?.checked_neg().ok_or(CmdError::IntOverflow)?,
    };
    let mut db = ctx.db();
    let s = string_entry(&mut db, &argv[1])?;
    let next = s.incr_by(delta)?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::STRING, if delta >= 0 { "incrby" } else { "decrby" }, &argv[1]);
    Ok(Reply::Int(next).into())
}

pub fn cmd_incrbyfloat(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let delta = crate::commands::parse_float(&argv[2])?;
    let mut db = ctx.db();
    let s = string_entry(&mut db, &argv[1])?;
    let next = s.incr_by_float(delta)?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::STRING, "incrbyfloat", &argv[1]);
    Ok(Reply::Bulk(crate::protocol::format_double(next).into_bytes()).into())
}

pub fn cmd_getrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let start = parse_int(&argv[2])?;
    let end = parse_int(&argv[3])?;
    let mut db = ctx.db();
    let out = read_string(&mut db, &argv[1])?
        .map(|s| s.getrange(start, end))
        .unwrap_or_default();
    Ok(Reply::Bulk(out).into())
}

pub fn cmd_setrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let offset = parse_int(&argv[2])?;
    if offset < 0 {
        return Err(CmdError::OutOfRange("offset is out of range"));
    }
    let mut db = ctx.db();
    if argv[3].is_empty() && !db.contains(&argv[1]) {
        return Ok(Reply::Int(0).into());
    }
    let s = string_entry(&mut db, &argv[1])?;
    let len = s.setrange(offset as usize, &argv[3])?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::STRING, "setrange", &argv[1]);
    Ok(Reply::Int(len as i64).into())
}

fn parse_bit_offset(b: &[u8]) -> Result<usize, CmdError> {
    let i = parse_int(b).map_err(|_| CmdError::OutOfRange("bit offset is not an integer or out of range"))?;
    if i < 0 || i as usize >= crate::protocol::MAX_BULK_LEN * 8 {
        return Err(CmdError::OutOfRange("bit offset is not an integer or out of range"));
    }
    Ok(i as usize)
}

pub fn cmd_getbit(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let pos = parse_bit_offset(&argv[2])?;
    let mut db = ctx.db();
    let bit = read_string(&mut db, &argv[1])?.map(|s| s.getbit(pos)).unwrap_or(false);
    Ok(Reply::Int(bit as i64).into())
}

pub fn cmd_setbit(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let pos = parse_bit_offset(&argv[2])?;
    let on = match parse_int(&argv[3]) {
        Ok(0) => false,
        Ok(1) => true,
        _ => return Err(CmdError::OutOfRange("bit is not an integer or out of range")),
    };
    let mut db = ctx.db();
    let s = string_entry(&mut db, &argv[1])?;
    let old = s.setbit(pos, on)?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::STRING, "setbit", &argv[1]);
    Ok(Reply::Int(old as i64).into())
}

fn parse_bit_unit(cur: &mut ArgCursor) -> Result<BitUnit, CmdError> {
    if cur.match_token("byte") {
        Ok(BitUnit::Byte)
    } else if cur.match_token("bit") {
        Ok(BitUnit::Bit)
    } else if cur.done() {
        Ok(BitUnit::Byte)
    } else {
        Err(CmdError::Syntax)
    }
}

pub fn cmd_bitcount(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let range = if cur.done() {
        None
    } else {
        let start = cur.next_int()?;
        let end = cur.next_int()?;
        let unit = parse_bit_unit(&mut cur)?;
        if !cur.done() {
            return Err(CmdError::Syntax);
        }
        Some((start, end, unit))
    };
    let mut db = ctx.db();
    let count = read_string(&mut db, &key)?.map(|s| s.bitcount(range)).unwrap_or(0);
    Ok(Reply::Int(count as i64).into())
}

pub fn cmd_bitpos(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let target = match cur.next_int()? {
        0 => false,
        1 => true,
        _ => return Err(CmdError::custom("ERR The bit argument must be 1 or 0.")),
    };
    let (start, end, explicit_end, unit) = if cur.done() {
        (0, -1, false, BitUnit::Byte)
    } else {
        let start = cur.next_int()?;
        if cur.done() {
            (start, -1, false, BitUnit::Byte)
        } else {
            let end = cur.next_int()?;
            let unit = parse_bit_unit(&mut cur)?;
            if !cur.done() {
                return Err(CmdError::Syntax);
            }
            (start, end, true, unit)
        }
    };
    let mut db = ctx.db();
    let pos = match read_string(&mut db, &key)? {
        Some(s) => s.bitpos(target, start, end, unit, explicit_end),
        // missing key: searching for 0 finds position 0, for 1 finds nothing
        None => {
            if target {
                -1
            } else {
                0
            }
        }
    };
    Ok(Reply::Int(pos).into())
}

pub fn cmd_bitop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let op = match lower(&argv[1]).as_str() {
        "and" => BitOp::And,
        "or" => BitOp::Or,
        "xor" => BitOp::Xor,
        "not" => BitOp::Not,
        _ => return Err(CmdError::Syntax),
    };
    if op == BitOp::Not && argv.len() != 4 {
        return Err(CmdError::custom("ERR BITOP NOT must be called with a single source key."));
    }
    let dest = &argv[2];
    let mut db = ctx.db();
    let mut inputs = Vec::with_capacity(argv.len() - 3);
    for key in &argv[3..] {
        inputs.push(read_string(&mut db, key)?.map(|s| s.to_bytes()).unwrap_or_default());
    }
    let result = bitop(op, &inputs);
    let len = result.len();
    if result.is_empty() {
        db.remove(dest);
    } else {
        db.set(dest.clone(), Value::Str(StrVal::new(result)));
    }
    drop(db);
    ctx.notify(NotifyFlags::STRING, "set", dest);
    Ok(Reply::Int(len as i64).into())
}
