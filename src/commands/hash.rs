/*!
 * Hash commands.
 */

use crate::commands::{parse_int, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::Db;
use crate::value::{HashVal, Value};

fn read_hash<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a HashVal>, CmdError> {
    match db.get(key) {
        Some(v) => v.as_hash().map(Some),
        None => Ok(None),
    }
}

pub fn cmd_hset(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if (argv.len() - 2) % 2 != 0 {
        return Err(CmdError::WrongArity(crate::commands::lower(&argv[0])));
    }
    let hmset = argv[0].eq_ignore_ascii_case(b"hmset");
    let mut db = ctx.db();
    let hash = db
        .entry_or_insert_with(&argv[1], || Value::Hash(HashVal::new()))
        .as_hash_mut()?;
    let mut added = 0;
    for pair in argv[2..].chunks(2) {
        if hash.set(pair[0].clone(), pair[1].clone()) {
            added += 1;
        }
    }
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::HASH, "hset", &argv[1]);
    Ok(if hmset { Reply::ok() } else { Reply::Int(added) }.into())
}

pub fn cmd_hsetnx(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let hash = db
        .entry_or_insert_with(&argv[1], || Value::Hash(HashVal::new()))
        .as_hash_mut()?;
    let set = hash.set_nx(argv[2].clone(), argv[3].clone());
    db.notify_mutation(&argv[1]);
    db.delete_if_drained(&argv[1]);
    if set {
        drop(db);
        ctx.notify(NotifyFlags::HASH, "hset", &argv[1]);
    }
    Ok(Reply::Int(set as i64).into())
}

pub fn cmd_hget(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let value = read_hash(&mut db, &argv[1])?.and_then(|h| h.get(&argv[2]).cloned());
    Ok(value.map(Reply::Bulk).unwrap_or(Reply::Null).into())
}

pub fn cmd_hmget(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let hash = read_hash(&mut db, &argv[1])?;
    let out: Vec<Reply> = argv[2..]
        .iter()
        .map(|f| {
            hash.and_then(|h| h.get(f).cloned())
                .map(Reply::Bulk)
                .unwrap_or(Reply::Null)
        })
        .collect();
    Ok(Reply::Array(out).into())
}

pub fn cmd_hdel(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let hash = match db.get_mut(&argv[1]) {
        Some(v) => v.as_hash_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    let mut removed = 0;
    for field in &argv[2..] {
        if hash.del(field) {
            removed += 1;
        }
    }
    if removed > 0 {
        db.notify_mutation(&argv[1]);
        db.delete_if_drained(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::HASH, "hdel", &argv[1]);
    }
    Ok(Reply::Int(removed).into())
}

pub fn cmd_hlen(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_hash(&mut db, &argv[1])?.map(|h| h.len()).unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_hexists(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let exists = read_hash(&mut db, &argv[1])?
        .map(|h| h.exists(&argv[2]))
        .unwrap_or(false);
    Ok(Reply::Int(exists as i64).into())
}

pub fn cmd_hkeys(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let fields: Vec<Vec<u8>> = read_hash(&mut db, &argv[1])?
        .map(|h| h.fields().cloned().collect())
        .unwrap_or_default();
    Ok(Reply::bulk_array(fields).into())
}

pub fn cmd_hvals(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let values: Vec<Vec<u8>> = read_hash(&mut db, &argv[1])?
        .map(|h| h.values().cloned().collect())
        .unwrap_or_default();
    Ok(Reply::bulk_array(values).into())
}

pub fn cmd_hgetall(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let pairs: Vec<(Reply, Reply)> = read_hash(&mut db, &argv[1])?
        .map(|h| {
            h.iter()
                .map(|(f, v)| (Reply::Bulk(f.clone()), Reply::Bulk(v.clone())))
                .collect()
        })
        .unwrap_or_default();
    Ok(Reply::Map(pairs).into())
}

pub fn cmd_hincrby(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let delta = parse_int(&argv[3])?;
    let mut db = ctx.db();
    let hash = db
        .entry_or_insert_with(&argv[1], || Value::Hash(HashVal::new()))
        .as_hash_mut()?;
    let next = hash.incr_by(&argv[2], delta)?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::HASH, "hincrby", &argv[1]);
    Ok(Reply::Int(next).into())
}

pub fn cmd_hincrbyfloat(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let delta = crate::commands::parse_float(&argv[3])?;
    let mut db = ctx.db();
    let hash = db
        .entry_or_insert_with(&argv[1], || Value::Hash(HashVal::new()))
        .as_hash_mut()?;
    let next = hash.incr_by_float(&argv[2], delta)?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::HASH, "hincrbyfloat", &argv[1]);
    Ok(Reply::Bulk(crate::protocol::format_double(next).into_bytes()).into())
}

pub fn cmd_hstrlen(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_hash(&mut db, &argv[1])?
        .map(|h| h.strlen(&argv[2]))
        .unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_hrandfield(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let count = if cur.done() { None } else { Some(cur.next_int()?) };
    let with_values = if cur.match_token("withvalues") {
        if count.is_none() {
            return Err(CmdError::Syntax);
        }
        true
    } else if !cur.done() {
        return Err(CmdError::Syntax);
    } else {
        false
    };
    let mut rng = rand::thread_rng();
    let mut db = ctx.db();
    let hash = read_hash(&mut db, &key)?;
    let reply = match (hash, count) {
        (None, None) => Reply::Null,
        (None, Some(_)) => Reply::Array(Vec::new()),
        (Some(h), None) => h
            .rand_fields(1, &mut rng)
            .first()
            .map(|(f, _)| Reply::Bulk((*f).clone()))
            .unwrap_or(Reply::Null),
        (Some(h), Some(n)) => {
            let picked = h.rand_fields(n, &mut rng);
            if with_values {
                Reply::Array(
                    picked
                        .into_iter()
                        .flat_map(|(f, v)| [Reply::Bulk(f.clone()), Reply::Bulk(v.clone())])
                        .collect(),
                )
            } else {
                Reply::Array(picked.into_iter().map(|(f, _)| Reply::Bulk(f.clone())).collect())
            }
        }
    };
    Ok(reply.into())
}

/// HSCAN: small values iterate in one pass, so the cursor is always
/// exhausted after the first call.
pub fn cmd_hscan(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let cursor = cur.next_int()?;
    let (pattern, _count, novalues) = parse_subscan_opts(&mut cur, true)?;
    let mut db = ctx.db();
    let hash = read_hash(&mut db, &key)?;
    let mut flat = Vec::new();
    if cursor == 0 {
        if let Some(h) = hash {
            for (f, v) in h.iter() {
                if let Some(p) = &pattern {
                    if !crate::glob::glob_match(p, f) {
                        continue;
                    }
                }
                flat.push(Reply::Bulk(f.clone()));
                if !novalues {
                    flat.push(Reply::Bulk(v.clone()));
                }
            }
        }
    }
    Ok(Reply::Array(vec![Reply::bulk("0"), Reply::Array(flat)]).into())
}

/// MATCH/COUNT (and NOVALUES for HSCAN) options of the value-scan commands.
pub fn parse_subscan_opts(
    cur: &mut ArgCursor,
    allow_novalues: bool,
) -> Result<(Option<Vec<u8>>, usize, bool), CmdError> {
    let mut pattern = None;
    let mut count = 10usize;
    let mut novalues = false;
    while !cur.done() {
        if cur.match_token("match") {
            pattern = Some(cur.next_owned()?);
        } else if cur.match_token("count") {
            let n = cur.next_int()?;
            if n <= 0 {
                return Err(CmdError::Syntax);
            }
            count = n as usize;
        } else if allow_novalues && cur.match_token("novalues") {
            novalues = true;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    Ok((pattern, count, novalues))
}
