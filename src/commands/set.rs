/*!
 * Set commands, including the union/intersection/difference algebra and
 * its STORE variants.
 */

use crate::commands::{lower, parse_int, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::Db;
use crate::value::set::{diff, intersect, union};
use crate::value::{SetVal, Value};

fn read_set<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a SetVal>, CmdError> {
    match db.get(key) {
        Some(v) => v.as_set().map(Some),
        None => Ok(None),
    }
}

pub fn cmd_sadd(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let set = db
        .entry_or_insert_with(&argv[1], || Value::Set(SetVal::new()))
        .as_set_mut()?;
    let mut added = 0;
    for member in &argv[2..] {
        if set.add(member.clone()) {
            added += 1;
        }
    }
    db.notify_mutation(&argv[1]);
    db.delete_if_drained(&argv[1]);
    if added > 0 {
        drop(db);
        ctx.notify(NotifyFlags::SET, "sadd", &argv[1]);
    }
    Ok(Reply::Int(added).into())
}

pub fn cmd_srem(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let set = match db.get_mut(&argv[1]) {
        Some(v) => v.as_set_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    let mut removed = 0;
    for member in &argv[2..] {
        if set.remove(member) {
            removed += 1;
        }
    }
    if removed > 0 {
        db.notify_mutation(&argv[1]);
        db.delete_if_drained(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::SET, "srem", &argv[1]);
    }
    Ok(Reply::Int(removed).into())
}

pub fn cmd_smembers(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let members: Vec<Vec<u8>> = read_set(&mut db, &argv[1])?
        .map(|s| s.members().cloned().collect())
        .unwrap_or_default();
    Ok(Reply::Set(members.into_iter().map(Reply::Bulk).collect()).into())
}

pub fn cmd_sismember(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let hit = read_set(&mut db, &argv[1])?
        .map(|s| s.contains(&argv[2]))
        .unwrap_or(false);
    Ok(Reply::Int(hit as i64).into())
}

pub fn cmd_smismember(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let set = read_set(&mut db, &argv[1])?;
    let out: Vec<Reply> = argv[2..]
        .iter()
        .map(|m| Reply::Int(set.map(|s| s.contains(m)).unwrap_or(false) as i64))
        .collect();
    Ok(Reply::Array(out).into())
}

pub fn cmd_scard(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_set(&mut db, &argv[1])?.map(|s| s.len()).unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_spop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
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
    let mut rng = rand::thread_rng();
    let mut db = ctx.db();
    let set = match db.get_mut(&argv[1]) {
        Some(v) => v.as_set_mut()?,
        None => {
            return Ok(match count {
                Some(_) => Reply::Set(Vec::new()).into(),
                None => Reply::Null.into(),
            })
        }
    };
    let popped = set.pop(count.unwrap_or(1), &mut rng);
    db.notify_mutation(&argv[1]);
    db.delete_if_drained(&argv[1]);
    drop(db);
    if !popped.is_empty() {
        ctx.notify(NotifyFlags::SET, "spop", &argv[1]);
    }
    let reply = match count {
        None => popped.into_iter().next().map(Reply::Bulk).unwrap_or(Reply::Null),
        Some(_) => Reply::Set(popped.into_iter().map(Reply::Bulk).collect()),
    };
    Ok(reply.into())
}

pub fn cmd_srandmember(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let count = match argv.get(2) {
        Some(b) => Some(parse_int(b)?),
        None => None,
    };
    let mut rng = rand::thread_rng();
    let mut db = ctx.db();
    let set = read_set(&mut db, &argv[1])?;
    let reply = match (set, count) {
        (None, None) => Reply::Null,
        (None, Some(_)) => Reply::Array(Vec::new()),
        (Some(s), None) => s
            .random(1, &mut rng)
            .into_iter()
            .next()
            .map(Reply::Bulk)
            .unwrap_or(Reply::Null),
        (Some(s), Some(n)) => Reply::Array(s.random(n, &mut rng).into_iter().map(Reply::Bulk).collect()),
    };
    Ok(reply.into())
}

pub fn cmd_smove(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    // both sides must be sets before anything moves
    if let Some(v) = db.get(&argv[2]) {
        v.as_set()?;
    }
    let src = match db.get_mut(&argv[1]) {
        Some(v) => v.as_set_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    if !src.remove(&argv[3]) {
        return Ok(Reply::Int(0).into());
    }
    db.notify_mutation(&argv[1]);
    db.delete_if_drained(&argv[1]);
    let dst = db
        .entry_or_insert_with(&argv[2], || Value::Set(SetVal::new()))
        .as_set_mut()?;
    dst.add(argv[3].clone());
    db.notify_mutation(&argv[2]);
    drop(db);
    ctx.notify(NotifyFlags::SET, "srem", &argv[1]);
    ctx.notify(NotifyFlags::SET, "sadd", &argv[2]);
    Ok(Reply::Int(1).into())
}

/// SUNION / SINTER / SDIFF.
pub fn cmd_setop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let mut db = ctx.db();
    let result = run_setop(&name, &mut db, &argv[1..])?;
    Ok(Reply::Set(result.into_iter().map(Reply::Bulk).collect()).into())
}

/// SUNIONSTORE / SINTERSTORE / SDIFFSTORE.
pub fn cmd_setop_store(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let op = name.trim_end_matches("store");
    let mut db = ctx.db();
    let result = run_setop(op, &mut db, &argv[2..])?;
    let len = result.len();
    if result.is_empty() {
        db.remove(&argv[1]);
    } else {
        let mut set = SetVal::new();
        for m in result {
            set.add(m);
        }
        db.set(argv[1].clone(), Value::Set(set));
    }
    drop(db);
    ctx.notify(NotifyFlags::SET, &format!("{}store", op), &argv[1]);
    Ok(Reply::Int(len as i64).into())
}

fn run_setop(op: &str, db: &mut Db, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, CmdError> {
    // collect owned copies first: the borrows of several keys overlap
    let mut owned: Vec<Option<SetVal>> = Vec::with_capacity(keys.len());
    for key in keys {
        owned.push(read_set(db, key)?.cloned());
    }
    let views: Vec<Option<&SetVal>> = owned.iter().map(|o| o.as_ref()).collect();
    Ok(match op {
        "sunion" => union(&views),
        "sinter" => intersect(&views, 0),
        "sdiff" => diff(&views),
        _ => unreachable!("unexpected set operation {}", op),
    })
}

pub fn cmd_sintercard(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let numkeys = cur.next_int()?;
    if numkeys <= 0 {
        return Err(CmdError::OutOfRange("numkeys should be greater than 0"));
    }
    let mut keys = Vec::with_capacity(numkeys as usize);
    for _ in 0..numkeys {
        keys.push(cur.next_owned()?);
    }
    let limit = if cur.match_token("limit") {
        let n = cur.next_int()?;
        if n < 0 {
            return Err(CmdError::OutOfRange("LIMIT can't be negative"));
        }
        n as usize
    } else {
        0
    };
    if !cur.done() {
        return Err(CmdError::Syntax);
    }
    let mut db = ctx.db();
    let mut owned: Vec<Option<SetVal>> = Vec::with_capacity(keys.len());
    for key in &keys {
        owned.push(read_set(&mut db, key)?.cloned());
    }
    let views: Vec<Option<&SetVal>> = owned.iter().map(|o| o.as_ref()).collect();
    Ok(Reply::Int(intersect(&views, limit).len() as i64).into())
}

pub fn cmd_sscan(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let cursor = cur.next_int()?;
    let (pattern, _count, _) = super::hash::parse_subscan_opts(&mut cur, false)?;
    let mut db = ctx.db();
    let mut out = Vec::new();
    if cursor == 0 {
        if let Some(s) = read_set(&mut db, &key)? {
            for m in s.members() {
                if let Some(p) = &pattern {
                    if !crate::glob::glob_match(p, m) {
                        continue;
                    }
                }
                out.push(Reply::Bulk(m.clone()));
            }
        }
    }
    Ok(Reply::Array(vec![Reply::bulk("0"), Reply::Array(out)]).into())
}
