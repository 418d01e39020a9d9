/*!
 * Sorted-set commands: ZADD with its flag grammar, the three range query
 * families, pops, and the union/intersect/difference aggregations.
 */

use crate::commands::{lower, parse_float, parse_int, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::Db;
use crate::value::zset::{parse_score, LexBound, ScoreBound};
use crate::value::{Value, ZsetVal};

fn read_zset<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a ZsetVal>, CmdError> {
    match db.get(key) {
        Some(v) => v.as_zset().map(Some),
        None => Ok(None),
    }
}

/// Member/score pairs as a reply: flat in RESP2, `[member, score]` pairs in
/// RESP3.
fn scored_array(items: Vec<(Vec<u8>, f64)>, withscores: bool, protover: u8) -> Reply {
    if !withscores {
        return Reply::Array(items.into_iter().map(|(m, _)| Reply::Bulk(m)).collect());
    }
    if protover >= 3 {
        Reply::Array(
            items
                .into_iter()
                .map(|(m, s)| Reply::Array(vec![Reply::Bulk(m), Reply::Double(s)]))
                .collect(),
        )
    } else {
        Reply::Array(
            items
                .into_iter()
                .flat_map(|(m, s)| [Reply::Bulk(m), Reply::Double(s)])
                .collect(),
        )
    }
}

pub fn cmd_zadd(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let (mut nx, mut xx, mut gt, mut lt, mut ch, mut incr) = (false, false, false, false, false, false);
    loop {
        if cur.match_token("nx") {
            nx = true;
        } else if cur.match_token("xx") {
            xx = true;
        } else if cur.match_token("gt") {
            gt = true;
        } else if cur.match_token("lt") {
            lt = true;
        } else if cur.match_token("ch") {
            ch = true;
        } else if cur.match_token("incr") {
            incr = true;
        } else {
            break;
        }
    }
    if nx && xx {
        return Err(CmdError::custom("ERR XX and NX options at the same time are not compatible"));
    }
    if (gt && lt) || (nx && (gt || lt)) {
        return Err(CmdError::custom(
            "ERR GT, LT, and/or NX options at the same time are not compatible",
        ));
    }
    if cur.remaining() == 0 || cur.remaining() % 2 != 0 {
        return Err(CmdError::Syntax);
    }
    let mut pairs = Vec::with_capacity(cur.remaining() / 2);
    while !cur.done() {
        let score = parse_score(cur.next_bytes()?)?;
        let member = cur.next_owned()?;
        pairs.push((member, score));
    }
    if incr && pairs.len() != 1 {
        return Err(CmdError::custom("ERR INCR option supports a single increment-element pair"));
    }

    let mut db = ctx.db();
    let zset = db
        .entry_or_insert_with(&key, || Value::Zset(ZsetVal::new()))
        .as_zset_mut()?;
    let mut added = 0i64;
    let mut changed = 0i64;
    let mut incr_result: Option<Option<f64>> = None;
    for (member, score) in pairs {
        let existing = zset.score(&member);
        let blocked = match existing {
            Some(old) => xx_nx_gt_lt_blocks(nx, gt, lt, old, score, incr),
            None => xx,
        };
        if incr {
            if blocked {
                incr_result = Some(None);
            } else {
                let next = zset.incr(&member, score)?;
                incr_result = Some(Some(next));
                changed += 1;
                if existing.is_none() {
                    added += 1;
                }
            }
            break;
        }
        if blocked {
            continue;
        }
        match existing {
            None => {
                zset.insert(member, score);
                added += 1;
                changed += 1;
            }
            Some(old) => {
                if old != score {
                    zset.insert(member, score);
                    changed += 1;
                }
            }
        }
    }
    db.notify_mutation(&key);
    db.delete_if_drained(&key);
    drop(db);
    if changed > 0 {
        ctx.notify(NotifyFlags::ZSET, "zadd", &key);
    }
    let reply = match incr_result {
        Some(Some(score)) => Reply::Double(score),
        Some(None) => Reply::Null,
        None => Reply::Int(if ch { changed } else { added }),
    };
    Ok(reply.into())
}

/// GT/LT/NX update gates for an existing member.
fn xx_nx_gt_lt_blocks(nx: bool, gt: bool, lt: bool, old: f64, new: f64, incr: bool) -> bool {
    if nx {
        return true;
    }
    let candidate = if incr { old + new } else { new };
    (gt && candidate <= old) || (lt && candidate >= old)
}

pub fn cmd_zrem(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let zset = match db.get_mut(&argv[1]) {
        Some(v) => v.as_zset_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    let mut removed = 0;
    for member in &argv[2..] {
        if zset.remove(member) {
            removed += 1;
        }
    }
    if removed > 0 {
        db.notify_mutation(&argv[1]);
        db.delete_if_drained(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::ZSET, "zrem", &argv[1]);
    }
    Ok(Reply::Int(removed).into())
}

pub fn cmd_zscore(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let score = read_zset(&mut db, &argv[1])?.and_then(|z| z.score(&argv[2]));
    Ok(score.map(Reply::Double).unwrap_or(Reply::Null).into())
}

pub fn cmd_zmscore(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let zset = read_zset(&mut db, &argv[1])?;
    let out: Vec<Reply> = argv[2..]
        .iter()
        .map(|m| {
            zset.and_then(|z| z.score(m))
                .map(Reply::Double)
                .unwrap_or(Reply::Null)
        })
        .collect();
    Ok(Reply::Array(out).into())
}

pub fn cmd_zcard(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_zset(&mut db, &argv[1])?.map(|z| z.len()).unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_zcount(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let min = ScoreBound::parse(&argv[2])?;
    let max = ScoreBound::parse(&argv[3])?;
    let mut db = ctx.db();
    let count = read_zset(&mut db, &argv[1])?
        .map(|z| z.count_by_score(&min, &max))
        .unwrap_or(0);
    Ok(Reply::Int(count as i64).into())
}

pub fn cmd_zincrby(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let delta = parse_score(&argv[2])?;
    let mut db = ctx.db();
    let zset = db
        .entry_or_insert_with(&argv[1], || Value::Zset(ZsetVal::new()))
        .as_zset_mut()?;
    let next = zset.incr(&argv[3], delta)?;
    db.notify_mutation(&argv[1]);
    drop(db);
    ctx.notify(NotifyFlags::ZSET, "zincr", &argv[1]);
    Ok(Reply::Double(next).into())
}

pub fn cmd_zrank(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let rev = lower(&argv[0]) == "zrevrank";
    let withscore = match argv.get(3) {
        Some(b) if b.eq_ignore_ascii_case(b"withscore") => true,
        Some(_) => return Err(CmdError::Syntax),
        None => false,
    };
    let mut db = ctx.db();
    let zset = read_zset(&mut db, &argv[1])?;
    let found = zset.and_then(|z| z.rank(&argv[2], rev).map(|r| (r, z.score(&argv[2]).unwrap_or(0.0))));
    let reply = match (found, withscore) {
        (None, false) => Reply::Null,
        (None, true) => Reply::NullArray,
        (Some((rank, _)), false) => Reply::Int(rank as i64),
        (Some((rank, score)), true) => Reply::Array(vec![Reply::Int(rank as i64), Reply::Double(score)]),
    };
    Ok(reply.into())
}

/// ZRANGE with the BYSCORE/BYLEX/REV/LIMIT grammar.
pub fn cmd_zrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let start = cur.next_owned()?;
    let stop = cur.next_owned()?;
    let mut by_score = false;
    let mut by_lex = false;
    let mut rev = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut withscores = false;
    while !cur.done() {
        if cur.match_token("byscore") {
            by_score = true;
        } else if cur.match_token("bylex") {
            by_lex = true;
        } else if cur.match_token("rev") {
            rev = true;
        } else if cur.match_token("limit") {
            limit = Some((cur.next_int()?, cur.next_int()?));
        } else if cur.match_token("withscores") {
            withscores = true;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    if by_score && by_lex {
        return Err(CmdError::Syntax);
    }
    if limit.is_some() && !by_score && !by_lex {
        return Err(CmdError::custom(
            "ERR syntax error, LIMIT is only supported in combination with either BYSCORE or BYLEX",
        ));
    }
    if by_lex && withscores {
        return Err(CmdError::Syntax);
    }
    let (offset, count) = limit.unwrap_or((0, -1));
    if offset < 0 {
        return Err(CmdError::OutOfRange("offset should be greater or equal to 0"));
    }
    let mut db = ctx.db();
    let zset = read_zset(&mut db, &key)?;
    let items = match zset {
        None => Vec::new(),
        Some(z) => {
            if by_score {
                // in REV form the bounds arrive max-first
                let (lo, hi) = if rev { (&stop, &start) } else { (&start, &stop) };
                let min = ScoreBound::parse(lo)?;
                let max = ScoreBound::parse(hi)?;
                z.range_by_score(&min, &max, rev, offset as usize, count)
            } else if by_lex {
                let (lo, hi) = if rev { (&stop, &start) } else { (&start, &stop) };
                let min = LexBound::parse(lo)?;
                let max = LexBound::parse(hi)?;
                z.range_by_lex(&min, &max, rev, offset as usize, count)
            } else {
                z.range_by_rank(parse_int(&start)?, parse_int(&stop)?, rev)
            }
        }
    };
    Ok(scored_array(items, withscores, ctx.session.protover).into())
}

/// ZREVRANGE (rank form only).
pub fn cmd_zrevrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let start = parse_int(&argv[2])?;
    let stop = parse_int(&argv[3])?;
    let withscores = match argv.get(4) {
        Some(b) if b.eq_ignore_ascii_case(b"withscores") => true,
        Some(_) => return Err(CmdError::Syntax),
        None => false,
    };
    let mut db = ctx.db();
    let items = read_zset(&mut db, &argv[1])?
        .map(|z| z.range_by_rank(start, stop, true))
        .unwrap_or_default();
    Ok(scored_array(items, withscores, ctx.session.protover).into())
}

/// ZRANGEBYSCORE / ZREVRANGEBYSCORE.
pub fn cmd_zrangebyscore(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let rev = lower(&argv[0]).starts_with("zrev");
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let first = cur.next_owned()?;
    let second = cur.next_owned()?;
    let mut withscores = false;
    let mut offset = 0i64;
    let mut count = -1i64;
    while !cur.done() {
        if cur.match_token("withscores") {
            withscores = true;
        } else if cur.match_token("limit") {
            offset = cur.next_int()?;
            count = cur.next_int()?;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    if offset < 0 {
        offset = 0;
    }
    let (min, max) = if rev {
        (ScoreBound::parse(&second)?, ScoreBound::parse(&first)?)
    } else {
        (ScoreBound::parse(&first)?, ScoreBound::parse(&second)?)
    };
    let mut db = ctx.db();
    let items = read_zset(&mut db, &key)?
        .map(|z| z.range_by_score(&min, &max, rev, offset as usize, count))
        .unwrap_or_default();
    Ok(scored_array(items, withscores, ctx.session.protover).into())
}

/// ZRANGEBYLEX / ZREVRANGEBYLEX.
pub fn cmd_zrangebylex(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let rev = lower(&argv[0]).starts_with("zrev");
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let first = cur.next_owned()?;
    let second = cur.next_owned()?;
    let mut offset = 0i64;
    let mut count = -1i64;
    while !cur.done() {
        if cur.match_token("limit") {
            offset = cur.next_int()?;
            count = cur.next_int()?;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    if offset < 0 {
        offset = 0;
    }
    let (min, max) = if rev {
        (LexBound::parse(&second)?, LexBound::parse(&first)?)
    } else {
        (LexBound::parse(&first)?, LexBound::parse(&second)?)
    };
    let mut db = ctx.db();
    let items = read_zset(&mut db, &key)?
        .map(|z| z.range_by_lex(&min, &max, rev, offset as usize, count))
        .unwrap_or_default();
    Ok(scored_array(items, false, ctx.session.protover).into())
}

pub fn cmd_zlexcount(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let min = LexBound::parse(&argv[2])?;
    let max = LexBound::parse(&argv[3])?;
    let mut db = ctx.db();
    let count = read_zset(&mut db, &argv[1])?
        .map(|z| z.count_by_lex(&min, &max))
        .unwrap_or(0);
    Ok(Reply::Int(count as i64).into())
}

/// ZPOPMIN / ZPOPMAX.
pub fn cmd_zpop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let max_end = lower(&argv[0]) == "zpopmax";
    let count = match argv.get(2) {
        Some(b) => {
            let n = parse_int(b)?;
            if n < 0 {
                return Err(CmdError::OutOfRange("value is out of range, must be positive"));
            }
            n as usize
        }
        None => 1,
    };
    let mut db = ctx.db();
    let zset = match db.get_mut(&argv[1]) {
        Some(v) => v.as_zset_mut()?,
        None => return Ok(Reply::Array(Vec::new()).into()),
    };
    let popped = zset.pop_end(max_end, count);
    db.notify_mutation(&argv[1]);
    db.delete_if_drained(&argv[1]);
    drop(db);
    if !popped.is_empty() {
        ctx.notify(NotifyFlags::ZSET, if max_end { "zpopmax" } else { "zpopmin" }, &argv[1]);
    }
    Ok(scored_array(popped, true, ctx.session.protover).into())
}

pub fn cmd_zrandmember(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let count = if cur.done() { None } else { Some(cur.next_int()?) };
    let withscores = if cur.match_token("withscores") {
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
    let zset = read_zset(&mut db, &key)?;
    let reply = match (zset, count) {
        (None, None) => Reply::Null,
        (None, Some(_)) => Reply::Array(Vec::new()),
        (Some(z), None) => z
            .random(1, &mut rng)
            .into_iter()
            .next()
            .map(|(m, _)| Reply::Bulk(m))
            .unwrap_or(Reply::Null),
        (Some(z), Some(n)) => scored_array(z.random(n, &mut rng), withscores, ctx.session.protover),
    };
    Ok(reply.into())
}

/// ZREMRANGEBYRANK / ZREMRANGEBYSCORE / ZREMRANGEBYLEX.
pub fn cmd_zremrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let mut db = ctx.db();
    let zset = match db.get_mut(&argv[1]) {
        Some(v) => v.as_zset_mut()?,
        None => return Ok(Reply::Int(0).into()),
    };
    let removed = match name.as_str() {
        "zremrangebyrank" => {
            let start = parse_int(&argv[2])?;
            let stop = parse_int(&argv[3])?;
            zset.remrange_by_rank(start, stop)
        }
        "zremrangebyscore" => {
            let min = ScoreBound::parse(&argv[2])?;
            let max = ScoreBound::parse(&argv[3])?;
            zset.remrange_by_score(&min, &max)
        }
        _ => {
            let min = LexBound::parse(&argv[2])?;
            let max = LexBound::parse(&argv[3])?;
            zset.remrange_by_lex(&min, &max)
        }
    };
    if removed > 0 {
        db.notify_mutation(&argv[1]);
        db.delete_if_drained(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::ZSET, "zremrange", &argv[1]);
    }
    Ok(Reply::Int(removed as i64).into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Aggregate::Sum => {
                // inf + -inf would be NaN; the convention is 0
                let s = a + b;
                if s.is_nan() {
                    0.0
                } else {
                    s
                }
            }
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

/// Zset view of a key for the multi-key operations: real zsets as-is, sets
/// as members with score 1.
fn zset_view(db: &mut Db, key: &[u8]) -> Result<Option<ZsetVal>, CmdError> {
    match db.get(key) {
        None => Ok(None),
        Some(Value::Zset(z)) => Ok(Some(z.clone())),
        Some(Value::Set(s)) => {
            let mut z = ZsetVal::new();
            for m in s.members() {
                z.insert(m.clone(), 1.0);
            }
            Ok(Some(z))
        }
        Some(_) => Err(CmdError::WrongType),
    }
}

struct ZsetOpArgs {
    keys: Vec<Vec<u8>>,
    weights: Vec<f64>,
    aggregate: Aggregate,
    withscores: bool,
}

fn parse_zsetop(cur: &mut ArgCursor, allow_withscores: bool) -> Result<ZsetOpArgs, CmdError> {
    let numkeys = cur.next_int()?;
    if numkeys <= 0 {
        return Err(CmdError::custom("ERR at least 1 input key is needed for ZUNIONSTORE/ZINTERSTORE"));
    }
    let mut keys = Vec::with_capacity(numkeys as usize);
    for _ in 0..numkeys {
        keys.push(cur.next_owned()?);
    }
    let mut weights = vec![1.0; keys.len()];
    let mut aggregate = Aggregate::Sum;
    let mut withscores = false;
    while !cur.done() {
        if cur.match_token("weights") {
            for w in weights.iter_mut() {
                *w = parse_float(cur.next_bytes()?)?;
            }
        } else if cur.match_token("aggregate") {
            let a = cur.next_bytes()?;
            aggregate = if a.eq_ignore_ascii_case(b"sum") {
                Aggregate::Sum
            } else if a.eq_ignore_ascii_case(b"min") {
                Aggregate::Min
            } else if a.eq_ignore_ascii_case(b"max") {
                Aggregate::Max
            } else {
                return Err(CmdError::Syntax);
            };
        } else if allow_withscores && cur.match_token("withscores") {
            withscores = true;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    Ok(ZsetOpArgs { keys, weights, aggregate, withscores })
}

fn run_zsetop(op: &str, db: &mut Db, args: &ZsetOpArgs) -> Result<ZsetVal, CmdError> {
    let mut views: Vec<Option<ZsetVal>> = Vec::with_capacity(args.keys.len());
    for key in &args.keys {
        views.push(zset_view(db, key)?);
    }
    let mut out = ZsetVal::new();
    match op {
        "zunion" => {
            for (i, view) in views.iter().enumerate() {
                let Some(z) = view else { continue };
                for (m, s) in z.iter() {
                    let weighted = s * args.weights[i];
                    match out.score(m) {
                        None => {
                            out.insert(m.clone(), weighted);
                        }
                        Some(cur) => {
                            out.insert(m.clone(), args.aggregate.apply(cur, weighted));
                        }
                    }
                }
            }
        }
        "zinter" => {
            let Some(first) = views.first().and_then(|v| v.as_ref()) else {
                return Ok(out);
            };
            'member: for (m, s) in first.iter() {
                let mut acc = s * args.weights[0];
                for (i, view) in views.iter().enumerate().skip(1) {
                    match view.as_ref().and_then(|z| z.score(m)) {
                        Some(other) => acc = args.aggregate.apply(acc, other * args.weights[i]),
                        None => continue 'member,
                    }
                }
                out.insert(m.clone(), acc);
            }
        }
        _ => {
            let Some(first) = views.first().and_then(|v| v.as_ref()) else {
                return Ok(out);
            };
            for (m, s) in first.iter() {
                let elsewhere = views
                    .iter()
                    .skip(1)
                    .any(|v| v.as_ref().map(|z| z.contains(m)).unwrap_or(false));
                if !elsewhere {
                    out.insert(m.clone(), s);
                }
            }
        }
    }
    Ok(out)
}

/// ZUNION / ZINTER / ZDIFF.
pub fn cmd_zsetop(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let mut cur = ArgCursor::new(argv);
    let args = parse_zsetop(&mut cur, true)?;
    if name == "zdiff" && (args.weights.iter().any(|w| *w != 1.0) || args.aggregate != Aggregate::Sum) {
        return Err(CmdError::Syntax);
    }
    let mut db = ctx.db();
    let result = run_zsetop(&name, &mut db, &args)?;
    let items: Vec<(Vec<u8>, f64)> = result.iter().map(|(m, s)| (m.clone(), s)).collect();
    Ok(scored_array(items, args.withscores, ctx.session.protover).into())
}

/// ZUNIONSTORE / ZINTERSTORE / ZDIFFSTORE.
pub fn cmd_zsetop_store(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let name = lower(&argv[0]);
    let op = name.trim_end_matches("store");
    let dest = argv[1].clone();
    // shift the cursor past the destination key
    let tail: Vec<Vec<u8>> = std::iter::once(argv[0].clone())
        .chain(argv[2..].iter().cloned())
        .collect();
    let mut cur = ArgCursor::new(&tail);
    let args = parse_zsetop(&mut cur, false)?;
    if op == "zdiff" && (args.weights.iter().any(|w| *w != 1.0) || args.aggregate != Aggregate::Sum) {
        return Err(CmdError::Syntax);
    }
    let mut db = ctx.db();
    let result = run_zsetop(op, &mut db, &args)?;
    let len = result.len();
    if result.is_empty() {
        db.remove(&dest);
    } else {
        db.set(dest.clone(), Value::Zset(result));
    }
    drop(db);
    ctx.notify(NotifyFlags::ZSET, &format!("{}store", op), &dest);
    Ok(Reply::Int(len as i64).into())
}

pub fn cmd_zscan(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let cursor = cur.next_int()?;
    let (pattern, _count, _) = super::hash::parse_subscan_opts(&mut cur, false)?;
    let mut db = ctx.db();
    let mut flat = Vec::new();
    if cursor == 0 {
        if let Some(z) = read_zset(&mut db, &key)? {
            for (m, s) in z.iter() {
                if let Some(p) = &pattern {
                    if !crate::glob::glob_match(p, m) {
                        continue;
                    }
                }
                flat.push(Reply::Bulk(m.clone()));
                flat.push(Reply::Bulk(crate::protocol::format_double(s).into_bytes()));
            }
        }
    }
    Ok(Reply::Array(vec![Reply::bulk("0"), Reply::Array(flat)]).into())
}
