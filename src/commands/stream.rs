/*!
 * Stream commands: XADD and range reads, XREAD (with BLOCK), and the
 * consumer-group machinery (XGROUP, XREADGROUP, XACK, XPENDING, XCLAIM,
 * XAUTOCLAIM, XINFO).
 */

use crate::blocking::{encode_stream_entry, BlockKind, BlockedState};
use crate::commands::{lower, ArgCursor, Ctx, Outcome};
use crate::config::NotifyFlags;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::{now_ms, Db};
use crate::value::stream::{Consumer, IdSpec, PendingEntry, StreamId};
use crate::value::{StreamVal, Value};

fn read_stream<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a StreamVal>, CmdError> {
    match db.get(key) {
        Some(v) => v.as_stream().map(Some),
        None => Ok(None),
    }
}

fn stream_mut<'a>(db: &'a mut Db, key: &[u8]) -> Result<Option<&'a mut StreamVal>, CmdError> {
    match db.get_mut(key) {
        Some(v) => v.as_stream_mut().map(Some),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Copy)]
enum TrimSpec {
    None,
    MaxLen(usize),
    MinId(StreamId),
}

fn parse_trim(cur: &mut ArgCursor) -> Result<TrimSpec, CmdError> {
    let spec = if cur.match_token("maxlen") {
        // `=` and `~` both trim exactly here
        if !cur.match_token("=") {
            cur.match_token("~");
        }
        let n = cur.next_int()?;
        if n < 0 {
            return Err(CmdError::custom("ERR value is out of range, must be positive"));
        }
        TrimSpec::MaxLen(n as usize)
    } else if cur.match_token("minid") {
        if !cur.match_token("=") {
            cur.match_token("~");
        }
        TrimSpec::MinId(StreamId::parse(cur.next_bytes()?, 0)?)
    } else {
        return Ok(TrimSpec::None);
    };
    if cur.match_token("limit") {
        // LIMIT is advisory for approximate trims; parse and ignore
        cur.next_int()?;
    }
    Ok(spec)
}

fn apply_trim(stream: &mut StreamVal, spec: TrimSpec) -> u64 {
    match spec {
        TrimSpec::None => 0,
        TrimSpec::MaxLen(n) => stream.trim_maxlen(n),
        TrimSpec::MinId(id) => stream.trim_minid(id),
    }
}

pub fn cmd_xadd(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let nomkstream = cur.match_token("nomkstream");
    let trim = parse_trim(&mut cur)?;
    let id_spec = IdSpec::parse(cur.next_bytes()?)?;
    if cur.remaining() == 0 || cur.remaining() % 2 != 0 {
        return Err(CmdError::WrongArity("xadd".into()));
    }
    let mut fields = Vec::with_capacity(cur.remaining() / 2);
    while !cur.done() {
        fields.push((cur.next_owned()?, cur.next_owned()?));
    }

    let mut db = ctx.db();
    if nomkstream && !db.contains(&key) {
        return Ok(Reply::Null.into());
    }
    let stream = db
        .entry_or_insert_with(&key, || Value::Stream(StreamVal::new()))
        .as_stream_mut()?;
    let id = stream.add(id_spec, fields, now_ms())?;
    apply_trim(stream, trim);
    db.notify_mutation(&key);
    db.signal_ready(&key);
    drop(db);
    ctx.notify(NotifyFlags::STREAM, "xadd", &key);
    Ok(Reply::bulk(id.to_string()).into())
}

pub fn cmd_xlen(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let len = read_stream(&mut db, &argv[1])?.map(|s| s.len()).unwrap_or(0);
    Ok(Reply::Int(len as i64).into())
}

/// XRANGE / XREVRANGE.
pub fn cmd_xrange(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let rev = lower(&argv[0]) == "xrevrange";
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let first = cur.next_owned()?;
    let second = cur.next_owned()?;
    let count = if cur.match_token("count") {
        let n = cur.next_int()?;
        if n < 0 {
            return Err(CmdError::custom("ERR value is out of range, must be positive"));
        }
        n as usize
    } else {
        0
    };
    if !cur.done() {
        return Err(CmdError::Syntax);
    }
    // XREVRANGE takes end first
    let (start_raw, end_raw) = if rev { (&second, &first) } else { (&first, &second) };
    let (start, start_ex) = StreamId::parse_range_item(start_raw, false)?;
    let (end, end_ex) = StreamId::parse_range_item(end_raw, true)?;
    let mut db = ctx.db();
    let entries = read_stream(&mut db, &key)?
        .map(|s| s.range(start, start_ex, end, end_ex, count, rev))
        .unwrap_or_default();
    Ok(Reply::Array(entries.into_iter().map(encode_stream_entry).collect()).into())
}

pub fn cmd_xdel(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut ids = Vec::with_capacity(argv.len() - 2);
    for raw in &argv[2..] {
        ids.push(StreamId::parse(raw, 0)?);
    }
    let mut db = ctx.db();
    let removed = match stream_mut(&mut db, &argv[1])? {
        Some(s) => s.delete(&ids),
        None => 0,
    };
    if removed > 0 {
        db.notify_mutation(&argv[1]);
        drop(db);
        ctx.notify(NotifyFlags::STREAM, "xdel", &argv[1]);
    }
    Ok(Reply::Int(removed as i64).into())
}

pub fn cmd_xtrim(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let trim = parse_trim(&mut cur)?;
    if matches!(trim, TrimSpec::None) || !cur.done() {
        return Err(CmdError::Syntax);
    }
    let mut db = ctx.db();
    let removed = match stream_mut(&mut db, &key)? {
        Some(s) => apply_trim(s, trim),
        None => 0,
    };
    if removed > 0 {
        db.notify_mutation(&key);
        drop(db);
        ctx.notify(NotifyFlags::STREAM, "xtrim", &key);
    }
    Ok(Reply::Int(removed as i64).into())
}

pub fn cmd_xsetid(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let id = StreamId::parse(cur.next_bytes()?, 0)?;
    let mut entries_added: Option<u64> = None;
    let mut max_deleted: Option<StreamId> = None;
    while !cur.done() {
        if cur.match_token("entriesadded") {
            entries_added = Some(cur.next_int()? as u64);
        } else if cur.match_token("maxdeletedid") {
            max_deleted = Some(StreamId::parse(cur.next_bytes()?, 0)?);
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let mut db = ctx.db();
    let stream = db
        .entry_or_insert_with(&key, || Value::Stream(StreamVal::new()))
        .as_stream_mut()?;
    if let Some(top) = stream.range(StreamId::MIN, false, StreamId::MAX, false, 1, true).first() {
        if id < top.0 {
            return Err(CmdError::custom(
                "ERR The ID specified in XSETID is smaller than the target stream top item",
            ));
        }
    }
    stream.last_id = id;
    if let Some(n) = entries_added {
        stream.entries_added = n;
    }
    if let Some(m) = max_deleted {
        stream.max_deleted_id = m;
    }
    db.notify_mutation(&key);
    Ok(Reply::ok().into())
}

/// XREAD [COUNT n] [BLOCK ms] STREAMS key... id...
pub fn cmd_xread(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let mut count = 0usize;
    let mut block_ms: Option<u64> = None;
    loop {
        if cur.match_token("count") {
            count = cur.next_int()?.max(0) as usize;
        } else if cur.match_token("block") {
            let ms = cur.next_int()?;
            if ms < 0 {
                return Err(CmdError::custom("ERR timeout is negative"));
            }
            block_ms = Some(ms as u64);
        } else if cur.match_token("streams") {
            break;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let tail = cur.rest();
    if tail.is_empty() || tail.len() % 2 != 0 {
        return Err(CmdError::custom(
            "ERR Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.",
        ));
    }
    let n = tail.len() / 2;
    let keys = &tail[..n];
    let ids = &tail[n..];

    let mut db = ctx.db();
    let mut after: Vec<(Vec<u8>, StreamId)> = Vec::with_capacity(n);
    for (key, raw) in keys.iter().zip(ids) {
        let from = if raw == b"$" {
            read_stream(&mut db, key)?.map(|s| s.last_id).unwrap_or(StreamId::MIN)
        } else {
            StreamId::parse(raw, 0)?
        };
        after.push((key.clone(), from));
    }
    let mut sections = Vec::new();
    for (key, from) in &after {
        let entries = read_stream(&mut db, key)?
            .map(|s| s.read_after(*from, count))
            .unwrap_or_default();
        if !entries.is_empty() {
            sections.push(Reply::Array(vec![
                Reply::bulk(key.clone()),
                Reply::Array(entries.into_iter().map(encode_stream_entry).collect()),
            ]));
        }
    }
    if !sections.is_empty() {
        return Ok(Reply::Array(sections).into());
    }
    match block_ms {
        Some(ms) if ctx.may_block() => {
            let deadline = if ms == 0 { None } else { Some(now_ms() + ms) };
            let keys: Vec<Vec<u8>> = after.iter().map(|(k, _)| k.clone()).collect();
            Ok(Outcome::Block(BlockedState {
                kind: BlockKind::StreamRead { after, count },
                db: ctx.session.db_index,
                keys,
                deadline,
            }))
        }
        _ => Ok(Reply::NullArray.into()),
    }
}

pub fn cmd_xgroup(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let sub = lower(&argv[1]);
    match sub.as_str() {
        "create" => {
            if argv.len() < 5 {
                return Err(CmdError::WrongArity("xgroup".into()));
            }
            let mkstream = argv.get(5).map(|b| b.eq_ignore_ascii_case(b"mkstream")).unwrap_or(false);
            let mut db = ctx.db();
            if !db.contains(&argv[2]) && !mkstream {
                return Err(CmdError::custom(
                    "ERR The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.",
                ));
            }
            let stream = db
                .entry_or_insert_with(&argv[2], || Value::Stream(StreamVal::new()))
                .as_stream_mut()?;
            let start = if argv[4] == b"$" {
                stream.last_id
            } else {
                StreamId::parse(&argv[4], 0)?
            };
            stream.create_group(argv[3].clone(), start)?;
            db.notify_mutation(&argv[2]);
            Ok(Reply::ok().into())
        }
        "setid" => {
            if argv.len() < 5 {
                return Err(CmdError::WrongArity("xgroup".into()));
            }
            let mut db = ctx.db();
            let stream = require_stream(&mut db, &argv[2], &argv[3])?;
            let id = if argv[4] == b"$" {
                stream.last_id
            } else {
                StreamId::parse(&argv[4], 0)?
            };
            let group = stream.groups.get_mut(&argv[3]).unwrap();
            group.last_delivered = id;
            Ok(Reply::ok().into())
        }
        "destroy" => {
            let mut db = ctx.db();
            let removed = match stream_mut(&mut db, &argv[2])? {
                Some(s) => s.groups.remove(&argv[3]).is_some(),
                None => false,
            };
            Ok(Reply::Int(removed as i64).into())
        }
        "createconsumer" => {
            if argv.len() < 5 {
                return Err(CmdError::WrongArity("xgroup".into()));
            }
            let mut db = ctx.db();
            let stream = require_stream(&mut db, &argv[2], &argv[3])?;
            let group = stream.groups.get_mut(&argv[3]).unwrap();
            let created = !group.consumers.contains_key(&argv[4]);
            group
                .consumers
                .entry(argv[4].clone())
                .or_insert_with(|| Consumer { seen_time: now_ms() });
            Ok(Reply::Int(created as i64).into())
        }
        "delconsumer" => {
            if argv.len() < 5 {
                return Err(CmdError::WrongArity("xgroup".into()));
            }
            let mut db = ctx.db();
            let stream = require_stream(&mut db, &argv[2], &argv[3])?;
            let group = stream.groups.get_mut(&argv[3]).unwrap();
            let pending: Vec<StreamId> = group
                .pending_for(&argv[4])
                .map(|(id, _)| *id)
                .collect();
            for id in &pending {
                group.pending.remove(id);
            }
            group.consumers.remove(&argv[4]);
            Ok(Reply::Int(pending.len() as i64).into())
        }
        other => Err(CmdError::custom(format!(
            "ERR Unknown XGROUP subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}

/// Stream-with-group lookup shared by the group subcommands.
fn require_stream<'a>(db: &'a mut Db, key: &[u8], group: &[u8]) -> Result<&'a mut StreamVal, CmdError> {
    let no_group = || {
        CmdError::NoGroup(
            String::from_utf8_lossy(group).to_string(),
            String::from_utf8_lossy(key).to_string(),
        )
    };
    let stream = stream_mut(db, key)?.ok_or_else(no_group)?;
    if !stream.groups.contains_key(group) {
        return Err(no_group());
    }
    Ok(stream)
}

/// XREADGROUP GROUP g consumer [COUNT n] [BLOCK ms] [NOACK] STREAMS key... id...
pub fn cmd_xreadgroup(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    cur.expect_token("group")?;
    let group_name = cur.next_owned()?;
    let consumer_name = cur.next_owned()?;
    let mut count = 0usize;
    let mut noack = false;
    loop {
        if cur.match_token("count") {
            count = cur.next_int()?.max(0) as usize;
        } else if cur.match_token("block") {
            // group reads do not park here; BLOCK degrades to an
            // immediate empty reply
            cur.next_int()?;
        } else if cur.match_token("noack") {
            noack = true;
        } else if cur.match_token("streams") {
            break;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let tail = cur.rest();
    if tail.is_empty() || tail.len() % 2 != 0 {
        return Err(CmdError::custom(
            "ERR Unbalanced XREADGROUP list of streams: for each stream key an ID or '>' must be specified.",
        ));
    }
    let n = tail.len() / 2;
    let now = now_ms();
    let mut db = ctx.db();
    let mut sections = Vec::new();
    let mut delivered_any = false;
    for i in 0..n {
        let key = &tail[i];
        let raw_id = &tail[n + i];
        let stream = require_stream(&mut db, key, &group_name)?;
        let entries: Vec<(StreamId, Vec<(Vec<u8>, Vec<u8>)>)> = if raw_id == b">" {
            let group = stream.groups.get(&group_name).unwrap();
            let new = stream.read_after(group.last_delivered, count);
            let group = stream.groups.get_mut(&group_name).unwrap();
            group
                .consumers
                .entry(consumer_name.clone())
                .or_insert_with(|| Consumer { seen_time: now })
                .seen_time = now;
            for (id, _) in &new {
                group.last_delivered = *id;
                if !noack {
                    group.pending.insert(
                        *id,
                        PendingEntry {
                            consumer: consumer_name.clone(),
                            delivery_time: now,
                            delivery_count: 1,
                        },
                    );
                }
            }
            new
        } else {
            // re-read of this consumer's own pending entries above the id
            let from = StreamId::parse(raw_id, 0)?;
            let group = stream.groups.get(&group_name).unwrap();
            let ids: Vec<StreamId> = group
                .pending_for(&consumer_name)
                .map(|(id, _)| *id)
                .filter(|id| *id > from)
                .collect();
            ids.into_iter()
                .filter_map(|id| stream.get(&id).map(|f| (id, f.clone())))
                .collect()
        };
        if !entries.is_empty() {
            delivered_any = true;
        }
        sections.push(Reply::Array(vec![
            Reply::bulk(key.clone()),
            Reply::Array(entries.into_iter().map(encode_stream_entry).collect()),
        ]));
        db.notify_mutation(key);
    }
    if !delivered_any && tail[n..].iter().all(|id| id == b">") {
        return Ok(Reply::NullArray.into());
    }
    Ok(Reply::Array(sections).into())
}

pub fn cmd_xack(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut ids = Vec::with_capacity(argv.len() - 3);
    for raw in &argv[3..] {
        ids.push(StreamId::parse(raw, 0)?);
    }
    let mut db = ctx.db();
    let stream = match stream_mut(&mut db, &argv[1])? {
        Some(s) => s,
        None => return Ok(Reply::Int(0).into()),
    };
    let group = match stream.groups.get_mut(&argv[2]) {
        Some(g) => g,
        None => return Ok(Reply::Int(0).into()),
    };
    let mut acked = 0;
    for id in ids {
        if group.pending.remove(&id).is_some() {
            acked += 1;
        }
    }
    Ok(Reply::Int(acked).into())
}

pub fn cmd_xpending(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    let stream = require_stream(&mut db, &argv[1], &argv[2])?;
    let group = stream.groups.get(&argv[2]).unwrap();
    if argv.len() == 3 {
        // summary form
        let count = group.pending.len() as i64;
        if count == 0 {
            return Ok(Reply::Array(vec![
                Reply::Int(0),
                Reply::Null,
                Reply::Null,
                Reply::NullArray,
            ])
            .into());
        }
        let min = *group.pending.keys().next().unwrap();
        let max = *group.pending.keys().next_back().unwrap();
        let mut per_consumer: Vec<(Vec<u8>, u64)> = Vec::new();
        for entry in group.pending.values() {
            match per_consumer.iter_mut().find(|(c, _)| c == &entry.consumer) {
                Some((_, n)) => *n += 1,
                None => per_consumer.push((entry.consumer.clone(), 1)),
            }
        }
        per_consumer.sort();
        return Ok(Reply::Array(vec![
            Reply::Int(count),
            Reply::bulk(min.to_string()),
            Reply::bulk(max.to_string()),
            Reply::Array(
                per_consumer
                    .into_iter()
                    .map(|(c, n)| Reply::Array(vec![Reply::Bulk(c), Reply::bulk(n.to_string())]))
                    .collect(),
            ),
        ])
        .into());
    }
    // extended form: [IDLE ms] start end count [consumer]
    let mut cur = ArgCursor::new(argv);
    cur.next_bytes()?; // key
    cur.next_bytes()?; // group
    let min_idle = if cur.match_token("idle") { cur.next_int()?.max(0) as u64 } else { 0 };
    let (start, start_ex) = StreamId::parse_range_item(cur.next_bytes()?, false)?;
    let (end, end_ex) = StreamId::parse_range_item(cur.next_bytes()?, true)?;
    let count = cur.next_int()?.max(0) as usize;
    let consumer: Option<Vec<u8>> = if cur.done() { None } else { Some(cur.next_owned()?) };
    if !cur.done() {
        return Err(CmdError::Syntax);
    }
    let now = now_ms();
    if start_ex && start == StreamId::MAX {
        return Ok(Reply::Array(Vec::new()).into());
    }
    let lo = if start_ex { start.next() } else { start };
    if lo > end {
        return Ok(Reply::Array(Vec::new()).into());
    }
    let mut out = Vec::new();
    for (id, entry) in group.pending.range(lo..=end) {
        if end_ex && *id == end {
            continue;
        }
        let idle = now.saturating_sub(entry.delivery_time);
        if idle < min_idle {
            continue;
        }
        if let Some(c) = &consumer {
            if &entry.consumer != c {
                continue;
            }
        }
        out.push(Reply::Array(vec![
            Reply::bulk(id.to_string()),
            Reply::Bulk(entry.consumer.clone()),
            Reply::Int(idle as i64),
            Reply::Int(entry.delivery_count as i64),
        ]));
        if out.len() >= count {
            break;
        }
    }
    Ok(Reply::Array(out).into())
}

pub fn cmd_xclaim(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let group_name = cur.next_owned()?;
    let consumer_name = cur.next_owned()?;
    let min_idle = cur.next_int()?.max(0) as u64;
    let mut ids = Vec::new();
    while let Some(peeked) = cur.peek() {
        match StreamId::parse(peeked, 0) {
            Ok(id) => {
                ids.push(id);
                cur.next_bytes()?;
            }
            Err(_) => break,
        }
    }
    if ids.is_empty() {
        return Err(CmdError::StreamIdInvalid);
    }
    let mut force = false;
    let mut justid = false;
    let mut set_idle: Option<u64> = None;
    let mut set_time: Option<u64> = None;
    let mut set_retry: Option<u64> = None;
    while !cur.done() {
        if cur.match_token("force") {
            force = true;
        } else if cur.match_token("justid") {
            justid = true;
        } else if cur.match_token("idle") {
            set_idle = Some(cur.next_int()?.max(0) as u64);
        } else if cur.match_token("time") {
            set_time = Some(cur.next_int()?.max(0) as u64);
        } else if cur.match_token("retrycount") {
            set_retry = Some(cur.next_int()?.max(0) as u64);
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let now = now_ms();
    let mut db = ctx.db();
    let stream = require_stream(&mut db, &key, &group_name)?;
    let mut claimed: Vec<(StreamId, Option<Vec<(Vec<u8>, Vec<u8>)>>)> = Vec::new();
    for id in ids {
        let exists_in_stream = stream.get(&id).is_some();
        let entry = stream.groups.get(&group_name).unwrap().pending.get(&id).cloned();
        let eligible = match &entry {
            Some(p) => now.saturating_sub(p.delivery_time) >= min_idle,
            None => force && exists_in_stream,
        };
        if !eligible {
            continue;
        }
        // a pending entry whose stream entry was deleted is discarded
        if !exists_in_stream {
            stream.groups.get_mut(&group_name).unwrap().pending.remove(&id);
            continue;
        }
        let delivery_time = match (set_time, set_idle) {
            (Some(t), _) => t,
            (None, Some(idle)) => now.saturating_sub(idle),
            (None, None) => now,
        };
        let delivery_count = set_retry.unwrap_or_else(|| {
            entry.as_ref().map(|p| p.delivery_count + if justid { 0 } else { 1 }).unwrap_or(1)
        });
        let group = stream.groups.get_mut(&group_name).unwrap();
        group.pending.insert(
            id,
            PendingEntry {
                consumer: consumer_name.clone(),
                delivery_time,
                delivery_count,
            },
        );
        group
            .consumers
            .entry(consumer_name.clone())
            .or_insert_with(|| Consumer { seen_time: now })
            .seen_time = now;
        claimed.push((id, stream.get(&id).cloned()));
    }
    db.notify_mutation(&key);
    let reply = if justid {
        Reply::Array(claimed.into_iter().map(|(id, _)| Reply::bulk(id.to_string())).collect())
    } else {
        Reply::Array(
            claimed
                .into_iter()
                .filter_map(|(id, fields)| fields.map(|f| encode_stream_entry((id, f))))
                .collect(),
        )
    };
    Ok(reply.into())
}

/// XAUTOCLAIM: scan pending in id order from `start`, claiming idle
/// entries. Ties on idle time resolve to the smaller id by construction.
pub fn cmd_xautoclaim(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    let key = cur.next_owned()?;
    let group_name = cur.next_owned()?;
    let consumer_name = cur.next_owned()?;
    let min_idle = cur.next_int()?.max(0) as u64;
    let (start, start_ex) = StreamId::parse_range_item(cur.next_bytes()?, false)?;
    let mut count = 100usize;
    let mut justid = false;
    while !cur.done() {
        if cur.match_token("count") {
            let n = cur.next_int()?;
            if n <= 0 {
                return Err(CmdError::custom("ERR COUNT must be > 0"));
            }
            count = n as usize;
        } else if cur.match_token("justid") {
            justid = true;
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let now = now_ms();
    let mut db = ctx.db();
    let stream = require_stream(&mut db, &key, &group_name)?;
    let lo = if start_ex && start != StreamId::MAX { start.next() } else { start };
    let scan: Vec<StreamId> = stream
        .groups
        .get(&group_name)
        .unwrap()
        .pending
        .range(lo..)
        .map(|(id, _)| *id)
        .collect();
    let mut claimed: Vec<(StreamId, Option<Vec<(Vec<u8>, Vec<u8>)>>)> = Vec::new();
    let mut deleted: Vec<StreamId> = Vec::new();
    let mut next_cursor = StreamId::MIN;
    for id in scan {
        if claimed.len() >= count {
            next_cursor = id;
            break;
        }
        let group = stream.groups.get(&group_name).unwrap();
        let entry = group.pending.get(&id).cloned().unwrap();
        if now.saturating_sub(entry.delivery_time) < min_idle {
            continue;
        }
        if stream.get(&id).is_none() {
            stream.groups.get_mut(&group_name).unwrap().pending.remove(&id);
            deleted.push(id);
            continue;
        }
        let group = stream.groups.get_mut(&group_name).unwrap();
        group.pending.insert(
            id,
            PendingEntry {
                consumer: consumer_name.clone(),
                delivery_time: now,
                delivery_count: entry.delivery_count + if justid { 0 } else { 1 },
            },
        );
        group
            .consumers
            .entry(consumer_name.clone())
            .or_insert_with(|| Consumer { seen_time: now })
            .seen_time = now;
        claimed.push((id, stream.get(&id).cloned()));
    }
    db.notify_mutation(&key);
    let entries = if justid {
        Reply::Array(claimed.into_iter().map(|(id, _)| Reply::bulk(id.to_string())).collect())
    } else {
        Reply::Array(
            claimed
                .into_iter()
                .filter_map(|(id, fields)| fields.map(|f| encode_stream_entry((id, f))))
                .collect(),
        )
    };
    Ok(Reply::Array(vec![
        Reply::bulk(next_cursor.to_string()),
        entries,
        Reply::Array(deleted.into_iter().map(|id| Reply::bulk(id.to_string())).collect()),
    ])
    .into())
}

pub fn cmd_xinfo(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let sub = lower(&argv[1]);
    let mut db = ctx.db();
    match sub.as_str() {
        "stream" => {
            let stream = read_stream(&mut db, &argv[2])?.ok_or(CmdError::NoSuchKey)?;
            let first = stream
                .range(StreamId::MIN, false, StreamId::MAX, false, 1, false)
                .into_iter()
                .next();
            let last = stream
                .range(StreamId::MIN, false, StreamId::MAX, false, 1, true)
                .into_iter()
                .next();
            Ok(Reply::Map(vec![
                (Reply::bulk("length"), Reply::Int(stream.len() as i64)),
                (Reply::bulk("last-generated-id"), Reply::bulk(stream.last_id.to_string())),
                (
                    Reply::bulk("max-deleted-entry-id"),
                    Reply::bulk(stream.max_deleted_id.to_string()),
                ),
                (Reply::bulk("entries-added"), Reply::Int(stream.entries_added as i64)),
                (Reply::bulk("groups"), Reply::Int(stream.groups.len() as i64)),
                (
                    Reply::bulk("first-entry"),
                    first.map(encode_stream_entry).unwrap_or(Reply::Null),
                ),
                (
                    Reply::bulk("last-entry"),
                    last.map(encode_stream_entry).unwrap_or(Reply::Null),
                ),
            ])
            .into())
        }
        "groups" => {
            let stream = read_stream(&mut db, &argv[2])?.ok_or(CmdError::NoSuchKey)?;
            let mut names: Vec<&Vec<u8>> = stream.groups.keys().collect();
            names.sort();
            let groups: Vec<Reply> = names
                .into_iter()
                .map(|name| {
                    let g = &stream.groups[name];
                    Reply::Map(vec![
                        (Reply::bulk("name"), Reply::Bulk(name.clone())),
                        (Reply::bulk("consumers"), Reply::Int(g.consumers.len() as i64)),
                        (Reply::bulk("pending"), Reply::Int(g.pending.len() as i64)),
                        (
                            Reply::bulk("last-delivered-id"),
                            Reply::bulk(g.last_delivered.to_string()),
                        ),
                    ])
                })
                .collect();
            Ok(Reply::Array(groups).into())
        }
        "consumers" => {
            if argv.len() < 4 {
                return Err(CmdError::WrongArity("xinfo".into()));
            }
            let now = now_ms();
            let stream = require_stream(&mut db, &argv[2], &argv[3])?;
            let group = stream.groups.get(&argv[3]).unwrap();
            let mut names: Vec<Vec<u8>> = group.consumers.keys().cloned().collect();
            names.sort();
            let consumers: Vec<Reply> = names
                .into_iter()
                .map(|name| {
                    let c = &group.consumers[&name];
                    let pending = group.pending_for(&name).count();
                    Reply::Map(vec![
                        (Reply::bulk("name"), Reply::Bulk(name.clone())),
                        (Reply::bulk("pending"), Reply::Int(pending as i64)),
                        (
                            Reply::bulk("idle"),
                            Reply::Int(now.saturating_sub(c.seen_time) as i64),
                        ),
                    ])
                })
                .collect();
            Ok(Reply::Array(consumers).into())
        }
        other => Err(CmdError::custom(format!(
            "ERR Unknown XINFO subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}
