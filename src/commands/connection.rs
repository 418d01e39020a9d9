/*!
 * Connection-level commands: handshake, authentication, database
 * selection, CLIENT introspection and control, COMMAND metadata.
 */

use crate::commands::{flag, lower, parse_int, ArgCursor, Ctx, KeySpec, Outcome};
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::session::ReplyMode;
use crate::storage::now_ms;

pub fn cmd_ping(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    // subscriber-mode RESP2 gets the array form
    if ctx.session.in_subscriber_mode() {
        let msg = argv.get(1).cloned().unwrap_or_default();
        return Ok(Reply::Array(vec![Reply::bulk("pong"), Reply::Bulk(msg)]).into());
    }
    Ok(match argv.get(1) {
        Some(msg) => Reply::Bulk(msg.clone()),
        None => Reply::simple("PONG"),
    }
    .into())
}

pub fn cmd_echo(_ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    Ok(Reply::Bulk(argv[1].clone()).into())
}

pub fn cmd_select(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let index = parse_int(&argv[1])?;
    if index < 0 || index as usize >= ctx.server.db_count() {
        return Err(CmdError::OutOfRange("DB index is out of range"));
    }
    ctx.session.db_index = index as usize;
    Ok(Reply::ok().into())
}

pub fn cmd_swapdb(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let a = parse_int(&argv[1])?;
    let b = parse_int(&argv[2])?;
    let count = ctx.server.db_count() as i64;
    if a < 0 || a >= count || b < 0 || b >= count {
        return Err(CmdError::OutOfRange("DB index is out of range"));
    }
    if a != b {
        let (lo, hi) = if a < b { (a as usize, b as usize) } else { (b as usize, a as usize) };
        let mut first = ctx.server.dbs[lo].write();
        let mut second = ctx.server.dbs[hi].write();
        std::mem::swap(&mut *first, &mut *second);
    }
    Ok(Reply::ok().into())
}

pub fn cmd_auth(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let (username, password) = if argv.len() == 3 {
        (String::from_utf8_lossy(&argv[1]).to_string(), argv[2].clone())
    } else {
        ("default".to_string(), argv[1].clone())
    };
    if argv.len() == 2 && ctx.server.config.requirepass().is_none() {
        return Err(CmdError::custom(
            "ERR Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?",
        ));
    }
    let acl = ctx.server.acl.read();
    acl.authenticate(&username, &password)?;
    drop(acl);
    ctx.session.user = username;
    ctx.session.authenticated = true;
    Ok(Reply::ok().into())
}

pub fn cmd_hello(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut cur = ArgCursor::new(argv);
    if !cur.done() {
        let ver = cur
            .next_int()
            .map_err(|_| CmdError::custom("NOPROTO unsupported protocol version"))?;
        if ver != 2 && ver != 3 {
            return Err(CmdError::custom("NOPROTO unsupported protocol version"));
        }
        let mut auth: Option<(Vec<u8>, Vec<u8>)> = None;
        let mut setname: Option<Vec<u8>> = None;
        while !cur.done() {
            if cur.match_token("auth") {
                auth = Some((cur.next_owned()?, cur.next_owned()?));
            } else if cur.match_token("setname") {
                setname = Some(cur.next_owned()?);
            } else {
                return Err(CmdError::Syntax);
            }
        }
        if let Some((user, pass)) = auth {
            let username = String::from_utf8_lossy(&user).to_string();
            ctx.server.acl.read().authenticate(&username, &pass)?;
            ctx.session.user = username;
            ctx.session.authenticated = true;
        }
        if !ctx.session.authenticated {
            return Err(CmdError::NoAuth);
        }
        if let Some(name) = setname {
            ctx.session.name = name;
        }
        ctx.session.protover = ver as u8;
    } else if !ctx.session.authenticated {
        return Err(CmdError::NoAuth);
    }
    let map = Reply::Map(vec![
        (Reply::bulk("server"), Reply::bulk("cindr")),
        (Reply::bulk("version"), Reply::bulk(env!("CARGO_PKG_VERSION"))),
        (Reply::bulk("proto"), Reply::Int(ctx.session.protover as i64)),
        (Reply::bulk("id"), Reply::Int(ctx.session.id as i64)),
        (Reply::bulk("mode"), Reply::bulk("standalone")),
        (Reply::bulk("role"), Reply::bulk("master")),
        (Reply::bulk("modules"), Reply::Array(Vec::new())),
    ]);
    Ok(map.into())
}

pub fn cmd_quit(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    ctx.session.close_after_reply = true;
    Ok(Reply::ok().into())
}

pub fn cmd_reset(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    // release watches and subscriptions before the state wipe
    super::txn::release_watches(ctx);
    let id = ctx.session.id;
    ctx.server.pubsub.lock().drop_client(id);
    ctx.session.channels.clear();
    ctx.session.patterns.clear();
    ctx.session.reset(ctx.server.auth_required());
    Ok(Reply::simple("RESET").into())
}

pub fn cmd_client(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let sub = lower(&argv[1]);
    match sub.as_str() {
        "id" => Ok(Reply::Int(ctx.session.id as i64).into()),
        "getname" => Ok(Reply::Bulk(ctx.session.name.clone()).into()),
        "setname" => {
            if argv.len() != 3 {
                return Err(CmdError::WrongArity("client|setname".into()));
            }
            if argv[2].iter().any(|&b| b == b' ' || b == b'\n') {
                return Err(CmdError::custom("ERR Client names cannot contain spaces, newlines or special characters."));
            }
            ctx.session.name = argv[2].clone();
            Ok(Reply::ok().into())
        }
        "list" => {
            let mut lines = String::new();
            let mut entries: Vec<(u64, String)> = ctx
                .server
                .clients
                .iter()
                .map(|entry| (entry.id, client_line(&entry)))
                .collect();
            entries.sort_by_key(|(id, _)| *id);
            for (_, line) in entries {
                lines.push_str(&line);
                lines.push('\n');
            }
            Ok(Reply::Bulk(lines.into_bytes()).into())
        }
        "info" => {
            let line = ctx
                .server
                .clients
                .get(&ctx.session.id)
                .map(|entry| client_line(&entry))
                .unwrap_or_default();
            Ok(Reply::Bulk(line.into_bytes()).into())
        }
        "kill" => cmd_client_kill(ctx, argv),
        "unblock" => {
            if argv.len() < 3 {
                return Err(CmdError::WrongArity("client|unblock".into()));
            }
            let id = parse_int(&argv[2])? as u64;
            let error = match argv.get(3) {
                None => false,
                Some(b) if b.eq_ignore_ascii_case(b"timeout") => false,
                Some(b) if b.eq_ignore_ascii_case(b"error") => true,
                Some(_) => return Err(CmdError::Syntax),
            };
            let unblocked = match ctx.server.clients.get(&id) {
                Some(client) if client.info.lock().blocked => {
                    *client.unblock.lock() = Some(error);
                    true
                }
                _ => false,
            };
            Ok(Reply::Int(unblocked as i64).into())
        }
        "reply" => {
            if argv.len() != 3 {
                return Err(CmdError::WrongArity("client|reply".into()));
            }
            if argv[2].eq_ignore_ascii_case(b"on") {
                ctx.session.reply_mode = ReplyMode::On;
                Ok(Reply::ok().into())
            } else if argv[2].eq_ignore_ascii_case(b"off") {
                ctx.session.reply_mode = ReplyMode::Off;
                Ok(Outcome::NoReply)
            } else if argv[2].eq_ignore_ascii_case(b"skip") {
                // skip the *next* command's reply; this one is silent too
                if ctx.session.reply_mode != ReplyMode::Off {
                    ctx.session.reply_mode = ReplyMode::Skip;
                }
                Ok(Outcome::NoReply)
            } else {
                Err(CmdError::Syntax)
            }
        }
        "no-evict" | "no-touch" => {
            if argv.len() != 3 {
                return Err(CmdError::WrongArity(format!("client|{}", sub)));
            }
            let on = if argv[2].eq_ignore_ascii_case(b"on") {
                true
            } else if argv[2].eq_ignore_ascii_case(b"off") {
                false
            } else {
                return Err(CmdError::Syntax);
            };
            if sub == "no-evict" {
                ctx.session.no_evict = on;
            } else {
                ctx.session.no_touch = on;
            }
            Ok(Reply::ok().into())
        }
        other => Err(CmdError::custom(format!(
            "ERR Unknown CLIENT subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}

fn client_line(client: &crate::server::ClientShared) -> String {
    let info = client.info.lock().clone();
    let age = (now_ms().saturating_sub(client.created_ms)) / 1000;
    format!(
        "id={} addr={} name={} age={} db={} sub={} psub={} multi={} resp={} cmd={} user={}",
        client.id,
        client.addr,
        info.name,
        age,
        info.db,
        info.sub,
        info.psub,
        if info.in_multi { 1 } else { 0 },
        info.resp.max(2),
        if info.last_command.is_empty() { "NULL" } else { &info.last_command },
        if info.user.is_empty() { "default" } else { &info.user },
    )
}

fn cmd_client_kill(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if argv.len() == 3 {
        // legacy form: CLIENT KILL addr:port
        let addr = String::from_utf8_lossy(&argv[2]).to_string();
        for entry in ctx.server.clients.iter() {
            if entry.addr == addr {
                entry.kill.store(true, std::sync::atomic::Ordering::Relaxed);
                return Ok(Reply::ok().into());
            }
        }
        return Err(CmdError::custom("ERR No such client address"));
    }
    let mut cur = ArgCursor::new(argv);
    cur.next_bytes()?; // KILL token
    let mut id_filter: Option<u64> = None;
    let mut addr_filter: Option<String> = None;
    let mut skipme = true;
    while !cur.done() {
        if cur.match_token("id") {
            id_filter = Some(cur.next_int()? as u64);
        } else if cur.match_token("addr") {
            addr_filter = Some(cur.next_str()?);
        } else if cur.match_token("skipme") {
            let v = cur.next_bytes()?;
            skipme = v.eq_ignore_ascii_case(b"yes");
        } else {
            return Err(CmdError::Syntax);
        }
    }
    let mut killed = 0;
    for entry in ctx.server.clients.iter() {
        if let Some(id) = id_filter {
            if entry.id != id {
                continue;
            }
        }
        if let Some(addr) = &addr_filter {
            if &entry.addr != addr {
                continue;
            }
        }
        if skipme && entry.id == ctx.session.id {
            continue;
        }
        entry.kill.store(true, std::sync::atomic::Ordering::Relaxed);
        killed += 1;
    }
    Ok(Reply::Int(killed).into())
}

pub fn cmd_command(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    if argv.len() == 1 {
        let entries: Vec<Reply> = crate::commands::COMMANDS.iter().map(command_info_entry).collect();
        return Ok(Reply::Array(entries).into());
    }
    match lower(&argv[1]).as_str() {
        "count" => Ok(Reply::Int(crate::commands::command_count() as i64).into()),
        "info" => {
            let entries: Vec<Reply> = argv[2..]
                .iter()
                .map(|name| match crate::commands::lookup(&lower(name)) {
                    Some(spec) => command_info_entry(spec),
                    None => Reply::NullArray,
                })
                .collect();
            Ok(Reply::Array(entries).into())
        }
        "docs" => {
            // minimal DOCS: clients mostly probe for existence
            let _ = ctx;
            Ok(Reply::Map(Vec::new()).into())
        }
        other => Err(CmdError::custom(format!(
            "ERR Unknown COMMAND subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}

fn command_info_entry(spec: &crate::commands::CommandSpec) -> Reply {
    let arity = match spec.arity {
        crate::commands::Arity::Exact(n) => n as i64,
        crate::commands::Arity::AtLeast(n) => -(n as i64),
        crate::commands::Arity::Range(lo, _) => -(lo as i64),
    };
    let mut flags = Vec::new();
    if spec.flags & flag::WRITE != 0 {
        flags.push(Reply::simple("write"));
    }
    if spec.flags & flag::READONLY != 0 {
        flags.push(Reply::simple("readonly"));
    }
    if spec.flags & flag::ADMIN != 0 {
        flags.push(Reply::simple("admin"));
    }
    if spec.flags & flag::PUBSUB != 0 {
        flags.push(Reply::simple("pubsub"));
    }
    if spec.flags & flag::FAST != 0 {
        flags.push(Reply::simple("fast"));
    }
    if spec.flags & flag::LOADING != 0 {
        flags.push(Reply::simple("loading"));
    }
    if spec.flags & flag::STALE != 0 {
        flags.push(Reply::simple("stale"));
    }
    if spec.flags & flag::MOVABLE != 0 {
        flags.push(Reply::simple("movablekeys"));
    }
    if spec.flags & flag::BLOCKING != 0 {
        flags.push(Reply::simple("blocking"));
    }
    let (first, last, step) = match spec.keys {
        KeySpec::None | KeySpec::Movable(_) => (0, 0, 0),
        KeySpec::Single => (1, 1, 1),
        KeySpec::All => (1, -1, 1),
        KeySpec::Step { first, last, step } => (first as i64, last, step as i64),
    };
    Reply::Array(vec![
        Reply::bulk(spec.name),
        Reply::Int(arity),
        Reply::Array(flags),
        Reply::Int(first),
        Reply::Int(last),
        Reply::Int(step),
    ])
}

/// With no replication there is nothing to wait for.
pub fn cmd_wait(_ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    parse_int(&argv[1])?;
    parse_int(&argv[2])?;
    Ok(Reply::Int(0).into())
}
