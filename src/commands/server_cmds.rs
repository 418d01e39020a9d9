/*!
 * Server administration commands: CONFIG, INFO, the FLUSH family, DEBUG,
 * SHUTDOWN and the ACL surface.
 */

use crate::acl::{category, genpass, AclUser};
use crate::commands::{lower, Ctx, Outcome};
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::storage::now_ms;
use std::sync::atomic::Ordering;

pub fn cmd_config(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    match lower(&argv[1]).as_str() {
        "get" => {
            if argv.len() < 3 {
                return Err(CmdError::WrongArity("config|get".into()));
            }
            let mut pairs: Vec<(String, String)> = Vec::new();
            for pattern in &argv[2..] {
                for (k, v) in ctx.server.config.get_matching(pattern) {
                    if !pairs.iter().any(|(seen, _)| seen == &k) {
                        pairs.push((k, v));
                    }
                }
            }
            pairs.sort();
            Ok(Reply::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (Reply::bulk(k), Reply::bulk(v)))
                    .collect(),
            )
            .into())
        }
        "set" => {
            if argv.len() < 4 || (argv.len() - 2) % 2 != 0 {
                return Err(CmdError::WrongArity("config|set".into()));
            }
            for pair in argv[2..].chunks(2) {
                let name = String::from_utf8_lossy(&pair[0]).to_string();
                let value = String::from_utf8_lossy(&pair[1]).to_string();
                ctx.server.config.set(&name, &value)?;
                if name.eq_ignore_ascii_case("requirepass") {
                    ctx.server
                        .acl
                        .write()
                        .sync_requirepass(ctx.server.config.requirepass().as_deref());
                }
            }
            Ok(Reply::ok().into())
        }
        "resetstat" => {
            let stats = &ctx.server.stats;
            stats.commands_processed.store(0, Ordering::Relaxed);
            stats.connections_received.store(0, Ordering::Relaxed);
            stats.expired_keys.store(0, Ordering::Relaxed);
            stats.keyspace_hits.store(0, Ordering::Relaxed);
            stats.keyspace_misses.store(0, Ordering::Relaxed);
            stats.pubsub_messages.store(0, Ordering::Relaxed);
            Ok(Reply::ok().into())
        }
        other => Err(CmdError::custom(format!(
            "ERR Unknown CONFIG subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}

pub fn cmd_info(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let wanted: Vec<String> = argv[1..].iter().map(|s| lower(s)).collect();
    let want = |section: &str| wanted.is_empty() || wanted.iter().any(|w| w == section || w == "all" || w == "everything" || w == "default");
    let mut out = String::new();
    if want("server") {
        out.push_str("# Server\r\n");
        out.push_str("server_name:cindr\r\n");
        out.push_str(&format!("cindr_version:{}\r\n", env!("CARGO_PKG_VERSION")));
        out.push_str("redis_version:7.2.0\r\n");
        out.push_str("redis_mode:standalone\r\n");
        out.push_str(&format!("run_id:{:016x}\r\n", ctx.server.start_ms));
        out.push_str(&format!(
            "uptime_in_seconds:{}\r\n",
            (now_ms().saturating_sub(ctx.server.start_ms)) / 1000
        ));
        out.push_str("\r\n");
    }
    if want("clients") {
        let blocked = ctx
            .server
            .clients
            .iter()
            .filter(|c| c.info.lock().blocked)
            .count();
        out.push_str("# Clients\r\n");
        out.push_str(&format!("connected_clients:{}\r\n", ctx.server.clients.len()));
        out.push_str(&format!("blocked_clients:{}\r\n", blocked));
        out.push_str("\r\n");
    }
    if want("memory") {
        // coarse object-count estimate, not an allocator measurement
        let mut keys = 0usize;
        for db in &ctx.server.dbs {
            keys += db.write().len();
        }
        out.push_str("# Memory\r\n");
        out.push_str(&format!("used_memory:{}\r\n", keys * 128));
        out.push_str(&format!("maxmemory:{}\r\n", ctx.server.config.int("maxmemory")));
        out.push_str(&format!(
            "maxmemory_policy:{}\r\n",
            ctx.server.config.get("maxmemory-policy").unwrap_or_default()
        ));
        out.push_str("\r\n");
    }
    if want("stats") {
        let s = &ctx.server.stats;
        out.push_str("# Stats\r\n");
        out.push_str(&format!(
            "total_connections_received:{}\r\n",
            s.connections_received.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "total_commands_processed:{}\r\n",
            s.commands_processed.load(Ordering::Relaxed)
        ));
        out.push_str(&format!("expired_keys:{}\r\n", s.expired_keys.load(Ordering::Relaxed)));
        out.push_str(&format!("keyspace_hits:{}\r\n", s.keyspace_hits.load(Ordering::Relaxed)));
        out.push_str(&format!(
            "keyspace_misses:{}\r\n",
            s.keyspace_misses.load(Ordering::Relaxed)
        ));
        out.push_str("\r\n");
    }
    if want("replication") {
        out.push_str("# Replication\r\n");
        out.push_str("role:master\r\n");
        out.push_str("connected_slaves:0\r\n");
        out.push_str("\r\n");
    }
    if want("keyspace") {
        out.push_str("# Keyspace\r\n");
        for (i, db) in ctx.server.dbs.iter().enumerate() {
            let mut guard = db.write();
            let keys = guard.len();
            if keys > 0 {
                out.push_str(&format!("db{}:keys={},expires=0,avg_ttl=0\r\n", i, keys));
            }
        }
        out.push_str("\r\n");
    }
    Ok(Reply::Verbatim("txt", out).into())
}

pub fn cmd_dbsize(ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let mut db = ctx.db();
    Ok(Reply::Int(db.len() as i64).into())
}

fn parse_flush_mode(argv: &[Vec<u8>]) -> Result<(), CmdError> {
    match argv.get(1) {
        None => Ok(()),
        Some(b) if b.eq_ignore_ascii_case(b"async") || b.eq_ignore_ascii_case(b"sync") => Ok(()),
        Some(_) => Err(CmdError::Syntax),
    }
}

pub fn cmd_flushdb(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    parse_flush_mode(argv)?;
    ctx.db().flush();
    Ok(Reply::ok().into())
}

pub fn cmd_flushall(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    parse_flush_mode(argv)?;
    for db in &ctx.server.dbs {
        db.write().flush();
    }
    Ok(Reply::ok().into())
}

pub fn cmd_time(_ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(Reply::Array(vec![
        Reply::bulk(now.as_secs().to_string()),
        Reply::bulk(now.subsec_micros().to_string()),
    ])
    .into())
}

pub fn cmd_debug(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    match lower(&argv[1]).as_str() {
        "sleep" => {
            let secs = argv
                .get(2)
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or(CmdError::Syntax)?;
            std::thread::sleep(std::time::Duration::from_secs_f64(secs.clamp(0.0, 60.0)));
            Ok(Reply::ok().into())
        }
        "set-active-expire" | "jmap" | "quicklist-packed-threshold" | "stringmatch-len" => {
            let _ = ctx;
            Ok(Reply::ok().into())
        }
        other => Err(CmdError::custom(format!(
            "ERR DEBUG subcommand '{}' not supported",
            other
        ))),
    }
}

pub fn cmd_shutdown(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    match argv.get(1) {
        None => {}
        Some(b) if b.eq_ignore_ascii_case(b"nosave") || b.eq_ignore_ascii_case(b"save") => {}
        Some(_) => return Err(CmdError::Syntax),
    }
    ctx.server.shutdown.store(true, Ordering::SeqCst);
    ctx.session.close_after_reply = true;
    Ok(Outcome::NoReply)
}

pub fn cmd_lolwut(_ctx: &mut Ctx, _argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    Ok(Reply::Bulk(format!("cindr {} :)\n", env!("CARGO_PKG_VERSION")).into_bytes()).into())
}

pub fn cmd_acl(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Result<Outcome, CmdError> {
    match lower(&argv[1]).as_str() {
        "whoami" => Ok(Reply::bulk(ctx.session.user.clone()).into()),
        "list" => {
            let acl = ctx.server.acl.read();
            let mut lines: Vec<String> = acl
                .iter()
                .map(|u| format!("user {} {}", u.name, u.describe()))
                .collect();
            lines.sort();
            Ok(Reply::bulk_array(lines.into_iter().map(String::into_bytes)).into())
        }
        "users" => {
            let acl = ctx.server.acl.read();
            Ok(Reply::bulk_array(acl.names()).into())
        }
        "cat" => match argv.get(2) {
            None => Ok(Reply::bulk_array(
                category::NAMES.iter().map(|(n, _)| n.as_bytes().to_vec()),
            )
            .into()),
            Some(name) => {
                let name = lower(name);
                let bit = category::bit(&name).ok_or_else(|| {
                    CmdError::custom(format!("ERR Unknown ACL cat '{}'", name))
                })?;
                let cmds: Vec<Vec<u8>> = crate::commands::COMMANDS
                    .iter()
                    .filter(|s| s.categories & bit != 0)
                    .map(|s| s.name.as_bytes().to_vec())
                    .collect();
                Ok(Reply::bulk_array(cmds).into())
            }
        },
        "getuser" => {
            let name = String::from_utf8_lossy(argv.get(2).ok_or(CmdError::Syntax)?).to_string();
            let acl = ctx.server.acl.read();
            match acl.user(&name) {
                Some(u) => Ok(Reply::Map(vec![
                    (
                        Reply::bulk("flags"),
                        Reply::Array(vec![Reply::bulk(if u.enabled { "on" } else { "off" })]),
                    ),
                    (Reply::bulk("rules"), Reply::bulk(u.describe())),
                ])
                .into()),
                None => Ok(Reply::NullArray.into()),
            }
        }
        "setuser" => {
            let name = String::from_utf8_lossy(argv.get(2).ok_or(CmdError::Syntax)?).to_string();
            let mut acl = ctx.server.acl.write();
            // validate against a scratch copy so a bad rule leaves the user
            // untouched
            let mut scratch = acl.user(&name).cloned().unwrap_or_else(|| AclUser::new(&name));
            for rule in &argv[3..] {
                scratch.apply_rule(&String::from_utf8_lossy(rule))?;
            }
            *acl.upsert(&name) = scratch;
            Ok(Reply::ok().into())
        }
        "deluser" => {
            let mut acl = ctx.server.acl.write();
            let mut removed = 0;
            for name in &argv[2..] {
                if acl.remove(&String::from_utf8_lossy(name))? {
                    removed += 1;
                }
            }
            Ok(Reply::Int(removed).into())
        }
        "genpass" => {
            let bits = match argv.get(2) {
                Some(b) => {
                    let n = crate::commands::parse_int(b)?;
                    if !(1..=4096).contains(&n) {
                        return Err(CmdError::custom(
                            "ERR ACL GENPASS argument must be the number of bits for the output password, a positive number up to 4096",
                        ));
                    }
                    n as usize
                }
                None => 256,
            };
            let mut rng = rand::thread_rng();
            Ok(Reply::bulk(genpass(bits, &mut rng)).into())
        }
        other => Err(CmdError::custom(format!(
            "ERR Unknown ACL subcommand or wrong number of arguments for '{}'",
            other
        ))),
    }
}
