/*!
 * Command registry and executor.
 *
 * Every command is a static record: canonical name, arity rule, flag set,
 * ACL categories, key-position rule, and a handler. The executor runs the
 * fixed pipeline over a parsed request: lookup, arity, auth, subscriber
 * mode, ACL, transaction queueing, then the handler.
 */

pub mod connection;
pub mod hash;
pub mod keyspace;
pub mod list;
pub mod pubsub_cmds;
pub mod server_cmds;
pub mod set;
pub mod string;
pub mod stream;
pub mod txn;
pub mod zset;

use crate::acl::category as cat;
use crate::blocking::BlockedState;
use crate::errors::CmdError;
use crate::protocol::Reply;
use crate::server::{Server, Stats};
use crate::session::{Session, TxState};
use crate::storage::Db;
use parking_lot::RwLockWriteGuard;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::OnceLock;

pub mod flag {
    pub const WRITE: u32 = 1 << 0;
    pub const READONLY: u32 = 1 << 1;
    pub const ADMIN: u32 = 1 << 2;
    pub const PUBSUB: u32 = 1 << 3;
    pub const NOSCRIPT: u32 = 1 << 4;
    pub const LOADING: u32 = 1 << 5;
    pub const STALE: u32 = 1 << 6;
    pub const FAST: u32 = 1 << 7;
    pub const MOVABLE: u32 = 1 << 8;
    /// May run before authentication.
    pub const NOAUTH: u32 = 1 << 9;
    /// Bypasses MULTI queueing.
    pub const TXFREE: u32 = 1 << 10;
    pub const BLOCKING: u32 = 1 << 11;
}

/// Arity rule; counts include the command name itself.
#[derive(Debug, Clone, Copy)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, argc: usize) -> bool {
        match *self {
            Arity::Exact(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
            Arity::Range(lo, hi) => argc >= lo && argc <= hi,
        }
    }
}

/// Where the keys sit in the argument vector.
#[derive(Clone, Copy)]
pub enum KeySpec {
    None,
    /// argv[1].
    Single,
    /// argv[1..].
    All,
    /// first/last/step; negative last counts from the end.
    Step { first: usize, last: i64, step: usize },
    /// Callback for commands whose key positions depend on the arguments.
    Movable(fn(&[Vec<u8>]) -> Vec<usize>),
}

impl KeySpec {
    pub fn positions(&self, argv: &[Vec<u8>]) -> Vec<usize> {
        match *self {
            KeySpec::None => Vec::new(),
            KeySpec::Single => {
                if argv.len() > 1 {
                    vec![1]
                } else {
                    Vec::new()
                }
            }
            KeySpec::All => (1..argv.len()).collect(),
            KeySpec::Step { first, last, step } => {
                let last = if last < 0 {
                    (argv.len() as i64 + last) as usize
                } else {
                    last as usize
                };
                let mut out = Vec::new();
                let mut i = first;
                while i <= last && i < argv.len() {
                    out.push(i);
                    i += step;
                }
                out
            }
            KeySpec::Movable(f) => f(argv),
        }
    }
}

/// What a handler produced.
pub enum Outcome {
    Reply(Reply),
    /// Several frames in order (the SUBSCRIBE family).
    Multi(Vec<Reply>),
    /// Park the session on keys.
    Block(BlockedState),
    /// Nothing to send (CLIENT REPLY OFF, SHUTDOWN).
    NoReply,
}

impl From<Reply> for Outcome {
    fn from(r: Reply) -> Outcome {
        Outcome::Reply(r)
    }
}

pub type Handler = fn(&mut Ctx, &[Vec<u8>]) -> Result<Outcome, CmdError>;

pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub flags: u32,
    pub categories: u32,
    pub keys: KeySpec,
    pub handler: Handler,
}

/// Execution context handed to handlers: the shared server plus the calling
/// session.
pub struct Ctx<'a> {
    pub server: &'a Arc<Server>,
    pub session: &'a mut Session,
    /// True while running the body of an EXEC; blocking commands degrade to
    /// their non-blocking form.
    pub in_exec: bool,
}

impl<'a> Ctx<'a> {
    pub fn new(server: &'a Arc<Server>, session: &'a mut Session) -> Ctx<'a> {
        Ctx { server, session, in_exec: false }
    }

    /// The session's current database, write-locked for the operation. The
    /// guard borrows from the server, not from `self`, so session fields
    /// stay mutable while it is held.
    pub fn db(&self) -> RwLockWriteGuard<'a, Db> {
        self.server.dbs[self.session.db_index].write()
    }

    pub fn db_at(&self, index: usize) -> RwLockWriteGuard<'a, Db> {
        self.server.dbs[index].write()
    }

    pub fn may_block(&self) -> bool {
        !self.in_exec
    }

    /// Keyspace notification against the session's database.
    pub fn notify(&self, class: u32, event: &str, key: &[u8]) {
        self.server
            .notify_keyspace_event(self.session.db_index, class, event, key);
    }
}

//
// Argument grammar
//

/// Cursor over the argument vector, positioned after the command name.
/// Positional slots, case-insensitive tokens and optional groups are pulled
/// off it; grammar mismatches are syntax errors.
pub struct ArgCursor<'a> {
    argv: &'a [Vec<u8>],
    pos: usize,
}

impl<'a> ArgCursor<'a> {
    pub fn new(argv: &'a [Vec<u8>]) -> ArgCursor<'a> {
        ArgCursor { argv, pos: 1 }
    }

    pub fn done(&self) -> bool {
        self.pos >= self.argv.len()
    }

    pub fn remaining(&self) -> usize {
        self.argv.len().saturating_sub(self.pos)
    }

    pub fn next_bytes(&mut self) -> Result<&'a [u8], CmdError> {
        let v = self.argv.get(self.pos).ok_or(CmdError::Syntax)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn next_owned(&mut self) -> Result<Vec<u8>, CmdError> {
        self.next_bytes().map(|b| b.to_vec())
    }

    pub fn next_str(&mut self) -> Result<String, CmdError> {
        let b = self.next_bytes()?;
        String::from_utf8(b.to_vec()).map_err(|_| CmdError::Syntax)
    }

    pub fn next_int(&mut self) -> Result<i64, CmdError> {
        parse_int(self.next_bytes()?)
    }

    pub fn next_float(&mut self) -> Result<f64, CmdError> {
        parse_float(self.next_bytes()?)
    }

    pub fn peek(&self) -> Option<&'a [u8]> {
        self.argv.get(self.pos).map(|v| v.as_slice())
    }

    /// Consume the next argument when it equals `token` (ASCII
    /// case-insensitive).
    pub fn match_token(&mut self, token: &str) -> bool {
        match self.peek() {
            Some(next) if next.eq_ignore_ascii_case(token.as_bytes()) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    pub fn expect_token(&mut self, token: &str) -> Result<(), CmdError> {
        if self.match_token(token) {
            Ok(())
        } else {
            Err(CmdError::Syntax)
        }
    }

    /// Remaining arguments as owned byte strings.
    pub fn rest(&mut self) -> Vec<Vec<u8>> {
        let out = self.argv[self.pos..].iter().map(|v| v.to_vec()).collect();
        self.pos = self.argv.len();
        out
    }
}

pub fn parse_int(b: &[u8]) -> Result<i64, CmdError> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CmdError::NotAnInteger)
}

pub fn parse_float(b: &[u8]) -> Result<f64, CmdError> {
    let s = std::str::from_utf8(b).map_err(|_| CmdError::NotAFloat)?;
    let f = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        other => other.parse::<f64>().map_err(|_| CmdError::NotAFloat)?,
    };
    if f.is_nan() {
        return Err(CmdError::NotAFloat);
    }
    Ok(f)
}

/// Blocking-command timeout in seconds (float); 0 blocks forever. Returns
/// the absolute deadline.
pub fn parse_timeout(b: &[u8], now_ms: u64) -> Result<Option<u64>, CmdError> {
    let secs = std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or(CmdError::custom("ERR timeout is not a float or out of range"))?;
    if secs < 0.0 || secs.is_nan() {
        return Err(CmdError::custom("ERR timeout is negative"));
    }
    if secs == 0.0 {
        return Ok(None);
    }
    Ok(Some(now_ms + (secs * 1000.0) as u64))
}

pub fn lower(b: &[u8]) -> String {
    String::from_utf8_lossy(b).to_ascii_lowercase()
}

//
// Registry
//

macro_rules! spec {
    ($name:literal, $arity:expr, $flags:expr, $cats:expr, $keys:expr, $handler:path) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            flags: $flags,
            categories: $cats,
            keys: $keys,
            handler: $handler,
        }
    };
}

use flag::*;
use Arity::*;
use KeySpec::{All, Movable, None as NoKeys, Single, Step};

#[rustfmt::skip]
pub static COMMANDS: &[CommandSpec] = &[
    // connection
    spec!("ping", Range(1, 2), FAST | NOAUTH, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_ping),
    spec!("echo", Exact(2), FAST, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_echo),
    spec!("select", Exact(2), FAST | LOADING | STALE, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_select),
    spec!("swapdb", Exact(3), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST | cat::DANGEROUS, NoKeys, connection::cmd_swapdb),
    spec!("auth", Range(2, 3), FAST | NOAUTH | LOADING | STALE, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_auth),
    spec!("hello", AtLeast(1), FAST | NOAUTH | LOADING | STALE, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_hello),
    spec!("quit", Exact(1), FAST | NOAUTH, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_quit),
    spec!("reset", Exact(1), FAST | NOAUTH | TXFREE, cat::FAST | cat::CONNECTION, NoKeys, connection::cmd_reset),
    spec!("client", AtLeast(2), ADMIN, cat::CONNECTION | cat::SLOW, NoKeys, connection::cmd_client),
    spec!("command", AtLeast(1), LOADING | STALE, cat::SLOW | cat::CONNECTION, NoKeys, connection::cmd_command),
    spec!("wait", Exact(3), BLOCKING, cat::SLOW | cat::BLOCKING | cat::CONNECTION, NoKeys, connection::cmd_wait),
    // server
    spec!("config", AtLeast(2), ADMIN | LOADING | STALE, cat::ADMIN | cat::SLOW | cat::DANGEROUS, NoKeys, server_cmds::cmd_config),
    spec!("info", AtLeast(1), LOADING | STALE, cat::SLOW | cat::DANGEROUS, NoKeys, server_cmds::cmd_info),
    spec!("dbsize", Exact(1), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, NoKeys, server_cmds::cmd_dbsize),
    spec!("flushdb", Range(1, 2), WRITE, cat::KEYSPACE | cat::WRITE | cat::SLOW | cat::DANGEROUS, NoKeys, server_cmds::cmd_flushdb),
    spec!("flushall", Range(1, 2), WRITE, cat::KEYSPACE | cat::WRITE | cat::SLOW | cat::DANGEROUS, NoKeys, server_cmds::cmd_flushall),
    spec!("time", Exact(1), FAST | LOADING | STALE, cat::FAST, NoKeys, server_cmds::cmd_time),
    spec!("debug", AtLeast(2), ADMIN, cat::ADMIN | cat::SLOW | cat::DANGEROUS, NoKeys, server_cmds::cmd_debug),
    spec!("shutdown", Range(1, 2), ADMIN | LOADING | STALE, cat::ADMIN | cat::DANGEROUS, NoKeys, server_cmds::cmd_shutdown),
    spec!("acl", AtLeast(2), ADMIN | LOADING | STALE, cat::ADMIN | cat::SLOW | cat::DANGEROUS, NoKeys, server_cmds::cmd_acl),
    spec!("lolwut", AtLeast(1), READONLY | FAST, cat::READ | cat::FAST, NoKeys, server_cmds::cmd_lolwut),
    // keyspace
    spec!("del", AtLeast(2), WRITE, cat::KEYSPACE | cat::WRITE | cat::SLOW, All, keyspace::cmd_del),
    spec!("unlink", AtLeast(2), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, All, keyspace::cmd_del),
    spec!("exists", AtLeast(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, All, keyspace::cmd_exists),
    spec!("type", Exact(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, Single, keyspace::cmd_type),
    spec!("keys", Exact(2), READONLY, cat::KEYSPACE | cat::READ | cat::SLOW | cat::DANGEROUS, NoKeys, keyspace::cmd_keys),
    spec!("scan", AtLeast(2), READONLY, cat::KEYSPACE | cat::READ | cat::SLOW, NoKeys, keyspace::cmd_scan),
    spec!("rename", Exact(3), WRITE, cat::KEYSPACE | cat::WRITE | cat::SLOW, Step { first: 1, last: 2, step: 1 }, keyspace::cmd_rename),
    spec!("renamenx", Exact(3), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Step { first: 1, last: 2, step: 1 }, keyspace::cmd_renamenx),
    spec!("randomkey", Exact(1), READONLY, cat::KEYSPACE | cat::READ | cat::SLOW, NoKeys, keyspace::cmd_randomkey),
    spec!("touch", AtLeast(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, All, keyspace::cmd_touch),
    spec!("copy", AtLeast(3), WRITE, cat::KEYSPACE | cat::WRITE | cat::SLOW, Step { first: 1, last: 2, step: 1 }, keyspace::cmd_copy),
    spec!("move", Exact(3), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Single, keyspace::cmd_move),
    spec!("expire", Range(3, 4), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Single, keyspace::cmd_expire),
    spec!("pexpire", Range(3, 4), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Single, keyspace::cmd_expire),
    spec!("expireat", Range(3, 4), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Single, keyspace::cmd_expire),
    spec!("pexpireat", Range(3, 4), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Single, keyspace::cmd_expire),
    spec!("ttl", Exact(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, Single, keyspace::cmd_ttl),
    spec!("pttl", Exact(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, Single, keyspace::cmd_ttl),
    spec!("expiretime", Exact(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, Single, keyspace::cmd_expiretime),
    spec!("pexpiretime", Exact(2), READONLY | FAST, cat::KEYSPACE | cat::READ | cat::FAST, Single, keyspace::cmd_expiretime),
    spec!("persist", Exact(2), WRITE | FAST, cat::KEYSPACE | cat::WRITE | cat::FAST, Single, keyspace::cmd_persist),
    spec!("dump", Exact(2), READONLY, cat::KEYSPACE | cat::READ | cat::SLOW, Single, keyspace::cmd_dump),
    spec!("restore", AtLeast(4), WRITE, cat::KEYSPACE | cat::WRITE | cat::SLOW | cat::DANGEROUS, Single, keyspace::cmd_restore),
    // string
    spec!("get", Exact(2), READONLY | FAST, cat::READ | cat::STRING | cat::FAST, Single, string::cmd_get),
    spec!("set", AtLeast(3), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Single, string::cmd_set),
    spec!("setnx", Exact(3), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_setnx),
    spec!("setex", Exact(4), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Single, string::cmd_setex),
    spec!("psetex", Exact(4), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Single, string::cmd_setex),
    spec!("getset", Exact(3), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_getset),
    spec!("getdel", Exact(2), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_getdel),
    spec!("getex", AtLeast(2), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_getex),
    spec!("mget", AtLeast(2), READONLY | FAST, cat::READ | cat::STRING | cat::FAST, All, string::cmd_mget),
    spec!("mset", AtLeast(3), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Step { first: 1, last: -1, step: 2 }, string::cmd_mset),
    spec!("msetnx", AtLeast(3), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Step { first: 1, last: -1, step: 2 }, string::cmd_msetnx),
    spec!("append", Exact(3), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_append),
    spec!("strlen", Exact(2), READONLY | FAST, cat::READ | cat::STRING | cat::FAST, Single, string::cmd_strlen),
    spec!("incr", Exact(2), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_incr),
    spec!("decr", Exact(2), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_incr),
    spec!("incrby", Exact(3), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_incr),
    spec!("decrby", Exact(3), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_incr),
    spec!("incrbyfloat", Exact(3), WRITE | FAST, cat::WRITE | cat::STRING | cat::FAST, Single, string::cmd_incrbyfloat),
    spec!("getrange", Exact(4), READONLY, cat::READ | cat::STRING | cat::SLOW, Single, string::cmd_getrange),
    spec!("substr", Exact(4), READONLY, cat::READ | cat::STRING | cat::SLOW, Single, string::cmd_getrange),
    spec!("setrange", Exact(4), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Single, string::cmd_setrange),
    spec!("getbit", Exact(3), READONLY | FAST, cat::READ | cat::STRING | cat::FAST, Single, string::cmd_getbit),
    spec!("setbit", Exact(4), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Single, string::cmd_setbit),
    spec!("bitcount", AtLeast(2), READONLY, cat::READ | cat::STRING | cat::SLOW, Single, string::cmd_bitcount),
    spec!("bitpos", AtLeast(3), READONLY, cat::READ | cat::STRING | cat::SLOW, Single, string::cmd_bitpos),
    spec!("bitop", AtLeast(4), WRITE, cat::WRITE | cat::STRING | cat::SLOW, Step { first: 2, last: -1, step: 1 }, string::cmd_bitop),
    // list
    spec!("lpush", AtLeast(3), WRITE | FAST, cat::WRITE | cat::LIST | cat::FAST, Single, list::cmd_push),
    spec!("rpush", AtLeast(3), WRITE | FAST, cat::WRITE | cat::LIST | cat::FAST, Single, list::cmd_push),
    spec!("lpushx", AtLeast(3), WRITE | FAST, cat::WRITE | cat::LIST | cat::FAST, Single, list::cmd_push),
    spec!("rpushx", AtLeast(3), WRITE | FAST, cat::WRITE | cat::LIST | cat::FAST, Single, list::cmd_push),
    spec!("lpop", Range(2, 3), WRITE | FAST, cat::WRITE | cat::LIST | cat::FAST, Single, list::cmd_pop),
    spec!("rpop", Range(2, 3), WRITE | FAST, cat::WRITE | cat::LIST | cat::FAST, Single, list::cmd_pop),
    spec!("llen", Exact(2), READONLY | FAST, cat::READ | cat::LIST | cat::FAST, Single, list::cmd_llen),
    spec!("lrange", Exact(4), READONLY, cat::READ | cat::LIST | cat::SLOW, Single, list::cmd_lrange),
    spec!("lindex", Exact(3), READONLY, cat::READ | cat::LIST | cat::SLOW, Single, list::cmd_lindex),
    spec!("lset", Exact(4), WRITE, cat::WRITE | cat::LIST | cat::SLOW, Single, list::cmd_lset),
    spec!("linsert", Exact(5), WRITE, cat::WRITE | cat::LIST | cat::SLOW, Single, list::cmd_linsert),
    spec!("lrem", Exact(4), WRITE, cat::WRITE | cat::LIST | cat::SLOW, Single, list::cmd_lrem),
    spec!("ltrim", Exact(4), WRITE, cat::WRITE | cat::LIST | cat::SLOW, Single, list::cmd_ltrim),
    spec!("lpos", AtLeast(3), READONLY, cat::READ | cat::LIST | cat::SLOW, Single, list::cmd_lpos),
    spec!("rpoplpush", Exact(3), WRITE, cat::WRITE | cat::LIST | cat::SLOW, Step { first: 1, last: 2, step: 1 }, list::cmd_lmove),
    spec!("lmove", Exact(5), WRITE, cat::WRITE | cat::LIST | cat::SLOW, Step { first: 1, last: 2, step: 1 }, list::cmd_lmove),
    spec!("lmpop", AtLeast(4), WRITE | MOVABLE, cat::WRITE | cat::LIST | cat::SLOW, Movable(numkeys_at_1), list::cmd_lmpop),
    spec!("blpop", AtLeast(3), WRITE | BLOCKING, cat::WRITE | cat::LIST | cat::FAST | cat::BLOCKING, Step { first: 1, last: -2, step: 1 }, list::cmd_bpop),
    spec!("brpop", AtLeast(3), WRITE | BLOCKING, cat::WRITE | cat::LIST | cat::FAST | cat::BLOCKING, Step { first: 1, last: -2, step: 1 }, list::cmd_bpop),
    spec!("blmove", Exact(6), WRITE | BLOCKING, cat::WRITE | cat::LIST | cat::SLOW | cat::BLOCKING, Step { first: 1, last: 2, step: 1 }, list::cmd_blmove),
    spec!("brpoplpush", Exact(4), WRITE | BLOCKING, cat::WRITE | cat::LIST | cat::SLOW | cat::BLOCKING, Step { first: 1, last: 2, step: 1 }, list::cmd_blmove),
    spec!("blmpop", AtLeast(5), WRITE | BLOCKING | MOVABLE, cat::WRITE | cat::LIST | cat::SLOW | cat::BLOCKING, Movable(numkeys_at_2), list::cmd_blmpop),
    // hash
    spec!("hset", AtLeast(4), WRITE | FAST, cat::WRITE | cat::HASH | cat::FAST, Single, hash::cmd_hset),
    spec!("hmset", AtLeast(4), WRITE | FAST, cat::WRITE | cat::HASH | cat::FAST, Single, hash::cmd_hset),
    spec!("hsetnx", Exact(4), WRITE | FAST, cat::WRITE | cat::HASH | cat::FAST, Single, hash::cmd_hsetnx),
    spec!("hget", Exact(3), READONLY | FAST, cat::READ | cat::HASH | cat::FAST, Single, hash::cmd_hget),
    spec!("hmget", AtLeast(3), READONLY | FAST, cat::READ | cat::HASH | cat::FAST, Single, hash::cmd_hmget),
    spec!("hdel", AtLeast(3), WRITE | FAST, cat::WRITE | cat::HASH | cat::FAST, Single, hash::cmd_hdel),
    spec!("hlen", Exact(2), READONLY | FAST, cat::READ | cat::HASH | cat::FAST, Single, hash::cmd_hlen),
    spec!("hexists", Exact(3), READONLY | FAST, cat::READ | cat::HASH | cat::FAST, Single, hash::cmd_hexists),
    spec!("hkeys", Exact(2), READONLY, cat::READ | cat::HASH | cat::SLOW, Single, hash::cmd_hkeys),
    spec!("hvals", Exact(2), READONLY, cat::READ | cat::HASH | cat::SLOW, Single, hash::cmd_hvals),
    spec!("hgetall", Exact(2), READONLY, cat::READ | cat::HASH | cat::SLOW, Single, hash::cmd_hgetall),
    spec!("hincrby", Exact(4), WRITE | FAST, cat::WRITE | cat::HASH | cat::FAST, Single, hash::cmd_hincrby),
    spec!("hincrbyfloat", Exact(4), WRITE | FAST, cat::WRITE | cat::HASH | cat::FAST, Single, hash::cmd_hincrbyfloat),
    spec!("hstrlen", Exact(3), READONLY | FAST, cat::READ | cat::HASH | cat::FAST, Single, hash::cmd_hstrlen),
    spec!("hrandfield", Range(2, 4), READONLY, cat::READ | cat::HASH | cat::SLOW, Single, hash::cmd_hrandfield),
    spec!("hscan", AtLeast(3), READONLY, cat::READ | cat::HASH | cat::SLOW, Single, hash::cmd_hscan),
    // set
    spec!("sadd", AtLeast(3), WRITE | FAST, cat::WRITE | cat::SET | cat::FAST, Single, set::cmd_sadd),
    spec!("srem", AtLeast(3), WRITE | FAST, cat::WRITE | cat::SET | cat::FAST, Single, set::cmd_srem),
    spec!("smembers", Exact(2), READONLY, cat::READ | cat::SET | cat::SLOW, Single, set::cmd_smembers),
    spec!("sismember", Exact(3), READONLY | FAST, cat::READ | cat::SET | cat::FAST, Single, set::cmd_sismember),
    spec!("smismember", AtLeast(3), READONLY | FAST, cat::READ | cat::SET | cat::FAST, Single, set::cmd_smismember),
    spec!("scard", Exact(2), READONLY | FAST, cat::READ | cat::SET | cat::FAST, Single, set::cmd_scard),
    spec!("spop", Range(2, 3), WRITE | FAST, cat::WRITE | cat::SET | cat::FAST, Single, set::cmd_spop),
    spec!("srandmember", Range(2, 3), READONLY, cat::READ | cat::SET | cat::SLOW, Single, set::cmd_srandmember),
    spec!("smove", Exact(4), WRITE | FAST, cat::WRITE | cat::SET | cat::FAST, Step { first: 1, last: 2, step: 1 }, set::cmd_smove),
    spec!("sunion", AtLeast(2), READONLY, cat::READ | cat::SET | cat::SLOW, All, set::cmd_setop),
    spec!("sinter", AtLeast(2), READONLY, cat::READ | cat::SET | cat::SLOW, All, set::cmd_setop),
    spec!("sdiff", AtLeast(2), READONLY, cat::READ | cat::SET | cat::SLOW, All, set::cmd_setop),
    spec!("sunionstore", AtLeast(3), WRITE, cat::WRITE | cat::SET | cat::SLOW, All, set::cmd_setop_store),
    spec!("sinterstore", AtLeast(3), WRITE, cat::WRITE | cat::SET | cat::SLOW, All, set::cmd_setop_store),
    spec!("sdiffstore", AtLeast(3), WRITE, cat::WRITE | cat::SET | cat::SLOW, All, set::cmd_setop_store),
    spec!("sintercard", AtLeast(3), READONLY | MOVABLE, cat::READ | cat::SET | cat::SLOW, Movable(numkeys_at_1), set::cmd_sintercard),
    spec!("sscan", AtLeast(3), READONLY, cat::READ | cat::SET | cat::SLOW, Single, set::cmd_sscan),
    // sorted set
    spec!("zadd", AtLeast(4), WRITE | FAST, cat::WRITE | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zadd),
    spec!("zrem", AtLeast(3), WRITE | FAST, cat::WRITE | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zrem),
    spec!("zscore", Exact(3), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zscore),
    spec!("zmscore", AtLeast(3), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zmscore),
    spec!("zcard", Exact(2), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zcard),
    spec!("zcount", Exact(4), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zcount),
    spec!("zincrby", Exact(4), WRITE | FAST, cat::WRITE | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zincrby),
    spec!("zrank", Range(3, 4), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zrank),
    spec!("zrevrank", Range(3, 4), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zrank),
    spec!("zrange", AtLeast(4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrange),
    spec!("zrevrange", AtLeast(4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrevrange),
    spec!("zrangebyscore", AtLeast(4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrangebyscore),
    spec!("zrevrangebyscore", AtLeast(4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrangebyscore),
    spec!("zrangebylex", AtLeast(4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrangebylex),
    spec!("zrevrangebylex", AtLeast(4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrangebylex),
    spec!("zlexcount", Exact(4), READONLY | FAST, cat::READ | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zlexcount),
    spec!("zpopmin", Range(2, 3), WRITE | FAST, cat::WRITE | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zpop),
    spec!("zpopmax", Range(2, 3), WRITE | FAST, cat::WRITE | cat::SORTEDSET | cat::FAST, Single, zset::cmd_zpop),
    spec!("zrandmember", Range(2, 4), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zrandmember),
    spec!("zremrangebyrank", Exact(4), WRITE, cat::WRITE | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zremrange),
    spec!("zremrangebyscore", Exact(4), WRITE, cat::WRITE | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zremrange),
    spec!("zremrangebylex", Exact(4), WRITE, cat::WRITE | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zremrange),
    spec!("zunion", AtLeast(3), READONLY | MOVABLE, cat::READ | cat::SORTEDSET | cat::SLOW, Movable(numkeys_at_1), zset::cmd_zsetop),
    spec!("zinter", AtLeast(3), READONLY | MOVABLE, cat::READ | cat::SORTEDSET | cat::SLOW, Movable(numkeys_at_1), zset::cmd_zsetop),
    spec!("zdiff", AtLeast(3), READONLY | MOVABLE, cat::READ | cat::SORTEDSET | cat::SLOW, Movable(numkeys_at_1), zset::cmd_zsetop),
    spec!("zunionstore", AtLeast(4), WRITE | MOVABLE, cat::WRITE | cat::SORTEDSET | cat::SLOW, Movable(store_numkeys_at_2), zset::cmd_zsetop_store),
    spec!("zinterstore", AtLeast(4), WRITE | MOVABLE, cat::WRITE | cat::SORTEDSET | cat::SLOW, Movable(store_numkeys_at_2), zset::cmd_zsetop_store),
    spec!("zdiffstore", AtLeast(4), WRITE | MOVABLE, cat::WRITE | cat::SORTEDSET | cat::SLOW, Movable(store_numkeys_at_2), zset::cmd_zsetop_store),
    spec!("zscan", AtLeast(3), READONLY, cat::READ | cat::SORTEDSET | cat::SLOW, Single, zset::cmd_zscan),
    // stream
    spec!("xadd", AtLeast(5), WRITE | FAST, cat::WRITE | cat::STREAM | cat::FAST, Single, stream::cmd_xadd),
    spec!("xlen", Exact(2), READONLY | FAST, cat::READ | cat::STREAM | cat::FAST, Single, stream::cmd_xlen),
    spec!("xrange", AtLeast(4), READONLY, cat::READ | cat::STREAM | cat::SLOW, Single, stream::cmd_xrange),
    spec!("xrevrange", AtLeast(4), READONLY, cat::READ | cat::STREAM | cat::SLOW, Single, stream::cmd_xrange),
    spec!("xdel", AtLeast(3), WRITE | FAST, cat::WRITE | cat::STREAM | cat::FAST, Single, stream::cmd_xdel),
    spec!("xtrim", AtLeast(4), WRITE, cat::WRITE | cat::STREAM | cat::SLOW, Single, stream::cmd_xtrim),
    spec!("xsetid", AtLeast(3), WRITE | FAST, cat::WRITE | cat::STREAM | cat::FAST, Single, stream::cmd_xsetid),
    spec!("xread", AtLeast(4), READONLY | MOVABLE | BLOCKING, cat::READ | cat::STREAM | cat::SLOW | cat::BLOCKING, Movable(xread_keys), stream::cmd_xread),
    spec!("xgroup", AtLeast(2), WRITE, cat::WRITE | cat::STREAM | cat::SLOW, Movable(arg_at_2), stream::cmd_xgroup),
    spec!("xreadgroup", AtLeast(7), WRITE | MOVABLE, cat::WRITE | cat::STREAM | cat::SLOW, Movable(xread_keys), stream::cmd_xreadgroup),
    spec!("xack", AtLeast(4), WRITE | FAST, cat::WRITE | cat::STREAM | cat::FAST, Single, stream::cmd_xack),
    spec!("xpending", AtLeast(3), READONLY, cat::READ | cat::STREAM | cat::SLOW, Single, stream::cmd_xpending),
    spec!("xclaim", AtLeast(6), WRITE | FAST, cat::WRITE | cat::STREAM | cat::FAST, Single, stream::cmd_xclaim),
    spec!("xautoclaim", AtLeast(7), WRITE | FAST, cat::WRITE | cat::STREAM | cat::FAST, Single, stream::cmd_xautoclaim),
    spec!("xinfo", AtLeast(3), READONLY, cat::READ | cat::STREAM | cat::SLOW, Movable(arg_at_2), stream::cmd_xinfo),
    // pub/sub
    spec!("subscribe", AtLeast(2), PUBSUB | FAST | LOADING | STALE, cat::PUBSUB | cat::FAST, NoKeys, pubsub_cmds::cmd_subscribe),
    spec!("unsubscribe", AtLeast(1), PUBSUB | FAST | LOADING | STALE, cat::PUBSUB | cat::FAST, NoKeys, pubsub_cmds::cmd_unsubscribe),
    spec!("psubscribe", AtLeast(2), PUBSUB | FAST | LOADING | STALE, cat::PUBSUB | cat::FAST, NoKeys, pubsub_cmds::cmd_psubscribe),
    spec!("punsubscribe", AtLeast(1), PUBSUB | FAST | LOADING | STALE, cat::PUBSUB | cat::FAST, NoKeys, pubsub_cmds::cmd_punsubscribe),
    spec!("publish", Exact(3), PUBSUB | FAST | LOADING | STALE, cat::PUBSUB | cat::FAST, NoKeys, pubsub_cmds::cmd_publish),
    spec!("pubsub", AtLeast(2), PUBSUB | FAST | LOADING | STALE, cat::PUBSUB | cat::SLOW, NoKeys, pubsub_cmds::cmd_pubsub),
    // transactions
    spec!("multi", Exact(1), FAST | TXFREE, cat::FAST | cat::TRANSACTION, NoKeys, txn::cmd_multi),
    spec!("exec", Exact(1), TXFREE, cat::SLOW | cat::TRANSACTION, NoKeys, txn::cmd_exec),
    spec!("discard", Exact(1), FAST | TXFREE, cat::FAST | cat::TRANSACTION, NoKeys, txn::cmd_discard),
    spec!("watch", AtLeast(2), FAST | TXFREE, cat::FAST | cat::TRANSACTION, All, txn::cmd_watch),
    spec!("unwatch", Exact(1), FAST | TXFREE, cat::FAST | cat::TRANSACTION, NoKeys, txn::cmd_unwatch),
];

// movable-key callbacks

/// `CMD numkeys key...`: numkeys sits at argv[1].
fn numkeys_at_1(argv: &[Vec<u8>]) -> Vec<usize> {
    numkeys_keys(argv, 1)
}

/// `CMD timeout numkeys key...`: numkeys sits at argv[2].
fn numkeys_at_2(argv: &[Vec<u8>]) -> Vec<usize> {
    numkeys_keys(argv, 2)
}

/// `CMD dest numkeys key...`: numkeys sits at argv[2], dest is a key too.
fn store_numkeys_at_2(argv: &[Vec<u8>]) -> Vec<usize> {
    let mut out = vec![1];
    out.extend(numkeys_keys(argv, 2));
    out
}

fn numkeys_keys(argv: &[Vec<u8>], numkeys_pos: usize) -> Vec<usize> {
    let n = argv
        .get(numkeys_pos)
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);
    (numkeys_pos + 1..(numkeys_pos + 1 + n).min(argv.len())).collect()
}

/// XREAD/XREADGROUP: keys follow STREAMS, first half of the tail.
fn xread_keys(argv: &[Vec<u8>]) -> Vec<usize> {
    let streams = argv
        .iter()
        .position(|a| a.eq_ignore_ascii_case(b"streams"));
    match streams {
        Some(pos) => {
            let tail = argv.len() - pos - 1;
            (pos + 1..pos + 1 + tail / 2).collect()
        }
        None => Vec::new(),
    }
}

/// Container commands whose key (if any) is argv[2] (XGROUP, XINFO).
fn arg_at_2(argv: &[Vec<u8>]) -> Vec<usize> {
    if argv.len() > 2 {
        vec![2]
    } else {
        Vec::new()
    }
}

fn registry() -> &'static FxHashMap<&'static str, &'static CommandSpec> {
    static REGISTRY: OnceLock<FxHashMap<&'static str, &'static CommandSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m = FxHashMap::default();
        for spec in COMMANDS {
            m.insert(spec.name, spec);
        }
        m
    })
}

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    registry().get(name).copied()
}

pub fn command_count() -> usize {
    COMMANDS.len()
}

const SUBSCRIBER_ALLOWED: &[&str] = &[
    "subscribe",
    "unsubscribe",
    "psubscribe",
    "punsubscribe",
    "ping",
    "quit",
    "reset",
];

/// Full pipeline for one parsed request. Never fails: every error becomes an
/// error reply.
pub fn dispatch(ctx: &mut Ctx, argv: &[Vec<u8>]) -> Outcome {
    debug_assert!(!argv.is_empty());
    let name = lower(&argv[0]);
    ctx.session.last_command = name.clone();

    // a failure before execution while queueing poisons the transaction
    macro_rules! fail {
        ($err:expr) => {{
            if ctx.session.tx == TxState::Queueing {
                ctx.session.tx = TxState::DirtyExec;
            }
            return Outcome::Reply(Reply::from($err));
        }};
    }

    let spec = match lookup(&name) {
        Some(s) => s,
        None => fail!(CmdError::Unknown(name)),
    };
    if !spec.arity.accepts(argv.len()) {
        fail!(CmdError::WrongArity(name));
    }
    if !ctx.session.authenticated && spec.flags & flag::NOAUTH == 0 {
        fail!(CmdError::NoAuth);
    }
    if ctx.session.in_subscriber_mode() && !SUBSCRIBER_ALLOWED.contains(&name.as_str()) {
        fail!(CmdError::SubscriberMode(name));
    }
    if let Err(e) = acl_check(ctx, spec, argv, &name) {
        fail!(e);
    }
    if ctx.session.in_tx() && spec.flags & flag::TXFREE == 0 {
        if matches!(name.as_str(), "subscribe" | "unsubscribe" | "psubscribe" | "punsubscribe") {
            fail!(CmdError::custom(format!(
                "ERR {} is not allowed in transactions",
                name.to_uppercase()
            )));
        }
        ctx.session.queued.push(argv.to_vec());
        return Outcome::Reply(Reply::simple("QUEUED"));
    }

    Stats::bump(&ctx.server.stats.commands_processed);
    match (spec.handler)(ctx, argv) {
        Ok(Outcome::Block(b)) if ctx.in_exec => Outcome::Reply(b.timeout_reply()),
        Ok(outcome) => outcome,
        Err(e) => Outcome::Reply(e.into()),
    }
}

fn acl_check(ctx: &Ctx, spec: &CommandSpec, argv: &[Vec<u8>], name: &str) -> Result<(), CmdError> {
    let acl = ctx.server.acl.read();
    let user = match acl.user(&ctx.session.user) {
        Some(u) => u,
        None => return Err(CmdError::NoPerm("User disappeared from the ACL table".into())),
    };
    if !user.may_run(name, spec.categories) {
        return Err(CmdError::NoPerm(format!(
            "User {} has no permissions to run the '{}' command",
            user.name, name
        )));
    }
    for pos in spec.keys.positions(argv) {
        if !user.may_touch_key(&argv[pos]) {
            return Err(CmdError::NoPerm(
                "this user has no permissions to access one of the keys used as arguments".into(),
            ));
        }
    }
    let channel_positions: Vec<usize> = match name {
        "subscribe" | "psubscribe" => (1..argv.len()).collect(),
        "publish" => vec![1],
        _ => Vec::new(),
    };
    for pos in channel_positions {
        if !user.may_use_channel(&argv[pos]) {
            return Err(CmdError::NoPerm(
                "this user has no permissions to access one of the channels used as arguments"
                    .into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_consistent() {
        // unique names, lowercase, handlers wired
        let mut seen = std::collections::HashSet::new();
        for spec in COMMANDS {
            assert!(seen.insert(spec.name), "duplicate command {}", spec.name);
            assert_eq!(spec.name, spec.name.to_lowercase());
        }
        assert!(lookup("get").is_some());
        assert!(lookup("GET").is_none(), "lookup takes pre-lowered names");
    }

    #[test]
    fn key_positions() {
        let argv: Vec<Vec<u8>> = ["mset", "a", "1", "b", "2"].iter().map(|s| s.as_bytes().to_vec()).collect();
        let spec = lookup("mset").unwrap();
        assert_eq!(spec.keys.positions(&argv), vec![1, 3]);

        let argv: Vec<Vec<u8>> = ["blpop", "k1", "k2", "0"].iter().map(|s| s.as_bytes().to_vec()).collect();
        let spec = lookup("blpop").unwrap();
        assert_eq!(spec.keys.positions(&argv), vec![1, 2]);

        let argv: Vec<Vec<u8>> = ["lmpop", "2", "a", "b", "left"].iter().map(|s| s.as_bytes().to_vec()).collect();
        let spec = lookup("lmpop").unwrap();
        assert_eq!(spec.keys.positions(&argv), vec![2, 3]);

        let argv: Vec<Vec<u8>> = ["xread", "count", "2", "streams", "s1", "s2", "0", "0"]
            .iter().map(|s| s.as_bytes().to_vec()).collect();
        let spec = lookup("xread").unwrap();
        assert_eq!(spec.keys.positions(&argv), vec![4, 5]);
    }

    #[test]
    fn arity_rules() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(3));
        assert!(Arity::AtLeast(3).accepts(7));
        assert!(!Arity::AtLeast(3).accepts(2));
        assert!(Arity::Range(1, 2).accepts(1));
        assert!(!Arity::Range(1, 2).accepts(3));
    }
}
