/*!
 * Network layer and event loop.
 *
 * A single mio reactor owns every socket: it accepts connections, decodes
 * requests, executes commands inline (command and EXEC atomicity fall out
 * of the single execution context), and writes replies. Pub/sub frames and
 * wakeup replies for *other* clients go through their mailboxes and are
 * drained here, keeping one writer per connection. The expiry sweeper
 * nudges the loop through a channel + waker pair.
 */

use crate::commands::{dispatch, Ctx, Outcome};
use crate::errors::CmdError;
use crate::protocol::{encode_reply, parse_many, Reply, Request};
use crate::server::{ClientShared, ClientSnapshot, Server};
use crate::session::{Session, TxState};
use crate::storage::now_ms;
use anyhow::Result;
use bytes::BytesMut;
use crossbeam::channel::{unbounded, Receiver};
use log::{debug, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Size of the per-read scratch buffer.
const READ_BUF: usize = 4096;
const LISTENER: Token = Token(0);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

struct Conn {
    sock: TcpStream,
    rbuf: BytesMut,
    wbuf: BytesMut,
    /// Decoded requests not yet executed (drained while unblocked).
    pending: VecDeque<Request>,
    session: Session,
    shared: Arc<ClientShared>,
    should_close: bool,
}

impl Conn {
    fn queue_reply(&mut self, reply: &Reply) {
        encode_reply(reply, self.session.protover, &mut self.wbuf);
    }

    /// Refresh the CLIENT LIST snapshot other sessions read.
    fn sync_snapshot(&self) {
        *self.shared.info.lock() = ClientSnapshot {
            name: String::from_utf8_lossy(&self.session.name).to_string(),
            db: self.session.db_index,
            resp: self.session.protover,
            user: self.session.user.clone(),
            sub: self.session.channels.len(),
            psub: self.session.patterns.len(),
            last_command: self.session.last_command.clone(),
            blocked: self.session.blocked.is_some(),
            in_multi: self.session.tx != TxState::None,
        };
    }
}

pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr)?)
}

/// Run the server loop until SHUTDOWN flips the flag. Blocks the calling
/// thread.
pub fn run_server(addr: SocketAddr, server: Arc<Server>) -> Result<()> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(1024);
    let mut listener = bind_listener(addr)?;
    poll.registry()
        .register(&mut listener, LISTENER, Interest::READABLE)?;

    let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
    let (sweep_tx, sweep_rx): (_, Receiver<u64>) = unbounded();
    crate::expire::spawn_expiry_sweeper(Arc::clone(&server), sweep_tx, Arc::clone(&waker))?;

    let mut conns: FxHashMap<usize, Conn> = FxHashMap::default();
    let mut by_client: FxHashMap<u64, usize> = FxHashMap::default();
    let mut next_tok: usize = 1;

    info!("listening on {}", addr);
    loop {
        if server.shutdown.load(Ordering::SeqCst) {
            info!("shutdown requested, closing {} connections", conns.len());
            return Ok(());
        }
        poll.poll(&mut events, Some(Duration::from_millis(100)))?;

        for ev in events.iter() {
            match ev.token() {
                LISTENER => loop {
                    match listener.accept() {
                        Ok((mut sock, peer)) => {
                            let max = server.config.int("maxclients").max(1) as usize;
                            if conns.len() >= max {
                                let _ = sock.write(b"-ERR max number of clients reached\r\n");
                                continue;
                            }
                            sock.set_nodelay(true).ok();
                            apply_keepalive(&server, &sock);
                            let tok = next_tok;
                            next_tok += 1;
                            poll.registry()
                                .register(
                                    &mut sock,
                                    Token(tok),
                                    Interest::READABLE | Interest::WRITABLE,
                                )
                                .ok();
                            let shared = server.register_client(peer.to_string());
                            let session = Session::new(
                                shared.id,
                                peer.to_string(),
                                server.auth_required(),
                                now_ms(),
                            );
                            by_client.insert(shared.id, tok);
                            debug!("client {} connected from {}", shared.id, peer);
                            conns.insert(
                                tok,
                                Conn {
                                    sock,
                                    rbuf: BytesMut::with_capacity(READ_BUF),
                                    wbuf: BytesMut::new(),
                                    pending: VecDeque::new(),
                                    session,
                                    shared,
                                    should_close: false,
                                },
                            );
                        }
                        Err(ref e) if would_block(e) => break,
                        Err(e) => {
                            warn!("accept error: {}", e);
                            break;
                        }
                    }
                },
                WAKER_TOKEN => {
                    // the sweeper only nudges; drain the tick counter
                    while sweep_rx.try_recv().is_ok() {}
                }
                Token(t) => {
                    if ev.is_readable() {
                        read_into_conn(&mut conns, t);
                    }
                }
            }
        }

        // execute whatever arrived, then housekeeping that can touch any
        // connection
        let tokens: Vec<usize> = conns.keys().copied().collect();
        for t in tokens {
            process_conn(&server, &mut conns, &mut by_client, t);
        }
        serve_ready_keys(&server, &mut conns, &by_client);
        check_blocked(&server, &mut conns);
        drain_mailboxes(&mut conns);
        flush_and_reap(&server, &mut conns, &mut by_client);
    }
}

fn apply_keepalive(server: &Server, sock: &TcpStream) {
    let secs = server.config.int("tcp-keepalive");
    if secs > 0 {
        let ka = socket2::TcpKeepalive::new().with_time(Duration::from_secs(secs as u64));
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(sock.as_raw_fd()) };
        let sref = socket2::SockRef::from(&borrowed);
        sref.set_tcp_keepalive(&ka).ok();
    }
}

/// Pull bytes off the socket and decode complete requests.
fn read_into_conn(conns: &mut FxHashMap<usize, Conn>, token: usize) {
    let Some(conn) = conns.get_mut(&token) else { return };
    let mut tmp = [0u8; READ_BUF];
    loop {
        match conn.sock.read(&mut tmp) {
            Ok(0) => {
                conn.should_close = true;
                break;
            }
            Ok(n) => conn.rbuf.extend_from_slice(&tmp[..n]),
            Err(ref e) if would_block(e) => break,
            Err(_) => {
                conn.should_close = true;
                break;
            }
        }
    }
    let mut requests = Vec::new();
    match parse_many(&mut conn.rbuf, &mut requests) {
        Ok(()) => conn.pending.extend(requests),
        Err(e) => {
            // framing is unrecoverable: report and drop the connection
            let reply = Reply::Error(format!("ERR {}", e));
            conn.queue_reply(&reply);
            conn.should_close = true;
        }
    }
}

/// Execute this connection's decoded requests until it blocks, closes, or
/// runs dry. Ready keys and mailboxes are serviced after every command so
/// cross-client effects land in order.
fn process_conn(
    server: &Arc<Server>,
    conns: &mut FxHashMap<usize, Conn>,
    by_client: &mut FxHashMap<u64, usize>,
    token: usize,
) {
    loop {
        let executed = {
            let Some(conn) = conns.get_mut(&token) else { return };
            if conn.should_close || conn.session.blocked.is_some() {
                false
            } else {
                match conn.pending.pop_front() {
                    None => false,
                    Some(argv) => {
                        run_one(server, conn, &argv);
                        true
                    }
                }
            }
        };
        if !executed {
            return;
        }
        serve_ready_keys(server, conns, by_client);
        drain_mailboxes(conns);
    }
}

fn run_one(server: &Arc<Server>, conn: &mut Conn, argv: &Request) {
    let mut ctx = Ctx::new(server, &mut conn.session);
    match dispatch(&mut ctx, argv) {
        Outcome::Reply(reply) => {
            if conn.session.take_reply_permission() {
                conn.queue_reply(&reply);
            }
        }
        Outcome::Multi(frames) => {
            if conn.session.take_reply_permission() {
                for frame in &frames {
                    conn.queue_reply(frame);
                }
            }
        }
        Outcome::NoReply => {}
        Outcome::Block(state) => {
            let mut db = server.dbs[state.db].write();
            for key in &state.keys {
                db.add_waiter(key, conn.session.id);
            }
            drop(db);
            conn.session.blocked = Some(state);
        }
    }
    conn.sync_snapshot();
}

/// Walk every database's ready keys and serve parked waiters FIFO by
/// running their operation on their behalf.
fn serve_ready_keys(
    server: &Arc<Server>,
    conns: &mut FxHashMap<usize, Conn>,
    by_client: &FxHashMap<u64, usize>,
) {
    for (db_index, db_lock) in server.dbs.iter().enumerate() {
        loop {
            let ready = db_lock.write().take_ready();
            if ready.is_empty() {
                break;
            }
            for key in ready {
                loop {
                    let waiters = db_lock.read().waiters_for(&key);
                    let mut progressed = false;
                    for waiter in waiters {
                        let Some(&token) = by_client.get(&waiter) else {
                            // connection died without cleanup; drop the entry
                            db_lock.write().remove_waiter(&key, waiter);
                            continue;
                        };
                        let Some(conn) = conns.get_mut(&token) else {
                            db_lock.write().remove_waiter(&key, waiter);
                            continue;
                        };
                        let Some(state) = conn.session.blocked.clone() else {
                            db_lock.write().remove_waiter(&key, waiter);
                            continue;
                        };
                        if state.db != db_index || !state.keys.iter().any(|k| k == &key) {
                            continue;
                        }
                        let served = {
                            let mut db = db_lock.write();
                            crate::blocking::try_serve(&state, &key, &mut db)
                        };
                        match served {
                            Some(reply) => {
                                let mut db = db_lock.write();
                                for k in &state.keys {
                                    db.remove_waiter(k, waiter);
                                }
                                drop(db);
                                conn.session.blocked = None;
                                conn.queue_reply(&reply);
                                conn.sync_snapshot();
                                progressed = true;
                                break;
                            }
                            // nothing for this waiter; the next one may
                            // watch different positions (stream reads)
                            None => continue,
                        }
                    }
                    if !progressed {
                        break;
                    }
                }
            }
        }
    }
}

/// Retire deadlines, honor CLIENT UNBLOCK/KILL requests.
fn check_blocked(server: &Arc<Server>, conns: &mut FxHashMap<usize, Conn>) {
    let now = now_ms();
    for conn in conns.values_mut() {
        if conn.shared.kill.load(Ordering::Relaxed) {
            conn.should_close = true;
        }
        let Some(state) = conn.session.blocked.clone() else { continue };
        let unblock_req = conn.shared.unblock.lock().take();
        let timed_out = state.deadline.map(|d| d <= now).unwrap_or(false);
        if conn.should_close || timed_out || unblock_req.is_some() {
            let mut db = server.dbs[state.db].write();
            for key in &state.keys {
                db.remove_waiter(key, conn.session.id);
            }
            drop(db);
            conn.session.blocked = None;
            if !conn.should_close {
                match unblock_req {
                    Some(true) => conn.queue_reply(&Reply::from(CmdError::Unblocked)),
                    _ => {
                        let reply = state.timeout_reply();
                        conn.queue_reply(&reply);
                    }
                }
            }
            conn.sync_snapshot();
        }
    }
}

/// Move mailbox frames (pub/sub fan-out) into each connection's write
/// buffer.
fn drain_mailboxes(conns: &mut FxHashMap<usize, Conn>) {
    for conn in conns.values_mut() {
        let frames: Vec<Reply> = {
            let mut outbox = conn.shared.outbox.lock();
            outbox.drain(..).collect()
        };
        for frame in frames {
            conn.queue_reply(&frame);
        }
    }
}

/// Flush write buffers; tear down closed connections and their state.
fn flush_and_reap(
    server: &Arc<Server>,
    conns: &mut FxHashMap<usize, Conn>,
    by_client: &mut FxHashMap<u64, usize>,
) {
    let mut doomed: Vec<usize> = Vec::new();
    for (&token, conn) in conns.iter_mut() {
        while !conn.wbuf.is_empty() {
            match conn.sock.write(&conn.wbuf) {
                Ok(0) => {
                    conn.should_close = true;
                    break;
                }
                Ok(n) => {
                    let _ = conn.wbuf.split_to(n);
                }
                Err(ref e) if would_block(e) => break,
                Err(_) => {
                    conn.wbuf.clear();
                    conn.should_close = true;
                    break;
                }
            }
        }
        if (conn.should_close || conn.session.close_after_reply) && conn.wbuf.is_empty() {
            doomed.push(token);
        }
    }
    for token in doomed {
        if let Some(mut conn) = conns.remove(&token) {
            teardown(server, &mut conn);
            by_client.remove(&conn.session.id);
        }
    }
}

/// Disconnect cleanup: waiters, watches, subscriptions, client table.
fn teardown(server: &Arc<Server>, conn: &mut Conn) {
    debug!("client {} disconnected", conn.session.id);
    if let Some(state) = conn.session.blocked.take() {
        let mut db = server.dbs[state.db].write();
        for key in &state.keys {
            db.remove_waiter(key, conn.session.id);
        }
    }
    for (db_index, key, _) in std::mem::take(&mut conn.session.watched) {
        server.dbs[db_index].write().unwatch_key(&key);
    }
    server.unregister_client(conn.session.id);
}

#[inline]
fn would_block(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}
