/*!
 * Shared server state: the database array, the connected-client table, the
 * pub/sub registry, the ACL table, configuration and info counters.
 *
 * The reactor thread executes commands; the expiry sweeper is the only
 * other writer, so databases sit behind `parking_lot` RwLocks and the
 * client table is a DashMap both threads may touch.
 */

use crate::acl::AclTable;
use crate::config::{Config, NotifyFlags};
use crate::protocol::Reply;
use crate::pubsub::PubSub;
use crate::storage::{now_ms, Db};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Fields of a client the rest of the server may need while the owning
/// connection is busy: kill/unblock flags checked by the reactor, the
/// mailbox for pub/sub fan-out, and a snapshot for CLIENT LIST.
pub struct ClientShared {
    pub id: u64,
    pub addr: String,
    pub created_ms: u64,
    pub kill: AtomicBool,
    /// CLIENT UNBLOCK: Some(true) delivers the UNBLOCKED error, Some(false)
    /// the timeout reply.
    pub unblock: Mutex<Option<bool>>,
    /// Deep-copied frames bound for this client (pub/sub messages); the
    /// reactor drains them into the socket buffer, keeping a single writer
    /// per connection.
    pub outbox: Mutex<VecDeque<Reply>>,
    pub info: Mutex<ClientSnapshot>,
}

#[derive(Debug, Default, Clone)]
pub struct ClientSnapshot {
    pub name: String,
    pub db: usize,
    pub resp: u8,
    pub user: String,
    pub sub: usize,
    pub psub: usize,
    pub last_command: String,
    pub blocked: bool,
    pub in_multi: bool,
}

#[derive(Default)]
pub struct Stats {
    pub connections_received: AtomicU64,
    pub commands_processed: AtomicU64,
    pub expired_keys: AtomicU64,
    pub keyspace_hits: AtomicU64,
    pub keyspace_misses: AtomicU64,
    pub pubsub_messages: AtomicU64,
}

impl Stats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Server {
    pub dbs: Vec<RwLock<Db>>,
    pub clients: DashMap<u64, Arc<ClientShared>>,
    pub pubsub: Mutex<PubSub>,
    pub acl: RwLock<AclTable>,
    pub config: Config,
    pub stats: Stats,
    pub shutdown: AtomicBool,
    pub start_ms: u64,
    next_client_id: AtomicU64,
}

impl Server {
    pub fn new(config: Config) -> Arc<Server> {
        let db_count = config.databases();
        let mut dbs = Vec::with_capacity(db_count);
        for _ in 0..db_count {
            dbs.push(RwLock::new(Db::new()));
        }
        let server = Server {
            dbs,
            clients: DashMap::new(),
            pubsub: Mutex::new(PubSub::new()),
            acl: RwLock::new(AclTable::new()),
            config,
            stats: Stats::default(),
            shutdown: AtomicBool::new(false),
            start_ms: now_ms(),
            next_client_id: AtomicU64::new(1),
        };
        server
            .acl
            .write()
            .sync_requirepass(server.config.requirepass().as_deref());
        Arc::new(server)
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    pub fn auth_required(&self) -> bool {
        self.config.requirepass().is_some()
    }

    pub fn register_client(&self, addr: String) -> Arc<ClientShared> {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        Stats::bump(&self.stats.connections_received);
        let shared = Arc::new(ClientShared {
            id,
            addr,
            created_ms: now_ms(),
            kill: AtomicBool::new(false),
            unblock: Mutex::new(None),
            outbox: Mutex::new(VecDeque::new()),
            info: Mutex::new(ClientSnapshot::default()),
        });
        self.clients.insert(id, Arc::clone(&shared));
        shared
    }

    pub fn unregister_client(&self, id: u64) {
        self.clients.remove(&id);
        self.pubsub.lock().drop_client(id);
    }

    /// Route a message to every subscriber, deep-copying the frame into
    /// each mailbox. Returns the number of receivers.
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> usize {
        let receivers = self.pubsub.lock().receivers(channel);
        let mut delivered = 0;
        for (client_id, pattern) in receivers {
            let frame = match &pattern {
                None => Reply::Push(vec![
                    Reply::bulk("message"),
                    Reply::bulk(channel.to_vec()),
                    Reply::bulk(payload.to_vec()),
                ]),
                Some(p) => Reply::Push(vec![
                    Reply::bulk("pmessage"),
                    Reply::bulk(p.clone()),
                    Reply::bulk(channel.to_vec()),
                    Reply::bulk(payload.to_vec()),
                ]),
            };
            if let Some(client) = self.clients.get(&client_id) {
                client.outbox.lock().push_back(frame);
                delivered += 1;
            }
        }
        if delivered > 0 {
            Stats::bump(&self.stats.pubsub_messages);
        }
        delivered
    }

    /// Keyspace notification fan-out, honoring `notify-keyspace-events`.
    pub fn notify_keyspace_event(&self, db: usize, class: u32, event: &str, key: &[u8]) {
        let flags = self.config.notify_flags();
        if !flags.wants(class) {
            return;
        }
        if flags.keyspace {
            let channel = [format!("__keyspace@{}__:", db).as_bytes(), key].concat();
            self.publish(&channel, event.as_bytes());
        }
        if flags.keyevent {
            let channel = format!("__keyevent@{}__:{}", db, event).into_bytes();
            self.publish(&channel, key);
        }
    }

    /// True when flags request expired-key events (used by the sweeper).
    pub fn wants_expired_events(&self) -> bool {
        self.config.notify_flags().wants(NotifyFlags::EXPIRED)
    }
}
