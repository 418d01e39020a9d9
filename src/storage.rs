/*!
 * Keyspace
 *
 * One logical database: the key→value dictionary, the expiry index, the
 * per-key watch versions used by WATCH/EXEC, the blocked-waiter index used
 * by the BLPOP family, and the snapshot sessions backing SCAN cursors.
 *
 * Expiry is lazy on every access; an optional sampling sweep (the expiry
 * sweeper thread) calls `expire_cycle`.
 */

use crate::glob::glob_match;
use crate::value::{BytesMap, Value};
use rand::seq::IteratorRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Most scan sessions a DB keeps alive; the oldest is dropped beyond this.
const MAX_SCAN_SESSIONS: usize = 128;
/// Keys sampled per expire cycle.
const EXPIRE_SAMPLE: usize = 20;

#[derive(Debug, Default)]
struct WatchEntry {
    version: u64,
    watchers: u32,
}

#[derive(Debug)]
struct ScanSession {
    keys: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct Db {
    dict: BytesMap<Value>,
    expires: BytesMap<u64>,
    watch: BytesMap<WatchEntry>,
    waiters: BytesMap<VecDeque<u64>>,
    ready_keys: Vec<Vec<u8>>,
    sessions: hashbrown::HashMap<u32, ScanSession, ahash::RandomState>,
    session_order: VecDeque<u32>,
    next_session: u32,
}

impl Db {
    pub fn new() -> Db {
        Db::default()
    }

    /// Number of live keys (after reaping anything already due).
    pub fn len(&mut self) -> usize {
        self.reap_due();
        self.dict.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn expire_if_due(&mut self, key: &[u8]) -> bool {
        match self.expires.get(key) {
            Some(&at) if at <= now_ms() => {
                self.remove(key);
                true
            }
            _ => false,
        }
    }

    fn reap_due(&mut self) {
        let now = now_ms();
        let due: Vec<Vec<u8>> = self
            .expires
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for k in due {
            self.remove(&k);
        }
    }

    /// Read access with lazy expiry.
    pub fn get(&mut self, key: &[u8]) -> Option<&Value> {
        self.expire_if_due(key);
        self.dict.get(key)
    }

    /// Write access with lazy expiry. Callers mutating through this must
    /// follow up with `notify_mutation`.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.expire_if_due(key);
        self.dict.get_mut(key)
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.expire_if_due(key);
        self.dict.contains_key(key)
    }

    /// Insert or replace a value, clearing any previous TTL.
    pub fn set(&mut self, key: Vec<u8>, value: Value) {
        self.expires.remove(&key);
        self.dict.insert(key.clone(), value);
        self.notify_mutation(&key);
    }

    /// Insert or replace, keeping the existing TTL (SET KEEPTTL, RESTORE).
    pub fn set_keep_ttl(&mut self, key: Vec<u8>, value: Value) {
        self.dict.insert(key.clone(), value);
        self.notify_mutation(&key);
    }

    /// Fetch-or-create for push-style writes.
    pub fn entry_or_insert_with(
        &mut self,
        key: &[u8],
        default: impl FnOnce() -> Value,
    ) -> &mut Value {
        self.expire_if_due(key);
        self.dict.entry(key.to_vec()).or_insert_with(default)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        let v = self.dict.remove(key);
        if v.is_some() {
            self.expires.remove(key);
            self.notify_mutation(key);
        }
        v
    }

    /// Drop the key when a container write drained it (invariant: a
    /// container value is never present but empty).
    pub fn delete_if_drained(&mut self, key: &[u8]) {
        if self.dict.get(key).map(|v| v.is_drained()).unwrap_or(false) {
            self.remove(key);
        }
    }

    pub fn rename(&mut self, src: &[u8], dst: &[u8]) -> bool {
        if !self.contains(src) {
            return false;
        }
        let value = self.dict.remove(src).unwrap();
        let ttl = self.expires.remove(src);
        self.dict.insert(dst.to_vec(), value);
        match ttl {
            Some(at) => {
                self.expires.insert(dst.to_vec(), at);
            }
            None => {
                self.expires.remove(dst);
            }
        }
        self.notify_mutation(src);
        self.notify_mutation(dst);
        true
    }

    /// Set an absolute expiry; a timestamp in the past deletes immediately.
    /// Returns false when the key does not exist.
    pub fn set_expiry(&mut self, key: &[u8], at_ms: u64) -> bool {
        if !self.contains(key) {
            return false;
        }
        if at_ms <= now_ms() {
            self.remove(key);
        } else {
            self.expires.insert(key.to_vec(), at_ms);
            self.notify_mutation(key);
        }
        true
    }

    pub fn expiry(&mut self, key: &[u8]) -> Option<u64> {
        self.expire_if_due(key);
        self.expires.get(key).copied()
    }

    /// Remove a TTL; true when a TTL existed.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if !self.contains(key) {
            return false;
        }
        let had = self.expires.remove(key).is_some();
        if had {
            self.notify_mutation(key);
        }
        had
    }

    pub fn flush(&mut self) {
        let keys: Vec<Vec<u8>> = self.dict.keys().cloned().collect();
        self.dict.clear();
        self.expires.clear();
        for k in keys {
            self.notify_mutation(&k);
        }
    }

    pub fn random_key(&mut self, rng: &mut impl Rng) -> Option<Vec<u8>> {
        self.reap_due();
        self.dict.keys().choose(rng).cloned()
    }

    pub fn keys_matching(&mut self, pattern: &[u8]) -> Vec<Vec<u8>> {
        self.reap_due();
        self.dict
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect()
    }

    pub fn iter_keys(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.dict.keys()
    }

    //
    // WATCH versions
    //

    /// Register a watcher and return the key's current version.
    pub fn watch_key(&mut self, key: &[u8]) -> u64 {
        let e = self.watch.entry(key.to_vec()).or_default();
        e.watchers += 1;
        e.version
    }

    /// Drop one watcher registration; the entry dies with its last watcher.
    pub fn unwatch_key(&mut self, key: &[u8]) {
        if let Some(e) = self.watch.get_mut(key) {
            e.watchers = e.watchers.saturating_sub(1);
            if e.watchers == 0 {
                self.watch.remove(key);
            }
        }
    }

    pub fn watch_version(&self, key: &[u8]) -> u64 {
        self.watch.get(key).map(|e| e.version).unwrap_or(0)
    }

    /// Bump the watch version of a mutated key. Cheap no-op for unwatched
    /// keys; write paths call this on every touched key.
    pub fn notify_mutation(&mut self, key: &[u8]) {
        if let Some(e) = self.watch.get_mut(key) {
            e.version += 1;
        }
    }

    //
    // Blocking-waiter index
    //

    /// Park `client` on `key`, FIFO.
    pub fn add_waiter(&mut self, key: &[u8], client: u64) {
        self.waiters.entry(key.to_vec()).or_default().push_back(client);
    }

    pub fn remove_waiter(&mut self, key: &[u8], client: u64) {
        if let Some(q) = self.waiters.get_mut(key) {
            q.retain(|&c| c != client);
            if q.is_empty() {
                self.waiters.remove(key);
            }
        }
    }

    /// Waiters for a key, oldest first.
    pub fn waiters_for(&self, key: &[u8]) -> Vec<u64> {
        self.waiters.get(key).map(|q| q.iter().copied().collect()).unwrap_or_default()
    }

    pub fn has_waiters(&self, key: &[u8]) -> bool {
        self.waiters.contains_key(key)
    }

    /// Mark a key as having received data a blocked client may want.
    pub fn signal_ready(&mut self, key: &[u8]) {
        if self.has_waiters(key) && !self.ready_keys.iter().any(|k| k == key) {
            self.ready_keys.push(key.to_vec());
        }
    }

    pub fn take_ready(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.ready_keys)
    }

    //
    // Active expiry
    //

    /// Sample up to `EXPIRE_SAMPLE` keys with TTLs and delete the due ones.
    /// Returns (expired keys, sampled count); callers repeat while the
    /// expired share exceeds 1/4.
    pub fn expire_cycle(&mut self, rng: &mut impl Rng) -> (Vec<Vec<u8>>, usize) {
        let now = now_ms();
        let sampled: Vec<Vec<u8>> = self
            .expires
            .keys()
            .choose_multiple(rng, EXPIRE_SAMPLE)
            .into_iter()
            .cloned()
            .collect();
        let total = sampled.len();
        let mut expired = Vec::new();
        for k in sampled {
            if self.expires.get(&k).map(|&at| at <= now).unwrap_or(false) {
                self.remove(&k);
                expired.push(k);
            }
        }
        (expired, total)
    }

    //
    // SCAN sessions
    //

    /// Begin or continue a keyspace scan. Returns (next cursor, keys).
    pub fn scan(
        &mut self,
        cursor: u64,
        pattern: Option<&[u8]>,
        count: usize,
        type_filter: Option<&str>,
    ) -> (u64, Vec<Vec<u8>>) {
        let (id, mut offset) = if cursor == 0 {
            self.reap_due();
            let snapshot: Vec<Vec<u8>> = self.dict.keys().cloned().collect();
            let id = self.alloc_session(snapshot);
            (id, 0usize)
        } else {
            ((cursor >> 32) as u32, (cursor & 0xffff_ffff) as usize)
        };
        let session = match self.sessions.get(&id) {
            Some(s) => s,
            // snapshot evicted: terminate this scan
            None => return (0, Vec::new()),
        };
        let mut out = Vec::new();
        let step = count.max(1);
        let mut walked = 0;
        let keys: Vec<Vec<u8>> = {
            let mut picked = Vec::new();
            while offset < session.keys.len() && walked < step {
                picked.push(session.keys[offset].clone());
                offset += 1;
                walked += 1;
            }
            picked
        };
        for k in keys {
            if !self.contains(&k) {
                continue;
            }
            if let Some(p) = pattern {
                if !glob_match(p, &k) {
                    continue;
                }
            }
            if let Some(t) = type_filter {
                if self.dict.get(&k).map(|v| v.type_name()) != Some(t) {
                    continue;
                }
            }
            out.push(k);
        }
        let done = self
            .sessions
            .get(&id)
            .map(|s| offset >= s.keys.len())
            .unwrap_or(true);
        if done {
            self.sessions.remove(&id);
            self.session_order.retain(|&x| x != id);
            (0, out)
        } else {
            (((id as u64) << 32) | offset as u64, out)
        }
    }

    fn alloc_session(&mut self, keys: Vec<Vec<u8>>) -> u32 {
        self.next_session = self.next_session.wrapping_add(1).max(1);
        let id = self.next_session;
        self.sessions.insert(id, ScanSession { keys });
        self.session_order.push_back(id);
        while self.session_order.len() > MAX_SCAN_SESSIONS {
            if let Some(old) = self.session_order.pop_front() {
                self.sessions.remove(&old);
            }
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StrVal;

    fn s(v: &str) -> Value {
        Value::Str(StrVal::new(v.as_bytes().to_vec()))
    }

    #[test]
    fn set_get_remove() {
        let mut db = Db::new();
        db.set(b"k".to_vec(), s("v"));
        assert!(db.contains(b"k"));
        assert!(db.remove(b"k").is_some());
        assert!(!db.contains(b"k"));
    }

    #[test]
    fn lazy_expiry_hides_due_keys() {
        let mut db = Db::new();
        db.set(b"k".to_vec(), s("v"));
        db.set_expiry(b"k", now_ms() + 10_000);
        assert!(db.contains(b"k"));
        // re-point the expiry into the past (same-module field access)
        db.expires.insert(b"k".to_vec(), now_ms().saturating_sub(1));
        assert!(db.get(b"k").is_none());
        assert_eq!(db.len(), 0);
        assert!(db.expiry(b"k").is_none());
    }

    #[test]
    fn expiry_in_past_deletes() {
        let mut db = Db::new();
        db.set(b"k".to_vec(), s("v"));
        assert!(db.set_expiry(b"k", 1));
        assert!(!db.contains(b"k"));
    }

    #[test]
    fn rename_moves_ttl() {
        let mut db = Db::new();
        db.set(b"a".to_vec(), s("v"));
        let at = now_ms() + 60_000;
        db.set_expiry(b"a", at);
        assert!(db.rename(b"a", b"b"));
        assert_eq!(db.expiry(b"b"), Some(at));
        assert!(!db.contains(b"a"));
    }

    #[test]
    fn watch_versions_bump_on_mutation() {
        let mut db = Db::new();
        db.set(b"k".to_vec(), s("1"));
        let v0 = db.watch_key(b"k");
        db.set(b"k".to_vec(), s("2"));
        assert!(db.watch_version(b"k") > v0);
        db.unwatch_key(b"k");
        // entry pruned with its last watcher
        assert_eq!(db.watch_version(b"k"), 0);
    }

    #[test]
    fn waiters_fifo() {
        let mut db = Db::new();
        db.add_waiter(b"q", 1);
        db.add_waiter(b"q", 2);
        assert_eq!(db.waiters_for(b"q"), vec![1, 2]);
        db.remove_waiter(b"q", 1);
        assert_eq!(db.waiters_for(b"q"), vec![2]);
        db.remove_waiter(b"q", 2);
        assert!(!db.has_waiters(b"q"));
    }

    #[test]
    fn scan_returns_every_stable_key() {
        let mut db = Db::new();
        for i in 0..100 {
            db.set(format!("k{}", i).into_bytes(), s("v"));
        }
        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys) = db.scan(cursor, None, 10, None);
            for k in keys {
                seen.insert(k);
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn scan_match_filters() {
        let mut db = Db::new();
        db.set(b"foo:1".to_vec(), s("v"));
        db.set(b"bar:1".to_vec(), s("v"));
        let (_, keys) = db.scan(0, Some(b"foo:*"), 100, None);
        assert_eq!(keys, vec![b"foo:1".to_vec()]);
    }
}
