/*!
 * Blocking-command coordination.
 *
 * A blocking command that finds no data parks the session: a `BlockedState`
 * is recorded on the session and the client id is appended to the waiter
 * list of each watched key (FIFO). Mutations mark keys ready; after every
 * command the reactor walks ready keys and serves the oldest compatible
 * waiter by running the non-blocking form of its operation. The poll tick
 * retires deadlines with null replies. Disconnect and CLIENT UNBLOCK remove
 * waiters.
 */

use crate::protocol::Reply;
use crate::storage::Db;
use crate::value::list::End;
use crate::value::stream::StreamId;
use crate::value::Value;

/// What a parked client is waiting to do.
#[derive(Debug, Clone)]
pub enum BlockKind {
    /// BLPOP / BRPOP over several keys.
    ListPop { end: End },
    /// BLMOVE / BRPOPLPUSH: pop from src, push to dst.
    ListMove { dst: Vec<u8>, from: End, to: End },
    /// BLMPOP: first non-empty key pops up to `count` elements.
    ListMpop { end: End, count: usize },
    /// XREAD BLOCK: per-key "entries after this id".
    StreamRead { after: Vec<(Vec<u8>, StreamId)>, count: usize },
}

#[derive(Debug, Clone)]
pub struct BlockedState {
    pub kind: BlockKind,
    pub db: usize,
    pub keys: Vec<Vec<u8>>,
    /// Absolute deadline in ms; None blocks forever.
    pub deadline: Option<u64>,
}

impl BlockedState {
    /// The deterministic reply delivered when the deadline passes.
    pub fn timeout_reply(&self) -> Reply {
        match self.kind {
            BlockKind::ListPop { .. } => Reply::NullArray,
            BlockKind::ListMove { .. } => Reply::Null,
            BlockKind::ListMpop { .. } => Reply::NullArray,
            BlockKind::StreamRead { .. } => Reply::NullArray,
        }
    }
}

/// Attempt to satisfy a parked waiter from `ready_key`, running the
/// corresponding non-blocking operation on its behalf. `None` means the key
/// no longer has data for this waiter and it stays parked.
pub fn try_serve(state: &BlockedState, ready_key: &[u8], db: &mut Db) -> Option<Reply> {
    match &state.kind {
        BlockKind::ListPop { end } => {
            let list = match db.get_mut(ready_key) {
                Some(Value::List(l)) => l,
                _ => return None,
            };
            let elem = list.pop(*end)?;
            db.notify_mutation(ready_key);
            db.delete_if_drained(ready_key);
            Some(Reply::Array(vec![Reply::bulk(ready_key.to_vec()), Reply::Bulk(elem)]))
        }
        BlockKind::ListMove { dst, from, to } => {
            // the destination may have changed type while we were parked;
            // probe it before anything moves
            if let Some(v) = db.get(dst) {
                if v.as_list().is_err() {
                    return None;
                }
            }
            let elem = match db.get_mut(ready_key) {
                Some(Value::List(l)) => l.pop(*from)?,
                _ => return None,
            };
            db.notify_mutation(ready_key);
            db.delete_if_drained(ready_key);
            let target = db.entry_or_insert_with(dst, || Value::List(Default::default()));
            if let Value::List(l) = target {
                l.push(*to, elem.clone());
            }
            db.notify_mutation(dst);
            db.signal_ready(dst);
            Some(Reply::Bulk(elem))
        }
        BlockKind::ListMpop { end, count } => {
            let list = match db.get_mut(ready_key) {
                Some(Value::List(l)) => l,
                _ => return None,
            };
            let popped = list.pop_count(*end, *count);
            if popped.is_empty() {
                return None;
            }
            db.notify_mutation(ready_key);
            db.delete_if_drained(ready_key);
            Some(Reply::Array(vec![
                Reply::bulk(ready_key.to_vec()),
                Reply::Array(popped.into_iter().map(Reply::Bulk).collect()),
            ]))
        }
        BlockKind::StreamRead { after, count } => {
            // a single ready stream wakes the read; reply covers every
            // watched stream that has data
            let mut sections = Vec::new();
            for (key, from) in after {
                let entries = match db.get(key) {
                    Some(Value::Stream(s)) => s.read_after(*from, *count),
                    _ => Vec::new(),
                };
                if entries.is_empty() {
                    continue;
                }
                sections.push(Reply::Array(vec![
                    Reply::bulk(key.clone()),
                    Reply::Array(entries.into_iter().map(encode_stream_entry).collect()),
                ]));
            }
            if sections.is_empty() {
                return None;
            }
            Some(Reply::Array(sections))
        }
    }
}

/// One `[id, [f1, v1, f2, v2, ...]]` stream entry reply.
pub fn encode_stream_entry((id, fields): (StreamId, Vec<(Vec<u8>, Vec<u8>)>)) -> Reply {
    let mut flat = Vec::with_capacity(fields.len() * 2);
    for (f, v) in fields {
        flat.push(Reply::Bulk(f));
        flat.push(Reply::Bulk(v));
    }
    Reply::Array(vec![Reply::bulk(id.to_string()), Reply::Array(flat)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ListVal;

    fn db_with_list(key: &[u8], elems: &[&str]) -> Db {
        let mut db = Db::new();
        let mut l = ListVal::new();
        for e in elems {
            l.push(End::Right, e.as_bytes().to_vec());
        }
        db.set(key.to_vec(), Value::List(l));
        db
    }

    #[test]
    fn serve_list_pop() {
        let mut db = db_with_list(b"q", &["a"]);
        let state = BlockedState {
            kind: BlockKind::ListPop { end: End::Left },
            db: 0,
            keys: vec![b"q".to_vec()],
            deadline: None,
        };
        let reply = try_serve(&state, b"q", &mut db).unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![Reply::bulk("q"), Reply::bulk("a")])
        );
        // the single element is gone along with the key
        assert!(!db.contains(b"q"));
        assert!(try_serve(&state, b"q", &mut db).is_none());
    }

    #[test]
    fn serve_list_move_pushes_destination() {
        let mut db = db_with_list(b"src", &["x"]);
        let state = BlockedState {
            kind: BlockKind::ListMove {
                dst: b"dst".to_vec(),
                from: End::Right,
                to: End::Left,
            },
            db: 0,
            keys: vec![b"src".to_vec()],
            deadline: None,
        };
        let reply = try_serve(&state, b"src", &mut db).unwrap();
        assert_eq!(reply, Reply::bulk("x"));
        let dst = db.get(b"dst").unwrap().as_list().unwrap();
        assert_eq!(dst.len(), 1);
    }

    #[test]
    fn timeout_replies_are_null() {
        let s = BlockedState {
            kind: BlockKind::ListPop { end: End::Left },
            db: 0,
            keys: vec![],
            deadline: Some(0),
        };
        assert_eq!(s.timeout_reply(), Reply::NullArray);
    }
}
