/*!
 * Stream values: an append-only log of field/value entries keyed by
 * monotonically increasing `ms-seq` IDs, plus named consumer groups that
 * track pending (delivered but unacknowledged) entries per consumer.
 */

use crate::errors::CmdError;
use crate::value::BytesMap;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId { ms: u64::MAX, seq: u64::MAX };

    pub fn new(ms: u64, seq: u64) -> StreamId {
        StreamId { ms, seq }
    }

    /// Smallest ID strictly greater than self.
    pub fn next(&self) -> StreamId {
        if self.seq == u64::MAX {
            StreamId { ms: self.ms + 1, seq: 0 }
        } else {
            StreamId { ms: self.ms, seq: self.seq + 1 }
        }
    }

    /// Parse `ms` or `ms-seq`; a missing sequence becomes `default_seq`.
    pub fn parse(arg: &[u8], default_seq: u64) -> Result<StreamId, CmdError> {
        let s = std::str::from_utf8(arg).map_err(|_| CmdError::StreamIdInvalid)?;
        match s.split_once('-') {
            Some((ms, seq)) => {
                let ms = ms.parse().map_err(|_| CmdError::StreamIdInvalid)?;
                let seq = seq.parse().map_err(|_| CmdError::StreamIdInvalid)?;
                Ok(StreamId { ms, seq })
            }
            None => {
                let ms = s.parse().map_err(|_| CmdError::StreamIdInvalid)?;
                Ok(StreamId { ms, seq: default_seq })
            }
        }
    }

    /// Parse a range endpoint: `-` and `+` are the stream extremes, a `(`
    /// prefix makes the endpoint exclusive. `is_end` selects the default
    /// sequence for a bare `ms`.
    pub fn parse_range_item(arg: &[u8], is_end: bool) -> Result<(StreamId, bool), CmdError> {
        match arg {
            b"-" => return Ok((StreamId::MIN, false)),
            b"+" => return Ok((StreamId::MAX, false)),
            _ => {}
        }
        let (exclusive, rest) = match arg.first() {
            Some(b'(') => (true, &arg[1..]),
            _ => (false, arg),
        };
        let default_seq = if is_end { u64::MAX } else { 0 };
        Ok((StreamId::parse(rest, default_seq)?, exclusive))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// How XADD names the new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// `*`: current time, next sequence.
    Auto,
    /// `ms-seq` (or bare `ms`, sequence 0).
    Explicit(StreamId),
    /// `ms-*`: fixed milliseconds, next sequence.
    MsAuto(u64),
}

impl IdSpec {
    pub fn parse(arg: &[u8]) -> Result<IdSpec, CmdError> {
        if arg == b"*" {
            return Ok(IdSpec::Auto);
        }
        let s = std::str::from_utf8(arg).map_err(|_| CmdError::StreamIdInvalid)?;
        if let Some(ms) = s.strip_suffix("-*") {
            return Ok(IdSpec::MsAuto(ms.parse().map_err(|_| CmdError::StreamIdInvalid)?));
        }
        Ok(IdSpec::Explicit(StreamId::parse(arg, 0)?))
    }
}

pub type EntryFields = Vec<(Vec<u8>, Vec<u8>)>;

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub consumer: Vec<u8>,
    pub delivery_time: u64,
    pub delivery_count: u64,
}

#[derive(Debug, Clone)]
pub struct Consumer {
    pub seen_time: u64,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub last_delivered: StreamId,
    pub pending: BTreeMap<StreamId, PendingEntry>,
    pub consumers: BytesMap<Consumer>,
}

impl Group {
    pub fn new(last_delivered: StreamId) -> Group {
        Group {
            last_delivered,
            pending: BTreeMap::new(),
            consumers: BytesMap::default(),
        }
    }

    pub fn pending_for(&self, consumer: &[u8]) -> impl Iterator<Item = (&StreamId, &PendingEntry)> + '_ {
        let consumer = consumer.to_vec();
        self.pending.iter().filter(move |(_, p)| p.consumer == consumer)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamVal {
    entries: BTreeMap<StreamId, EntryFields>,
    pub last_id: StreamId,
    pub max_deleted_id: StreamId,
    pub entries_added: u64,
    pub groups: BytesMap<Group>,
}

impl StreamVal {
    pub fn new() -> StreamVal {
        StreamVal::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_id(&self) -> Option<StreamId> {
        self.entries.keys().next().copied()
    }

    pub fn get(&self, id: &StreamId) -> Option<&EntryFields> {
        self.entries.get(id)
    }

    /// Append an entry. The concrete ID must be strictly greater than the
    /// last one ever used.
    pub fn add(&mut self, spec: IdSpec, fields: EntryFields, now_ms: u64) -> Result<StreamId, CmdError> {
        let id = match spec {
            IdSpec::Auto => {
                if now_ms > self.last_id.ms {
                    StreamId::new(now_ms, 0)
                } else {
                    self.last_id.next()
                }
            }
            IdSpec::MsAuto(ms) => {
                if ms < self.last_id.ms {
                    return Err(CmdError::StreamIdTooSmall);
                }
                if ms == self.last_id.ms {
                    if self.last_id.seq == u64::MAX {
                        return Err(CmdError::StreamIdTooSmall);
                    }
                    StreamId::new(ms, self.last_id.seq + 1)
                } else {
                    StreamId::new(ms, 0)
                }
            }
            IdSpec::Explicit(id) => {
                if (self.entries_added > 0 || self.last_id != StreamId::MIN) && id <= self.last_id {
                    return Err(CmdError::StreamIdTooSmall);
                }
                if id == StreamId::MIN {
                    return Err(CmdError::custom("ERR The ID specified in XADD must be greater than 0-0"));
                }
                id
            }
        };
        self.entries.insert(id, fields);
        self.last_id = id;
        self.entries_added += 1;
        Ok(id)
    }

    /// Inclusive (or exclusive per flag) range scan, ascending or
    /// descending, bounded by `count` (0 = unlimited).
    pub fn range(
        &self,
        start: StreamId,
        start_exclusive: bool,
        end: StreamId,
        end_exclusive: bool,
        count: usize,
        rev: bool,
    ) -> Vec<(StreamId, EntryFields)> {
        if start_exclusive && start == StreamId::MAX {
            return Vec::new();
        }
        let lo = if start_exclusive { start.next() } else { start };
        let hi = end;
        if lo > hi {
            return Vec::new();
        }
        let want = if count == 0 { usize::MAX } else { count };
        let iter = self.entries.range(lo..=hi);
        let filtered = |(id, f): (&StreamId, &EntryFields)| {
            if end_exclusive && *id == end {
                None
            } else {
                Some((*id, f.clone()))
            }
        };
        if rev {
            iter.rev().filter_map(filtered).take(want).collect()
        } else {
            iter.filter_map(filtered).take(want).collect()
        }
    }

    /// Entries with IDs strictly greater than `after` (XREAD semantics).
    pub fn read_after(&self, after: StreamId, count: usize) -> Vec<(StreamId, EntryFields)> {
        if after == StreamId::MAX {
            return Vec::new();
        }
        self.range(after.next(), false, StreamId::MAX, false, count, false)
    }

    pub fn delete(&mut self, ids: &[StreamId]) -> u64 {
        let mut removed = 0;
        for id in ids {
            if self.entries.remove(id).is_some() {
                removed += 1;
                if *id > self.max_deleted_id {
                    self.max_deleted_id = *id;
                }
            }
        }
        removed
    }

    /// Keep at most `maxlen` newest entries.
    pub fn trim_maxlen(&mut self, maxlen: usize) -> u64 {
        let mut removed = 0;
        while self.entries.len() > maxlen {
            let id = *self.entries.keys().next().unwrap();
            self.entries.remove(&id);
            if id > self.max_deleted_id {
                self.max_deleted_id = id;
            }
            removed += 1;
        }
        removed
    }

    /// Drop entries with IDs lower than `minid`.
    pub fn trim_minid(&mut self, minid: StreamId) -> u64 {
        let doomed: Vec<StreamId> = self.entries.range(..minid).map(|(id, _)| *id).collect();
        let n = doomed.len() as u64;
        for id in doomed {
            self.entries.remove(&id);
            if id > self.max_deleted_id {
                self.max_deleted_id = id;
            }
        }
        n
    }

    pub fn create_group(&mut self, name: Vec<u8>, last_delivered: StreamId) -> Result<(), CmdError> {
        if self.groups.contains_key(&name) {
            return Err(CmdError::BusyGroup);
        }
        self.groups.insert(name, Group::new(last_delivered));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> EntryFields {
        pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn auto_ids_are_monotonic() {
        let mut s = StreamVal::new();
        let a = s.add(IdSpec::Auto, fields(&[("f", "1")]), 100).unwrap();
        let b = s.add(IdSpec::Auto, fields(&[("f", "2")]), 100).unwrap();
        let c = s.add(IdSpec::Auto, fields(&[("f", "3")]), 50).unwrap();
        assert_eq!(a, StreamId::new(100, 0));
        assert_eq!(b, StreamId::new(100, 1));
        assert_eq!(c, StreamId::new(100, 2));
    }

    #[test]
    fn explicit_id_must_grow() {
        let mut s = StreamVal::new();
        s.add(IdSpec::Explicit(StreamId::new(5, 0)), fields(&[("a", "b")]), 0).unwrap();
        let err = s.add(IdSpec::Explicit(StreamId::new(5, 0)), fields(&[("a", "b")]), 0);
        assert_eq!(err, Err(CmdError::StreamIdTooSmall));
        s.add(IdSpec::Explicit(StreamId::new(5, 1)), fields(&[("a", "b")]), 0).unwrap();
    }

    #[test]
    fn zero_zero_rejected() {
        let mut s = StreamVal::new();
        assert!(s.add(IdSpec::Explicit(StreamId::MIN), fields(&[("a", "b")]), 0).is_err());
    }

    #[test]
    fn range_and_rev() {
        let mut s = StreamVal::new();
        for i in 1..=5u64 {
            s.add(IdSpec::Explicit(StreamId::new(i, 0)), fields(&[("n", "x")]), 0).unwrap();
        }
        let all = s.range(StreamId::MIN, false, StreamId::MAX, false, 0, false);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].0, StreamId::new(1, 0));
        let rev = s.range(StreamId::MIN, false, StreamId::MAX, false, 2, true);
        assert_eq!(rev[0].0, StreamId::new(5, 0));
        assert_eq!(rev[1].0, StreamId::new(4, 0));
        let tail = s.read_after(StreamId::new(3, 0), 0);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].0, StreamId::new(4, 0));
    }

    #[test]
    fn trim() {
        let mut s = StreamVal::new();
        for i in 1..=5u64 {
            s.add(IdSpec::Explicit(StreamId::new(i, 0)), fields(&[("n", "x")]), 0).unwrap();
        }
        assert_eq!(s.trim_maxlen(2), 3);
        assert_eq!(s.first_id(), Some(StreamId::new(4, 0)));
        assert_eq!(s.trim_minid(StreamId::new(5, 0)), 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn id_parsing() {
        assert_eq!(StreamId::parse(b"5-3", 0).unwrap(), StreamId::new(5, 3));
        assert_eq!(StreamId::parse(b"5", 0).unwrap(), StreamId::new(5, 0));
        assert_eq!(StreamId::parse(b"5", u64::MAX).unwrap(), StreamId::new(5, u64::MAX));
        assert!(StreamId::parse(b"x", 0).is_err());
        assert_eq!(IdSpec::parse(b"*").unwrap(), IdSpec::Auto);
        assert_eq!(IdSpec::parse(b"7-*").unwrap(), IdSpec::MsAuto(7));
        assert_eq!(
            StreamId::parse_range_item(b"(5-1", false).unwrap(),
            (StreamId::new(5, 1), true)
        );
    }
}
