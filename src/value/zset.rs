/*!
 * Sorted set values: unique members with a double score, totally ordered by
 * (score ascending, member lexicographic ascending). The member map and the
 * ordered index always agree; NaN scores are rejected at the parse layer so
 * the score ordering is total.
 */

use crate::errors::CmdError;
use crate::value::BytesMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// f64 wrapper with a total order. Safe because NaN never enters a zset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreKey(pub f64);

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// One end of a score interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    /// Parse `3.5`, `(3.5`, `+inf`, `-inf`.
    pub fn parse(arg: &[u8]) -> Result<ScoreBound, CmdError> {
        let (exclusive, rest) = match arg.first() {
            Some(b'(') => (true, &arg[1..]),
            _ => (false, arg),
        };
        let value = parse_score(rest).map_err(|_| CmdError::custom("ERR min or max is not a float"))?;
        Ok(ScoreBound { value, exclusive })
    }

    fn admits_low(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    fn admits_high(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

/// One end of a lexicographic interval.
#[derive(Debug, Clone, PartialEq)]
pub enum LexBound {
    NegInf,
    PosInf,
    Incl(Vec<u8>),
    Excl(Vec<u8>),
}

impl LexBound {
    /// Parse `-`, `+`, `[member`, `(member`.
    pub fn parse(arg: &[u8]) -> Result<LexBound, CmdError> {
        match arg.split_first() {
            Some((b'-', rest)) if rest.is_empty() => Ok(LexBound::NegInf),
            Some((b'+', rest)) if rest.is_empty() => Ok(LexBound::PosInf),
            Some((b'[', rest)) => Ok(LexBound::Incl(rest.to_vec())),
            Some((b'(', rest)) => Ok(LexBound::Excl(rest.to_vec())),
            _ => Err(CmdError::custom("ERR min or max not valid string range item")),
        }
    }

    fn admits_low(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Incl(m) => member >= &m[..],
            LexBound::Excl(m) => member > &m[..],
        }
    }

    fn admits_high(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Incl(m) => member <= &m[..],
            LexBound::Excl(m) => member < &m[..],
        }
    }
}

/// Parse a score argument; accepts `inf`, `+inf`, `-inf`, rejects NaN.
pub fn parse_score(arg: &[u8]) -> Result<f64, CmdError> {
    let s = std::str::from_utf8(arg).map_err(|_| CmdError::NotAFloat)?;
    let f = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        other => other.parse::<f64>().map_err(|_| CmdError::NotAFloat)?,
    };
    if f.is_nan() {
        return Err(CmdError::NotAFloat);
    }
    Ok(f)
}

#[derive(Debug, Clone, Default)]
pub struct ZsetVal {
    map: BytesMap<f64>,
    sorted: BTreeSet<(ScoreKey, Vec<u8>)>,
}

impl ZsetVal {
    pub fn new() -> ZsetVal {
        ZsetVal::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.map.get(member).copied()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.map.contains_key(member)
    }

    /// Insert or update. Returns true when the member is new.
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        match self.map.insert(member.clone(), score) {
            Some(old) => {
                self.sorted.remove(&(ScoreKey(old), member.clone()));
                self.sorted.insert((ScoreKey(score), member));
                false
            }
            None => {
                self.sorted.insert((ScoreKey(score), member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.map.remove(member) {
            Some(score) => {
                self.sorted.remove(&(ScoreKey(score), member.to_vec()));
                true
            }
            None => false,
        }
    }

    pub fn incr(&mut self, member: &[u8], delta: f64) -> Result<f64, CmdError> {
        let next = self.map.get(member).copied().unwrap_or(0.0) + delta;
        if next.is_nan() {
            return Err(CmdError::custom("ERR resulting score is not a number (NaN)"));
        }
        self.insert(member.to_vec(), next);
        Ok(next)
    }

    /// 0-based rank in the chosen direction.
    pub fn rank(&self, member: &[u8], rev: bool) -> Option<usize> {
        let score = self.score(member)?;
        let target = (ScoreKey(score), member.to_vec());
        let fwd = self.sorted.range(..&target).count();
        Some(if rev { self.map.len() - 1 - fwd } else { fwd })
    }

    /// Members in order (or reverse order) by rank window, inclusive.
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(Vec<u8>, f64)> {
        match crate::value::normalize_range(self.map.len(), start, stop) {
            Some((s, e)) => {
                let pick = |it: &(ScoreKey, Vec<u8>)| (it.1.clone(), it.0 .0);
                if rev {
                    self.sorted.iter().rev().skip(s).take(e - s + 1).map(pick).collect()
                } else {
                    self.sorted.iter().skip(s).take(e - s + 1).map(pick).collect()
                }
            }
            None => Vec::new(),
        }
    }

    /// Score interval query with LIMIT offset/count (count < 0 = unbounded).
    pub fn range_by_score(
        &self,
        min: &ScoreBound,
        max: &ScoreBound,
        rev: bool,
        offset: usize,
        count: i64,
    ) -> Vec<(Vec<u8>, f64)> {
        let admitted = |score: f64| min.admits_low(score) && max.admits_high(score);
        let want = if count < 0 { usize::MAX } else { count as usize };
        let mut out = Vec::new();
        let mut skipped = 0usize;
        let iter: Box<dyn Iterator<Item = &(ScoreKey, Vec<u8>)> + '_> = if rev {
            Box::new(self.sorted.iter().rev())
        } else {
            Box::new(self.sorted.iter())
        };
        for (key, member) in iter {
            let score = key.0;
            // ordered iteration: once past the far bound nothing else matches
            if if rev { !min.admits_low(score) } else { !max.admits_high(score) } {
                break;
            }
            if !admitted(score) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            out.push((member.clone(), score));
            if out.len() >= want {
                break;
            }
        }
        out
    }

    pub fn count_by_score(&self, min: &ScoreBound, max: &ScoreBound) -> usize {
        self.sorted
            .iter()
            .filter(|(k, _)| min.admits_low(k.0) && max.admits_high(k.0))
            .count()
    }

    /// Lexicographic interval query; meaningful when all scores are equal.
    pub fn range_by_lex(
        &self,
        min: &LexBound,
        max: &LexBound,
        rev: bool,
        offset: usize,
        count: i64,
    ) -> Vec<(Vec<u8>, f64)> {
        let admitted = |m: &[u8]| min.admits_low(m) && max.admits_high(m);
        let want = if count < 0 { usize::MAX } else { count as usize };
        let mut out = Vec::new();
        let mut skipped = 0usize;
        let iter: Box<dyn Iterator<Item = &(ScoreKey, Vec<u8>)> + '_> = if rev {
            Box::new(self.sorted.iter().rev())
        } else {
            Box::new(self.sorted.iter())
        };
        for (key, member) in iter {
            if !admitted(member) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            out.push((member.clone(), key.0));
            if out.len() >= want {
                break;
            }
        }
        out
    }

    pub fn count_by_lex(&self, min: &LexBound, max: &LexBound) -> usize {
        self.sorted
            .iter()
            .filter(|(_, m)| min.admits_low(m) && max.admits_high(m))
            .count()
    }

    /// Pop `count` members from the low (min) or high (max) end.
    pub fn pop_end(&mut self, max_end: bool, count: usize) -> Vec<(Vec<u8>, f64)> {
        let mut out = Vec::new();
        for _ in 0..count {
            let picked = if max_end {
                self.sorted.iter().next_back().cloned()
            } else {
                self.sorted.iter().next().cloned()
            };
            match picked {
                Some((key, member)) => {
                    self.sorted.remove(&(key, member.clone()));
                    self.map.remove(&member);
                    out.push((member, key.0));
                }
                None => break,
            }
        }
        out
    }

    pub fn remrange_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let doomed: Vec<Vec<u8>> = self
            .range_by_rank(start, stop, false)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        for m in &doomed {
            self.remove(m);
        }
        doomed.len()
    }

    pub fn remrange_by_score(&mut self, min: &ScoreBound, max: &ScoreBound) -> usize {
        let doomed: Vec<Vec<u8>> = self
            .range_by_score(min, max, false, 0, -1)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        for m in &doomed {
            self.remove(m);
        }
        doomed.len()
    }

    pub fn remrange_by_lex(&mut self, min: &LexBound, max: &LexBound) -> usize {
        let doomed: Vec<Vec<u8>> = self
            .range_by_lex(min, max, false, 0, -1)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        for m in &doomed {
            self.remove(m);
        }
        doomed.len()
    }

    /// In-order iteration of (member, score).
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, f64)> {
        self.sorted.iter().map(|(k, m)| (m, k.0))
    }

    /// Random members; negative count samples with replacement.
    pub fn random(&self, count: i64, rng: &mut impl rand::Rng) -> Vec<(Vec<u8>, f64)> {
        use rand::seq::IteratorRandom;
        if self.map.is_empty() {
            return Vec::new();
        }
        if count >= 0 {
            let n = (count as usize).min(self.map.len());
            self.map
                .iter()
                .choose_multiple(rng, n)
                .into_iter()
                .map(|(m, s)| (m.clone(), *s))
                .collect()
        } else {
            (0..(-count) as usize)
                .filter_map(|_| self.map.iter().choose(rng).map(|(m, s)| (m.clone(), *s)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(entries: &[(&str, f64)]) -> ZsetVal {
        let mut z = ZsetVal::new();
        for (m, s) in entries {
            z.insert(m.as_bytes().to_vec(), *s);
        }
        z
    }

    #[test]
    fn orderings_agree() {
        let mut z = zset(&[("b", 2.0), ("a", 1.0), ("c", 3.0)]);
        assert_eq!(z.len(), 3);
        let in_order: Vec<_> = z.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(in_order, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        // score update moves the member, never duplicates it
        z.insert(b"a".to_vec(), 10.0);
        assert_eq!(z.len(), 3);
        let in_order: Vec<_> = z.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(in_order, vec![b"b".to_vec(), b"c".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn ties_break_lexicographically() {
        let z = zset(&[("b", 1.0), ("a", 1.0), ("c", 1.0)]);
        let order: Vec<_> = z.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(order, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn rank_both_directions() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(z.rank(b"a", false), Some(0));
        assert_eq!(z.rank(b"a", true), Some(2));
        assert_eq!(z.rank(b"nope", false), None);
    }

    #[test]
    fn score_ranges() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let min = ScoreBound::parse(b"2").unwrap();
        let max = ScoreBound::parse(b"+inf").unwrap();
        let got: Vec<_> = z.range_by_score(&min, &max, false, 0, -1).into_iter().map(|(m, _)| m).collect();
        assert_eq!(got, vec![b"b".to_vec(), b"c".to_vec()]);
        let min = ScoreBound::parse(b"(1").unwrap();
        let max = ScoreBound::parse(b"(3").unwrap();
        let got: Vec<_> = z.range_by_score(&min, &max, false, 0, -1).into_iter().map(|(m, _)| m).collect();
        assert_eq!(got, vec![b"b".to_vec()]);
    }

    #[test]
    fn lex_ranges() {
        let z = zset(&[("a", 0.0), ("b", 0.0), ("c", 0.0), ("d", 0.0)]);
        let got: Vec<_> = z
            .range_by_lex(&LexBound::parse(b"[b").unwrap(), &LexBound::parse(b"(d").unwrap(), false, 0, -1)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(got, vec![b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(z.count_by_lex(&LexBound::NegInf, &LexBound::PosInf), 4);
    }

    #[test]
    fn pop_ends() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(z.pop_end(false, 1), vec![(b"a".to_vec(), 1.0)]);
        assert_eq!(z.pop_end(true, 2), vec![(b"c".to_vec(), 3.0), (b"b".to_vec(), 2.0)]);
        assert!(z.is_empty());
    }

    #[test]
    fn remrange() {
        let mut z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        assert_eq!(z.remrange_by_rank(0, 1), 2);
        assert_eq!(z.len(), 2);
        let min = ScoreBound::parse(b"-inf").unwrap();
        let max = ScoreBound::parse(b"3").unwrap();
        assert_eq!(z.remrange_by_score(&min, &max), 1);
        assert_eq!(z.len(), 1);
    }
}
