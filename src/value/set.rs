/*!
 * Set values: unordered unique byte strings, with the union/intersection/
 * difference algebra used by the S*STORE family.
 */

use crate::value::BytesSet;
use rand::seq::IteratorRandom;
use rand::Rng;

#[derive(Debug, Clone, Default)]
pub struct SetVal {
    items: BytesSet,
}

impl SetVal {
    pub fn new() -> SetVal {
        SetVal::default()
    }

    pub fn add(&mut self, member: Vec<u8>) -> bool {
        self.items.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.items.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.items.contains(member)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.items.iter()
    }

    /// Random members; negative count samples with replacement.
    pub fn random(&self, count: i64, rng: &mut impl Rng) -> Vec<Vec<u8>> {
        if self.items.is_empty() {
            return Vec::new();
        }
        if count >= 0 {
            let n = (count as usize).min(self.items.len());
            self.items.iter().choose_multiple(rng, n).into_iter().cloned().collect()
        } else {
            let n = (-count) as usize;
            (0..n)
                .filter_map(|_| self.items.iter().choose(rng).cloned())
                .collect()
        }
    }

    /// Remove and return up to `count` random members.
    pub fn pop(&mut self, count: usize, rng: &mut impl Rng) -> Vec<Vec<u8>> {
        let n = count.min(self.items.len());
        let picked: Vec<Vec<u8>> = self.items.iter().choose_multiple(rng, n).into_iter().cloned().collect();
        for m in &picked {
            self.items.remove(m);
        }
        picked
    }
}

/// Union of several sets (absent keys are empty sets).
pub fn union(sets: &[Option<&SetVal>]) -> Vec<Vec<u8>> {
    let mut out = BytesSet::default();
    for s in sets.iter().flatten() {
        for m in s.members() {
            out.insert(m.clone());
        }
    }
    out.into_iter().collect()
}

/// Intersection; any absent key makes the result empty. `limit` of 0 means
/// unbounded (used by SINTERCARD).
pub fn intersect(sets: &[Option<&SetVal>], limit: usize) -> Vec<Vec<u8>> {
    let mut smallest: Option<&SetVal> = None;
    for s in sets {
        match s {
            None => return Vec::new(),
            Some(s) => {
                if smallest.map(|cur| s.len() < cur.len()).unwrap_or(true) {
                    smallest = Some(s);
                }
            }
        }
    }
    let smallest = match smallest {
        Some(s) => s,
        None => return Vec::new(),
    };
    let mut out = Vec::new();
    for m in smallest.members() {
        if sets.iter().all(|s| s.map(|s| s.contains(m)).unwrap_or(false)) {
            out.push(m.clone());
            if limit != 0 && out.len() >= limit {
                break;
            }
        }
    }
    out
}

/// First set minus every following set.
pub fn diff(sets: &[Option<&SetVal>]) -> Vec<Vec<u8>> {
    let first = match sets.first().and_then(|s| *s) {
        Some(s) => s,
        None => return Vec::new(),
    };
    first
        .members()
        .filter(|m| !sets[1..].iter().any(|s| s.map(|s| s.contains(m)).unwrap_or(false)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(members: &[&str]) -> SetVal {
        let mut s = SetVal::new();
        for m in members {
            s.add(m.as_bytes().to_vec());
        }
        s
    }

    #[test]
    fn add_is_unique() {
        let mut s = SetVal::new();
        assert!(s.add(b"a".to_vec()));
        assert!(!s.add(b"a".to_vec()));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn algebra() {
        let a = set(&["a", "b", "c"]);
        let b = set(&["b", "c", "d"]);
        let mut u = union(&[Some(&a), Some(&b)]);
        u.sort();
        assert_eq!(u, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        let mut i = intersect(&[Some(&a), Some(&b)], 0);
        i.sort();
        assert_eq!(i, vec![b"b".to_vec(), b"c".to_vec()]);
        let d = diff(&[Some(&a), Some(&b)]);
        assert_eq!(d, vec![b"a".to_vec()]);
        assert!(intersect(&[Some(&a), None], 0).is_empty());
    }

    #[test]
    fn intersect_limit() {
        let a = set(&["a", "b", "c"]);
        let b = set(&["a", "b", "c"]);
        assert_eq!(intersect(&[Some(&a), Some(&b)], 2).len(), 2);
    }

    #[test]
    fn pop_removes() {
        let mut s = set(&["a", "b", "c"]);
        let mut rng = rand::thread_rng();
        let popped = s.pop(2, &mut rng);
        assert_eq!(popped.len(), 2);
        assert_eq!(s.len(), 1);
    }
}
