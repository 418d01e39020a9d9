/*!
 * Hash values: field → value byte maps. Iteration order is whatever the
 * table yields; HSCAN exposes it only as a non-guaranteed hint.
 */

use crate::errors::CmdError;
use crate::value::BytesMap;
use rand::seq::IteratorRandom;
use rand::Rng;

#[derive(Debug, Clone, Default)]
pub struct HashVal {
    map: BytesMap<Vec<u8>>,
}

impl HashVal {
    pub fn new() -> HashVal {
        HashVal::default()
    }

    /// Insert or overwrite a field. Returns true when the field is new.
    pub fn set(&mut self, field: Vec<u8>, value: Vec<u8>) -> bool {
        self.map.insert(field, value).is_none()
    }

    pub fn set_nx(&mut self, field: Vec<u8>, value: Vec<u8>) -> bool {
        if self.map.contains_key(&field) {
            false
        } else {
            self.map.insert(field, value);
            true
        }
    }

    pub fn get(&self, field: &[u8]) -> Option<&Vec<u8>> {
        self.map.get(field)
    }

    pub fn del(&mut self, field: &[u8]) -> bool {
        self.map.remove(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn exists(&self, field: &[u8]) -> bool {
        self.map.contains_key(field)
    }

    pub fn strlen(&self, field: &[u8]) -> usize {
        self.map.get(field).map(|v| v.len()).unwrap_or(0)
    }

    pub fn incr_by(&mut self, field: &[u8], delta: i64) -> Result<i64, CmdError> {
        let cur = match self.map.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(CmdError::custom("ERR hash value is not an integer"))?,
            None => 0,
        };
        let next = cur.checked_add(delta).ok_or(CmdError::IntOverflow)?;
        self.map.insert(field.to_vec(), next.to_string().into_bytes());
        Ok(next)
    }

    pub fn incr_by_float(&mut self, field: &[u8], delta: f64) -> Result<f64, CmdError> {
        let cur = match self.map.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or(CmdError::custom("ERR hash value is not a float"))?,
            None => 0.0,
        };
        let next = cur + delta;
        if next.is_nan() || next.is_infinite() {
            return Err(CmdError::custom("ERR increment would produce NaN or Infinity"));
        }
        self.map
            .insert(field.to_vec(), crate::protocol::format_double(next).into_bytes());
        Ok(next)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.map.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.map.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.map.iter()
    }

    /// HRANDFIELD selection: a positive count samples distinct fields, a
    /// negative count samples with replacement.
    pub fn rand_fields(&self, count: i64, rng: &mut impl Rng) -> Vec<(&Vec<u8>, &Vec<u8>)> {
        if self.map.is_empty() {
            return Vec::new();
        }
        if count >= 0 {
            let n = (count as usize).min(self.map.len());
            self.map.iter().choose_multiple(rng, n)
        } else {
            let n = (-count) as usize;
            (0..n)
                .filter_map(|_| self.map.iter().choose(rng))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_del() {
        let mut h = HashVal::new();
        assert!(h.set(b"f".to_vec(), b"1".to_vec()));
        assert!(!h.set(b"f".to_vec(), b"2".to_vec()));
        assert_eq!(h.get(b"f"), Some(&b"2".to_vec()));
        assert!(h.del(b"f"));
        assert!(!h.del(b"f"));
        assert!(h.is_empty());
    }

    #[test]
    fn incr_rejects_non_numeric() {
        let mut h = HashVal::new();
        h.set(b"f".to_vec(), b"oops".to_vec());
        assert!(h.incr_by(b"f", 1).is_err());
        assert_eq!(h.incr_by(b"g", 3).unwrap(), 3);
        assert_eq!(h.incr_by(b"g", -1).unwrap(), 2);
    }

    #[test]
    fn rand_fields_counts() {
        let mut h = HashVal::new();
        for i in 0..5 {
            h.set(format!("f{}", i).into_bytes(), b"v".to_vec());
        }
        let mut rng = rand::thread_rng();
        assert_eq!(h.rand_fields(3, &mut rng).len(), 3);
        assert_eq!(h.rand_fields(10, &mut rng).len(), 5);
        assert_eq!(h.rand_fields(-10, &mut rng).len(), 10);
    }
}
