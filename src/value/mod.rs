/*!
 * Typed Value Model
 *
 * The six value kinds a key can hold. Each kind lives in its own module and
 * exposes a minimal operator set; operators are pure functions of the value
 * plus arguments and fail with a typed error. Type tags are matched by the
 * keyspace accessors, which produce WRONGTYPE on mismatch.
 */

pub mod hash;
pub mod list;
pub mod set;
pub mod stream;
pub mod string;
pub mod zset;

pub use hash::HashVal;
pub use list::ListVal;
pub use set::SetVal;
pub use stream::{StreamId, StreamVal};
pub use string::StrVal;
pub use zset::ZsetVal;

use crate::errors::CmdError;

/// Byte-keyed map with the ahash hasher, the workhorse of the value model.
pub type BytesMap<V> = hashbrown::HashMap<Vec<u8>, V, ahash::RandomState>;
/// Byte set with the ahash hasher.
pub type BytesSet = hashbrown::HashSet<Vec<u8>, ahash::RandomState>;

#[derive(Debug, Clone)]
pub enum Value {
    Str(StrVal),
    List(ListVal),
    Hash(HashVal),
    Set(SetVal),
    Zset(ZsetVal),
    Stream(StreamVal),
}

impl Value {
    /// The name reported by TYPE and used by SCAN's TYPE filter.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::Zset(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }

    /// True when a container write has drained the value; the keyspace then
    /// deletes the key. Streams persist when empty (groups survive XDEL).
    pub fn is_drained(&self) -> bool {
        match self {
            Value::Str(_) | Value::Stream(_) => false,
            Value::List(l) => l.len() == 0,
            Value::Hash(h) => h.len() == 0,
            Value::Set(s) => s.len() == 0,
            Value::Zset(z) => z.len() == 0,
        }
    }

    pub fn as_str(&self) -> Result<&StrVal, CmdError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_str_mut(&mut self) -> Result<&mut StrVal, CmdError> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&ListVal, CmdError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut ListVal, CmdError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashVal, CmdError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashVal, CmdError> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&SetVal, CmdError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut SetVal, CmdError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&ZsetVal, CmdError> {
        match self {
            Value::Zset(z) => Ok(z),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut ZsetVal, CmdError> {
        match self {
            Value::Zset(z) => Ok(z),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_stream(&self) -> Result<&StreamVal, CmdError> {
        match self {
            Value::Stream(s) => Ok(s),
            _ => Err(CmdError::WrongType),
        }
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut StreamVal, CmdError> {
        match self {
            Value::Stream(s) => Ok(s),
            _ => Err(CmdError::WrongType),
        }
    }
}

/// Normalize a (start, stop) pair of possibly-negative indices against a
/// container of `len` elements. Returns None for an empty slice.
pub fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
