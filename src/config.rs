/*!
 * Server configuration: a schema of recognized parameters with typed
 * validation, stored lowercased in a concurrent map so background threads
 * (the expiry sweeper) read live values without holding server locks.
 */

use crate::errors::CmdError;
use crate::glob::glob_match;
use dashmap::DashMap;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Int { min: i64, max: i64 },
    Bool,
    Memory,
    Str,
    Enum(&'static [&'static str]),
    NotifyFlags,
}

struct Param {
    name: &'static str,
    default: &'static str,
    kind: Kind,
    /// Immutable parameters reject CONFIG SET after startup.
    mutable: bool,
}

static SCHEMA: &[Param] = &[
    Param { name: "maxmemory", default: "0", kind: Kind::Memory, mutable: true },
    Param { name: "maxmemory-policy", default: "noeviction", kind: Kind::Enum(&[
        "noeviction", "allkeys-lru", "volatile-lru", "allkeys-random",
        "volatile-random", "volatile-ttl", "allkeys-lfu", "volatile-lfu",
    ]), mutable: true },
    Param { name: "timeout", default: "0", kind: Kind::Int { min: 0, max: i64::MAX }, mutable: true },
    Param { name: "tcp-keepalive", default: "300", kind: Kind::Int { min: 0, max: i64::MAX }, mutable: true },
    Param { name: "databases", default: "16", kind: Kind::Int { min: 1, max: 10_000 }, mutable: false },
    Param { name: "requirepass", default: "", kind: Kind::Str, mutable: true },
    Param { name: "hz", default: "10", kind: Kind::Int { min: 1, max: 500 }, mutable: true },
    Param { name: "proto-max-bulk-len", default: "536870912", kind: Kind::Memory, mutable: true },
    Param { name: "notify-keyspace-events", default: "", kind: Kind::NotifyFlags, mutable: true },
    Param { name: "appendonly", default: "no", kind: Kind::Bool, mutable: true },
    Param { name: "save", default: "3600 1 300 100 60 10000", kind: Kind::Str, mutable: true },
    Param { name: "maxclients", default: "10000", kind: Kind::Int { min: 1, max: i64::MAX }, mutable: true },
    Param { name: "list-max-listpack-size", default: "128", kind: Kind::Int { min: i64::MIN, max: i64::MAX }, mutable: true },
    Param { name: "hash-max-listpack-entries", default: "128", kind: Kind::Int { min: 0, max: i64::MAX }, mutable: true },
    Param { name: "set-max-intset-entries", default: "512", kind: Kind::Int { min: 0, max: i64::MAX }, mutable: true },
    Param { name: "zset-max-listpack-entries", default: "128", kind: Kind::Int { min: 0, max: i64::MAX }, mutable: true },
];

fn schema_lookup(name: &str) -> Option<&'static Param> {
    SCHEMA.iter().find(|p| p.name == name)
}

pub struct Config {
    values: DashMap<SmolStr, String>,
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let values = DashMap::new();
        for p in SCHEMA {
            values.insert(SmolStr::new(p.name), p.default.to_string());
        }
        Config { values }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.get(name.to_lowercase().as_str()).map(|v| v.clone())
    }

    /// CONFIG GET: every known parameter matching the glob pattern.
    pub fn get_matching(&self, pattern: &[u8]) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = SCHEMA
            .iter()
            .filter(|p| glob_match(pattern, p.name.as_bytes()))
            .map(|p| (p.name.to_string(), self.get(p.name).unwrap_or_default()))
            .collect();
        out.sort();
        out
    }

    /// CONFIG SET with schema validation.
    pub fn set(&self, name: &str, value: &str) -> Result<(), CmdError> {
        let lname = name.to_lowercase();
        let param = schema_lookup(&lname).ok_or_else(|| CmdError::InvalidConfig(name.to_string()))?;
        if !param.mutable {
            return Err(CmdError::custom(format!(
                "ERR Unsupported CONFIG parameter: {}",
                lname
            )));
        }
        let normalized = validate(param, value)?;
        self.values.insert(SmolStr::new(lname), normalized);
        Ok(())
    }

    /// Seed a value at startup, bypassing the mutability check.
    pub fn seed(&self, name: &str, value: &str) {
        self.values.insert(SmolStr::new(name.to_lowercase()), value.to_string());
    }

    pub fn int(&self, name: &str) -> i64 {
        self.get(name)
            .and_then(|v| parse_memory(&v))
            .unwrap_or(0)
    }

    pub fn bool_flag(&self, name: &str) -> bool {
        matches!(self.get(name).as_deref(), Some("yes") | Some("1") | Some("true"))
    }

    pub fn requirepass(&self) -> Option<String> {
        self.get("requirepass").filter(|p| !p.is_empty())
    }

    pub fn databases(&self) -> usize {
        self.int("databases").max(1) as usize
    }

    pub fn hz(&self) -> u64 {
        self.int("hz").clamp(1, 500) as u64
    }

    pub fn notify_flags(&self) -> NotifyFlags {
        NotifyFlags::parse(self.get("notify-keyspace-events").unwrap_or_default().as_bytes())
            .unwrap_or_default()
    }
}

fn validate(param: &Param, value: &str) -> Result<String, CmdError> {
    let bad = || {
        CmdError::custom(format!(
            "ERR Invalid argument '{}' for CONFIG SET '{}'",
            value, param.name
        ))
    };
    match param.kind {
        Kind::Int { min, max } => {
            let v: i64 = value.parse().map_err(|_| bad())?;
            if v < min || v > max {
                return Err(CmdError::custom(format!(
                    "ERR argument must be between {} and {} inclusive",
                    min, max
                )));
            }
            Ok(v.to_string())
        }
        Kind::Bool => match value.to_lowercase().as_str() {
            "yes" | "no" => Ok(value.to_lowercase()),
            _ => Err(CmdError::custom("ERR argument must be 'yes' or 'no'".to_string())),
        },
        Kind::Memory => {
            let v = parse_memory(value).ok_or_else(bad)?;
            Ok(v.to_string())
        }
        Kind::Str => Ok(value.to_string()),
        Kind::Enum(options) => {
            let lower = value.to_lowercase();
            if options.contains(&lower.as_str()) {
                Ok(lower)
            } else {
                Err(bad())
            }
        }
        Kind::NotifyFlags => {
            NotifyFlags::parse(value.as_bytes()).map_err(|_| bad())?;
            Ok(value.to_string())
        }
    }
}

/// Parse `100`, `100kb`, `7mb`, `2gb` (decimal and binary suffixes) into a
/// plain integer.
pub fn parse_memory(s: &str) -> Option<i64> {
    let s = s.trim().to_lowercase();
    let (digits, mult) = if let Some(d) = s.strip_suffix("kb") {
        (d, 1024)
    } else if let Some(d) = s.strip_suffix("mb") {
        (d, 1024 * 1024)
    } else if let Some(d) = s.strip_suffix("gb") {
        (d, 1024 * 1024 * 1024)
    } else if let Some(d) = s.strip_suffix('k') {
        (d, 1000)
    } else if let Some(d) = s.strip_suffix('m') {
        (d, 1_000_000)
    } else if let Some(d) = s.strip_suffix('g') {
        (d, 1_000_000_000)
    } else {
        (s.as_str(), 1)
    };
    digits.trim().parse::<i64>().ok()?.checked_mul(mult)
}

/// Parsed `notify-keyspace-events` flag string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyFlags {
    pub keyspace: bool,
    pub keyevent: bool,
    pub classes: u32,
}

impl NotifyFlags {
    pub const GENERIC: u32 = 1 << 0;
    pub const STRING: u32 = 1 << 1;
    pub const LIST: u32 = 1 << 2;
    pub const SET: u32 = 1 << 3;
    pub const HASH: u32 = 1 << 4;
    pub const ZSET: u32 = 1 << 5;
    pub const EXPIRED: u32 = 1 << 6;
    pub const EVICTED: u32 = 1 << 7;
    pub const STREAM: u32 = 1 << 8;
    pub const KEY_MISS: u32 = 1 << 9;
    pub const NEW_KEY: u32 = 1 << 10;
    const ALL_CLASSES: u32 = Self::GENERIC
        | Self::STRING
        | Self::LIST
        | Self::SET
        | Self::HASH
        | Self::ZSET
        | Self::EXPIRED
        | Self::EVICTED
        | Self::STREAM;

    pub fn parse(s: &[u8]) -> Result<NotifyFlags, ()> {
        let mut f = NotifyFlags::default();
        for &c in s {
            match c {
                b'K' => f.keyspace = true,
                b'E' => f.keyevent = true,
                b'g' => f.classes |= Self::GENERIC,
                b'$' => f.classes |= Self::STRING,
                b'l' => f.classes |= Self::LIST,
                b's' => f.classes |= Self::SET,
                b'h' => f.classes |= Self::HASH,
                b'z' => f.classes |= Self::ZSET,
                b'x' => f.classes |= Self::EXPIRED,
                b'e' => f.classes |= Self::EVICTED,
                b't' => f.classes |= Self::STREAM,
                b'm' => f.classes |= Self::KEY_MISS,
                b'n' => f.classes |= Self::NEW_KEY,
                b'A' => f.classes |= Self::ALL_CLASSES,
                _ => return Err(()),
            }
        }
        Ok(f)
    }

    pub fn wants(&self, class: u32) -> bool {
        (self.keyspace || self.keyevent) && self.classes & class != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_present() {
        let c = Config::new();
        assert_eq!(c.get("databases").as_deref(), Some("16"));
        assert_eq!(c.databases(), 16);
        assert!(c.requirepass().is_none());
    }

    #[test]
    fn set_validates() {
        let c = Config::new();
        assert!(c.set("hz", "50").is_ok());
        assert_eq!(c.hz(), 50);
        assert!(c.set("hz", "not-a-number").is_err());
        assert!(c.set("no-such-option", "1").is_err());
        assert!(c.set("maxmemory-policy", "allkeys-lru").is_ok());
        assert!(c.set("maxmemory-policy", "bogus").is_err());
        // databases is fixed after startup
        assert!(c.set("databases", "32").is_err());
    }

    #[test]
    fn memory_suffixes() {
        assert_eq!(parse_memory("100"), Some(100));
        assert_eq!(parse_memory("1kb"), Some(1024));
        assert_eq!(parse_memory("2m"), Some(2_000_000));
        assert_eq!(parse_memory("1gb"), Some(1 << 30));
        assert_eq!(parse_memory("oops"), None);
    }

    #[test]
    fn config_get_glob() {
        let c = Config::new();
        let got = c.get_matching(b"max*");
        assert!(got.iter().any(|(k, _)| k == "maxmemory"));
        assert!(got.iter().any(|(k, _)| k == "maxclients"));
    }

    #[test]
    fn notify_flag_parsing() {
        let f = NotifyFlags::parse(b"KEA").unwrap();
        assert!(f.keyspace && f.keyevent);
        assert!(f.wants(NotifyFlags::LIST));
        let f = NotifyFlags::parse(b"El").unwrap();
        assert!(!f.keyspace && f.keyevent);
        assert!(f.wants(NotifyFlags::LIST));
        assert!(!f.wants(NotifyFlags::HASH));
        assert!(NotifyFlags::parse(b"Kq").is_err());
    }
}
