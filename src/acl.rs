/*!
 * Access control lists: per-user command, key, and channel permissions.
 *
 * Rules are kept in the order they were applied and replayed at check time,
 * so later rules override earlier ones the way `ACL SETUSER user +@all
 * -get` reads. Keys and channels are glob patterns; categories are a fixed
 * enum summed into a bitmask per command record.
 */

use crate::errors::CmdError;
use crate::glob::glob_match;
use hashbrown::HashMap;
use rand::Rng;

pub mod category {
    pub const READ: u32 = 1 << 0;
    pub const WRITE: u32 = 1 << 1;
    pub const KEYSPACE: u32 = 1 << 2;
    pub const STRING: u32 = 1 << 3;
    pub const LIST: u32 = 1 << 4;
    pub const SET: u32 = 1 << 5;
    pub const SORTEDSET: u32 = 1 << 6;
    pub const HASH: u32 = 1 << 7;
    pub const STREAM: u32 = 1 << 8;
    pub const FAST: u32 = 1 << 9;
    pub const SLOW: u32 = 1 << 10;
    pub const ADMIN: u32 = 1 << 11;
    pub const CONNECTION: u32 = 1 << 12;
    pub const TRANSACTION: u32 = 1 << 13;
    pub const PUBSUB: u32 = 1 << 14;
    pub const BLOCKING: u32 = 1 << 15;
    pub const DANGEROUS: u32 = 1 << 16;
    pub const ALL: u32 = (1 << 17) - 1;

    pub static NAMES: &[(&str, u32)] = &[
        ("read", READ),
        ("write", WRITE),
        ("keyspace", KEYSPACE),
        ("string", STRING),
        ("list", LIST),
        ("set", SET),
        ("sortedset", SORTEDSET),
        ("hash", HASH),
        ("stream", STREAM),
        ("fast", FAST),
        ("slow", SLOW),
        ("admin", ADMIN),
        ("connection", CONNECTION),
        ("transaction", TRANSACTION),
        ("pubsub", PUBSUB),
        ("blocking", BLOCKING),
        ("dangerous", DANGEROUS),
    ];

    pub fn bit(name: &str) -> Option<u32> {
        NAMES.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CmdSelector {
    All,
    Name(String),
    Category(u32),
}

#[derive(Debug, Clone, PartialEq)]
struct CmdRule {
    allow: bool,
    sel: CmdSelector,
}

#[derive(Debug, Clone)]
pub struct AclUser {
    pub name: String,
    pub enabled: bool,
    pub nopass: bool,
    passwords: Vec<String>,
    cmd_rules: Vec<CmdRule>,
    key_patterns: Vec<Vec<u8>>,
    channel_patterns: Vec<Vec<u8>>,
}

impl AclUser {
    /// A fresh user: off, no passwords, nothing allowed.
    pub fn new(name: impl Into<String>) -> AclUser {
        AclUser {
            name: name.into(),
            enabled: false,
            nopass: false,
            passwords: Vec::new(),
            cmd_rules: Vec::new(),
            key_patterns: Vec::new(),
            channel_patterns: Vec::new(),
        }
    }

    /// The superuser shape the `default` user starts with.
    pub fn default_user() -> AclUser {
        let mut u = AclUser::new("default");
        u.enabled = true;
        u.nopass = true;
        u.apply_rule("+@all").unwrap();
        u.apply_rule("~*").unwrap();
        u.apply_rule("&*").unwrap();
        u
    }

    pub fn check_password(&self, pass: &[u8]) -> bool {
        if self.nopass {
            return true;
        }
        let pass = String::from_utf8_lossy(pass);
        self.passwords.iter().any(|p| p.as_str() == pass)
    }

    /// Replay the rules: the last matching rule decides; default deny.
    pub fn may_run(&self, cmd_name: &str, categories: u32) -> bool {
        let mut allowed = false;
        for rule in &self.cmd_rules {
            let hit = match &rule.sel {
                CmdSelector::All => true,
                CmdSelector::Name(n) => n == cmd_name,
                CmdSelector::Category(mask) => categories & mask != 0,
            };
            if hit {
                allowed = rule.allow;
            }
        }
        allowed
    }

    pub fn may_touch_key(&self, key: &[u8]) -> bool {
        self.key_patterns.iter().any(|p| glob_match(p, key))
    }

    pub fn may_use_channel(&self, channel: &[u8]) -> bool {
        self.channel_patterns.iter().any(|p| glob_match(p, channel))
    }

    /// Apply one SETUSER rule token.
    pub fn apply_rule(&mut self, rule: &str) -> Result<(), CmdError> {
        let lower = rule.to_lowercase();
        match lower.as_str() {
            "on" => self.enabled = true,
            "off" => self.enabled = false,
            "nopass" => {
                self.nopass = true;
                self.passwords.clear();
            }
            "resetpass" => {
                self.nopass = false;
                self.passwords.clear();
            }
            "allcommands" => self.cmd_rules.push(CmdRule { allow: true, sel: CmdSelector::All }),
            "nocommands" => self.cmd_rules.push(CmdRule { allow: false, sel: CmdSelector::All }),
            "allkeys" => {
                self.key_patterns.clear();
                self.key_patterns.push(b"*".to_vec());
            }
            "resetkeys" => self.key_patterns.clear(),
            "allchannels" => {
                self.channel_patterns.clear();
                self.channel_patterns.push(b"*".to_vec());
            }
            "resetchannels" => self.channel_patterns.clear(),
            "reset" => {
                let name = self.name.clone();
                *self = AclUser::new(name);
            }
            _ => {
                if let Some(pass) = rule.strip_prefix('>') {
                    self.nopass = false;
                    if !self.passwords.iter().any(|p| p == pass) {
                        self.passwords.push(pass.to_string());
                    }
                } else if let Some(pass) = rule.strip_prefix('<') {
                    self.passwords.retain(|p| p != pass);
                } else if let Some(cat) = lower.strip_prefix("+@") {
                    let mask = if cat == "all" {
                        category::ALL
                    } else {
                        category::bit(cat).ok_or_else(|| unknown_category(cat))?
                    };
                    let sel = if cat == "all" { CmdSelector::All } else { CmdSelector::Category(mask) };
                    self.cmd_rules.push(CmdRule { allow: true, sel });
                } else if let Some(cat) = lower.strip_prefix("-@") {
                    let mask = if cat == "all" {
                        category::ALL
                    } else {
                        category::bit(cat).ok_or_else(|| unknown_category(cat))?
                    };
                    let sel = if cat == "all" { CmdSelector::All } else { CmdSelector::Category(mask) };
                    self.cmd_rules.push(CmdRule { allow: false, sel });
                } else if let Some(cmd) = lower.strip_prefix('+') {
                    self.cmd_rules.push(CmdRule {
                        allow: true,
                        sel: CmdSelector::Name(cmd.split('|').next().unwrap_or(cmd).to_string()),
                    });
                } else if let Some(cmd) = lower.strip_prefix('-') {
                    self.cmd_rules.push(CmdRule {
                        allow: false,
                        sel: CmdSelector::Name(cmd.split('|').next().unwrap_or(cmd).to_string()),
                    });
                } else if let Some(pat) = rule.strip_prefix('~') {
                    self.key_patterns.push(pat.as_bytes().to_vec());
                } else if let Some(pat) = rule.strip_prefix("%R~").or_else(|| rule.strip_prefix("%W~")).or_else(|| rule.strip_prefix("%RW~")) {
                    // read/write key selectors are accepted; permissions here
                    // do not split by access mode
                    self.key_patterns.push(pat.as_bytes().to_vec());
                } else if let Some(pat) = rule.strip_prefix('&') {
                    self.channel_patterns.push(pat.as_bytes().to_vec());
                } else {
                    return Err(CmdError::custom(format!(
                        "ERR Error in ACL SETUSER modifier '{}': Syntax error",
                        rule
                    )));
                }
            }
        }
        Ok(())
    }

    /// The rule list as `ACL LIST`/`ACL GETUSER` render it.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(if self.enabled { "on".into() } else { "off".into() });
        if self.nopass {
            parts.push("nopass".into());
        } else {
            for p in &self.passwords {
                parts.push(format!(">{}", p));
            }
        }
        for r in &self.cmd_rules {
            let sign = if r.allow { "+" } else { "-" };
            match &r.sel {
                CmdSelector::All => parts.push(format!("{}@all", sign)),
                CmdSelector::Name(n) => parts.push(format!("{}{}", sign, n)),
                CmdSelector::Category(mask) => {
                    for (name, bit) in category::NAMES {
                        if mask & bit != 0 {
                            parts.push(format!("{}@{}", sign, name));
                        }
                    }
                }
            }
        }
        for p in &self.key_patterns {
            parts.push(format!("~{}", String::from_utf8_lossy(p)));
        }
        for p in &self.channel_patterns {
            parts.push(format!("&{}", String::from_utf8_lossy(p)));
        }
        parts.join(" ")
    }
}

fn unknown_category(cat: &str) -> CmdError {
    CmdError::custom(format!("ERR Unknown command or category name in ACL: '@{}'", cat))
}

pub struct AclTable {
    users: HashMap<String, AclUser>,
}

impl Default for AclTable {
    fn default() -> AclTable {
        AclTable::new()
    }
}

impl AclTable {
    pub fn new() -> AclTable {
        let mut users = HashMap::new();
        users.insert("default".to_string(), AclUser::default_user());
        AclTable { users }
    }

    pub fn user(&self, name: &str) -> Option<&AclUser> {
        self.users.get(name)
    }

    pub fn user_mut(&mut self, name: &str) -> Option<&mut AclUser> {
        self.users.get_mut(name)
    }

    pub fn upsert(&mut self, name: &str) -> &mut AclUser {
        self.users
            .entry(name.to_string())
            .or_insert_with(|| AclUser::new(name))
    }

    /// DELUSER; the default user is not removable.
    pub fn remove(&mut self, name: &str) -> Result<bool, CmdError> {
        if name == "default" {
            return Err(CmdError::custom("ERR The 'default' user cannot be removed"));
        }
        Ok(self.users.remove(name).is_some())
    }

    pub fn names(&self) -> Vec<String> {
        let mut v: Vec<String> = self.users.keys().cloned().collect();
        v.sort();
        v
    }

    pub fn iter(&self) -> impl Iterator<Item = &AclUser> {
        self.users.values()
    }

    /// AUTH: find the user, check enabled + password.
    pub fn authenticate(&self, username: &str, password: &[u8]) -> Result<&AclUser, CmdError> {
        let user = self.users.get(username).ok_or(CmdError::WrongPass)?;
        if !user.enabled || !user.check_password(password) {
            return Err(CmdError::WrongPass);
        }
        Ok(user)
    }

    /// Mirror `requirepass` onto the default user the way the config layer
    /// expects: a password set means the default user requires it.
    pub fn sync_requirepass(&mut self, pass: Option<&str>) {
        let user = self.upsert("default");
        match pass {
            Some(p) => {
                user.nopass = false;
                user.passwords = vec![p.to_string()];
            }
            None => {
                user.nopass = true;
                user.passwords.clear();
            }
        }
    }
}

/// ACL GENPASS: `bits` random bits rendered as lowercase hex.
pub fn genpass(bits: usize, rng: &mut impl Rng) -> String {
    let nibbles = bits.div_ceil(4);
    (0..nibbles)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::category::*;

    #[test]
    fn default_user_allows_everything() {
        let table = AclTable::new();
        let u = table.user("default").unwrap();
        assert!(u.enabled && u.nopass);
        assert!(u.may_run("get", READ | STRING));
        assert!(u.may_touch_key(b"any:key"));
        assert!(u.may_use_channel(b"news"));
    }

    #[test]
    fn minus_command_overrides_category() {
        let mut u = AclUser::new("t");
        u.apply_rule("+@read").unwrap();
        u.apply_rule("-get").unwrap();
        assert!(!u.may_run("get", READ | STRING));
        assert!(u.may_run("mget", READ | STRING));
    }

    #[test]
    fn key_patterns_scope_access() {
        let mut u = AclUser::new("t");
        u.apply_rule("~foo:*").unwrap();
        assert!(u.may_touch_key(b"foo:bar"));
        assert!(!u.may_touch_key(b"bar:baz"));
    }

    #[test]
    fn passwords() {
        let mut u = AclUser::new("t");
        u.apply_rule(">secret").unwrap();
        assert!(u.check_password(b"secret"));
        assert!(!u.check_password(b"wrong"));
        u.apply_rule("<secret").unwrap();
        assert!(!u.check_password(b"secret"));
        u.apply_rule("nopass").unwrap();
        assert!(u.check_password(b"anything"));
    }

    #[test]
    fn reset_clears_everything() {
        let mut u = AclUser::new("t");
        u.apply_rule("on").unwrap();
        u.apply_rule("+@all").unwrap();
        u.apply_rule("~*").unwrap();
        u.apply_rule("reset").unwrap();
        assert!(!u.enabled);
        assert!(!u.may_run("get", READ));
        assert!(!u.may_touch_key(b"k"));
    }

    #[test]
    fn authenticate_path() {
        let mut table = AclTable::new();
        let u = table.upsert("alice");
        u.apply_rule("on").unwrap();
        u.apply_rule(">pw").unwrap();
        assert!(table.authenticate("alice", b"pw").is_ok());
        assert!(table.authenticate("alice", b"no").is_err());
        assert!(table.authenticate("ghost", b"pw").is_err());
    }

    #[test]
    fn genpass_length() {
        let mut rng = rand::thread_rng();
        assert_eq!(genpass(256, &mut rng).len(), 64);
        assert_eq!(genpass(10, &mut rng).len(), 3);
    }
}
