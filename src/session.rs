/*!
 * Per-connection session state machine: authentication, selected DB,
 * reply mode, transaction queue, watched keys, subscriptions, and the
 * negotiated RESP version.
 */

use crate::blocking::BlockedState;
use crate::protocol::Request;
use crate::value::BytesSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    On,
    Off,
    /// Silence exactly the next reply, then revert to On.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    None,
    Queueing,
    /// A queue error occurred; EXEC will abort.
    DirtyExec,
}

pub struct Session {
    pub id: u64,
    pub addr: String,
    pub name: Vec<u8>,
    pub db_index: usize,
    /// ACL identity; meaningful once `authenticated`.
    pub user: String,
    pub authenticated: bool,
    pub protover: u8,
    pub reply_mode: ReplyMode,
    pub tx: TxState,
    pub queued: Vec<Request>,
    /// (db index, key, version observed at WATCH time).
    pub watched: Vec<(usize, Vec<u8>, u64)>,
    pub channels: BytesSet,
    pub patterns: BytesSet,
    pub blocked: Option<BlockedState>,
    pub no_evict: bool,
    pub no_touch: bool,
    pub created_ms: u64,
    pub last_command: String,
    /// Set by QUIT / fatal errors; the reactor closes after flushing.
    pub close_after_reply: bool,
}

impl Session {
    /// `auth_required` reflects whether a password is configured at accept
    /// time; without one the session starts authenticated as `default`.
    pub fn new(id: u64, addr: String, auth_required: bool, now_ms: u64) -> Session {
        Session {
            id,
            addr,
            name: Vec::new(),
            db_index: 0,
            user: "default".to_string(),
            authenticated: !auth_required,
            protover: 2,
            reply_mode: ReplyMode::On,
            tx: TxState::None,
            queued: Vec::new(),
            watched: Vec::new(),
            channels: BytesSet::default(),
            patterns: BytesSet::default(),
            blocked: None,
            no_evict: false,
            no_touch: false,
            created_ms: now_ms,
            last_command: String::new(),
            close_after_reply: false,
        }
    }

    pub fn sub_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// RESP2 sessions with live subscriptions accept only the subscriber
    /// command set; RESP3 lifts the restriction.
    pub fn in_subscriber_mode(&self) -> bool {
        self.protover == 2 && self.sub_count() > 0
    }

    pub fn in_tx(&self) -> bool {
        !matches!(self.tx, TxState::None)
    }

    /// Abandon the transaction; watched keys are released by the executor,
    /// which owns the DB locks.
    pub fn clear_tx(&mut self) {
        self.tx = TxState::None;
        self.queued.clear();
    }

    /// RESET: back to a freshly-accepted state (keeping identity fields and
    /// the negotiated protocol).
    pub fn reset(&mut self, auth_required: bool) {
        self.db_index = 0;
        self.user = "default".to_string();
        self.authenticated = !auth_required;
        self.reply_mode = ReplyMode::On;
        self.clear_tx();
        self.watched.clear();
        self.name.clear();
        self.blocked = None;
    }

    /// Whether the reply to the command just executed should be sent, and
    /// advance the Skip state machine.
    pub fn take_reply_permission(&mut self) -> bool {
        match self.reply_mode {
            ReplyMode::On => true,
            ReplyMode::Off => false,
            ReplyMode::Skip => {
                self.reply_mode = ReplyMode::On;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_silences_exactly_one() {
        let mut s = Session::new(1, "test".into(), false, 0);
        s.reply_mode = ReplyMode::Skip;
        assert!(!s.take_reply_permission());
        assert!(s.take_reply_permission());
    }

    #[test]
    fn subscriber_mode_is_resp2_only() {
        let mut s = Session::new(1, "test".into(), false, 0);
        s.channels.insert(b"c".to_vec());
        assert!(s.in_subscriber_mode());
        s.protover = 3;
        assert!(!s.in_subscriber_mode());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut s = Session::new(1, "test".into(), true, 0);
        s.authenticated = true;
        s.db_index = 3;
        s.tx = TxState::Queueing;
        s.queued.push(vec![b"SET".to_vec()]);
        s.reset(true);
        assert!(!s.authenticated);
        assert_eq!(s.db_index, 0);
        assert_eq!(s.tx, TxState::None);
        assert!(s.queued.is_empty());
    }
}
