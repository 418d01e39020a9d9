/*!
 * Command Error Taxonomy
 *
 * Every failure a command handler can produce, each mapping to one RESP
 * error line. The leading word of the Display output is the RESP error
 * code (`ERR`, `WRONGTYPE`, `NOAUTH`, ...).
 */

use crate::protocol::Reply;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CmdError {
    #[error("ERR unknown command '{0}'")]
    Unknown(String),
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR syntax error")]
    Syntax,
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR value is not a valid float")]
    NotAFloat,
    #[error("ERR increment or decrement would overflow")]
    IntOverflow,
    #[error("ERR {0}")]
    OutOfRange(&'static str),
    #[error("NOAUTH Authentication required.")]
    NoAuth,
    #[error("WRONGPASS invalid username-password pair or user is disabled.")]
    WrongPass,
    #[error("NOPERM {0}")]
    NoPerm(String),
    #[error("ERR Can't execute '{0}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context")]
    SubscriberMode(String),
    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,
    #[error("UNBLOCKED client unblocked via CLIENT UNBLOCK")]
    Unblocked,
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("BUSY {0}")]
    Busy(&'static str),
    #[error("LOADING server is loading the dataset in memory")]
    Loading,
    #[error("ERR Unknown option or number of arguments for CONFIG SET - '{0}'")]
    InvalidConfig(String),
    #[error("ERR {0} is not implemented")]
    NotImplemented(&'static str),
    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,
    #[error("NOGROUP No such consumer group '{0}' for key name '{1}'")]
    NoGroup(String, String),
    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,
    #[error("ERR Invalid stream ID specified as stream command argument")]
    StreamIdInvalid,
    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,
    #[error("ERR {0} without MULTI")]
    WithoutMulti(&'static str),
    /// Full error line, code included, for one-off messages.
    #[error("{0}")]
    Custom(String),
}

impl CmdError {
    pub fn custom(line: impl Into<String>) -> CmdError {
        CmdError::Custom(line.into())
    }
}

impl From<CmdError> for Reply {
    fn from(e: CmdError) -> Reply {
        Reply::Error(e.to_string())
    }
}
