// Core modules for the cindr key-value store
pub mod acl; // users, categories, key/channel patterns
pub mod blocking; // parked-waiter records + wake logic
pub mod commands; // command registry, argument grammar, executor
pub mod config; // schema-validated configuration
pub mod errors; // RESP error taxonomy
pub mod expire; // active-expiry sweeper thread
pub mod glob; // glob matcher for KEYS/MATCH/ACL/patterns
pub mod net; // mio reactor (accept + read + execute + write)
pub mod protocol; // RESP2/RESP3 codec: requests in, replies out
pub mod pubsub; // channel/pattern subscription registry
pub mod server; // shared server state
pub mod session; // per-connection state machine
pub mod storage; // keyspace: dict + expiry + watch + waiters
pub mod value; // the six value kinds

pub use commands::{dispatch, Ctx, Outcome};
pub use errors::CmdError;
pub use protocol::{parse_many, parse_request, Reply, Request};
pub use server::Server;
pub use session::Session;
pub use storage::Db;
pub use value::Value;

// Default listen address - standard RESP port
pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";
