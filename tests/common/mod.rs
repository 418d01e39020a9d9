#![allow(dead_code)]

use bytes::BytesMut;
use cindr::commands::{dispatch, Ctx, Outcome};
use cindr::config::Config;
use cindr::protocol::{encode_reply, Reply};
use cindr::server::Server;
use cindr::session::Session;
use std::sync::Arc;

/// Executor-level harness: a server plus one registered session, commands
/// fed as whitespace-separated lines.
pub struct Harness {
    pub server: Arc<Server>,
    pub session: Session,
}

impl Harness {
    pub fn new() -> Harness {
        Harness::with_config(Config::new())
    }

    pub fn with_config(config: Config) -> Harness {
        let server = Server::new(config);
        let session = register_session(&server);
        Harness { server, session }
    }

    /// Another connected client on the same server.
    pub fn second_session(&self) -> Session {
        register_session(&self.server)
    }

    pub fn argv(line: &str) -> Vec<Vec<u8>> {
        line.split_whitespace().map(|t| t.as_bytes().to_vec()).collect()
    }

    /// Run a command on the harness session; panics on a Block outcome.
    pub fn run(&mut self, line: &str) -> Reply {
        let argv = Self::argv(line);
        self.run_argv(&argv)
    }

    pub fn run_argv(&mut self, argv: &[Vec<u8>]) -> Reply {
        let mut ctx = Ctx::new(&self.server, &mut self.session);
        flatten(dispatch(&mut ctx, argv))
    }

    /// Run a command on another session of the same server.
    pub fn run_as(&self, session: &mut Session, line: &str) -> Reply {
        let argv = Self::argv(line);
        let mut ctx = Ctx::new(&self.server, session);
        flatten(dispatch(&mut ctx, &argv))
    }

    /// Raw outcome, for blocking-command tests.
    pub fn outcome(&mut self, line: &str) -> Outcome {
        let argv = Self::argv(line);
        let mut ctx = Ctx::new(&self.server, &mut self.session);
        dispatch(&mut ctx, &argv)
    }

    /// The encoded wire bytes of a command's reply at the given RESP
    /// version.
    pub fn bytes(&mut self, line: &str, protover: u8) -> Vec<u8> {
        let reply = self.run(line);
        let mut out = BytesMut::new();
        encode_reply(&reply, protover, &mut out);
        out.to_vec()
    }
}

fn register_session(server: &Arc<Server>) -> Session {
    let shared = server.register_client("test-harness".into());
    Session::new(shared.id, "test-harness".into(), server.auth_required(), 0)
}

fn flatten(outcome: Outcome) -> Reply {
    match outcome {
        Outcome::Reply(r) => r,
        Outcome::Multi(frames) => Reply::Array(frames),
        Outcome::NoReply => Reply::simple("<no-reply>"),
        Outcome::Block(_) => panic!("unexpected blocking outcome"),
    }
}

/// Error-reply assertion helper.
pub fn assert_error_starts(reply: &Reply, prefix: &str) {
    match reply {
        Reply::Error(e) => assert!(
            e.starts_with(prefix),
            "expected error starting with {:?}, got {:?}",
            prefix,
            e
        ),
        other => panic!("expected error starting with {:?}, got {:?}", prefix, other),
    }
}
