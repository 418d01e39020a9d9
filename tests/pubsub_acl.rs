mod common;

use cindr::protocol::Reply;
use common::{assert_error_starts, Harness};

#[test]
fn subscribe_acks_count_subscriptions() {
    let mut h = Harness::new();
    let Reply::Array(frames) = h.run("SUBSCRIBE a b") else { panic!() };
    assert_eq!(
        frames[0],
        Reply::Push(vec![Reply::bulk("subscribe"), Reply::bulk("a"), Reply::Int(1)])
    );
    assert_eq!(
        frames[1],
        Reply::Push(vec![Reply::bulk("subscribe"), Reply::bulk("b"), Reply::Int(2)])
    );
    let Reply::Array(frames) = h.run("PSUBSCRIBE news.*") else { panic!() };
    assert_eq!(
        frames[0],
        Reply::Push(vec![Reply::bulk("psubscribe"), Reply::bulk("news.*"), Reply::Int(3)])
    );
    let Reply::Array(frames) = h.run("UNSUBSCRIBE a") else { panic!() };
    assert_eq!(
        frames[0],
        Reply::Push(vec![Reply::bulk("unsubscribe"), Reply::bulk("a"), Reply::Int(2)])
    );
}

#[test]
fn publish_routes_to_mailboxes_in_order() {
    let mut h = Harness::new();
    let mut sub = h.second_session();
    h.run_as(&mut sub, "SUBSCRIBE news");
    h.run_as(&mut sub, "PSUBSCRIBE n*");

    assert_eq!(h.run("PUBLISH news one"), Reply::Int(2));
    assert_eq!(h.run("PUBLISH news two"), Reply::Int(2));
    assert_eq!(h.run("PUBLISH other x"), Reply::Int(0));

    let shared = h.server.clients.get(&sub.id).unwrap();
    let frames: Vec<Reply> = shared.outbox.lock().drain(..).collect();
    // exact-channel delivery first, then the pattern, publish order kept
    assert_eq!(
        frames[0],
        Reply::Push(vec![Reply::bulk("message"), Reply::bulk("news"), Reply::bulk("one")])
    );
    assert_eq!(
        frames[1],
        Reply::Push(vec![
            Reply::bulk("pmessage"),
            Reply::bulk("n*"),
            Reply::bulk("news"),
            Reply::bulk("one"),
        ])
    );
    assert_eq!(
        frames[2],
        Reply::Push(vec![Reply::bulk("message"), Reply::bulk("news"), Reply::bulk("two")])
    );
}

#[test]
fn pubsub_introspection() {
    let mut h = Harness::new();
    let mut sub = h.second_session();
    h.run_as(&mut sub, "SUBSCRIBE alpha beta");
    h.run_as(&mut sub, "PSUBSCRIBE a*");
    assert_eq!(
        h.run("PUBSUB CHANNELS"),
        Reply::bulk_array(["alpha", "beta"])
    );
    assert_eq!(h.run("PUBSUB CHANNELS al*"), Reply::bulk_array(["alpha"]));
    assert_eq!(
        h.run("PUBSUB NUMSUB alpha ghost"),
        Reply::Array(vec![
            Reply::bulk("alpha"),
            Reply::Int(1),
            Reply::bulk("ghost"),
            Reply::Int(0),
        ])
    );
    assert_eq!(h.run("PUBSUB NUMPAT"), Reply::Int(1));
}

#[test]
fn resp2_subscriber_mode_restricts_commands() {
    let mut h = Harness::new();
    h.run("SUBSCRIBE c");
    assert_error_starts(&h.run("GET k"), "ERR Can't execute 'get'");
    // PING stays allowed, with the subscriber-mode array shape
    assert_eq!(
        h.run("PING"),
        Reply::Array(vec![Reply::bulk("pong"), Reply::bulk("")])
    );
    let Reply::Array(_) = h.run("UNSUBSCRIBE") else { panic!() };
    assert_eq!(h.run("SET k v"), Reply::ok());
}

#[test]
fn resp3_subscribers_run_anything() {
    let mut h = Harness::new();
    h.run("HELLO 3");
    h.run("SUBSCRIBE c");
    assert_eq!(h.run("SET k v"), Reply::ok());
}

#[test]
fn unsubscribe_all_when_no_args() {
    let mut h = Harness::new();
    h.run("SUBSCRIBE a b c");
    let Reply::Array(frames) = h.run("UNSUBSCRIBE") else { panic!() };
    assert_eq!(frames.len(), 3);
    assert_eq!(h.session.sub_count(), 0);
    // no live subscriptions: a lone nil ack
    let Reply::Array(frames) = h.run("UNSUBSCRIBE") else { panic!() };
    assert_eq!(
        frames[0],
        Reply::Push(vec![Reply::bulk("unsubscribe"), Reply::Null, Reply::Int(0)])
    );
}

#[test]
fn reset_clears_subscriptions() {
    let mut h = Harness::new();
    h.run("SUBSCRIBE a");
    assert_eq!(h.run("RESET"), Reply::simple("RESET"));
    assert_eq!(h.session.sub_count(), 0);
    assert_eq!(h.run("PUBSUB NUMPAT"), Reply::Int(0));
    assert_eq!(h.run("SET k v"), Reply::ok());
}

//
// ACL
//

#[test]
fn acl_category_and_key_scoping() {
    let mut h = Harness::new();
    assert_eq!(
        h.run("ACL SETUSER limited on >pw ~foo:* +@read"),
        Reply::ok()
    );
    assert_eq!(h.run("AUTH limited pw"), Reply::ok());
    assert_eq!(h.session.user, "limited");

    // allowed: read command on a key inside the pattern
    assert_eq!(h.run("GET foo:bar"), Reply::Null);
    // denied: key outside the pattern
    assert_error_starts(&h.run("GET bar:baz"), "NOPERM");
    // denied: write command not in @read
    assert_error_starts(&h.run("SET foo:bar v"), "NOPERM");
}

#[test]
fn acl_minus_command_overrides_category() {
    let mut h = Harness::new();
    h.run("ACL SETUSER nogets on >pw allkeys +@read -get");
    assert_eq!(h.run("AUTH nogets pw"), Reply::ok());
    assert_error_starts(&h.run("GET k"), "NOPERM");
    assert_eq!(h.run("STRLEN k"), Reply::Int(0));
}

#[test]
fn acl_channel_patterns() {
    let mut h = Harness::new();
    h.run("ACL SETUSER chan on >pw allkeys +@pubsub +@connection &news.*");
    assert_eq!(h.run("AUTH chan pw"), Reply::ok());
    let Reply::Array(_) = h.run("SUBSCRIBE news.tech") else { panic!() };
    assert_error_starts(&h.run("SUBSCRIBE private"), "NOPERM");
    assert_error_starts(&h.run("PUBLISH private x"), "NOPERM");
}

#[test]
fn auth_failures() {
    let mut h = Harness::new();
    h.run("ACL SETUSER u on >right");
    assert_error_starts(&h.run("AUTH u wrong"), "WRONGPASS");
    assert_error_starts(&h.run("AUTH ghost pw"), "WRONGPASS");
    // single-arg AUTH without requirepass
    assert_error_starts(&h.run("AUTH pw"), "ERR Client sent AUTH");
}

#[test]
fn requirepass_gates_commands() {
    let config = cindr::config::Config::new();
    config.seed("requirepass", "hunter2");
    let mut h = Harness::with_config(config);
    assert!(!h.session.authenticated);
    assert_error_starts(&h.run("GET k"), "NOAUTH");
    // PING is allowed pre-auth
    assert_eq!(h.run("PING"), Reply::simple("PONG"));
    assert_error_starts(&h.run("AUTH wrong"), "WRONGPASS");
    assert_eq!(h.run("AUTH hunter2"), Reply::ok());
    assert_eq!(h.run("GET k"), Reply::Null);
}

#[test]
fn acl_introspection() {
    let mut h = Harness::new();
    assert_eq!(h.run("ACL WHOAMI"), Reply::bulk("default"));
    h.run("ACL SETUSER extra on >pw");
    assert_eq!(h.run("ACL USERS"), Reply::bulk_array(["default", "extra"]));
    assert_eq!(h.run("ACL DELUSER extra"), Reply::Int(1));
    assert_error_starts(&h.run("ACL DELUSER default"), "ERR The 'default' user cannot be removed");
    let Reply::Array(cats) = h.run("ACL CAT") else { panic!() };
    assert!(cats.contains(&Reply::bulk("read")));
    let Reply::Array(cmds) = h.run("ACL CAT string") else { panic!() };
    assert!(cmds.contains(&Reply::bulk("get")));
    let Reply::Bulk(pass) = h.run("ACL GENPASS") else { panic!() };
    assert_eq!(pass.len(), 64);
    let Reply::Bulk(pass) = h.run("ACL GENPASS 128") else { panic!() };
    assert_eq!(pass.len(), 32);
}

#[test]
fn hello_auth_combined() {
    let config = cindr::config::Config::new();
    config.seed("requirepass", "pw");
    let mut h = Harness::with_config(config);
    assert_error_starts(&h.run("HELLO 3"), "NOAUTH");
    let Reply::Map(_) = h.run("HELLO 3 AUTH default pw") else { panic!() };
    assert!(h.session.authenticated);
    assert_eq!(h.session.protover, 3);
}
