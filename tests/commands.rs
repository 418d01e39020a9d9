mod common;

use cindr::protocol::Reply;
use common::{assert_error_starts, Harness};

#[test]
fn incrby_over_set_value() {
    let mut h = Harness::new();
    assert_eq!(h.run("SET x 10"), Reply::ok());
    assert_eq!(h.run("INCRBY x 5"), Reply::Int(15));
    assert_eq!(h.bytes("GET x", 2), b"$2\r\n15\r\n");
}

#[test]
fn lpush_lrange_order() {
    let mut h = Harness::new();
    h.run("LPUSH l a b c");
    assert_eq!(
        h.run("LRANGE l 0 -1"),
        Reply::bulk_array(["c", "b", "a"])
    );
}

#[test]
fn zrangebyscore_open_upper() {
    let mut h = Harness::new();
    h.run("ZADD z 1 a 2 b 3 c");
    assert_eq!(
        h.run("ZRANGEBYSCORE z 2 +inf"),
        Reply::bulk_array(["b", "c"])
    );
}

#[test]
fn multi_exec_batches() {
    let mut h = Harness::new();
    assert_eq!(h.run("MULTI"), Reply::ok());
    assert_eq!(h.run("SET a 1"), Reply::simple("QUEUED"));
    assert_eq!(h.run("INCR a"), Reply::simple("QUEUED"));
    assert_eq!(
        h.run("EXEC"),
        Reply::Array(vec![Reply::ok(), Reply::Int(2)])
    );
    assert_eq!(h.run("GET a"), Reply::bulk("2"));
}

#[test]
fn hello_3_returns_server_map() {
    let mut h = Harness::new();
    let reply = h.run("HELLO 3");
    let Reply::Map(pairs) = reply else { panic!("expected map") };
    let field = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == &Reply::bulk(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| panic!("missing field {}", name))
    };
    assert_eq!(field("proto"), Reply::Int(3));
    assert_eq!(field("mode"), Reply::bulk("standalone"));
    assert_eq!(field("role"), Reply::bulk("master"));
    assert!(matches!(field("modules"), Reply::Array(v) if v.is_empty()));
    assert_eq!(h.session.protover, 3);
}

#[test]
fn hello_rejects_unknown_protocol() {
    let mut h = Harness::new();
    assert_error_starts(&h.run("HELLO 4"), "NOPROTO");
    assert_eq!(h.session.protover, 2);
}

#[test]
fn unknown_command_and_arity_errors() {
    let mut h = Harness::new();
    assert_error_starts(&h.run("NOSUCHCOMMAND a b"), "ERR unknown command");
    assert_error_starts(&h.run("GET"), "ERR wrong number of arguments");
    assert_error_starts(&h.run("GET a b"), "ERR wrong number of arguments");
}

#[test]
fn echo_and_select() {
    let mut h = Harness::new();
    assert_eq!(h.run("ECHO hello"), Reply::bulk("hello"));
    assert_eq!(h.run("SELECT 1"), Reply::ok());
    assert_eq!(h.session.db_index, 1);
    h.run("SET only-in-db1 v");
    assert_eq!(h.run("SELECT 0"), Reply::ok());
    assert_eq!(h.run("EXISTS only-in-db1"), Reply::Int(0));
    assert_error_starts(&h.run("SELECT 99"), "ERR DB index is out of range");
}

#[test]
fn keyspace_basics() {
    let mut h = Harness::new();
    h.run("MSET a 1 b 2 c 3");
    assert_eq!(h.run("DBSIZE"), Reply::Int(3));
    assert_eq!(h.run("EXISTS a b nope"), Reply::Int(2));
    assert_eq!(h.run("DEL a b"), Reply::Int(2));
    assert_eq!(h.run("TYPE c"), Reply::simple("string"));
    assert_eq!(h.run("TYPE nope"), Reply::simple("none"));
    h.run("RENAME c d");
    assert_eq!(h.run("GET d"), Reply::bulk("3"));
    assert_error_starts(&h.run("RENAME ghost x"), "ERR no such key");
}

#[test]
fn keys_and_scan_cover_the_keyspace() {
    let mut h = Harness::new();
    for i in 0..50 {
        h.run(&format!("SET key:{} v", i));
    }
    h.run("SET other v");
    let Reply::Array(keys) = h.run("KEYS key:*") else { panic!() };
    assert_eq!(keys.len(), 50);

    let mut seen = std::collections::HashSet::new();
    let mut cursor = "0".to_string();
    loop {
        let Reply::Array(parts) = h.run(&format!("SCAN {} COUNT 7", cursor)) else { panic!() };
        let Reply::Bulk(next) = &parts[0] else { panic!() };
        let Reply::Array(batch) = &parts[1] else { panic!() };
        for k in batch {
            let Reply::Bulk(k) = k else { panic!() };
            seen.insert(k.clone());
        }
        cursor = String::from_utf8(next.clone()).unwrap();
        if cursor == "0" {
            break;
        }
    }
    assert_eq!(seen.len(), 51);
}

#[test]
fn copy_and_move_between_dbs() {
    let mut h = Harness::new();
    h.run("SET src hello");
    assert_eq!(h.run("COPY src dst"), Reply::Int(1));
    assert_eq!(h.run("GET dst"), Reply::bulk("hello"));
    assert_eq!(h.run("COPY src dst"), Reply::Int(0));
    assert_eq!(h.run("COPY src dst REPLACE"), Reply::Int(1));
    assert_eq!(h.run("MOVE src 2"), Reply::Int(1));
    assert_eq!(h.run("EXISTS src"), Reply::Int(0));
    h.run("SELECT 2");
    assert_eq!(h.run("GET src"), Reply::bulk("hello"));
}

#[test]
fn config_get_set_roundtrip() {
    let mut h = Harness::new();
    assert_eq!(h.run("CONFIG SET maxmemory 100mb"), Reply::ok());
    let Reply::Map(pairs) = h.run("CONFIG GET maxmemory") else { panic!() };
    assert_eq!(pairs[0].1, Reply::bulk((100 * 1024 * 1024).to_string()));
    assert_error_starts(&h.run("CONFIG SET no-such-thing 1"), "ERR Unknown option");
}

#[test]
fn command_metadata() {
    let mut h = Harness::new();
    let Reply::Int(count) = h.run("COMMAND COUNT") else { panic!() };
    assert!(count > 100);
    let Reply::Array(infos) = h.run("COMMAND INFO get nosuch") else { panic!() };
    let Reply::Array(get_info) = &infos[0] else { panic!("get should be known") };
    assert_eq!(get_info[0], Reply::bulk("get"));
    assert_eq!(get_info[1], Reply::Int(2));
    assert_eq!(infos[1], Reply::NullArray);
}

#[test]
fn dump_restore_not_implemented() {
    let mut h = Harness::new();
    h.run("SET k v");
    assert_error_starts(&h.run("DUMP k"), "ERR DUMP is not implemented");
    assert_error_starts(&h.run("RESTORE k 0 blob"), "ERR RESTORE is not implemented");
}

#[test]
fn client_introspection() {
    let mut h = Harness::new();
    let Reply::Int(id) = h.run("CLIENT ID") else { panic!() };
    assert_eq!(id as u64, h.session.id);
    assert_eq!(h.run("CLIENT SETNAME worker-1"), Reply::ok());
    assert_eq!(h.run("CLIENT GETNAME"), Reply::bulk("worker-1"));
    assert_error_starts(&h.run("CLIENT SETNAME bad name"), "ERR wrong number of arguments");
}

#[test]
fn wait_returns_zero_without_replicas() {
    let mut h = Harness::new();
    assert_eq!(h.run("WAIT 0 100"), Reply::Int(0));
    assert_eq!(h.run("WAIT 2 100"), Reply::Int(0));
}
