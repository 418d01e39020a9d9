mod common;

use cindr::protocol::Reply;
use common::{assert_error_starts, Harness};

fn entry(id: &str, pairs: &[(&str, &str)]) -> Reply {
    let mut flat = Vec::new();
    for (f, v) in pairs {
        flat.push(Reply::bulk(*f));
        flat.push(Reply::bulk(*v));
    }
    Reply::Array(vec![Reply::bulk(id), Reply::Array(flat)])
}

#[test]
fn xadd_ids_grow_monotonically() {
    let mut h = Harness::new();
    assert_eq!(h.run("XADD s 1-1 f a"), Reply::bulk("1-1"));
    assert_eq!(h.run("XADD s 1-2 f b"), Reply::bulk("1-2"));
    assert_error_starts(
        &h.run("XADD s 1-2 f c"),
        "ERR The ID specified in XADD is equal or smaller",
    );
    assert_error_starts(&h.run("XADD s 0-0 f c"), "ERR The ID specified in XADD must be greater than 0-0");
    assert_eq!(h.run("XADD s 1-* f c"), Reply::bulk("1-3"));
    assert_eq!(h.run("XLEN s"), Reply::Int(3));
    // auto ids never go backwards
    let Reply::Bulk(auto) = h.run("XADD s * f d") else { panic!() };
    assert!(String::from_utf8(auto).unwrap() > "1-3".to_string());
}

#[test]
fn xrange_and_xrevrange() {
    let mut h = Harness::new();
    h.run("XADD s 1-0 n one");
    h.run("XADD s 2-0 n two");
    h.run("XADD s 3-0 n three");
    assert_eq!(
        h.run("XRANGE s - +"),
        Reply::Array(vec![
            entry("1-0", &[("n", "one")]),
            entry("2-0", &[("n", "two")]),
            entry("3-0", &[("n", "three")]),
        ])
    );
    assert_eq!(
        h.run("XRANGE s (1-0 + COUNT 1"),
        Reply::Array(vec![entry("2-0", &[("n", "two")])])
    );
    assert_eq!(
        h.run("XREVRANGE s + -"),
        Reply::Array(vec![
            entry("3-0", &[("n", "three")]),
            entry("2-0", &[("n", "two")]),
            entry("1-0", &[("n", "one")]),
        ])
    );
}

#[test]
fn xdel_and_xtrim() {
    let mut h = Harness::new();
    for i in 1..=5 {
        h.run(&format!("XADD s {}-0 n x", i));
    }
    assert_eq!(h.run("XDEL s 2-0 9-9"), Reply::Int(1));
    assert_eq!(h.run("XLEN s"), Reply::Int(4));
    assert_eq!(h.run("XTRIM s MAXLEN 2"), Reply::Int(2));
    assert_eq!(h.run("XLEN s"), Reply::Int(2));
    assert_eq!(h.run("XTRIM s MINID 5-0"), Reply::Int(1));
    assert_eq!(h.run("XLEN s"), Reply::Int(1));
    // the key survives empty: groups may still reference it
    h.run("XTRIM s MAXLEN 0");
    assert_eq!(h.run("EXISTS s"), Reply::Int(1));
    assert_eq!(h.run("XLEN s"), Reply::Int(0));
}

#[test]
fn xread_after_id() {
    let mut h = Harness::new();
    h.run("XADD s 1-0 a 1");
    h.run("XADD s 2-0 a 2");
    let reply = h.run("XREAD COUNT 10 STREAMS s 1-0");
    assert_eq!(
        reply,
        Reply::Array(vec![Reply::Array(vec![
            Reply::bulk("s"),
            Reply::Array(vec![entry("2-0", &[("a", "2")])]),
        ])])
    );
    // nothing new and no BLOCK: immediate nil
    assert_eq!(h.run("XREAD STREAMS s 2-0"), Reply::NullArray);
    assert_eq!(h.run("XREAD STREAMS s $"), Reply::NullArray);
}

#[test]
fn group_lifecycle_and_delivery() {
    let mut h = Harness::new();
    assert_error_starts(&h.run("XGROUP CREATE s g 0"), "ERR The XGROUP subcommand requires the key to exist");
    assert_eq!(h.run("XGROUP CREATE s g 0 MKSTREAM"), Reply::ok());
    assert_error_starts(&h.run("XGROUP CREATE s g 0"), "BUSYGROUP");

    h.run("XADD s 1-0 n one");
    h.run("XADD s 2-0 n two");
    let reply = h.run("XREADGROUP GROUP g alice COUNT 1 STREAMS s >");
    assert_eq!(
        reply,
        Reply::Array(vec![Reply::Array(vec![
            Reply::bulk("s"),
            Reply::Array(vec![entry("1-0", &[("n", "one")])]),
        ])])
    );
    // second consumer picks up where the group cursor is
    let reply = h.run("XREADGROUP GROUP g bob COUNT 5 STREAMS s >");
    assert_eq!(
        reply,
        Reply::Array(vec![Reply::Array(vec![
            Reply::bulk("s"),
            Reply::Array(vec![entry("2-0", &[("n", "two")])]),
        ])])
    );
    // re-reading own history by explicit id
    let reply = h.run("XREADGROUP GROUP g alice COUNT 5 STREAMS s 0");
    assert_eq!(
        reply,
        Reply::Array(vec![Reply::Array(vec![
            Reply::bulk("s"),
            Reply::Array(vec![entry("1-0", &[("n", "one")])]),
        ])])
    );
    // nothing new for the group
    assert_eq!(h.run("XREADGROUP GROUP g alice STREAMS s >"), Reply::NullArray);
    assert_error_starts(
        &h.run("XREADGROUP GROUP ghost c STREAMS s >"),
        "NOGROUP",
    );
}

#[test]
fn xack_clears_pending() {
    let mut h = Harness::new();
    h.run("XGROUP CREATE s g 0 MKSTREAM");
    h.run("XADD s 1-0 n one");
    h.run("XADD s 2-0 n two");
    h.run("XREADGROUP GROUP g alice STREAMS s >");
    let Reply::Array(summary) = h.run("XPENDING s g") else { panic!() };
    assert_eq!(summary[0], Reply::Int(2));
    assert_eq!(summary[1], Reply::bulk("1-0"));
    assert_eq!(summary[2], Reply::bulk("2-0"));
    assert_eq!(h.run("XACK s g 1-0"), Reply::Int(1));
    assert_eq!(h.run("XACK s g 1-0"), Reply::Int(0));
    let Reply::Array(summary) = h.run("XPENDING s g") else { panic!() };
    assert_eq!(summary[0], Reply::Int(1));
}

#[test]
fn xpending_extended_form() {
    let mut h = Harness::new();
    h.run("XGROUP CREATE s g 0 MKSTREAM");
    h.run("XADD s 1-0 n one");
    h.run("XREADGROUP GROUP g alice STREAMS s >");
    let Reply::Array(rows) = h.run("XPENDING s g - + 10") else { panic!() };
    assert_eq!(rows.len(), 1);
    let Reply::Array(row) = &rows[0] else { panic!() };
    assert_eq!(row[0], Reply::bulk("1-0"));
    assert_eq!(row[1], Reply::bulk("alice"));
    assert_eq!(row[3], Reply::Int(1));
    // filter by consumer
    let Reply::Array(rows) = h.run("XPENDING s g - + 10 nobody") else { panic!() };
    assert!(rows.is_empty());
}

#[test]
fn xclaim_transfers_ownership() {
    let mut h = Harness::new();
    h.run("XGROUP CREATE s g 0 MKSTREAM");
    h.run("XADD s 1-0 n one");
    h.run("XREADGROUP GROUP g alice STREAMS s >");
    let reply = h.run("XCLAIM s g bob 0 1-0");
    assert_eq!(reply, Reply::Array(vec![entry("1-0", &[("n", "one")])]));
    let Reply::Array(rows) = h.run("XPENDING s g - + 10 bob") else { panic!() };
    assert_eq!(rows.len(), 1);
    // min-idle-time above actual idle claims nothing
    let reply = h.run("XCLAIM s g carol 100000 1-0");
    assert_eq!(reply, Reply::Array(vec![]));
    // JUSTID returns ids only
    assert_eq!(h.run("XCLAIM s g carol 0 1-0 JUSTID"), Reply::bulk_array(["1-0"]));
}

#[test]
fn xautoclaim_scans_in_id_order() {
    let mut h = Harness::new();
    h.run("XGROUP CREATE s g 0 MKSTREAM");
    h.run("XADD s 1-0 n a");
    h.run("XADD s 2-0 n b");
    h.run("XREADGROUP GROUP g alice STREAMS s >");
    let Reply::Array(parts) = h.run("XAUTOCLAIM s g bob 0 0") else { panic!() };
    assert_eq!(parts[0], Reply::bulk("0-0"));
    assert_eq!(
        parts[1],
        Reply::Array(vec![entry("1-0", &[("n", "a")]), entry("2-0", &[("n", "b")])])
    );
    assert_eq!(parts[2], Reply::Array(vec![]));
    // deleted entries are dropped from pending and reported
    h.run("XDEL s 1-0");
    let Reply::Array(parts) = h.run("XAUTOCLAIM s g carol 0 0") else { panic!() };
    assert_eq!(parts[2], Reply::bulk_array(["1-0"]));
}

#[test]
fn xinfo_surface() {
    let mut h = Harness::new();
    h.run("XADD s 1-0 a 1");
    h.run("XADD s 2-0 b 2");
    h.run("XGROUP CREATE s g 0");
    h.run("XREADGROUP GROUP g alice STREAMS s >");
    let Reply::Map(info) = h.run("XINFO STREAM s") else { panic!() };
    let field = |name: &str| {
        info.iter()
            .find(|(k, _)| k == &Reply::bulk(name))
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(field("length"), Reply::Int(2));
    assert_eq!(field("last-generated-id"), Reply::bulk("2-0"));
    assert_eq!(field("groups"), Reply::Int(1));
    assert_eq!(field("first-entry"), entry("1-0", &[("a", "1")]));

    let Reply::Array(groups) = h.run("XINFO GROUPS s") else { panic!() };
    assert_eq!(groups.len(), 1);
    let Reply::Array(consumers) = h.run("XINFO CONSUMERS s g") else { panic!() };
    assert_eq!(consumers.len(), 1);
}

#[test]
fn xsetid_moves_the_cursor() {
    let mut h = Harness::new();
    h.run("XADD s 5-0 a 1");
    assert_error_starts(
        &h.run("XSETID s 1-0"),
        "ERR The ID specified in XSETID is smaller",
    );
    assert_eq!(h.run("XSETID s 100-0"), Reply::ok());
    assert_eq!(h.run("XADD s 100-* f v"), Reply::bulk("100-1"));
}
