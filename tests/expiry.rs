mod common;

use cindr::protocol::Reply;
use common::{assert_error_starts, Harness};
use std::thread::sleep;
use std::time::Duration;

#[test]
fn px_expiry_is_lazy_but_invisible() {
    let mut h = Harness::new();
    assert_eq!(h.run("SET k v PX 50"), Reply::ok());
    assert_eq!(h.run("GET k"), Reply::bulk("v"));
    sleep(Duration::from_millis(100));
    assert_eq!(h.run("GET k"), Reply::Null);
    assert_eq!(h.run("EXISTS k"), Reply::Int(0));
    assert_eq!(h.run("DBSIZE"), Reply::Int(0));
}

#[test]
fn ttl_reporting() {
    let mut h = Harness::new();
    h.run("SET k v EX 100");
    let Reply::Int(ttl) = h.run("TTL k") else { panic!() };
    assert!((99..=100).contains(&ttl), "ttl was {}", ttl);
    let Reply::Int(pttl) = h.run("PTTL k") else { panic!() };
    assert!(pttl > 99_000 && pttl <= 100_000);
    assert_eq!(h.run("TTL missing"), Reply::Int(-2));
    h.run("SET plain v");
    assert_eq!(h.run("TTL plain"), Reply::Int(-1));
}

#[test]
fn persist_drops_ttl() {
    let mut h = Harness::new();
    h.run("SET k v EX 100");
    assert_eq!(h.run("PERSIST k"), Reply::Int(1));
    assert_eq!(h.run("TTL k"), Reply::Int(-1));
    assert_eq!(h.run("PERSIST k"), Reply::Int(0));
}

#[test]
fn set_clears_ttl_unless_keepttl() {
    let mut h = Harness::new();
    h.run("SET k v EX 100");
    h.run("SET k w");
    assert_eq!(h.run("TTL k"), Reply::Int(-1));
    h.run("SET k v EX 100");
    h.run("SET k w KEEPTTL");
    let Reply::Int(ttl) = h.run("TTL k") else { panic!() };
    assert!(ttl > 0);
}

#[test]
fn getex_adjusts_ttl() {
    let mut h = Harness::new();
    h.run("SET k v");
    assert_eq!(h.run("GETEX k EX 100"), Reply::bulk("v"));
    let Reply::Int(ttl) = h.run("TTL k") else { panic!() };
    assert!(ttl > 0);
    assert_eq!(h.run("GETEX k PERSIST"), Reply::bulk("v"));
    assert_eq!(h.run("TTL k"), Reply::Int(-1));
    assert_eq!(h.run("GETEX missing"), Reply::Null);
}

#[test]
fn expire_gates() {
    let mut h = Harness::new();
    h.run("SET k v");
    assert_eq!(h.run("EXPIRE k 100 XX"), Reply::Int(0));
    assert_eq!(h.run("EXPIRE k 100 NX"), Reply::Int(1));
    assert_eq!(h.run("EXPIRE k 200 NX"), Reply::Int(0));
    assert_eq!(h.run("EXPIRE k 50 GT"), Reply::Int(0));
    assert_eq!(h.run("EXPIRE k 200 GT"), Reply::Int(1));
    assert_eq!(h.run("EXPIRE k 300 LT"), Reply::Int(0));
    assert_eq!(h.run("EXPIRE k 100 LT"), Reply::Int(1));
    assert_eq!(h.run("EXPIRE missing 10"), Reply::Int(0));
}

#[test]
fn expire_in_past_deletes_now() {
    let mut h = Harness::new();
    h.run("SET k v");
    assert_eq!(h.run("EXPIRE k -1"), Reply::Int(1));
    assert_eq!(h.run("EXISTS k"), Reply::Int(0));
    h.run("SET k2 v");
    assert_eq!(h.run("PEXPIREAT k2 1"), Reply::Int(1));
    assert_eq!(h.run("EXISTS k2"), Reply::Int(0));
}

#[test]
fn expiretime_absolute() {
    let mut h = Harness::new();
    h.run("SET k v EXAT 33177117420");
    assert_eq!(h.run("EXPIRETIME k"), Reply::Int(33177117420));
    assert_eq!(h.run("PEXPIRETIME k"), Reply::Int(33177117420000));
}

#[test]
fn setex_validates() {
    let mut h = Harness::new();
    assert_eq!(h.run("SETEX k 100 v"), Reply::ok());
    let Reply::Int(ttl) = h.run("TTL k") else { panic!() };
    assert!(ttl > 0);
    assert_error_starts(&h.run("SETEX k 0 v"), "ERR invalid expire time");
    assert_error_starts(&h.run("PSETEX k -5 v"), "ERR invalid expire time");
}

#[test]
fn rename_carries_ttl() {
    let mut h = Harness::new();
    h.run("SET a v EX 100");
    h.run("RENAME a b");
    let Reply::Int(ttl) = h.run("TTL b") else { panic!() };
    assert!(ttl > 0);
}
