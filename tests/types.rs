mod common;

use cindr::protocol::Reply;
use common::{assert_error_starts, Harness};

#[test]
fn string_surface() {
    let mut h = Harness::new();
    assert_eq!(h.run("APPEND s hello"), Reply::Int(5));
    assert_eq!(h.run("APPEND s -world"), Reply::Int(11));
    assert_eq!(h.run("STRLEN s"), Reply::Int(11));
    assert_eq!(h.run("GETRANGE s 0 4"), Reply::bulk("hello"));
    assert_eq!(h.run("GETRANGE s -5 -1"), Reply::bulk("world"));
    assert_eq!(h.run("SETRANGE s 6 WORLD"), Reply::Int(11));
    assert_eq!(h.run("GET s"), Reply::bulk("hello-WORLD"));
    assert_eq!(h.run("GETDEL s"), Reply::bulk("hello-WORLD"));
    assert_eq!(h.run("EXISTS s"), Reply::Int(0));
}

#[test]
fn set_options() {
    let mut h = Harness::new();
    assert_eq!(h.run("SET k v NX"), Reply::ok());
    assert_eq!(h.run("SET k w NX"), Reply::Null);
    assert_eq!(h.run("SET k w XX"), Reply::ok());
    assert_eq!(h.run("SET missing v XX"), Reply::Null);
    assert_eq!(h.run("SET k z GET"), Reply::bulk("w"));
    assert_error_starts(&h.run("SET k v NX XX"), "ERR syntax error");
    assert_error_starts(&h.run("SET k v EX 0"), "ERR invalid expire time");
}

#[test]
fn incr_rejects_garbage() {
    let mut h = Harness::new();
    h.run("SET n abc");
    assert_error_starts(&h.run("INCR n"), "ERR value is not an integer");
    h.run("SET f 3.5");
    assert_eq!(h.run("INCRBYFLOAT f 1.5"), Reply::bulk("5"));
    assert_eq!(h.run("DECRBY counter 3"), Reply::Int(-3));
}

#[test]
fn setnx_msetnx() {
    let mut h = Harness::new();
    assert_eq!(h.run("SETNX a 1"), Reply::Int(1));
    assert_eq!(h.run("SETNX a 2"), Reply::Int(0));
    assert_eq!(h.run("MSETNX x 1 y 2"), Reply::Int(1));
    assert_eq!(h.run("MSETNX y 9 z 3"), Reply::Int(0));
    assert_eq!(h.run("EXISTS z"), Reply::Int(0));
    assert_eq!(
        h.run("MGET a x y z"),
        Reply::Array(vec![
            Reply::bulk("1"),
            Reply::bulk("1"),
            Reply::bulk("2"),
            Reply::Null
        ])
    );
}

#[test]
fn bit_operations() {
    let mut h = Harness::new();
    assert_eq!(h.run("SETBIT b 7 1"), Reply::Int(0));
    assert_eq!(h.run("GETBIT b 7"), Reply::Int(1));
    assert_eq!(h.run("GETBIT b 6"), Reply::Int(0));
    h.run("SET fb foobar");
    assert_eq!(h.run("BITCOUNT fb"), Reply::Int(26));
    assert_eq!(h.run("BITCOUNT fb 1 1"), Reply::Int(6));
    assert_eq!(h.run("BITCOUNT fb 5 30 BIT"), Reply::Int(17));
    assert_eq!(h.run("BITPOS fb 1"), Reply::Int(1));
    h.run("SET x abc");
    h.run("SET y abd");
    assert_eq!(h.run("BITOP XOR dest x y"), Reply::Int(3));
    assert_eq!(h.run("STRLEN dest"), Reply::Int(3));
}

#[test]
fn wrong_type_is_reported() {
    let mut h = Harness::new();
    h.run("SET plain v");
    assert_error_starts(&h.run("LPUSH plain x"), "WRONGTYPE");
    assert_error_starts(&h.run("HGET plain f"), "WRONGTYPE");
    assert_error_starts(&h.run("SADD plain m"), "WRONGTYPE");
    assert_error_starts(&h.run("ZADD plain 1 m"), "WRONGTYPE");
    assert_error_starts(&h.run("XADD plain * f v"), "WRONGTYPE");
    h.run("LPUSH alist x");
    assert_error_starts(&h.run("GET alist"), "WRONGTYPE");
}

#[test]
fn list_surface() {
    let mut h = Harness::new();
    h.run("RPUSH l one two three");
    assert_eq!(h.run("LLEN l"), Reply::Int(3));
    assert_eq!(h.run("LINDEX l -1"), Reply::bulk("three"));
    assert_eq!(h.run("LINSERT l BEFORE two 1.5"), Reply::Int(4));
    assert_eq!(h.run("LSET l 0 zero"), Reply::ok());
    assert_eq!(h.run("LPOP l"), Reply::bulk("zero"));
    assert_eq!(
        h.run("LPOP l 2"),
        Reply::bulk_array(["1.5", "two"])
    );
    assert_eq!(h.run("RPOP missing"), Reply::Null);
    assert_error_starts(&h.run("LSET missing 0 v"), "ERR no such key");
}

#[test]
fn lrem_and_ltrim() {
    let mut h = Harness::new();
    h.run("RPUSH l a b a c a");
    assert_eq!(h.run("LREM l 2 a"), Reply::Int(2));
    assert_eq!(h.run("LRANGE l 0 -1"), Reply::bulk_array(["b", "c", "a"]));
    h.run("LTRIM l 1 1");
    assert_eq!(h.run("LRANGE l 0 -1"), Reply::bulk_array(["c"]));
}

#[test]
fn lmove_rotation() {
    let mut h = Harness::new();
    h.run("RPUSH src a b c");
    assert_eq!(h.run("LMOVE src dst RIGHT LEFT"), Reply::bulk("c"));
    assert_eq!(h.run("RPOPLPUSH src dst"), Reply::bulk("b"));
    assert_eq!(h.run("LRANGE dst 0 -1"), Reply::bulk_array(["b", "c"]));
    assert_eq!(h.run("LMOVE missing dst LEFT LEFT"), Reply::Null);
}

#[test]
fn lmpop_first_nonempty() {
    let mut h = Harness::new();
    h.run("RPUSH second x y");
    let reply = h.run("LMPOP 2 first second LEFT COUNT 2");
    assert_eq!(
        reply,
        Reply::Array(vec![
            Reply::bulk("second"),
            Reply::bulk_array(["x", "y"])
        ])
    );
    assert_eq!(h.run("LMPOP 1 first LEFT"), Reply::NullArray);
}

#[test]
fn empty_containers_are_deleted() {
    let mut h = Harness::new();
    h.run("RPUSH l only");
    h.run("LPOP l");
    assert_eq!(h.run("EXISTS l"), Reply::Int(0));

    h.run("HSET h f v");
    h.run("HDEL h f");
    assert_eq!(h.run("EXISTS h"), Reply::Int(0));

    h.run("SADD s m");
    h.run("SREM s m");
    assert_eq!(h.run("EXISTS s"), Reply::Int(0));

    h.run("ZADD z 1 m");
    h.run("ZREM z m");
    assert_eq!(h.run("EXISTS z"), Reply::Int(0));
    assert_eq!(h.run("DBSIZE"), Reply::Int(0));
}

#[test]
fn hash_surface() {
    let mut h = Harness::new();
    assert_eq!(h.run("HSET h a 1 b 2"), Reply::Int(2));
    assert_eq!(h.run("HSET h a 9"), Reply::Int(0));
    assert_eq!(h.run("HGET h a"), Reply::bulk("9"));
    assert_eq!(h.run("HSETNX h a 0"), Reply::Int(0));
    assert_eq!(h.run("HLEN h"), Reply::Int(2));
    assert_eq!(h.run("HEXISTS h b"), Reply::Int(1));
    assert_eq!(h.run("HSTRLEN h a"), Reply::Int(1));
    assert_eq!(h.run("HINCRBY h b 5"), Reply::Int(7));
    assert_eq!(
        h.run("HMGET h a nope"),
        Reply::Array(vec![Reply::bulk("9"), Reply::Null])
    );
    let Reply::Map(pairs) = h.run("HGETALL h") else { panic!() };
    assert_eq!(pairs.len(), 2);
}

#[test]
fn set_surface() {
    let mut h = Harness::new();
    assert_eq!(h.run("SADD s a b c"), Reply::Int(3));
    assert_eq!(h.run("SADD s a"), Reply::Int(0));
    assert_eq!(h.run("SCARD s"), Reply::Int(3));
    assert_eq!(h.run("SISMEMBER s a"), Reply::Int(1));
    assert_eq!(
        h.run("SMISMEMBER s a nope"),
        Reply::Array(vec![Reply::Int(1), Reply::Int(0)])
    );
    assert_eq!(h.run("SREM s c"), Reply::Int(1));
    assert_eq!(h.run("SMOVE s other a"), Reply::Int(1));
    assert_eq!(h.run("SISMEMBER other a"), Reply::Int(1));
}

#[test]
fn set_algebra_and_store() {
    let mut h = Harness::new();
    h.run("SADD a x y z");
    h.run("SADD b y z w");
    let Reply::Set(members) = h.run("SINTER a b") else { panic!() };
    assert_eq!(members.len(), 2);
    assert_eq!(h.run("SINTERCARD 2 a b"), Reply::Int(2));
    assert_eq!(h.run("SINTERCARD 2 a b LIMIT 1"), Reply::Int(1));
    assert_eq!(h.run("SUNIONSTORE dest a b"), Reply::Int(4));
    assert_eq!(h.run("SDIFFSTORE dest2 a b"), Reply::Int(1));
    let Reply::Set(d) = h.run("SMEMBERS dest2") else { panic!() };
    assert_eq!(d, vec![Reply::bulk("x")]);
}

#[test]
fn zset_surface() {
    let mut h = Harness::new();
    assert_eq!(h.run("ZADD z 1 a 2 b"), Reply::Int(2));
    assert_eq!(h.run("ZADD z XX 5 c"), Reply::Int(0));
    assert_eq!(h.run("ZADD z NX 1.5 a"), Reply::Int(0));
    assert_eq!(h.run("ZSCORE z a"), Reply::Double(1.0));
    assert_eq!(h.run("ZADD z GT 0 b"), Reply::Int(0));
    assert_eq!(h.run("ZSCORE z b"), Reply::Double(2.0));
    assert_eq!(h.run("ZADD z CH 9 b"), Reply::Int(1));
    assert_eq!(h.run("ZCARD z"), Reply::Int(2));
    assert_eq!(h.run("ZRANK z a"), Reply::Int(0));
    assert_eq!(h.run("ZREVRANK z a"), Reply::Int(1));
    assert_eq!(h.run("ZRANK z missing"), Reply::Null);
    assert_eq!(h.run("ZINCRBY z 3 a"), Reply::Double(4.0));
    assert_eq!(h.run("ZCOUNT z (4 +inf"), Reply::Int(1));
}

#[test]
fn zset_ranges_and_pops() {
    let mut h = Harness::new();
    h.run("ZADD z 1 a 2 b 3 c 4 d");
    assert_eq!(h.run("ZRANGE z 0 -1"), Reply::bulk_array(["a", "b", "c", "d"]));
    assert_eq!(h.run("ZRANGE z 0 -1 REV"), Reply::bulk_array(["d", "c", "b", "a"]));
    assert_eq!(
        h.run("ZRANGE z (1 3 BYSCORE"),
        Reply::bulk_array(["b", "c"])
    );
    assert_eq!(
        h.run("ZRANGE z 2 +inf BYSCORE LIMIT 1 1"),
        Reply::bulk_array(["c"])
    );
    assert_eq!(h.run("ZREVRANGE z 0 1"), Reply::bulk_array(["d", "c"]));
    assert_eq!(
        h.run("ZRANGEBYSCORE z 2 3 WITHSCORES"),
        Reply::Array(vec![
            Reply::bulk("b"),
            Reply::Double(2.0),
            Reply::bulk("c"),
            Reply::Double(3.0),
        ])
    );
    assert_eq!(
        h.run("ZPOPMIN z"),
        Reply::Array(vec![Reply::bulk("a"), Reply::Double(1.0)])
    );
    assert_eq!(
        h.run("ZPOPMAX z 2"),
        Reply::Array(vec![
            Reply::bulk("d"),
            Reply::Double(4.0),
            Reply::bulk("c"),
            Reply::Double(3.0),
        ])
    );
}

#[test]
fn zset_lex_family() {
    let mut h = Harness::new();
    h.run("ZADD z 0 a 0 b 0 c 0 d");
    assert_eq!(h.run("ZRANGEBYLEX z - +"), Reply::bulk_array(["a", "b", "c", "d"]));
    assert_eq!(h.run("ZRANGEBYLEX z [b (d"), Reply::bulk_array(["b", "c"]));
    assert_eq!(h.run("ZREVRANGEBYLEX z + -"), Reply::bulk_array(["d", "c", "b", "a"]));
    assert_eq!(h.run("ZLEXCOUNT z [b +"), Reply::Int(3));
    assert_eq!(h.run("ZREMRANGEBYLEX z [a (c"), Reply::Int(2));
}

#[test]
fn zset_store_operations() {
    let mut h = Harness::new();
    h.run("ZADD a 1 x 2 y");
    h.run("ZADD b 10 y 20 z");
    assert_eq!(h.run("ZUNIONSTORE dest 2 a b"), Reply::Int(3));
    assert_eq!(h.run("ZSCORE dest y"), Reply::Double(12.0));
    assert_eq!(h.run("ZINTERSTORE idest 2 a b AGGREGATE MAX"), Reply::Int(1));
    assert_eq!(h.run("ZSCORE idest y"), Reply::Double(10.0));
    assert_eq!(h.run("ZUNIONSTORE wdest 2 a b WEIGHTS 2 1"), Reply::Int(3));
    assert_eq!(h.run("ZSCORE wdest y"), Reply::Double(14.0));
    assert_eq!(h.run("ZDIFFSTORE ddest 2 a b"), Reply::Int(1));
    assert_eq!(h.run("ZSCORE ddest x"), Reply::Double(1.0));
    // sets participate with score 1
    h.run("SADD plain y");
    assert_eq!(h.run("ZUNIONSTORE mixed 2 a plain"), Reply::Int(2));
    assert_eq!(h.run("ZSCORE mixed y"), Reply::Double(3.0));
}
