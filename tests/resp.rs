mod common;

use bytes::BytesMut;
use cindr::protocol::*;
use common::Harness;

#[test]
fn ping_wire_bytes() {
    let mut h = Harness::new();
    assert_eq!(h.bytes("PING", 2), b"+PONG\r\n");
}

#[test]
fn pipelined_commands_parse_in_order() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
    buf.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n");
    buf.extend_from_slice(b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n");
    let mut cmds = Vec::new();
    parse_many(&mut buf, &mut cmds).unwrap();
    assert_eq!(cmds.len(), 3);
    assert_eq!(cmds[0][0], b"PING");
    assert_eq!(cmds[1][0], b"SET");
    assert_eq!(cmds[2][0], b"GET");
    assert!(buf.is_empty());
}

#[test]
fn decoder_restarts_at_every_split_point() {
    let full: &[u8] = b"*2\r\n$4\r\nLLEN\r\n$5\r\nmykey\r\nSET inline 1\r\n*1\r\n$4\r\nPING\r\n";
    let whole = {
        let mut buf = BytesMut::from(full);
        let mut out = Vec::new();
        parse_many(&mut buf, &mut out).unwrap();
        out
    };
    for split in 0..full.len() {
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        buf.extend_from_slice(&full[..split]);
        parse_many(&mut buf, &mut out).unwrap();
        buf.extend_from_slice(&full[split..]);
        parse_many(&mut buf, &mut out).unwrap();
        assert_eq!(out, whole, "split at byte {}", split);
    }
}

#[test]
fn inline_commands_execute() {
    let (_, argv) = parse_request(b"GET somekey\r\n").unwrap().unwrap();
    assert_eq!(argv, vec![b"GET".to_vec(), b"somekey".to_vec()]);
}

#[test]
fn protocol_errors_are_fatal_variants() {
    assert!(matches!(
        parse_request(b"*abc\r\n"),
        Err(ProtocolError::BadMultibulkLen)
    ));
    assert!(matches!(
        parse_request(b"*1\r\n$-2\r\n"),
        Err(ProtocolError::BadBulkLen)
    ));
    assert!(matches!(
        parse_request(b"*1\r\n+OK\r\n"),
        Err(ProtocolError::ExpectedBulk('+'))
    ));
    let long = vec![b'x'; MAX_INLINE_LEN + 2];
    assert!(matches!(
        parse_request(&long),
        Err(ProtocolError::InlineTooLong)
    ));
}

#[test]
fn reply_round_trip_resp2() {
    // RESP2-native shapes survive encode/decode unchanged
    let replies = vec![
        Reply::Simple("OK".into()),
        Reply::Error("ERR bad".into()),
        Reply::Int(12),
        Reply::bulk("payload"),
        Reply::Array(vec![Reply::Int(1), Reply::bulk("two")]),
    ];
    for r in replies {
        let mut buf = BytesMut::new();
        encode_reply(&r, 2, &mut buf);
        let (n, back) = decode_reply(&buf[..]).unwrap().unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(back, r);
    }
}

#[test]
fn reply_round_trip_resp3() {
    let replies = vec![
        Reply::Map(vec![(Reply::bulk("a"), Reply::Int(1))]),
        Reply::Set(vec![Reply::bulk("x"), Reply::bulk("y")]),
        Reply::Double(2.5),
        Reply::Bool(false),
        Reply::Null,
        Reply::Push(vec![Reply::bulk("message"), Reply::bulk("c"), Reply::bulk("p")]),
        Reply::Big("99999999999999999999999999".into()),
        Reply::Verbatim("txt", "hello".into()),
    ];
    for r in replies {
        let mut buf = BytesMut::new();
        encode_reply(&r, 3, &mut buf);
        let (n, back) = decode_reply(&buf[..]).unwrap().unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(back, r);
    }
}

#[test]
fn resp2_and_resp3_null_encodings() {
    let mut v2 = BytesMut::new();
    encode_reply(&Reply::Null, 2, &mut v2);
    assert_eq!(&v2[..], b"$-1\r\n".as_ref());
    let mut v2 = BytesMut::new();
    encode_reply(&Reply::NullArray, 2, &mut v2);
    assert_eq!(&v2[..], b"*-1\r\n".as_ref());
    let mut v3 = BytesMut::new();
    encode_reply(&Reply::Null, 3, &mut v3);
    assert_eq!(&v3[..], b"_\r\n".as_ref());
}

#[test]
fn large_bulk_payload_round_trips() {
    let big = vec![b'x'; 100 * 1024];
    let mut frame = Vec::new();
    frame.extend_from_slice(format!("*3\r\n$3\r\nSET\r\n$5\r\nlarge\r\n${}\r\n", big.len()).as_bytes());
    frame.extend_from_slice(&big);
    frame.extend_from_slice(b"\r\n");
    let (consumed, argv) = parse_request(&frame).unwrap().unwrap();
    assert_eq!(consumed, frame.len());
    assert_eq!(argv[2].len(), big.len());

    let mut h = Harness::new();
    h.run_argv(&argv);
    let reply = h.run("GET large");
    assert_eq!(reply, Reply::Bulk(big));
}
