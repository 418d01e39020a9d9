/*!
 * RESP Protocol Codec
 *
 * Decodes framed client requests (multibulk and inline forms) and encodes
 * typed replies in RESP2 or RESP3, per the negotiated protocol version of
 * the session. The decoder is restartable: feeding it the same buffer
 * suffix plus more bytes continues from the last incomplete frame.
 */

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Hard limit on a single inline command line.
pub const MAX_INLINE_LEN: usize = 64 * 1024;
/// Hard limit on a single bulk string payload.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Hard limit on the element count of a request array.
pub const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;

/// Fatal framing error. The connection writes the error line and closes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Protocol error: invalid multibulk length")]
    BadMultibulkLen,
    #[error("Protocol error: invalid bulk length")]
    BadBulkLen,
    #[error("Protocol error: expected '$', got '{0}'")]
    ExpectedBulk(char),
    #[error("Protocol error: too big inline request")]
    InlineTooLong,
    #[error("Protocol error: too big mbulk count string")]
    LengthLineTooLong,
    #[error("Protocol error: missing CRLF")]
    MissingCrlf,
    #[error("Protocol error: unknown reply type byte '{0}'")]
    UnknownType(char),
}

/// A decoded client request: one non-empty argument vector.
pub type Request = Vec<Vec<u8>>;

/// Parse a single request from the head of `data`.
///
/// Returns `Ok(Some((consumed, argv)))` for a complete frame, `Ok(None)` when
/// more bytes are needed, and `Err` on malformed input. An empty argv (blank
/// inline line, `*0`) is a valid parse that callers skip.
pub fn parse_request(data: &[u8]) -> Result<Option<(usize, Request)>, ProtocolError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data[0] == b'*' {
        parse_multibulk(data)
    } else {
        parse_inline(data)
    }
}

/// Drain every complete request out of `buf`, appending to `out`.
///
/// Consumed bytes are advanced out of the buffer; an incomplete tail frame is
/// left in place for the next read.
pub fn parse_many(buf: &mut BytesMut, out: &mut Vec<Request>) -> Result<(), ProtocolError> {
    loop {
        match parse_request(&buf[..])? {
            Some((consumed, argv)) => {
                buf.advance(consumed);
                if !argv.is_empty() {
                    out.push(argv);
                }
            }
            None => break,
        }
    }
    Ok(())
}

fn parse_multibulk(data: &[u8]) -> Result<Option<(usize, Request)>, ProtocolError> {
    let (hdr, count) = match read_length_line(&data[1..], ProtocolError::BadMultibulkLen)? {
        Some(x) => x,
        None => return Ok(None),
    };
    let mut cursor = 1 + hdr;
    if count < 0 || count > MAX_MULTIBULK_LEN {
        return Err(ProtocolError::BadMultibulkLen);
    }
    let mut argv: Request = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if cursor >= data.len() {
            return Ok(None);
        }
        let ty = data[cursor];
        if ty != b'$' {
            return Err(ProtocolError::ExpectedBulk(ty as char));
        }
        let (hdr, len) = match read_length_line(&data[cursor + 1..], ProtocolError::BadBulkLen)? {
            Some(x) => x,
            None => return Ok(None),
        };
        cursor += 1 + hdr;
        if len < 0 || len as usize > MAX_BULK_LEN {
            return Err(ProtocolError::BadBulkLen);
        }
        let need = len as usize + 2;
        if cursor + need > data.len() {
            return Ok(None);
        }
        if &data[cursor + len as usize..cursor + need] != b"\r\n" {
            return Err(ProtocolError::MissingCrlf);
        }
        argv.push(data[cursor..cursor + len as usize].to_vec());
        cursor += need;
    }
    Ok(Some((cursor, argv)))
}

/// Inline form: one line of whitespace-separated tokens, for telnet use.
fn parse_inline(data: &[u8]) -> Result<Option<(usize, Request)>, ProtocolError> {
    let nl = match data.iter().position(|&b| b == b'\n') {
        Some(i) => i,
        None => {
            if data.len() > MAX_INLINE_LEN {
                return Err(ProtocolError::InlineTooLong);
            }
            return Ok(None);
        }
    };
    if nl > MAX_INLINE_LEN {
        return Err(ProtocolError::InlineTooLong);
    }
    let mut line = &data[..nl];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    let argv: Request = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_vec())
        .collect();
    Ok(Some((nl + 1, argv)))
}

/// Read a decimal length terminated by CRLF. Returns (bytes consumed, value).
fn read_length_line(s: &[u8], on_bad: ProtocolError) -> Result<Option<(usize, i64)>, ProtocolError> {
    let mut i = 0;
    while i + 1 < s.len() && !(s[i] == b'\r' && s[i + 1] == b'\n') {
        i += 1;
        if i > 32 {
            return Err(ProtocolError::LengthLineTooLong);
        }
    }
    if i + 1 >= s.len() {
        return Ok(None);
    }
    let num = std::str::from_utf8(&s[..i])
        .ok()
        .and_then(|x| x.parse::<i64>().ok())
        .ok_or(on_bad)?;
    Ok(Some((i + 2, num)))
}

//
// Reply model and encoders
//

/// A typed server reply, encoded to bytes per the session's RESP version.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    /// Full error line without the leading '-', e.g. `WRONGTYPE Operation ...`.
    Error(String),
    Int(i64),
    Bulk(Vec<u8>),
    /// Null bulk string in RESP2, `_` in RESP3.
    Null,
    /// Null array in RESP2, `_` in RESP3.
    NullArray,
    Array(Vec<Reply>),
    Map(Vec<(Reply, Reply)>),
    Set(Vec<Reply>),
    Double(f64),
    Bool(bool),
    Big(String),
    /// (format tag, content), e.g. `("txt", "...")`.
    Verbatim(&'static str, String),
    Push(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".into())
    }

    pub fn simple(s: impl Into<String>) -> Reply {
        Reply::Simple(s.into())
    }

    pub fn bulk(b: impl Into<Vec<u8>>) -> Reply {
        Reply::Bulk(b.into())
    }

    /// Bulk strings for each element of an iterator.
    pub fn bulk_array<I, B>(items: I) -> Reply
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Reply::Array(items.into_iter().map(Reply::bulk).collect())
    }
}

/// Encode `reply` into `out` for RESP version `protover` (2 or 3).
pub fn encode_reply(reply: &Reply, protover: u8, out: &mut BytesMut) {
    match reply {
        Reply::Simple(s) => {
            out.extend_from_slice(b"+");
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Error(e) => {
            out.extend_from_slice(b"-");
            out.extend_from_slice(e.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Reply::Int(i) => {
            out.extend_from_slice(format!(":{}\r\n", i).as_bytes());
        }
        Reply::Bulk(b) => {
            out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        Reply::Null => {
            if protover >= 3 {
                out.extend_from_slice(b"_\r\n");
            } else {
                out.extend_from_slice(b"$-1\r\n");
            }
        }
        Reply::NullArray => {
            if protover >= 3 {
                out.extend_from_slice(b"_\r\n");
            } else {
                out.extend_from_slice(b"*-1\r\n");
            }
        }
        Reply::Array(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for it in items {
                encode_reply(it, protover, out);
            }
        }
        Reply::Map(pairs) => {
            if protover >= 3 {
                out.extend_from_slice(format!("%{}\r\n", pairs.len()).as_bytes());
            } else {
                out.extend_from_slice(format!("*{}\r\n", pairs.len() * 2).as_bytes());
            }
            for (k, v) in pairs {
                encode_reply(k, protover, out);
                encode_reply(v, protover, out);
            }
        }
        Reply::Set(items) => {
            let tag = if protover >= 3 { '~' } else { '*' };
            out.extend_from_slice(format!("{}{}\r\n", tag, items.len()).as_bytes());
            for it in items {
                encode_reply(it, protover, out);
            }
        }
        Reply::Double(d) => {
            let s = format_double(*d);
            if protover >= 3 {
                out.extend_from_slice(format!(",{}\r\n", s).as_bytes());
            } else {
                encode_reply(&Reply::Bulk(s.into_bytes()), protover, out);
            }
        }
        Reply::Bool(b) => {
            if protover >= 3 {
                out.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" });
            } else {
                encode_reply(&Reply::Int(*b as i64), protover, out);
            }
        }
        Reply::Big(digits) => {
            if protover >= 3 {
                out.extend_from_slice(format!("({}\r\n", digits).as_bytes());
            } else {
                encode_reply(&Reply::Bulk(digits.clone().into_bytes()), protover, out);
            }
        }
        Reply::Verbatim(fmt, content) => {
            if protover >= 3 {
                out.extend_from_slice(format!("={}\r\n{}:", content.len() + 4, fmt).as_bytes());
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"\r\n");
            } else {
                encode_reply(&Reply::Bulk(content.clone().into_bytes()), protover, out);
            }
        }
        Reply::Push(items) => {
            let tag = if protover >= 3 { '>' } else { '*' };
            out.extend_from_slice(format!("{}{}\r\n", tag, items.len()).as_bytes());
            for it in items {
                encode_reply(it, protover, out);
            }
        }
    }
}

/// Format a double the way RESP clients expect: no trailing `.0` on whole
/// numbers, `inf`/`-inf` for infinities.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "nan".into()
    } else if d.is_infinite() {
        if d > 0.0 { "inf".into() } else { "-inf".into() }
    } else if d == d.trunc() && d.abs() < 1e17 {
        format!("{}", d as i64)
    } else {
        format!("{}", d)
    }
}

/// Decode one reply frame from `data`. Used by tests and the reply
/// round-trip property; understands every RESP2 and RESP3 type byte.
pub fn decode_reply(data: &[u8]) -> Result<Option<(usize, Reply)>, ProtocolError> {
    if data.is_empty() {
        return Ok(None);
    }
    let ty = data[0];
    let rest = &data[1..];
    match ty {
        b'+' | b'-' | b':' | b',' | b'(' | b'#' | b'_' => {
            let nl = match find_crlf(rest) {
                Some(i) => i,
                None => return Ok(None),
            };
            let line = std::str::from_utf8(&rest[..nl]).map_err(|_| ProtocolError::MissingCrlf)?;
            let consumed = 1 + nl + 2;
            let reply = match ty {
                b'+' => Reply::Simple(line.into()),
                b'-' => Reply::Error(line.into()),
                b':' => Reply::Int(line.parse().map_err(|_| ProtocolError::BadBulkLen)?),
                b',' => Reply::Double(parse_double_repr(line)?),
                b'(' => Reply::Big(line.into()),
                b'#' => Reply::Bool(line == "t"),
                b'_' => Reply::Null,
                _ => unreachable!(),
            };
            Ok(Some((consumed, reply)))
        }
        b'$' | b'=' => {
            let (hdr, len) = match read_length_line(rest, ProtocolError::BadBulkLen)? {
                Some(x) => x,
                None => return Ok(None),
            };
            if len == -1 {
                return Ok(Some((1 + hdr, Reply::Null)));
            }
            if len < 0 {
                return Err(ProtocolError::BadBulkLen);
            }
            let start = 1 + hdr;
            let need = len as usize + 2;
            if start + need > data.len() {
                return Ok(None);
            }
            let payload = &data[start..start + len as usize];
            let reply = if ty == b'=' {
                let s = std::str::from_utf8(payload).map_err(|_| ProtocolError::MissingCrlf)?;
                let (fmt, content) = s.split_once(':').ok_or(ProtocolError::MissingCrlf)?;
                let fmt: &'static str = match fmt {
                    "txt" => "txt",
                    _ => "mkd",
                };
                Reply::Verbatim(fmt, content.into())
            } else {
                Reply::Bulk(payload.to_vec())
            };
            Ok(Some((start + need, reply)))
        }
        b'*' | b'~' | b'>' | b'%' => {
            let (hdr, len) = match read_length_line(rest, ProtocolError::BadMultibulkLen)? {
                Some(x) => x,
                None => return Ok(None),
            };
            let mut cursor = 1 + hdr;
            if len == -1 {
                return Ok(Some((cursor, Reply::NullArray)));
            }
            if len < 0 {
                return Err(ProtocolError::BadMultibulkLen);
            }
            if ty == b'%' {
                let mut pairs = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    let (n, k) = match decode_reply(&data[cursor..])? {
                        Some(x) => x,
                        None => return Ok(None),
                    };
                    cursor += n;
                    let (n, v) = match decode_reply(&data[cursor..])? {
                        Some(x) => x,
                        None => return Ok(None),
                    };
                    cursor += n;
                    pairs.push((k, v));
                }
                return Ok(Some((cursor, Reply::Map(pairs))));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let (n, item) = match decode_reply(&data[cursor..])? {
                    Some(x) => x,
                    None => return Ok(None),
                };
                cursor += n;
                items.push(item);
            }
            let reply = match ty {
                b'*' => Reply::Array(items),
                b'~' => Reply::Set(items),
                b'>' => Reply::Push(items),
                _ => unreachable!(),
            };
            Ok(Some((cursor, reply)))
        }
        other => Err(ProtocolError::UnknownType(other as char)),
    }
}

fn parse_double_repr(s: &str) -> Result<f64, ProtocolError> {
    match s {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => s.parse().map_err(|_| ProtocolError::BadBulkLen),
    }
}

fn find_crlf(s: &[u8]) -> Option<usize> {
    s.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_command() {
        let data = b"*1\r\n$4\r\nPING\r\n";
        let (consumed, argv) = parse_request(data).unwrap().unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(argv, vec![b"PING".to_vec()]);
    }

    #[test]
    fn parse_incomplete_returns_none() {
        let data = b"*2\r\n$3\r\nGET\r\n$5\r\nhel";
        assert_eq!(parse_request(data).unwrap(), None);
    }

    #[test]
    fn parse_restartable_at_any_split() {
        let full = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nworld\r\n*1\r\n$4\r\nPING\r\n";
        for split in 0..full.len() {
            let mut buf = BytesMut::new();
            let mut out = Vec::new();
            buf.extend_from_slice(&full[..split]);
            parse_many(&mut buf, &mut out).unwrap();
            buf.extend_from_slice(&full[split..]);
            parse_many(&mut buf, &mut out).unwrap();
            assert_eq!(out.len(), 2, "split at {}", split);
            assert_eq!(out[0][0], b"SET");
            assert_eq!(out[1][0], b"PING");
        }
    }

    #[test]
    fn parse_inline_command() {
        let (consumed, argv) = parse_request(b"SET foo  bar\r\n").unwrap().unwrap();
        assert_eq!(consumed, 14);
        assert_eq!(argv, vec![b"SET".to_vec(), b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[test]
    fn blank_inline_line_is_empty_request() {
        let (_, argv) = parse_request(b"\r\n").unwrap().unwrap();
        assert!(argv.is_empty());
    }

    #[test]
    fn negative_multibulk_rejected() {
        assert!(parse_request(b"*-1\r\n").is_err());
        assert!(parse_request(b"*-4\r\n").is_err());
    }

    #[test]
    fn non_bulk_element_rejected() {
        assert_eq!(
            parse_request(b"*1\r\n:5\r\n"),
            Err(ProtocolError::ExpectedBulk(':'))
        );
    }

    #[test]
    fn encode_resp2_basics() {
        let mut out = BytesMut::new();
        encode_reply(&Reply::ok(), 2, &mut out);
        encode_reply(&Reply::Int(42), 2, &mut out);
        encode_reply(&Reply::Null, 2, &mut out);
        assert_eq!(&out[..], b"+OK\r\n:42\r\n$-1\r\n".as_ref());
    }

    #[test]
    fn encode_map_downgrades_in_resp2() {
        let map = Reply::Map(vec![(Reply::bulk("a"), Reply::Int(1))]);
        let mut v2 = BytesMut::new();
        encode_reply(&map, 2, &mut v2);
        assert_eq!(&v2[..], b"*2\r\n$1\r\na\r\n:1\r\n".as_ref());
        let mut v3 = BytesMut::new();
        encode_reply(&map, 3, &mut v3);
        assert_eq!(&v3[..], b"%1\r\n$1\r\na\r\n:1\r\n".as_ref());
    }

    #[test]
    fn encode_decode_round_trip_resp3() {
        let replies = vec![
            Reply::Simple("OK".into()),
            Reply::Error("ERR oops".into()),
            Reply::Int(-7),
            Reply::bulk("hello"),
            Reply::Null,
            Reply::Array(vec![Reply::Int(1), Reply::bulk("x")]),
            Reply::Map(vec![(Reply::bulk("k"), Reply::Double(1.5))]),
            Reply::Set(vec![Reply::bulk("m")]),
            Reply::Bool(true),
            Reply::Big("123456789012345678901234567890".into()),
            Reply::Verbatim("txt", "note".into()),
            Reply::Push(vec![Reply::bulk("message")]),
        ];
        for r in replies {
            let mut buf = BytesMut::new();
            encode_reply(&r, 3, &mut buf);
            let (n, back) = decode_reply(&buf[..]).unwrap().unwrap();
            assert_eq!(n, buf.len());
            assert_eq!(back, r, "round trip for {:?}", r);
        }
    }

    #[test]
    fn double_formatting() {
        assert_eq!(format_double(17.0), "17");
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }
}
