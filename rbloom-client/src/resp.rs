//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode client commands and parse server replies, then narrow a
//! parsed reply to the shape the issuing command guarantees.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Responses are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing and shape mismatches return errors
//!    immediately; error frames are classified (redirect or server error).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, BufRead, Read};

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use rbloom_common::{ClientError, ClientResult, ReplyShape};

use crate::command::Arg;

/// RESP response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Bytes>),
    /// *... arrays.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Name of the frame type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::Simple(_) => "status",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::Bulk(Some(_)) => "bulk string",
            RespValue::Bulk(None) => "nil",
            RespValue::Array(_) => "array",
        }
    }
}

/// Value of one field in a filter's info reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    /// Numeric field such as `Capacity`.
    Integer(i64),
    /// Status or bulk text.
    Text(String),
    /// Nested array, kept in reply order.
    List(Vec<InfoValue>),
    /// Null bulk string.
    Nil,
}

impl InfoValue {
    /// Numeric value of the field. Text that parses as an integer counts;
    /// lists and nil do not.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            InfoValue::Integer(value) => Some(*value),
            InfoValue::Text(text) => text.parse().ok(),
            _ => None,
        }
    }
}

/// Field map decoded from a `*.INFO` reply.
pub type FilterInfo = BTreeMap<String, InfoValue>;

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(keyword: &str, args: &[Arg], out: &mut BytesMut) {
    out.extend_from_slice(b"*");
    push_usize(out, args.len() + 1);
    out.extend_from_slice(b"\r\n");
    push_bulk(out, keyword.as_bytes());

    let mut scratch = BytesMut::new();
    for arg in args {
        match arg {
            Arg::Text(text) => push_bulk(out, text.as_bytes()),
            Arg::Bytes(data) => push_bulk(out, data),
            Arg::Int(_) | Arg::Float(_) => {
                scratch.clear();
                arg.write_to(&mut scratch);
                push_bulk(out, &scratch);
            }
        }
    }
}

fn push_bulk(out: &mut BytesMut, data: &[u8]) {
    out.extend_from_slice(b"$");
    push_usize(out, data.len());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Largest bulk string the server can send (`proto-max-bulk-len` default).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Largest aggregate accepted in one reply.
const MAX_ARRAY_LEN: i64 = i32::MAX as i64;
/// Upper bound on capacity reserved from a length prefix before data arrives.
const PREALLOC_LIMIT: usize = 1024;

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(ClientError::Protocol("empty reply line"));
    }

    match line_buf[0] {
        b'+' => Ok(RespValue::Simple(line_buf[1..].to_vec())),
        b'-' => Ok(RespValue::Error(line_buf[1..].to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf)
        }
        _ => Err(ClientError::Protocol("unknown reply type byte")),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<RespValue> {
    if len == -1 {
        return Ok(RespValue::Bulk(None));
    }
    if !(0..=MAX_BULK_LEN).contains(&len) {
        return Err(ClientError::Protocol("bulk length out of range"));
    }
    let len = len as usize;
    // Grow with the bytes actually received, not the announced length.
    let mut data = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bulk string truncated").into());
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(ClientError::Protocol("bulk string missing CRLF"));
    }

    line_buf.clear();
    Ok(RespValue::Bulk(Some(Bytes::from(data))))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<RespValue> {
    if len == -1 || len == 0 {
        return Ok(RespValue::Array(Vec::new()));
    }
    if !(1..=MAX_ARRAY_LEN).contains(&len) {
        return Err(ClientError::Protocol("array length out of range"));
    }

    let mut items = Vec::with_capacity((len as usize).min(PREALLOC_LIMIT));
    for _ in 0..len {
        items.push(read_response(reader, line_buf)?);
    }
    Ok(RespValue::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        // A peer that hangs up is a connectivity failure, not a framing one.
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server").into());
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol("reply line missing CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(ClientError::Protocol("empty integer"));
    }

    // Accumulate toward the sign so i64::MIN parses without overflow.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol("invalid integer digit"));
        }
        let digit = i64::from(b - b'0');
        value = value
            .checked_mul(10)
            .and_then(|v| if negative { v.checked_sub(digit) } else { v.checked_add(digit) })
            .ok_or(ClientError::Protocol("integer out of range"))?;
    }
    Ok(value)
}

fn push_usize(out: &mut BytesMut, value: usize) {
    push_u64(out, value as u64);
}

fn push_u64(out: &mut BytesMut, mut value: u64) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.extend_from_slice(&buf[..len]);
}

/// Appends a signed integer in decimal.
pub fn push_i64(out: &mut BytesMut, value: i64) {
    if value < 0 {
        out.extend_from_slice(b"-");
    }
    push_u64(out, value.unsigned_abs());
}

/// Appends a float in the shortest decimal form that parses back to `value`.
pub fn push_f64(out: &mut BytesMut, value: f64) {
    // Formatting into BytesMut only grows the buffer; it cannot fail.
    let _ = write!(out, "{}", value);
}

fn server_error(message: Vec<u8>) -> ClientError {
    ClientError::from_server_message(String::from_utf8_lossy(&message).into_owned())
}

fn unexpected(expected: ReplyShape, found: &RespValue) -> ClientError {
    ClientError::UnexpectedReply {
        expected: expected.name(),
        found: found.type_name(),
    }
}

fn text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Decodes a status reply into its text.
pub fn expect_status(value: RespValue) -> ClientResult<String> {
    match value {
        RespValue::Simple(status) => Ok(text(&status)),
        RespValue::Error(message) => Err(server_error(message)),
        other => Err(unexpected(ReplyShape::Status, &other)),
    }
}

/// Decodes a status reply that must be `OK`.
pub fn expect_ok(value: RespValue) -> ClientResult<()> {
    let status = expect_status(value)?;
    if status == "OK" {
        Ok(())
    } else {
        Err(ClientError::Server { message: status })
    }
}

/// Decodes a single integer reply.
pub fn expect_integer(value: RespValue) -> ClientResult<i64> {
    match value {
        RespValue::Integer(number) => Ok(number),
        RespValue::Error(message) => Err(server_error(message)),
        other => Err(unexpected(ReplyShape::Integer, &other)),
    }
}

/// Decodes a single integer reply as a flag (nonzero = true).
pub fn expect_flag(value: RespValue) -> ClientResult<bool> {
    expect_integer(value).map(|number| number != 0)
}

/// Decodes an array whose elements are all integers.
pub fn expect_integers(value: RespValue) -> ClientResult<Vec<i64>> {
    let items = match value {
        RespValue::Array(items) => items,
        RespValue::Error(message) => return Err(server_error(message)),
        other => return Err(unexpected(ReplyShape::IntegerArray, &other)),
    };
    items
        .into_iter()
        .map(|item| match item {
            RespValue::Integer(number) => Ok(number),
            RespValue::Error(message) => Err(server_error(message)),
            other => Err(unexpected(ReplyShape::IntegerArray, &other)),
        })
        .collect()
}

/// Decodes an integer array that must have one entry per submitted item.
pub fn expect_aligned_integers(value: RespValue, len: usize) -> ClientResult<Vec<i64>> {
    let numbers = expect_integers(value)?;
    if numbers.len() != len {
        return Err(ClientError::Protocol("reply length differs from item count"));
    }
    Ok(numbers)
}

/// Decodes an aligned integer array into flags (nonzero = true).
pub fn expect_flags(value: RespValue, len: usize) -> ClientResult<Vec<bool>> {
    Ok(expect_aligned_integers(value, len)?
        .into_iter()
        .map(|number| number != 0)
        .collect())
}

/// Decodes a generic array, leaving element typing to the caller.
pub fn expect_values(value: RespValue) -> ClientResult<Vec<RespValue>> {
    match value {
        RespValue::Array(items) => Ok(items),
        RespValue::Error(message) => Err(server_error(message)),
        other => Err(unexpected(ReplyShape::GenericArray, &other)),
    }
}

/// Decodes an array of strings; nil elements become `None`.
pub fn expect_texts(value: RespValue) -> ClientResult<Vec<Option<String>>> {
    let items = match value {
        RespValue::Array(items) => items,
        RespValue::Error(message) => return Err(server_error(message)),
        other => return Err(unexpected(ReplyShape::TextArray, &other)),
    };
    items
        .into_iter()
        .map(|item| match item {
            RespValue::Bulk(Some(data)) => Ok(Some(text(&data))),
            RespValue::Simple(data) => Ok(Some(text(&data))),
            RespValue::Bulk(None) => Ok(None),
            RespValue::Error(message) => Err(server_error(message)),
            other => Err(unexpected(ReplyShape::TextArray, &other)),
        })
        .collect()
}

/// Decodes an alternating key/value array into a field map.
pub fn expect_info(value: RespValue) -> ClientResult<FilterInfo> {
    let items = expect_values(value)?;
    if items.len() % 2 != 0 {
        return Err(ClientError::Protocol("info reply has odd length"));
    }

    let mut info = FilterInfo::new();
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key = match key {
            RespValue::Bulk(Some(data)) => text(&data),
            RespValue::Simple(data) => text(&data),
            other => return Err(unexpected(ReplyShape::GenericArray, &other)),
        };
        info.insert(key, info_value(value)?);
    }
    Ok(info)
}

fn info_value(value: RespValue) -> ClientResult<InfoValue> {
    Ok(match value {
        RespValue::Integer(number) => InfoValue::Integer(number),
        RespValue::Bulk(Some(data)) => InfoValue::Text(text(&data)),
        RespValue::Simple(data) => InfoValue::Text(text(&data)),
        RespValue::Bulk(None) => InfoValue::Nil,
        RespValue::Array(items) => {
            InfoValue::List(items.into_iter().map(info_value).collect::<ClientResult<_>>()?)
        }
        RespValue::Error(message) => return Err(server_error(message)),
    })
}
