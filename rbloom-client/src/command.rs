//! # Command Envelope
//!
//! Purpose: Carry one command keyword plus its ordered, typed arguments until
//! the codec writes them to a connection.
//!
//! ## Design Principles
//! 1. **Builder Pattern**: `Command::new(..).arg(..).args(..)` keeps call sites flat.
//! 2. **Order Preservation**: Arguments are encoded exactly in insertion order;
//!    the server assigns meaning by position.
//! 3. **Typed Arguments**: Numbers are kept as numbers until encoding so the
//!    text form is produced in one place.

use std::borrow::Cow;

use bytes::{Bytes, BytesMut};

use rbloom_common::{keywords, ClientError, ClientResult, CommandSpec};

use crate::resp::{encode_command, push_f64, push_i64};

/// One positional command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// UTF-8 text, sent as its raw bytes.
    Text(String),
    /// Opaque binary payload.
    Bytes(Bytes),
    /// Integer, sent in decimal.
    Int(i64),
    /// Floating point, sent in shortest round-trip decimal.
    Float(f64),
}

impl Arg {
    /// Appends the wire bytes of this argument (without bulk framing).
    pub fn write_to(&self, out: &mut BytesMut) {
        match self {
            Arg::Text(text) => out.extend_from_slice(text.as_bytes()),
            Arg::Bytes(data) => out.extend_from_slice(data),
            Arg::Int(value) => push_i64(out, *value),
            Arg::Float(value) => push_f64(out, *value),
        }
    }

    /// Returns the wire bytes of this argument.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Arg::Text(text) => Cow::Borrowed(text.as_bytes()),
            Arg::Bytes(data) => Cow::Borrowed(data.as_ref()),
            Arg::Int(_) | Arg::Float(_) => {
                let mut out = BytesMut::with_capacity(24);
                self.write_to(&mut out);
                Cow::Owned(out.to_vec())
            }
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        // Values above i64::MAX are far beyond any filter capacity the server accepts.
        Arg::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

/// A command keyword and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    keyword: &'static str,
    args: Vec<Arg>,
}

impl Command {
    /// Starts a command with the given keyword.
    pub fn new(keyword: &'static str) -> Self {
        Command {
            keyword,
            args: Vec::new(),
        }
    }

    /// Starts a command from a keyword table row.
    pub fn from_spec(spec: &CommandSpec) -> Self {
        Self::new(spec.keyword)
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments in iteration order.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends raw items, each as a binary argument.
    pub fn items<T: AsRef<[u8]>>(self, items: &[T]) -> Self {
        self.args(items.iter().map(|item| {
            let bytes: &[u8] = item.as_ref();
            bytes
        }))
    }

    /// Command name as sent on the wire.
    pub fn keyword(&self) -> &'static str {
        self.keyword
    }

    pub fn arguments(&self) -> &[Arg] {
        &self.args
    }

    /// Routing key: the first argument, by the module command convention.
    pub fn key(&self) -> Option<Cow<'_, [u8]>> {
        self.args.first().map(Arg::as_bytes)
    }

    /// Encodes the command as a RESP2 array of bulk strings.
    pub fn encode(&self, out: &mut BytesMut) {
        encode_command(self.keyword, &self.args, out);
    }
}

/// Creation flags for `BF.INSERT` / `CF.INSERT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOptions {
    capacity: Option<u64>,
    error_rate: Option<f64>,
    no_create: bool,
    non_scaling: bool,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity used if the filter has to be created.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Error rate used if the filter has to be created (Bloom only).
    pub fn error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = Some(error_rate);
        self
    }

    /// Fail instead of creating a missing filter.
    pub fn no_create(mut self) -> Self {
        self.no_create = true;
        self
    }

    /// Do not grow the filter when it fills up (Bloom only).
    pub fn non_scaling(mut self) -> Self {
        self.non_scaling = true;
        self
    }

    /// Returns true when a Bloom-only flag is set.
    pub fn has_bloom_only_flags(&self) -> bool {
        self.error_rate.is_some() || self.non_scaling
    }

    /// Flag arguments followed by the `ITEMS` marker.
    pub fn to_args(&self) -> Vec<Arg> {
        let mut args = Vec::with_capacity(7);
        if let Some(capacity) = self.capacity {
            args.push(Arg::from(keywords::CAPACITY));
            args.push(Arg::from(capacity));
        }
        if let Some(error_rate) = self.error_rate {
            args.push(Arg::from(keywords::ERROR));
            args.push(Arg::from(error_rate));
        }
        if self.no_create {
            args.push(Arg::from(keywords::NOCREATE));
        }
        if self.non_scaling {
            args.push(Arg::from(keywords::NONSCALING));
        }
        args.push(Arg::from(keywords::ITEMS));
        args
    }
}

/// Rejects option sets the cuckoo module does not understand.
pub(crate) fn cuckoo_insert_args(options: &InsertOptions) -> ClientResult<Vec<Arg>> {
    if options.has_bloom_only_flags() {
        return Err(ClientError::Config(
            "cuckoo insert accepts only CAPACITY and NOCREATE".to_string(),
        ));
    }
    Ok(options.to_args())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(command: &Command) -> Vec<u8> {
        let mut out = BytesMut::new();
        command.encode(&mut out);
        out.to_vec()
    }

    #[test]
    fn encodes_mixed_arguments_in_order() {
        let command = Command::new("BF.RESERVE").arg("f1").arg(0.01).arg(1000u64);
        assert_eq!(
            encoded(&command),
            b"*4\r\n$10\r\nBF.RESERVE\r\n$2\r\nf1\r\n$4\r\n0.01\r\n$4\r\n1000\r\n".to_vec()
        );
    }

    #[test]
    fn binary_items_are_sent_verbatim() {
        let command = Command::new("BF.MADD").arg("f").items(&[&b"\x00\r\n"[..], &b"x"[..]]);
        assert_eq!(
            encoded(&command),
            b"*4\r\n$7\r\nBF.MADD\r\n$1\r\nf\r\n$3\r\n\x00\r\n\r\n$1\r\nx\r\n".to_vec()
        );
    }

    #[test]
    fn key_is_first_argument() {
        let command = Command::new("CF.ADD").arg("{user}:seen").arg(7i64);
        assert_eq!(command.key().unwrap().as_ref(), b"{user}:seen");
        assert!(Command::new("PING").key().is_none());
    }

    #[test]
    fn numeric_arguments_render_as_decimal() {
        assert_eq!(Arg::from(-42i64).as_bytes().as_ref(), b"-42");
        assert_eq!(Arg::from(0.5).as_bytes().as_ref(), b"0.5");
        assert_eq!(Arg::from(2.0).as_bytes().as_ref(), b"2");
    }

    #[test]
    fn insert_options_emit_flags_then_items_marker() {
        let args = InsertOptions::new()
            .capacity(100)
            .error_rate(0.001)
            .no_create()
            .non_scaling()
            .to_args();
        let rendered: Vec<Vec<u8>> = args.iter().map(|arg| arg.as_bytes().into_owned()).collect();
        assert_eq!(
            rendered,
            vec![
                b"CAPACITY".to_vec(),
                b"100".to_vec(),
                b"ERROR".to_vec(),
                b"0.001".to_vec(),
                b"NOCREATE".to_vec(),
                b"NONSCALING".to_vec(),
                b"ITEMS".to_vec(),
            ]
        );
    }

    #[test]
    fn cuckoo_rejects_bloom_flags() {
        assert!(cuckoo_insert_args(&InsertOptions::new().capacity(10).no_create()).is_ok());
        assert!(cuckoo_insert_args(&InsertOptions::new().error_rate(0.1)).is_err());
    }
}
