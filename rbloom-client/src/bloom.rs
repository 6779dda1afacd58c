//! # Bloom Filter Commands
//!
//! Purpose: Typed wrappers for the `BF.*` command family over any
//! `CommandExecutor`.

use rbloom_common::{require, ClientResult, Family, Operation};

use crate::client::CommandExecutor;
use crate::command::{Command, InsertOptions};
use crate::resp::{expect_flag, expect_flags, expect_info, expect_ok, FilterInfo};

/// Bloom filter commands borrowed from an executor.
pub struct BloomFilter<'a, E> {
    executor: &'a E,
}

impl<'a, E: CommandExecutor> BloomFilter<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        BloomFilter { executor }
    }

    fn command(op: Operation, name: &str) -> ClientResult<Command> {
        Ok(Command::from_spec(require(Family::Bloom, op)?).arg(name))
    }

    /// Creates an empty filter sized for `capacity` items at `error_rate`.
    ///
    /// Fails with a server error if the filter already exists.
    pub fn reserve(&self, name: &str, capacity: u64, error_rate: f64) -> ClientResult<()> {
        let command = Self::command(Operation::Reserve, name)?
            .arg(error_rate)
            .arg(capacity);
        self.executor.execute(&command, expect_ok)
    }

    /// Adds one item; returns true if it was not already present.
    pub fn add(&self, name: &str, item: impl AsRef<[u8]>) -> ClientResult<bool> {
        let command = Self::command(Operation::Add, name)?.arg(item.as_ref());
        self.executor.execute(&command, expect_flag)
    }

    /// Adds several items; entry `i` reports whether `items[i]` was new.
    pub fn add_multi<T: AsRef<[u8]>>(&self, name: &str, items: &[T]) -> ClientResult<Vec<bool>> {
        self.batch(Operation::MultiAdd, name, items)
    }

    /// Returns true if the item may be in the filter.
    pub fn exists(&self, name: &str, item: impl AsRef<[u8]>) -> ClientResult<bool> {
        let command = Self::command(Operation::Exists, name)?.arg(item.as_ref());
        self.executor.execute(&command, expect_flag)
    }

    /// Membership of several items, aligned with `items`.
    pub fn exists_multi<T: AsRef<[u8]>>(
        &self,
        name: &str,
        items: &[T],
    ) -> ClientResult<Vec<bool>> {
        self.batch(Operation::MultiExists, name, items)
    }

    /// Adds items, creating the filter with `options` if it is missing.
    pub fn insert<T: AsRef<[u8]>>(
        &self,
        name: &str,
        options: &InsertOptions,
        items: &[T],
    ) -> ClientResult<Vec<bool>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let command = Self::command(Operation::Insert, name)?
            .args(options.to_args())
            .items(items);
        let len = items.len();
        self.executor.execute(&command, |reply| expect_flags(reply, len))
    }

    /// Server-reported fields of the filter.
    pub fn info(&self, name: &str) -> ClientResult<FilterInfo> {
        let command = Self::command(Operation::Info, name)?;
        self.executor.execute(&command, expect_info)
    }

    /// Deletes the filter key; returns true if it existed.
    pub fn delete(&self, name: &str) -> ClientResult<bool> {
        let command = Command::from_spec(require(Family::Keyspace, Operation::Delete)?).arg(name);
        self.executor.execute(&command, expect_flag)
    }

    fn batch<T: AsRef<[u8]>>(
        &self,
        op: Operation,
        name: &str,
        items: &[T],
    ) -> ClientResult<Vec<bool>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let command = Self::command(op, name)?.items(items);
        let len = items.len();
        self.executor.execute(&command, |reply| expect_flags(reply, len))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use bytes::Bytes;

    use super::*;
    use crate::resp::RespValue;

    /// Records commands and answers each with a canned reply.
    struct Scripted {
        sent: RefCell<Vec<Vec<Vec<u8>>>>,
        reply: RespValue,
    }

    impl Scripted {
        fn new(reply: RespValue) -> Self {
            Scripted {
                sent: RefCell::new(Vec::new()),
                reply,
            }
        }

        fn last(&self) -> Vec<Vec<u8>> {
            self.sent.borrow().last().cloned().unwrap_or_default()
        }
    }

    impl CommandExecutor for Scripted {
        fn execute<T, D>(&self, command: &Command, decode: D) -> ClientResult<T>
        where
            D: Fn(RespValue) -> ClientResult<T>,
        {
            let mut parts = vec![command.keyword().as_bytes().to_vec()];
            parts.extend(command.arguments().iter().map(|arg| arg.as_bytes().to_vec()));
            self.sent.borrow_mut().push(parts);
            decode(self.reply.clone())
        }
    }

    fn words(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|part| part.as_bytes().to_vec()).collect()
    }

    #[test]
    fn reserve_sends_error_rate_before_capacity() {
        let exec = Scripted::new(RespValue::Simple(b"OK".to_vec()));
        exec.bloom().reserve("f1", 1000, 0.01).unwrap();
        assert_eq!(exec.last(), words(&["BF.RESERVE", "f1", "0.01", "1000"]));
    }

    #[test]
    fn insert_places_flags_before_items() {
        let exec = Scripted::new(RespValue::Array(vec![
            RespValue::Integer(1),
            RespValue::Integer(0),
        ]));
        let options = InsertOptions::new().capacity(500).no_create();
        let added = exec.bloom().insert("f", &options, &["a", "b"]).unwrap();
        assert_eq!(added, vec![true, false]);
        assert_eq!(
            exec.last(),
            words(&["BF.INSERT", "f", "CAPACITY", "500", "NOCREATE", "ITEMS", "a", "b"])
        );
    }

    #[test]
    fn empty_batches_skip_the_server() {
        let exec = Scripted::new(RespValue::Integer(0));
        assert!(exec.bloom().add_multi::<&str>("f", &[]).unwrap().is_empty());
        assert!(exec.bloom().exists_multi::<&str>("f", &[]).unwrap().is_empty());
        assert!(exec.sent.borrow().is_empty());
    }

    #[test]
    fn misaligned_batch_reply_is_protocol_error() {
        let exec = Scripted::new(RespValue::Array(vec![RespValue::Integer(1)]));
        let err = exec.bloom().exists_multi("f", &["a", "b"]).unwrap_err();
        assert!(matches!(err, rbloom_common::ClientError::Protocol(_)));
    }

    #[test]
    fn binary_items_are_sent_verbatim() {
        let exec = Scripted::new(RespValue::Integer(1));
        assert!(exec.bloom().add("f", [0u8, 159, 146, 150]).unwrap());
        assert_eq!(exec.last()[2], vec![0u8, 159, 146, 150]);
    }

    #[test]
    fn delete_uses_keyspace_del() {
        let exec = Scripted::new(RespValue::Integer(1));
        assert!(exec.bloom().delete("f").unwrap());
        assert_eq!(exec.last(), words(&["DEL", "f"]));
    }

    #[test]
    fn info_decodes_pairs() {
        let exec = Scripted::new(RespValue::Array(vec![
            RespValue::Simple(b"Capacity".to_vec()),
            RespValue::Integer(1000),
            RespValue::Bulk(Some(Bytes::from_static(b"Number of filters"))),
            RespValue::Integer(1),
        ]));
        let info = exec.bloom().info("f").unwrap();
        assert_eq!(info["Capacity"].as_integer(), Some(1000));
        assert_eq!(info.len(), 2);
    }
}
