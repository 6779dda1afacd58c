//! # Cuckoo Filter Commands
//!
//! Purpose: Typed wrappers for the `CF.*` command family. Unlike Bloom
//! filters, cuckoo filters support removing single items.

use rbloom_common::{require, ClientResult, Family, Operation};

use crate::client::CommandExecutor;
use crate::command::{cuckoo_insert_args, Command, InsertOptions};
use crate::resp::{expect_flag, expect_flags, expect_info, expect_ok, FilterInfo};

/// Cuckoo filter commands borrowed from an executor.
pub struct CuckooFilter<'a, E> {
    executor: &'a E,
}

impl<'a, E: CommandExecutor> CuckooFilter<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        CuckooFilter { executor }
    }

    fn command(op: Operation, name: &str) -> ClientResult<Command> {
        Ok(Command::from_spec(require(Family::Cuckoo, op)?).arg(name))
    }

    fn single(&self, op: Operation, name: &str, item: &[u8]) -> ClientResult<bool> {
        let command = Self::command(op, name)?.arg(item);
        self.executor.execute(&command, expect_flag)
    }

    /// Creates an empty filter sized for `capacity` items.
    pub fn reserve(&self, name: &str, capacity: u64) -> ClientResult<()> {
        let command = Self::command(Operation::Reserve, name)?.arg(capacity);
        self.executor.execute(&command, expect_ok)
    }

    /// Adds an item, even if it is already present.
    pub fn add(&self, name: &str, item: impl AsRef<[u8]>) -> ClientResult<bool> {
        self.single(Operation::Add, name, item.as_ref())
    }

    /// Adds an item only if it is not already present; returns false if it was.
    pub fn add_nx(&self, name: &str, item: impl AsRef<[u8]>) -> ClientResult<bool> {
        self.single(Operation::AddNx, name, item.as_ref())
    }

    /// Tests membership. May report false positives, never false negatives
    /// for items that were not removed.
    pub fn exists(&self, name: &str, item: impl AsRef<[u8]>) -> ClientResult<bool> {
        self.single(Operation::Exists, name, item.as_ref())
    }

    /// Removes one occurrence of an item; returns false if it was not found.
    pub fn remove(&self, name: &str, item: impl AsRef<[u8]>) -> ClientResult<bool> {
        self.single(Operation::Remove, name, item.as_ref())
    }

    /// Adds items, creating the filter if needed.
    ///
    /// Only `capacity` and `no_create` apply; Bloom-only flags are rejected
    /// before anything is sent.
    pub fn insert<T: AsRef<[u8]>>(
        &self,
        name: &str,
        options: &InsertOptions,
        items: &[T],
    ) -> ClientResult<Vec<bool>> {
        self.insert_with(Operation::Insert, name, options, items)
    }

    /// Like [`insert`](Self::insert), but skips items that are already present.
    pub fn insert_nx<T: AsRef<[u8]>>(
        &self,
        name: &str,
        options: &InsertOptions,
        items: &[T],
    ) -> ClientResult<Vec<bool>> {
        self.insert_with(Operation::InsertNx, name, options, items)
    }

    fn insert_with<T: AsRef<[u8]>>(
        &self,
        op: Operation,
        name: &str,
        options: &InsertOptions,
        items: &[T],
    ) -> ClientResult<Vec<bool>> {
        let flags = cuckoo_insert_args(options)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let command = Self::command(op, name)?.args(flags).items(items);
        let len = items.len();
        self.executor.execute(&command, |reply| expect_flags(reply, len))
    }

    /// Returns filter metadata as a field map.
    pub fn info(&self, name: &str) -> ClientResult<FilterInfo> {
        let command = Self::command(Operation::Info, name)?;
        self.executor.execute(&command, expect_info)
    }

    /// Deletes the whole filter key; returns true if it existed.
    pub fn delete(&self, name: &str) -> ClientResult<bool> {
        let command = Command::from_spec(require(Family::Keyspace, Operation::Delete)?).arg(name);
        self.executor.execute(&command, expect_flag)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rbloom_common::ClientError;

    use super::*;
    use crate::resp::{InfoValue, RespValue};

    struct Recorder {
        sent: RefCell<Vec<String>>,
        reply: RespValue,
    }

    impl CommandExecutor for Recorder {
        fn execute<T, D>(&self, command: &Command, decode: D) -> ClientResult<T>
        where
            D: Fn(RespValue) -> ClientResult<T>,
        {
            let mut line = command.keyword().to_string();
            for arg in command.arguments() {
                line.push(' ');
                line.push_str(&String::from_utf8_lossy(&arg.as_bytes()));
            }
            self.sent.borrow_mut().push(line);
            decode(self.reply.clone())
        }
    }

    fn recorder(reply: RespValue) -> Recorder {
        Recorder {
            sent: RefCell::new(Vec::new()),
            reply,
        }
    }

    #[test]
    fn remove_uses_cf_del_and_delete_uses_del() {
        let exec = recorder(RespValue::Integer(1));
        assert!(exec.cuckoo().remove("cf", "x").unwrap());
        assert!(exec.cuckoo().delete("cf").unwrap());
        assert_eq!(*exec.sent.borrow(), vec!["CF.DEL cf x", "DEL cf"]);
    }

    #[test]
    fn add_nx_reports_existing_item() {
        let exec = recorder(RespValue::Integer(0));
        assert!(!exec.cuckoo().add_nx("cf", "x").unwrap());
        assert_eq!(*exec.sent.borrow(), vec!["CF.ADDNX cf x"]);
    }

    #[test]
    fn reserve_sends_capacity() {
        let exec = recorder(RespValue::Simple(b"OK".to_vec()));
        exec.cuckoo().reserve("cf", 2048).unwrap();
        assert_eq!(*exec.sent.borrow(), vec!["CF.RESERVE cf 2048"]);
    }

    #[test]
    fn insert_nx_sends_flags_and_items() {
        let exec = recorder(RespValue::Array(vec![
            RespValue::Integer(1),
            RespValue::Integer(0),
        ]));
        let options = InsertOptions::new().capacity(64);
        let added = exec.cuckoo().insert_nx("cf", &options, &["a", "b"]).unwrap();
        assert_eq!(added, vec![true, false]);
        assert_eq!(*exec.sent.borrow(), vec!["CF.INSERTNX cf CAPACITY 64 ITEMS a b"]);
    }

    #[test]
    fn bloom_only_flags_are_rejected_locally() {
        let exec = recorder(RespValue::Integer(1));
        let options = InsertOptions::new().error_rate(0.1);
        let err = exec.cuckoo().insert("cf", &options, &["a"]).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(exec.sent.borrow().is_empty());
    }

    #[test]
    fn exists_and_info_decode_replies() {
        let exec = recorder(RespValue::Integer(1));
        assert!(exec.cuckoo().exists("cf", "x").unwrap());
        assert_eq!(*exec.sent.borrow(), vec!["CF.EXISTS cf x"]);

        let exec = recorder(RespValue::Array(vec![
            RespValue::Simple(b"Number of buckets".to_vec()),
            RespValue::Integer(512),
            RespValue::Simple(b"Max iterations".to_vec()),
            RespValue::Bulk(Some(bytes::Bytes::from_static(b"20"))),
        ]));
        let info = exec.cuckoo().info("cf").unwrap();
        assert_eq!(info.get("Number of buckets").and_then(InfoValue::as_integer), Some(512));
        assert_eq!(info.get("Max iterations").and_then(InfoValue::as_integer), Some(20));
        assert_eq!(*exec.sent.borrow(), vec!["CF.INFO cf"]);
    }

    #[test]
    fn server_error_is_surfaced_verbatim() {
        let exec = recorder(RespValue::Error(b"ERR item exists".to_vec()));
        let err = exec.cuckoo().reserve("cf", 10).unwrap_err();
        assert!(matches!(err, ClientError::Server { ref message } if message == "ERR item exists"));
    }
}
