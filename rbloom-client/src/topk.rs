//! # Top-K Commands
//!
//! Purpose: Typed wrappers for the `TOPK.*` command family, which tracks the
//! most frequent items seen in a stream.

use rbloom_common::{require, ClientError, ClientResult, Family, Operation};

use crate::client::CommandExecutor;
use crate::command::Command;
use crate::resp::{expect_aligned_integers, expect_flags, expect_ok, expect_texts, RespValue};

/// Top-K commands borrowed from an executor.
pub struct TopK<'a, E> {
    executor: &'a E,
}

impl<'a, E: CommandExecutor> TopK<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        TopK { executor }
    }

    fn command(op: Operation, key: &str) -> ClientResult<Command> {
        Ok(Command::from_spec(require(Family::TopK, op)?).arg(key))
    }

    /// Creates a Top-K structure keeping `topk` items, with a `width` x
    /// `depth` count sketch and the given decay.
    pub fn reserve(&self, key: &str, topk: u64, width: u64, depth: u64, decay: f64) -> ClientResult<()> {
        let command = Self::command(Operation::Reserve, key)?
            .arg(topk)
            .arg(width)
            .arg(depth)
            .arg(decay);
        self.executor.execute(&command, expect_ok)
    }

    /// Adds items; entry `i` is the item `items[i]` pushed out of the list, if any.
    pub fn add<T: AsRef<[u8]>>(&self, key: &str, items: &[T]) -> ClientResult<Vec<Option<String>>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let command = Self::command(Operation::Add, key)?.items(items);
        let len = items.len();
        self.executor.execute(&command, |reply| aligned_texts(reply, len))
    }

    /// Increments one item's score; returns the item it pushed out, if any.
    pub fn incr_by(&self, key: &str, item: impl AsRef<[u8]>, increment: u64) -> ClientResult<Option<String>> {
        let dropped = self.incr_by_multi(key, &[(item, increment)])?;
        Ok(dropped.into_iter().next().flatten())
    }

    /// Increments several items at once.
    pub fn incr_by_multi<T: AsRef<[u8]>>(
        &self,
        key: &str,
        increments: &[(T, u64)],
    ) -> ClientResult<Vec<Option<String>>> {
        if increments.is_empty() {
            return Ok(Vec::new());
        }
        let mut command = Self::command(Operation::IncrBy, key)?;
        for (item, increment) in increments {
            command = command.arg(item.as_ref()).arg(*increment);
        }
        let len = increments.len();
        self.executor.execute(&command, |reply| aligned_texts(reply, len))
    }

    /// Whether each item is currently in the Top-K list.
    pub fn query<T: AsRef<[u8]>>(&self, key: &str, items: &[T]) -> ClientResult<Vec<bool>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let command = Self::command(Operation::Query, key)?.items(items);
        let len = items.len();
        self.executor.execute(&command, |reply| expect_flags(reply, len))
    }

    /// Estimated count of each item.
    pub fn count<T: AsRef<[u8]>>(&self, key: &str, items: &[T]) -> ClientResult<Vec<i64>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let command = Self::command(Operation::Count, key)?.items(items);
        let len = items.len();
        self.executor
            .execute(&command, |reply| expect_aligned_integers(reply, len))
    }

    /// Items currently in the list.
    pub fn list(&self, key: &str) -> ClientResult<Vec<String>> {
        let command = Self::command(Operation::List, key)?;
        self.executor.execute(&command, |reply| {
            expect_texts(reply)?
                .into_iter()
                .map(|item| item.ok_or(ClientError::Protocol("nil entry in top-k list")))
                .collect()
        })
    }
}

fn aligned_texts(reply: RespValue, len: usize) -> ClientResult<Vec<Option<String>>> {
    let texts = expect_texts(reply)?;
    if texts.len() != len {
        return Err(ClientError::Protocol("reply length differs from item count"));
    }
    Ok(texts)
}
