//! # Synchronous Client API
//!
//! Purpose: Execute filter commands against one server endpoint over a
//! pooled connection, and define the executor seam the filter facades are
//! written against.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pooling and protocol details.
//! 2. **Composition over Inheritance**: Bloom, Cuckoo, and Top-K are thin
//!    borrowers of any `CommandExecutor`, not subclasses of a client.
//! 3. **Scoped Borrowing**: A connection is held only for one round trip and
//!    returns to the pool when the guard drops, including on decode errors.
//! 4. **At Most Once**: The single-node client never retries.

use parking_lot::Mutex;
use tracing::trace;

use rbloom_common::{validate_table, ClientResult};

use crate::bloom::BloomFilter;
use crate::command::Command;
use crate::config::ClientConfig;
use crate::cuckoo::CuckooFilter;
use crate::pool::{ConnectionPool, EvictionHandle, PoolStats};
use crate::resp::{expect_ok, expect_status, RespValue};
use crate::topk::TopK;

/// Something that can run one command and decode its reply.
///
/// The decoder may run more than once when the executor retries, so it must
/// be `Fn`.
pub trait CommandExecutor {
    /// Sends `command`, reads one reply, and narrows it with `decode`.
    fn execute<T, D>(&self, command: &Command, decode: D) -> ClientResult<T>
    where
        D: Fn(RespValue) -> ClientResult<T>;

    /// Bloom filter commands over this executor.
    fn bloom(&self) -> BloomFilter<'_, Self>
    where
        Self: Sized,
    {
        BloomFilter::new(self)
    }

    /// Cuckoo filter commands over this executor.
    fn cuckoo(&self) -> CuckooFilter<'_, Self>
    where
        Self: Sized,
    {
        CuckooFilter::new(self)
    }

    /// Top-K commands over this executor.
    fn topk(&self) -> TopK<'_, Self>
    where
        Self: Sized,
    {
        TopK::new(self)
    }
}

/// Synchronous client with connection pooling.
///
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool.
pub struct Client {
    pool: ConnectionPool,
    evictor: Mutex<Option<EvictionHandle>>,
}

impl Client {
    /// Creates a client for `host:port` with default configuration.
    pub fn connect(addr: &str) -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_addr(addr)?)
    }

    /// Creates a client with a custom configuration.
    ///
    /// Connections are opened lazily; an unreachable server surfaces on the
    /// first command.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        validate_table()?;
        config.validate()?;
        let pool = ConnectionPool::new(config.pool_config())?;
        let evictor = if config.eviction_interval.is_zero() || config.idle_timeout.is_zero() {
            None
        } else {
            Some(pool.start_evictor(config.eviction_interval))
        };
        Ok(Client {
            pool,
            evictor: Mutex::new(evictor),
        })
    }

    /// Endpoint address of this client.
    pub fn addr(&self) -> &str {
        self.pool.addr()
    }

    /// Current pool occupancy.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Pings the server.
    pub fn ping(&self) -> ClientResult<()> {
        let reply = self.execute(&Command::new("PING"), expect_status)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(rbloom_common::ClientError::Server { message: reply })
        }
    }

    /// Sends `ASKING` followed by `command` on the same connection.
    ///
    /// Used for the one-shot hop a cluster `ASK` redirect requires.
    pub(crate) fn execute_asking<T, D>(&self, command: &Command, decode: D) -> ClientResult<T>
    where
        D: Fn(RespValue) -> ClientResult<T>,
    {
        let mut conn = self.pool.acquire()?;
        trace!(addr = self.addr(), keyword = command.keyword(), "dispatch asking");
        expect_ok(conn.exec(&Command::new("ASKING"))?)?;
        let reply = conn.exec(command)?;
        decode(reply)
    }

    /// Stops idle eviction and closes every pooled connection.
    pub fn close(&self) {
        if let Some(evictor) = self.evictor.lock().take() {
            evictor.stop();
        }
        self.pool.close();
    }
}

impl CommandExecutor for Client {
    fn execute<T, D>(&self, command: &Command, decode: D) -> ClientResult<T>
    where
        D: Fn(RespValue) -> ClientResult<T>,
    {
        let mut conn = self.pool.acquire()?;
        trace!(addr = self.addr(), keyword = command.keyword(), "dispatch");
        let reply = conn.exec(command)?;
        decode(reply)
    }
}
