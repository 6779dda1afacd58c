//! # Cluster Client
//!
//! Purpose: Route each command to the node that owns its key's slot and
//! recover from topology changes within a fixed attempt budget.
//!
//! ## Design Principles
//! 1. **Single Retry Loop**: Every call runs through `ClusterClient::run`,
//!    parameterized by a dispatch closure.
//! 2. **Bounded Attempts**: Redirects and transient failures each consume one
//!    attempt; exhausting the budget wraps the last error.
//! 3. **Shared Topology**: One slot table and one pool per node, shared by
//!    all callers.
//!
//! Retried commands may take effect more than once if a failure hides a
//! successful write; only naturally idempotent commands are safe under retry.

mod slots;
mod topology;

pub use slots::{hash_slot, hash_tag, parse_cluster_slots, SlotRange, SlotTable, SLOT_COUNT};
pub use topology::Topology;

use tracing::{debug, warn};

use rbloom_common::{validate_table, ClientError, ClientResult};

use crate::client::{Client, CommandExecutor};
use crate::command::Command;
use crate::config::ClusterConfig;
use crate::resp::RespValue;

/// Cluster-aware client with redirect handling.
pub struct ClusterClient {
    topology: Topology,
    max_attempts: usize,
}

impl ClusterClient {
    /// Creates a client from seed node addresses with default settings.
    pub fn connect<I, S>(seeds: I) -> ClientResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(ClusterConfig::with_seeds(seeds))
    }

    /// Creates a client; the slot table is loaded on the first command.
    pub fn with_config(config: ClusterConfig) -> ClientResult<Self> {
        validate_table()?;
        let max_attempts = config.max_attempts;
        Ok(ClusterClient {
            topology: Topology::new(config)?,
            max_attempts,
        })
    }

    /// Slot table and node clients behind this client.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Slot that owns `key`.
    pub fn slot_for(&self, key: &[u8]) -> u16 {
        self.topology.slot_for(key)
    }

    /// Runs `dispatch` against the owner of `key` until it succeeds, fails
    /// with a non-retryable error, or the attempt budget runs out.
    ///
    /// `dispatch` receives the target node and whether the call follows an
    /// `ASK` redirect, in which case `ASKING` must precede the command.
    pub fn run<T, F>(&self, key: &[u8], dispatch: F) -> ClientResult<T>
    where
        F: Fn(&Client, bool) -> ClientResult<T>,
    {
        let slot = self.topology.slot_for(key);
        let mut asking: Option<String> = None;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = match asking.take() {
                Some(addr) => self
                    .topology
                    .client_for(&addr)
                    .and_then(|node| dispatch(&node, true)),
                None => self
                    .topology
                    .node_for(slot)
                    .and_then(|node| dispatch(&node, false)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempts >= self.max_attempts {
                warn!(slot, attempts, error = %err, "cluster attempts exhausted");
                return Err(ClientError::ClusterExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            match &err {
                ClientError::Moved { slot, addr } => {
                    debug!(slot, addr = %addr, attempts, "moved");
                    self.topology.assign(*slot, addr);
                }
                ClientError::Ask { slot, addr } => {
                    debug!(slot, addr = %addr, attempts, "ask");
                    asking = Some(addr.clone());
                }
                other => {
                    debug!(slot, attempts, error = %other, "transient failure");
                    self.topology.invalidate();
                }
            }
        }
    }

    /// Closes every node pool. Commands issued afterwards fail with
    /// `PoolClosed`.
    pub fn close(&self) {
        self.topology.close();
    }
}

impl CommandExecutor for ClusterClient {
    fn execute<T, D>(&self, command: &Command, decode: D) -> ClientResult<T>
    where
        D: Fn(RespValue) -> ClientResult<T>,
    {
        let key = command.key().ok_or_else(|| {
            ClientError::Config(format!("{} has no key to route on", command.keyword()))
        })?;
        self.run(&key, |node, asking| {
            if asking {
                node.execute_asking(command, &decode)
            } else {
                node.execute(command, &decode)
            }
        })
    }
}
