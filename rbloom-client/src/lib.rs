//! # RBloom Sync Client
//!
//! Purpose: Provide a synchronous client for the Bloom, Cuckoo, and Top-K
//! commands of a Redis-compatible server, against a single endpoint or a
//! cluster, with connection pooling to minimize TCP handshake overhead.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **One Core, Many Facades**: Filter families are thin wrappers over a
//!    shared `CommandExecutor`.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.
//!
//! ```no_run
//! use rbloom_client::{Client, CommandExecutor};
//!
//! let client = Client::connect("127.0.0.1:6379")?;
//! client.bloom().reserve("visitors", 1000, 0.01)?;
//! assert!(client.bloom().add("visitors", "alice")?);
//! # Ok::<(), rbloom_client::ClientError>(())
//! ```

mod bloom;
mod client;
mod cluster;
mod command;
mod config;
mod cuckoo;
mod pool;
mod resp;
mod topk;

pub use bloom::BloomFilter;
pub use client::{Client, CommandExecutor};
pub use cluster::{
    hash_slot, hash_tag, parse_cluster_slots, ClusterClient, SlotRange, SlotTable, Topology,
    SLOT_COUNT,
};
pub use command::{Arg, Command, InsertOptions};
pub use config::{ClientConfig, ClusterConfig, DEFAULT_MAX_ATTEMPTS};
pub use cuckoo::CuckooFilter;
pub use pool::{ConnectionPool, EvictionHandle, PoolConfig, PoolStats, PooledConnection};
pub use resp::{FilterInfo, InfoValue, RespValue};
pub use topk::TopK;

pub use rbloom_common::{ClientError, ClientResult, ErrorKind};
