// topology.rs - Slot-to-node resolution for cluster calls
//
// Owns the slot table and one single-node client per discovered node.
// Refreshes run one at a time; lookups proceed against the current table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use rbloom_common::{ClientError, ClientResult};

use crate::client::{Client, CommandExecutor};
use crate::cluster::slots::{hash_slot, parse_cluster_slots, SlotTable};
use crate::command::Command;
use crate::config::ClusterConfig;

/// Slot table plus the per-node clients it points at.
pub struct Topology {
    config: ClusterConfig,
    table: SlotTable,
    nodes: RwLock<HashMap<String, Arc<Client>>>,
    refresh_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Topology {
    /// Validates `config`. No node is contacted until the first lookup.
    pub fn new(config: ClusterConfig) -> ClientResult<Self> {
        config.validate()?;
        Ok(Topology {
            config,
            table: SlotTable::new(),
            nodes: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Hash slot of `key`.
    pub fn slot_for(&self, key: &[u8]) -> u16 {
        hash_slot(key)
    }

    /// Client for the node serving `slot`, refreshing the table first if the
    /// slot is unresolved.
    pub fn node_for(&self, slot: u16) -> ClientResult<Arc<Client>> {
        self.ensure_open()?;
        if let Some(addr) = self.table.owner(slot) {
            return self.client_for(&addr);
        }

        {
            let _guard = self.refresh_lock.lock();
            // Another caller may have refreshed while we waited.
            if self.table.owner(slot).is_none() {
                self.refresh_locked()?;
            }
        }

        match self.table.owner(slot) {
            Some(addr) => self.client_for(&addr),
            None => Err(ClientError::SlotUncovered(slot)),
        }
    }

    /// Marks the whole table stale.
    pub fn invalidate(&self) {
        debug!("slot table invalidated");
        self.table.invalidate();
    }

    /// Records a `MOVED` redirect for one slot.
    pub fn assign(&self, slot: u16, addr: &str) {
        self.table.assign(slot, addr);
    }

    /// Reloads the slot table with `CLUSTER SLOTS`.
    pub fn refresh(&self) -> ClientResult<()> {
        let _guard = self.refresh_lock.lock();
        self.refresh_locked()
    }

    fn refresh_locked(&self) -> ClientResult<()> {
        self.ensure_open()?;
        // Nodes from the last table first, seeds as the fallback.
        let mut candidates = self.table.nodes();
        for seed in &self.config.seeds {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }

        let mut last = None;
        for addr in candidates {
            match self.query_slots(&addr) {
                Ok(covered) => {
                    debug!(source = %addr, covered, nodes = self.table.nodes().len(), "slot table refreshed");
                    self.prune();
                    return Ok(());
                }
                Err(err) => {
                    warn!(source = %addr, error = %err, "slot table refresh failed");
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| ClientError::Config("no cluster nodes to query".to_string())))
    }

    fn query_slots(&self, addr: &str) -> ClientResult<usize> {
        let client = self.client_for(addr)?;
        let source_host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
        let command = Command::new("CLUSTER").arg("SLOTS");
        let ranges = client.execute(&command, |reply| parse_cluster_slots(reply, source_host))?;
        Ok(self.table.install(&ranges))
    }

    /// Drops clients for nodes the table no longer references. In-flight
    /// callers keep their handle; the pool goes away with the last one.
    fn prune(&self) {
        let live = self.table.nodes();
        self.nodes.write().retain(|addr, _| {
            let keep = live.contains(addr);
            if !keep {
                debug!(addr = %addr, "cluster node removed");
            }
            keep
        });
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::PoolClosed);
        }
        Ok(())
    }

    /// Client for `addr`, created on first use.
    pub fn client_for(&self, addr: &str) -> ClientResult<Arc<Client>> {
        self.ensure_open()?;
        if let Some(client) = self.nodes.read().get(addr) {
            return Ok(Arc::clone(client));
        }

        let mut nodes = self.nodes.write();
        // Re-checked under the lock so close() cannot race a new pool in.
        self.ensure_open()?;
        if let Some(client) = nodes.get(addr) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(Client::with_config(self.config.node_config(addr)?)?);
        debug!(addr, "cluster node added");
        nodes.insert(addr.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Addresses currently in the slot table.
    pub fn nodes(&self) -> Vec<String> {
        self.table.nodes()
    }

    /// Addresses with a live client, sorted.
    pub fn connected_nodes(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.nodes.read().keys().cloned().collect();
        addrs.sort();
        addrs
    }

    /// Closes every node pool. Later lookups fail with `PoolClosed` instead
    /// of reconnecting.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for client in self.nodes.write().drain().map(|(_, client)| client) {
            client.close();
        }
        self.table.invalidate();
    }
}
