// slots.rs - Key hashing and the shared slot table
//
// Keys map to one of 16384 slots via CRC16 (XMODEM) of the key, or of its
// `{hash tag}` when one is present. The table maps each slot to the address
// of the node that serves it and is refreshed in place.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use rbloom_common::{ClientError, ClientResult};

use crate::resp::RespValue;

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: u16 = 16384;

/// Returns the part of `key` that is hashed.
///
/// The first `{` and the first `}` after it delimit the tag; an empty tag
/// (`abc{}de`) or an unterminated one hashes the whole key.
pub fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(begin) = key.iter().position(|b| *b == b'{') {
        if let Some(len) = key[begin + 1..].iter().position(|b| *b == b'}') {
            if len > 0 {
                return &key[begin + 1..begin + 1 + len];
            }
        }
    }
    key
}

/// Slot that owns `key`.
pub fn hash_slot(key: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(hash_tag(key)) & (SLOT_COUNT - 1)
}

/// One `CLUSTER SLOTS` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub master: String,
    pub replicas: Vec<String>,
}

/// Parses a `CLUSTER SLOTS` reply.
///
/// Node entries with an empty host refer to the node that answered, so
/// `source_host` is substituted for them.
pub fn parse_cluster_slots(value: RespValue, source_host: &str) -> ClientResult<Vec<SlotRange>> {
    let entries = match value {
        RespValue::Array(entries) => entries,
        RespValue::Error(message) => {
            return Err(ClientError::from_server_message(
                String::from_utf8_lossy(&message).into_owned(),
            ))
        }
        other => {
            return Err(ClientError::UnexpectedReply {
                expected: "array",
                found: other.type_name(),
            })
        }
    };

    let mut ranges = Vec::with_capacity(entries.len());
    for entry in entries {
        let RespValue::Array(fields) = entry else {
            return Err(ClientError::Protocol("slot range is not an array"));
        };
        if fields.len() < 3 {
            return Err(ClientError::Protocol("slot range is missing its master"));
        }
        let mut fields = fields.into_iter();
        let start = slot_number(fields.next())?;
        let end = slot_number(fields.next())?;
        if start > end {
            return Err(ClientError::Protocol("slot range start exceeds end"));
        }
        let master = node_addr(fields.next(), source_host)?;
        let replicas = fields
            .map(|field| node_addr(Some(field), source_host))
            .collect::<ClientResult<Vec<_>>>()?;
        ranges.push(SlotRange {
            start,
            end,
            master,
            replicas,
        });
    }
    Ok(ranges)
}

fn slot_number(value: Option<RespValue>) -> ClientResult<u16> {
    match value {
        Some(RespValue::Integer(n)) if (0..i64::from(SLOT_COUNT)).contains(&n) => Ok(n as u16),
        _ => Err(ClientError::Protocol("slot bound is not a valid slot number")),
    }
}

fn node_addr(value: Option<RespValue>, source_host: &str) -> ClientResult<String> {
    let Some(RespValue::Array(fields)) = value else {
        return Err(ClientError::Protocol("slot node is not an array"));
    };
    let mut fields = fields.into_iter();
    let host = match fields.next() {
        Some(RespValue::Bulk(Some(host))) => String::from_utf8_lossy(&host).into_owned(),
        Some(RespValue::Simple(host)) => String::from_utf8_lossy(&host).into_owned(),
        _ => return Err(ClientError::Protocol("slot node host is not a string")),
    };
    let port = match fields.next() {
        Some(RespValue::Integer(port)) => u16::try_from(port)
            .map_err(|_| ClientError::Protocol("slot node port is out of range"))?,
        _ => return Err(ClientError::Protocol("slot node port is not an integer")),
    };
    let host = if host.is_empty() || host == "?" {
        source_host
    } else {
        host.as_str()
    };
    Ok(format!("{host}:{port}"))
}

struct SlotMap {
    owners: Vec<Option<Arc<str>>>,
    fresh: bool,
}

/// Slot to node-address table shared by every cluster call.
///
/// Starts empty and stale. Readers see a table either before or after a
/// refresh, never a mix of the two.
pub struct SlotTable {
    inner: RwLock<SlotMap>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotTable {
    /// Empty, stale table; the first lookup triggers a refresh.
    pub fn new() -> Self {
        SlotTable {
            inner: RwLock::new(SlotMap {
                owners: vec![None; usize::from(SLOT_COUNT)],
                fresh: false,
            }),
        }
    }

    /// Owner of `slot`, or `None` when the table is stale or the slot is uncovered.
    pub fn owner(&self, slot: u16) -> Option<Arc<str>> {
        let map = self.inner.read();
        if !map.fresh {
            return None;
        }
        map.owners.get(usize::from(slot)).cloned().flatten()
    }

    pub fn is_fresh(&self) -> bool {
        self.inner.read().fresh
    }

    /// Replaces every slot owner with the given ranges and marks the table fresh.
    ///
    /// Returns the number of covered slots.
    pub fn install(&self, ranges: &[SlotRange]) -> usize {
        let mut owners: Vec<Option<Arc<str>>> = vec![None; usize::from(SLOT_COUNT)];
        for range in ranges {
            let master: Arc<str> = Arc::from(range.master.as_str());
            for slot in range.start..=range.end {
                owners[usize::from(slot)] = Some(Arc::clone(&master));
            }
        }
        let covered = owners.iter().filter(|owner| owner.is_some()).count();

        let mut map = self.inner.write();
        map.owners = owners;
        map.fresh = true;
        covered
    }

    /// Points a single slot at `addr`, as a `MOVED` reply instructs.
    pub fn assign(&self, slot: u16, addr: &str) {
        let mut map = self.inner.write();
        if let Some(owner) = map.owners.get_mut(usize::from(slot)) {
            *owner = Some(Arc::from(addr));
        }
    }

    /// Marks the table stale; the next lookup forces a refresh.
    pub fn invalidate(&self) {
        self.inner.write().fresh = false;
    }

    /// Distinct node addresses currently in the table.
    pub fn nodes(&self) -> Vec<String> {
        let map = self.inner.read();
        map.owners
            .iter()
            .flatten()
            .map(|addr| addr.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
