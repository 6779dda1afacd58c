// commands.rs - command keyword table for the probabilistic filter modules
//
// Every filter call is a single RESP command whose first element is a fixed
// keyword (`BF.ADD`, `CF.EXISTS`, `TOPK.LIST`, ...). The spelling is part of
// the wire contract with the server module, and each keyword guarantees one
// reply shape. Both facts live in a single data table here instead of being
// spread over per-family enums.
//
// ============================================================================
// LOOKUP
// ============================================================================
//
//   (Family, Operation) --COMMANDS--> CommandSpec { keyword, reply }
//
// `spec(family, op)` scans the table (it is tiny) and returns `None` for
// combinations a family does not support, e.g. `(TopK, Exists)`.
//
// ============================================================================
// VALIDATION
// ============================================================================
//
// `validate_table()` runs once when a client is constructed. It rejects:
//
// 1. duplicate (family, operation) rows or duplicate keywords
// 2. keywords that are not upper-case ASCII
// 3. keywords whose prefix does not belong to their family
//
// A failing table is a build defect, so the client refuses to start instead
// of sending a misspelled command later.

use std::fmt;

use crate::error::{ClientError, ClientResult};

/// Server-side module family a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Scalable Bloom filters (`BF.*`).
    Bloom,
    /// Cuckoo filters (`CF.*`).
    Cuckoo,
    /// Top-K heavy hitters (`TOPK.*`).
    TopK,
    /// Plain keyspace commands shared by every family.
    Keyspace,
}

impl Family {
    /// Keyword prefix every command of this family must carry.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Bloom => "BF.",
            Self::Cuckoo => "CF.",
            Self::TopK => "TOPK.",
            Self::Keyspace => "",
        }
    }
}

/// Logical operation, independent of the family spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a filter with explicit sizing.
    Reserve,
    /// Add one item.
    Add,
    /// Add one item only if absent.
    AddNx,
    /// Add many items.
    MultiAdd,
    /// Check one item.
    Exists,
    /// Check many items.
    MultiExists,
    /// Add many items with creation flags.
    Insert,
    /// `Insert` that skips items already present.
    InsertNx,
    /// Remove one item from a filter.
    Remove,
    /// Describe a filter.
    Info,
    /// Increase an item's Top-K counter.
    IncrBy,
    /// Check Top-K membership.
    Query,
    /// Read Top-K counters.
    Count,
    /// List Top-K items.
    List,
    /// Delete a whole key.
    Delete,
}

/// Reply shape a keyword guarantees on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyShape {
    /// `+OK` status line.
    Status,
    /// Single `:` integer.
    Integer,
    /// Array of integers aligned with the submitted items.
    IntegerArray,
    /// Array of mixed values, alternating key/value.
    GenericArray,
    /// Array of bulk strings (possibly nil).
    TextArray,
}

impl ReplyShape {
    /// Human-readable shape name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Integer => "integer",
            Self::IntegerArray => "integer array",
            Self::GenericArray => "generic array",
            Self::TextArray => "text array",
        }
    }
}

impl fmt::Display for ReplyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the keyword table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub family: Family,
    pub op: Operation,
    /// Exact wire spelling.
    pub keyword: &'static str,
    pub reply: ReplyShape,
}

const fn row(family: Family, op: Operation, keyword: &'static str, reply: ReplyShape) -> CommandSpec {
    CommandSpec {
        family,
        op,
        keyword,
        reply,
    }
}

/// Every command the facades issue.
pub const COMMANDS: &[CommandSpec] = &[
    row(Family::Bloom, Operation::Reserve, "BF.RESERVE", ReplyShape::Status),
    row(Family::Bloom, Operation::Add, "BF.ADD", ReplyShape::Integer),
    row(Family::Bloom, Operation::MultiAdd, "BF.MADD", ReplyShape::IntegerArray),
    row(Family::Bloom, Operation::Exists, "BF.EXISTS", ReplyShape::Integer),
    row(Family::Bloom, Operation::MultiExists, "BF.MEXISTS", ReplyShape::IntegerArray),
    row(Family::Bloom, Operation::Insert, "BF.INSERT", ReplyShape::IntegerArray),
    row(Family::Bloom, Operation::Info, "BF.INFO", ReplyShape::GenericArray),
    row(Family::Cuckoo, Operation::Reserve, "CF.RESERVE", ReplyShape::Status),
    row(Family::Cuckoo, Operation::Add, "CF.ADD", ReplyShape::Integer),
    row(Family::Cuckoo, Operation::AddNx, "CF.ADDNX", ReplyShape::Integer),
    row(Family::Cuckoo, Operation::Exists, "CF.EXISTS", ReplyShape::Integer),
    row(Family::Cuckoo, Operation::Insert, "CF.INSERT", ReplyShape::IntegerArray),
    row(Family::Cuckoo, Operation::InsertNx, "CF.INSERTNX", ReplyShape::IntegerArray),
    row(Family::Cuckoo, Operation::Remove, "CF.DEL", ReplyShape::Integer),
    row(Family::Cuckoo, Operation::Info, "CF.INFO", ReplyShape::GenericArray),
    row(Family::TopK, Operation::Reserve, "TOPK.RESERVE", ReplyShape::Status),
    row(Family::TopK, Operation::Add, "TOPK.ADD", ReplyShape::TextArray),
    row(Family::TopK, Operation::IncrBy, "TOPK.INCRBY", ReplyShape::TextArray),
    row(Family::TopK, Operation::Query, "TOPK.QUERY", ReplyShape::IntegerArray),
    row(Family::TopK, Operation::Count, "TOPK.COUNT", ReplyShape::IntegerArray),
    row(Family::TopK, Operation::List, "TOPK.LIST", ReplyShape::TextArray),
    row(Family::Keyspace, Operation::Delete, "DEL", ReplyShape::Integer),
];

/// Insert-option keywords accepted by `BF.INSERT` / `CF.INSERT`.
pub mod keywords {
    pub const CAPACITY: &str = "CAPACITY";
    pub const ERROR: &str = "ERROR";
    pub const NOCREATE: &str = "NOCREATE";
    pub const NONSCALING: &str = "NONSCALING";
    pub const ITEMS: &str = "ITEMS";
}

/// Looks up the table row for a family/operation pair.
pub fn spec(family: Family, op: Operation) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|row| row.family == family && row.op == op)
}

/// Like [`spec`], but an unsupported pair is a configuration error.
pub fn require(family: Family, op: Operation) -> ClientResult<&'static CommandSpec> {
    spec(family, op).ok_or_else(|| {
        ClientError::Config(format!("{family:?} has no {op:?} command"))
    })
}

/// Checks the keyword table for spelling and uniqueness defects.
pub fn validate_table() -> ClientResult<()> {
    validate(COMMANDS)
}

fn validate(table: &[CommandSpec]) -> ClientResult<()> {
    for (idx, row) in table.iter().enumerate() {
        if row.keyword.is_empty()
            || !row
                .keyword
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b == b'.' || b == b'_')
        {
            return Err(ClientError::Config(format!(
                "keyword {:?} is not upper-case ASCII",
                row.keyword
            )));
        }
        if !row.keyword.starts_with(row.family.prefix()) {
            return Err(ClientError::Config(format!(
                "keyword {} does not belong to {:?}",
                row.keyword, row.family
            )));
        }
        for other in &table[idx + 1..] {
            if other.keyword == row.keyword {
                return Err(ClientError::Config(format!("duplicate keyword {}", row.keyword)));
            }
            if other.family == row.family && other.op == row.op {
                return Err(ClientError::Config(format!(
                    "duplicate entry for {:?}/{:?}",
                    row.family, row.op
                )));
            }
        }
    }
    Ok(())
}
