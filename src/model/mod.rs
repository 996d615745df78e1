//! Core data model shared across the engine: source records, change events,
//! continuation tokens and partition identifiers.
//!
//! All persisted values are encoded with bincode; see the sled adaptors in
//! [`crate::storage`] and [`crate::lease`] for the key layouts.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::utils::time::now_ms;

/// An entity stored in the source collection.
///
/// Records are created by the producer and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique record identifier
    pub id: String,
    /// Partition the record belongs to. The demo driver sets this to the
    /// record id (matching the sample workload), but nothing in the engine
    /// assumes that mapping.
    pub partition_key: String,
    /// Creation timestamp, epoch milliseconds
    pub creation_time_ms: i64,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            partition_key: partition_key.into(),
            creation_time_ms: now_ms(),
        }
    }
}

/// Opaque marker of a position within one partition's change feed.
///
/// Issued by the source store; monotonically ordered per partition in raw
/// byte order. The engine never decodes it and no cross-partition ordering is
/// implied.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContinuationToken(Vec<u8>);

impl ContinuationToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContinuationToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ContinuationToken({})", self)
    }
}

/// Identifier of a disjoint, source-defined shard of records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A [`Record`] observed through the change feed, tagged with its position in
/// that partition's change history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub record: Record,
    pub token: ContinuationToken,
}
