//! Source store contract and the embedded sled adaptor.
//!
//! The engine depends only on [`SourceStore`]: a key-value/document store
//! with a stable per-record identifier and a per-partition, ordered change
//! history addressed by opaque continuation tokens. Replication, indexing and
//! query concerns of a real store are out of scope.

mod sled_store;
pub use sled_store::*;


///--------------------------------------
/// Trait Definition
use std::collections::BTreeSet;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;

use crate::ChangeEvent;
use crate::ContinuationToken;
use crate::PartitionId;
use crate::Record;
use crate::Result;

/// Outcome of one incremental read of a partition's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResponse {
    /// Ordered, non-empty changes since the given token, plus the token to
    /// resume from after this batch.
    Changes {
        events: Vec<ChangeEvent>,
        next_token: ContinuationToken,
    },
    /// No changes past the given token. Not an error; callers back off
    /// before polling again.
    UpToDate,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceStore: Send + Sync + 'static {
    /// Create a collection if it does not exist yet. Idempotent.
    async fn create_collection_if_absent(
        &self,
        name: &str,
        partition_key_path: &str,
    ) -> Result<()>;

    /// Insert a new record. Fails with [`crate::SourceError::Conflict`] if
    /// the identifier already exists.
    async fn insert(
        &self,
        collection: &str,
        record: Record,
    ) -> Result<()>;

    /// Read changes in one partition past `token` (from the beginning when
    /// `None`), bounded by `max_items`. Within a partition, events are never
    /// skipped or duplicated relative to token order.
    async fn read_changes_since(
        &self,
        collection: &str,
        partition: PartitionId,
        token: Option<ContinuationToken>,
        max_items: usize,
    ) -> Result<FeedResponse>;

    /// Current partition set of the collection. May grow over time.
    async fn list_partitions(
        &self,
        collection: &str,
    ) -> Result<BTreeSet<PartitionId>>;
}
