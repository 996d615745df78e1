//! Sled-backed [`SourceStore`].
//!
//! Tree layout per collection `{c}`:
//! - `{c}/docs`: record id -> bincode([`Record`])
//! - `{c}/partitions`: partition key -> ()
//! - `{c}/changes/{partition}`: big-endian sequence -> bincode([`Record`])
//!
//! Sequence numbers come from sled's monotonic id allocator, so within one
//! partition the change log keys strictly increase in insertion order. A
//! continuation token is the raw 8-byte sequence key of the last delivered
//! event.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::constants::CHANGES_TREE_INFIX;
use crate::constants::COLLECTIONS_TREE;
use crate::constants::DOCS_TREE_SUFFIX;
use crate::constants::PARTITIONS_TREE_SUFFIX;
use crate::utils::convert::key_to_seq;
use crate::utils::convert::seq_to_key;
use crate::ChangeEvent;
use crate::ContinuationToken;
use crate::FeedResponse;
use crate::PartitionId;
use crate::Record;
use crate::Result;
use crate::SourceError;
use crate::SourceStore;
use crate::StorageError;

/// Open the embedded database backing both the source and lease collections.
pub fn init_sled_db(path: impl AsRef<Path>) -> Result<sled::Db> {
    let db = sled::open(path)?;
    Ok(db)
}

pub struct SledSourceStore {
    db: sled::Db,
    /// One lock per partition change log, keyed by tree name; see `insert`
    append_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SledSourceStore {
    pub fn new(db: sled::Db) -> Self {
        Self {
            db,
            append_locks: DashMap::new(),
        }
    }

    fn collections_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree(COLLECTIONS_TREE)?)
    }

    fn ensure_collection(
        &self,
        collection: &str,
    ) -> Result<()> {
        if self.collections_tree()?.get(collection)?.is_none() {
            return Err(SourceError::CollectionNotFound(collection.to_string()).into());
        }
        Ok(())
    }

    fn docs_tree(
        &self,
        collection: &str,
    ) -> Result<sled::Tree> {
        Ok(self
            .db
            .open_tree(format!("{collection}{DOCS_TREE_SUFFIX}"))?)
    }

    fn partitions_tree(
        &self,
        collection: &str,
    ) -> Result<sled::Tree> {
        Ok(self
            .db
            .open_tree(format!("{collection}{PARTITIONS_TREE_SUFFIX}"))?)
    }

    fn changes_tree(
        &self,
        collection: &str,
        partition: &PartitionId,
    ) -> Result<sled::Tree> {
        Ok(self
            .db
            .open_tree(format!("{collection}{CHANGES_TREE_INFIX}{partition}"))?)
    }
}

#[async_trait]
impl SourceStore for SledSourceStore {
    async fn create_collection_if_absent(
        &self,
        name: &str,
        partition_key_path: &str,
    ) -> Result<()> {
        let collections = self.collections_tree()?;
        match collections.compare_and_swap(
            name,
            None::<&[u8]>,
            Some(partition_key_path.as_bytes()),
        )? {
            Ok(()) => {
                debug!("created collection {} (pk path: {})", name, partition_key_path);
            }
            Err(_) => {
                debug!("collection {} already exists", name);
            }
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        record: Record,
    ) -> Result<()> {
        self.ensure_collection(collection)?;

        let bytes = bincode::serialize(&record).map_err(StorageError::BincodeError)?;

        // Identifier uniqueness via conditional insert
        let docs = self.docs_tree(collection)?;
        if docs
            .compare_and_swap(record.id.as_bytes(), None::<&[u8]>, Some(bytes.clone()))?
            .is_err()
        {
            return Err(SourceError::Conflict {
                id: record.id.clone(),
            }
            .into());
        }

        let partition = PartitionId::new(record.partition_key.clone());
        self.partitions_tree(collection)?
            .insert(partition.as_str().as_bytes(), &[])?;

        // Append to the partition's change log. Allocation and append must
        // not interleave between writers to the same partition: a stalled
        // writer could otherwise publish a lower sequence after a higher one
        // was already read and checkpointed past, leaving that record behind
        // every future token.
        let changes = self.changes_tree(collection, &partition)?;
        let lock = self
            .append_locks
            .entry(format!("{collection}{CHANGES_TREE_INFIX}{partition}"))
            .or_default()
            .clone();
        let seq = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            let seq = self.db.generate_id()?;
            changes.insert(seq_to_key(seq), bytes)?;
            seq
        };

        debug!(
            "inserted record {} into {} (partition {}, seq {})",
            record.id, collection, partition, seq
        );
        Ok(())
    }

    async fn read_changes_since(
        &self,
        collection: &str,
        partition: PartitionId,
        token: Option<ContinuationToken>,
        max_items: usize,
    ) -> Result<FeedResponse> {
        self.ensure_collection(collection)?;

        let start = match &token {
            None => Bound::Unbounded,
            Some(t) => {
                // Tokens are opaque to callers but must decode here
                let seq = key_to_seq(t.as_bytes()).map_err(|_| SourceError::InvalidToken {
                    partition: partition.to_string(),
                })?;
                Bound::Excluded(seq_to_key(seq).to_vec())
            }
        };

        let changes = self.changes_tree(collection, &partition)?;
        let mut events = Vec::new();
        for entry in changes.range((start, Bound::<Vec<u8>>::Unbounded)).take(max_items) {
            let (key, value) = entry?;
            let record: Record =
                bincode::deserialize(&value).map_err(StorageError::BincodeError)?;
            events.push(ChangeEvent {
                record,
                token: ContinuationToken::from_bytes(key.to_vec()),
            });
        }

        match events.last() {
            None => Ok(FeedResponse::UpToDate),
            Some(last) => {
                let next_token = last.token.clone();
                Ok(FeedResponse::Changes { events, next_token })
            }
        }
    }

    async fn list_partitions(
        &self,
        collection: &str,
    ) -> Result<BTreeSet<PartitionId>> {
        self.ensure_collection(collection)?;

        let mut partitions = BTreeSet::new();
        for entry in self.partitions_tree(collection)?.iter() {
            let (key, _) = entry?;
            let id = String::from_utf8(key.to_vec()).map_err(|_| StorageError::DataCorruption {
                location: format!("partition key in {collection}"),
            })?;
            partitions.insert(PartitionId::new(id));
        }
        Ok(partitions)
    }
}
