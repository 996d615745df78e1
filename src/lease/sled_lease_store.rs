//! Sled-backed [`LeaseStore`].
//!
//! One tree (`{lease_collection}/leases`), keyed by partition id, value =
//! bincode([`Lease`]). Conditional updates ride on sled's compare-and-swap
//! over the full serialized record: bincode encoding is deterministic, so a
//! byte-level CAS is equivalent to an etag check on the version field.

use async_trait::async_trait;
use tracing::debug;

use crate::constants::LEASES_TREE_SUFFIX;
use crate::CasOutcome;
use crate::Lease;
use crate::LeaseStore;
use crate::PartitionId;
use crate::Result;
use crate::StorageError;

pub struct SledLeaseStore {
    tree: sled::Tree,
}

impl SledLeaseStore {
    pub fn new(
        db: sled::Db,
        lease_collection: &str,
    ) -> Result<Self> {
        let tree = db.open_tree(format!("{lease_collection}{LEASES_TREE_SUFFIX}"))?;
        Ok(Self { tree })
    }

    fn encode(lease: &Lease) -> Result<Vec<u8>> {
        Ok(bincode::serialize(lease).map_err(StorageError::BincodeError)?)
    }

    fn decode(bytes: &[u8]) -> Result<Lease> {
        Ok(bincode::deserialize(bytes).map_err(StorageError::BincodeError)?)
    }
}

#[async_trait]
impl LeaseStore for SledLeaseStore {
    async fn create_if_absent(
        &self,
        lease: &Lease,
    ) -> Result<bool> {
        let key = lease.partition_id.as_str().as_bytes();
        let created = self
            .tree
            .compare_and_swap(key, None::<&[u8]>, Some(Self::encode(lease)?))?
            .is_ok();
        if created {
            debug!("created lease for partition {}", lease.partition_id);
        }
        Ok(created)
    }

    async fn get(
        &self,
        partition: &PartitionId,
    ) -> Result<Option<Lease>> {
        match self.tree.get(partition.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Lease>> {
        let mut leases = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            leases.push(Self::decode(&bytes)?);
        }
        Ok(leases)
    }

    async fn update(
        &self,
        expected: &Lease,
        updated: Lease,
    ) -> Result<CasOutcome> {
        let key = expected.partition_id.as_str().as_bytes();

        let mut stored = updated;
        stored.version = expected.version + 1;

        match self.tree.compare_and_swap(
            key,
            Some(Self::encode(expected)?),
            Some(Self::encode(&stored)?),
        )? {
            Ok(()) => Ok(CasOutcome::Applied(stored)),
            Err(_) => Ok(CasOutcome::Conflict),
        }
    }
}
