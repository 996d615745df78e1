//! Partition discovery and lease reconciliation.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use crate::Lease;
use crate::LeaseStore;
use crate::PartitionId;
use crate::Result;
use crate::SourceStore;

/// Discovers the current partition set of the source collection and creates
/// a lease for every partition that does not have one yet.
///
/// Creation is conditional on non-existence, so reconciliation is idempotent
/// and safe to run concurrently with itself and with lease acquisition on
/// other instances.
pub struct PartitionEnumerator {
    source: Arc<dyn SourceStore>,
    lease_store: Arc<dyn LeaseStore>,
    source_collection: String,
}

impl PartitionEnumerator {
    pub fn new(
        source: Arc<dyn SourceStore>,
        lease_store: Arc<dyn LeaseStore>,
        source_collection: impl Into<String>,
    ) -> Self {
        Self {
            source,
            lease_store,
            source_collection: source_collection.into(),
        }
    }

    pub async fn discover_partitions(&self) -> Result<BTreeSet<PartitionId>> {
        self.source.list_partitions(&self.source_collection).await
    }

    /// Reconcile discovered partitions against existing leases. Returns the
    /// number of leases created.
    pub async fn reconcile(&self) -> Result<usize> {
        let partitions = self.discover_partitions().await?;

        let known: BTreeSet<PartitionId> = self
            .lease_store
            .list()
            .await?
            .into_iter()
            .map(|l| l.partition_id)
            .collect();

        let mut created = 0;
        for partition in partitions {
            if known.contains(&partition) {
                continue;
            }
            // Another instance may create the same lease between list and
            // here; create_if_absent makes the race harmless.
            if self
                .lease_store
                .create_if_absent(&Lease::unowned(partition.clone()))
                .await?
            {
                info!("created lease for new partition {}", partition);
                created += 1;
            }
        }

        debug!(
            "reconciled partitions for {}: {} new lease(s)",
            self.source_collection, created
        );
        Ok(created)
    }
}
