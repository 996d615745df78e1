//! Lease-based partition coordination.
//!
//! One durable lease record per partition tracks the current owner and the
//! last checkpointed continuation token. Every mutation goes through a
//! versioned conditional update, so competing instances can race on the same
//! lease without lost updates; the loser simply observes a conflict.
//!
//! Ownership is expiry-based rather than heartbeat-based: an instance that
//! stops renewing loses its leases by timeout and any other instance may
//! steal them. In-process lease copies are advisory only and are revalidated
//! against the store before each mutation.

mod enumerator;
mod manager;
mod sled_lease_store;
pub use enumerator::*;
pub use manager::*;
pub use sled_lease_store::*;

#[cfg(test)]
mod enumerator_test;

///--------------------------------------
/// Trait Definition
#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::ContinuationToken;
use crate::PartitionId;
use crate::Result;

/// Coordination record granting one instance time-bounded processing rights
/// over a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub partition_id: PartitionId,
    /// Current owner instance; `None` after release or before first acquisition
    pub owner: Option<String>,
    /// Last checkpointed feed position; `None` means start from the beginning
    pub continuation_token: Option<ContinuationToken>,
    /// Wall-clock expiry, epoch milliseconds. An expired lease with a
    /// non-null owner marks a dead instance and is stealable.
    pub expires_at_ms: i64,
    /// Optimistic concurrency version, bumped on every successful update
    pub version: u64,
}

impl Lease {
    /// Initial lease for a freshly discovered partition.
    pub fn unowned(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            owner: None,
            continuation_token: None,
            expires_at_ms: 0,
            version: 0,
        }
    }

    pub fn is_expired(
        &self,
        now_ms: i64,
    ) -> bool {
        self.expires_at_ms < now_ms
    }

    pub fn is_owned_by(
        &self,
        instance: &str,
    ) -> bool {
        self.owner.as_deref() == Some(instance)
    }
}

/// Result of an acquisition attempt. Contention is a normal racing outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Owned(Lease),
    Contended,
}

/// Result of a renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Owned(Lease),
    Lost,
}

/// Result of persisting a checkpoint into an owned lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Token persisted; the returned lease carries the new version
    Committed(Lease),
    /// Ownership was lost mid-batch. The batch was already handled, so this
    /// is not data loss; the new owner re-delivers from the prior token.
    Lost,
}

/// Outcome of a versioned conditional update on a lease record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// Update applied; carries the stored lease with its bumped version
    Applied(Lease),
    /// Another writer got there first
    Conflict,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    /// Create the lease only if none exists for its partition yet.
    /// Returns `false` when one already existed.
    async fn create_if_absent(
        &self,
        lease: &Lease,
    ) -> Result<bool>;

    async fn get(
        &self,
        partition: &PartitionId,
    ) -> Result<Option<Lease>>;

    /// Every lease currently visible, any owner state.
    async fn list(&self) -> Result<Vec<Lease>>;

    /// Replace `expected` with `updated` only if the stored record still
    /// matches `expected` exactly (version included). The store bumps the
    /// version on success.
    async fn update(
        &self,
        expected: &Lease,
        updated: Lease,
    ) -> Result<CasOutcome>;
}
