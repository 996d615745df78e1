//! Lease acquisition, renewal, checkpointing and release for one instance.
//!
//! Every operation revalidates the lease against the store before mutating
//! it; the in-memory copies handed around by callers are advisory only. A
//! conditional update can conflict with a concurrent renewal by the same
//! instance (the control loop renews while a dispatch loop checkpoints), so
//! self-owned conflicts are retried a few times before being reported as
//! ownership loss.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::LEASE_ACQUIRED_METRIC;
use crate::metrics::LEASE_CONTENTION_METRIC;
use crate::metrics::LEASE_LOST_METRIC;
use crate::utils::time::now_ms;
use crate::AcquireOutcome;
use crate::CasOutcome;
use crate::CheckpointOutcome;
use crate::ContinuationToken;
use crate::Lease;
use crate::LeaseStore;
use crate::PartitionId;
use crate::RenewOutcome;
use crate::Result;

/// Attempts per mutation when the only competing writer is this instance
/// itself.
const SELF_CONFLICT_RETRIES: usize = 3;

pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    instance_name: String,
    lease_duration: Duration,
}

impl LeaseManager {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        instance_name: impl Into<String>,
        lease_duration: Duration,
    ) -> Self {
        Self {
            store,
            instance_name: instance_name.into(),
            lease_duration,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    fn new_expiry(&self) -> i64 {
        now_ms() + self.lease_duration.as_millis() as i64
    }

    /// Attempt to take ownership of `lease`. Eligible when the lease is
    /// unowned, expired (dead owner), or already owned by this instance.
    /// A lost race returns [`AcquireOutcome::Contended`].
    pub async fn try_acquire(
        &self,
        lease: &Lease,
    ) -> Result<AcquireOutcome> {
        if let Some(owner) = &lease.owner {
            if owner != &self.instance_name && !lease.is_expired(now_ms()) {
                LEASE_CONTENTION_METRIC
                    .with_label_values(&[&self.instance_name])
                    .inc();
                return Ok(AcquireOutcome::Contended);
            }
        }

        let mut updated = lease.clone();
        updated.owner = Some(self.instance_name.clone());
        updated.expires_at_ms = self.new_expiry();

        match self.store.update(lease, updated).await? {
            CasOutcome::Applied(owned) => {
                info!(
                    "instance {} acquired lease for partition {} (v{})",
                    self.instance_name, owned.partition_id, owned.version
                );
                LEASE_ACQUIRED_METRIC
                    .with_label_values(&[&self.instance_name])
                    .inc();
                Ok(AcquireOutcome::Owned(owned))
            }
            CasOutcome::Conflict => {
                debug!(
                    "lost acquisition race for partition {}",
                    lease.partition_id
                );
                LEASE_CONTENTION_METRIC
                    .with_label_values(&[&self.instance_name])
                    .inc();
                Ok(AcquireOutcome::Contended)
            }
        }
    }

    /// Extend the expiry of a lease this instance believes it owns.
    pub async fn renew(
        &self,
        partition: &PartitionId,
    ) -> Result<RenewOutcome> {
        for _ in 0..SELF_CONFLICT_RETRIES {
            let current = match self.store.get(partition).await? {
                Some(l) => l,
                None => return Ok(self.report_lost(partition, "lease record gone")),
            };
            if !current.is_owned_by(&self.instance_name) {
                return Ok(self.report_lost(partition, "stolen by another instance"));
            }

            let mut updated = current.clone();
            updated.expires_at_ms = self.new_expiry();

            match self.store.update(&current, updated).await? {
                CasOutcome::Applied(owned) => return Ok(RenewOutcome::Owned(owned)),
                CasOutcome::Conflict => continue,
            }
        }
        Ok(self.report_lost(partition, "persistent update conflict"))
    }

    /// Persist a checkpoint token into an owned lease. A checkpoint also
    /// extends the expiry, since it proves the owner is alive.
    pub async fn checkpoint(
        &self,
        partition: &PartitionId,
        token: ContinuationToken,
    ) -> Result<CheckpointOutcome> {
        for _ in 0..SELF_CONFLICT_RETRIES {
            let current = match self.store.get(partition).await? {
                Some(l) => l,
                None => {
                    self.report_lost(partition, "lease record gone");
                    return Ok(CheckpointOutcome::Lost);
                }
            };
            if !current.is_owned_by(&self.instance_name) {
                self.report_lost(partition, "stolen mid-batch");
                return Ok(CheckpointOutcome::Lost);
            }

            let mut updated = current.clone();
            updated.continuation_token = Some(token.clone());
            updated.expires_at_ms = self.new_expiry();

            match self.store.update(&current, updated).await? {
                CasOutcome::Applied(owned) => {
                    debug!(
                        "checkpointed partition {} at {} (v{})",
                        partition, token, owned.version
                    );
                    return Ok(CheckpointOutcome::Committed(owned));
                }
                CasOutcome::Conflict => continue,
            }
        }
        self.report_lost(partition, "persistent update conflict");
        Ok(CheckpointOutcome::Lost)
    }

    /// Clear ownership on graceful shutdown. Best-effort: on failure the
    /// lease simply expires naturally. The checkpoint token is kept for the
    /// next owner.
    pub async fn release(
        &self,
        partition: &PartitionId,
    ) -> Result<()> {
        let current = match self.store.get(partition).await? {
            Some(l) => l,
            None => return Ok(()),
        };
        if !current.is_owned_by(&self.instance_name) {
            return Ok(());
        }

        let mut updated = current.clone();
        updated.owner = None;
        updated.expires_at_ms = 0;

        match self.store.update(&current, updated).await? {
            CasOutcome::Applied(_) => {
                info!(
                    "instance {} released lease for partition {}",
                    self.instance_name, partition
                );
            }
            CasOutcome::Conflict => {
                warn!(
                    "release of partition {} conflicted; lease will expire naturally",
                    partition
                );
            }
        }
        Ok(())
    }

    /// Expiry sweep: every lease this instance may currently acquire.
    /// Unowned leases and expired leases of dead owners both qualify.
    pub async fn acquirable_leases(&self) -> Result<Vec<Lease>> {
        let now = now_ms();
        let mut acquirable = Vec::new();
        for lease in self.store.list().await? {
            let eligible = match &lease.owner {
                None => true,
                Some(owner) => owner == &self.instance_name || lease.is_expired(now),
            };
            if eligible {
                if lease.owner.is_some() && !lease.is_owned_by(&self.instance_name) {
                    info!(
                        "lease for partition {} expired (owner {:?} presumed dead)",
                        lease.partition_id, lease.owner
                    );
                }
                acquirable.push(lease);
            }
        }
        Ok(acquirable)
    }

    fn report_lost(
        &self,
        partition: &PartitionId,
        reason: &str,
    ) -> RenewOutcome {
        warn!(
            "instance {} lost lease for partition {}: {}",
            self.instance_name, partition, reason
        );
        LEASE_LOST_METRIC
            .with_label_values(&[&self.instance_name])
            .inc();
        RenewOutcome::Lost
    }
}
