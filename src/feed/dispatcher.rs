//! Per-partition dispatch loop.
//!
//! Runs the `Idle -> Polling -> Handling -> Checkpointing` cycle for one
//! owned partition, with `Stopping` reachable from every wait point through
//! the shutdown signal. An in-flight handler invocation is always allowed to
//! complete; the signal is only observed between attempts and between
//! batches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics::BATCHES_DELIVERED_METRIC;
use crate::metrics::HANDLER_RETRY_METRIC;
use crate::metrics::PARTITION_FATAL_METRIC;
use crate::metrics::RECORDS_DELIVERED_METRIC;
use crate::utils::retry::Backoff;
use crate::ChangeEvent;
use crate::ChangeHandler;
use crate::CheckpointOutcome;
use crate::ContinuationToken;
use crate::Error;
use crate::FeedReader;
use crate::FeedResponse;
use crate::Lease;
use crate::LeaseManager;
use crate::PartitionId;
use crate::ProcessingError;
use crate::ProcessorConfig;
use crate::Result;
use crate::SourceError;

/// Cap for the handler-retry backoff; the retry limit bounds attempts anyway.
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(30);

enum DeliveryOutcome {
    Delivered,
    Exhausted { attempts: usize },
    Interrupted,
}

pub struct DispatchLoop {
    lease: Lease,
    reader: FeedReader,
    handler: Arc<dyn ChangeHandler>,
    lease_manager: Arc<LeaseManager>,
    handler_retry_limit: usize,
    retry_backoff_base: Duration,
    poll_backoff: Backoff,
    shutdown_signal: watch::Receiver<()>,
}

impl DispatchLoop {
    pub fn new(
        lease: Lease,
        reader: FeedReader,
        handler: Arc<dyn ChangeHandler>,
        lease_manager: Arc<LeaseManager>,
        config: &ProcessorConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            lease,
            reader,
            handler,
            lease_manager,
            handler_retry_limit: config.handler_retry_limit,
            retry_backoff_base: config.retry_backoff_base(),
            poll_backoff: Backoff::new(config.poll_backoff_base(), config.poll_backoff_max()),
            shutdown_signal,
        }
    }

    /// Drive the partition until shutdown, ownership loss or a fatal
    /// condition. Consumes the loop; the task owns its lease copy.
    pub async fn run(mut self) -> Result<()> {
        let partition = self.lease.partition_id.clone();
        let mut shutdown = self.shutdown_signal.clone();
        let mut token = self.lease.continuation_token.clone();

        info!(
            "dispatch loop started for partition {} at token {:?}",
            partition, token
        );

        let result = loop {
            // Polling
            let response = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                r = self.reader.read_next(&partition, token.as_ref()) => r,
            };

            match response {
                Ok(FeedResponse::UpToDate) => {
                    let delay = self.poll_backoff.next_delay();
                    tokio::select! {
                        _ = shutdown.changed() => break Ok(()),
                        _ = sleep(delay) => {}
                    }
                }
                Ok(FeedResponse::Changes { events, next_token }) => {
                    self.poll_backoff.reset();

                    // Handling
                    match self.deliver(&partition, &events, &mut shutdown).await {
                        DeliveryOutcome::Delivered => {
                            // Checkpointing
                            match self.checkpoint(&partition, next_token).await {
                                Ok(new_token) => token = new_token,
                                Err(e) => break Err(e),
                            }
                        }
                        DeliveryOutcome::Exhausted { attempts } => {
                            PARTITION_FATAL_METRIC
                                .with_label_values(&[partition.as_str()])
                                .set(1.0);
                            error!(
                                "handler exhausted {} attempts for partition {}; \
                                 halting partition, checkpoint frozen at {:?}",
                                attempts, partition, token
                            );
                            break Err(ProcessingError::HandlerExhausted {
                                partition: partition.to_string(),
                                attempts,
                            }
                            .into());
                        }
                        DeliveryOutcome::Interrupted => break Ok(()),
                    }
                }
                Err(Error::Source(SourceError::Unavailable(msg))) => {
                    warn!(
                        "source unavailable while polling partition {}: {}",
                        partition, msg
                    );
                    let delay = self.poll_backoff.next_delay();
                    tokio::select! {
                        _ = shutdown.changed() => break Ok(()),
                        _ = sleep(delay) => {}
                    }
                }
                Err(e @ Error::Source(SourceError::InvalidToken { .. })) => {
                    error!(
                        "stale or corrupt continuation token for partition {}; \
                         operator intervention required",
                        partition
                    );
                    break Err(e);
                }
                Err(e) => break Err(e),
            }
        };

        // Stopping
        match &result {
            Ok(()) => {
                if let Err(e) = self.lease_manager.release(&partition).await {
                    warn!(
                        "best-effort release of partition {} failed: {:?}",
                        partition, e
                    );
                }
                info!("dispatch loop for partition {} stopped", partition);
            }
            Err(Error::Processing(ProcessingError::LeaseLost { .. })) => {
                // Not ours anymore; the new owner re-delivers from the prior
                // checkpoint.
            }
            Err(e) => {
                warn!("dispatch loop for partition {} halted: {:?}", partition, e);
            }
        }

        result
    }

    /// Invoke the handler until it succeeds or the attempt limit is reached.
    async fn deliver(
        &self,
        partition: &PartitionId,
        events: &[ChangeEvent],
        shutdown: &mut watch::Receiver<()>,
    ) -> DeliveryOutcome {
        let mut backoff = Backoff::new(self.retry_backoff_base, RETRY_BACKOFF_MAX);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.handler.handle_changes(events).await {
                Ok(()) => {
                    BATCHES_DELIVERED_METRIC
                        .with_label_values(&[partition.as_str()])
                        .inc();
                    RECORDS_DELIVERED_METRIC
                        .with_label_values(&[partition.as_str()])
                        .inc_by(events.len() as u64);
                    return DeliveryOutcome::Delivered;
                }
                Err(e) => {
                    warn!(
                        "handler failed for partition {} (attempt {}/{}): {}",
                        partition, attempts, self.handler_retry_limit, e
                    );
                    HANDLER_RETRY_METRIC
                        .with_label_values(&[partition.as_str()])
                        .inc();
                    if attempts >= self.handler_retry_limit {
                        return DeliveryOutcome::Exhausted { attempts };
                    }
                    tokio::select! {
                        _ = shutdown.changed() => return DeliveryOutcome::Interrupted,
                        _ = sleep(backoff.next_delay()) => {}
                    }
                }
            }
        }
    }

    /// Persist the batch's final token. Ownership loss abandons the
    /// checkpoint: the handler already ran, so the batch counts as delivered.
    async fn checkpoint(
        &self,
        partition: &PartitionId,
        next_token: ContinuationToken,
    ) -> Result<Option<ContinuationToken>> {
        match self.lease_manager.checkpoint(partition, next_token).await? {
            CheckpointOutcome::Committed(lease) => Ok(lease.continuation_token),
            CheckpointOutcome::Lost => Err(ProcessingError::LeaseLost {
                partition: partition.to_string(),
            }
            .into()),
        }
    }
}
