//! Engine entry point: supervises partition discovery, lease upkeep and one
//! dispatch task per owned partition.
//!
//! Scheduling model: one tokio task per currently-owned partition plus one
//! control loop per instance. The control loop reconciles the partition set
//! and tries acquisition on a discovery cadence, and renews owned leases on a
//! renewal cadence. Tasks communicate only through the shared lease store;
//! the in-process task registry is advisory.


use std::sync::Arc;

use dashmap::DashMap;
use dashmap::DashSet;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::utils::retry::retry_with_backoff;
use crate::AcquireOutcome;
use crate::ChangeHandler;
use crate::DispatchLoop;
use crate::Error;
use crate::FeedReader;
use crate::LeaseManager;
use crate::LeaseStore;
use crate::PartitionEnumerator;
use crate::PartitionId;
use crate::ProcessingError;
use crate::ProcessorConfig;
use crate::RenewOutcome;
use crate::Result;
use crate::Settings;
use crate::SourceError;
use crate::SourceStore;

/// Startup gives a briefly unreachable source a few chances before failing.
const STARTUP_RECONCILE_ATTEMPTS: usize = 3;

struct PartitionTask {
    stop_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

struct ProcessorState {
    config: ProcessorConfig,
    source_collection: String,
    source: Arc<dyn SourceStore>,
    handler: Arc<dyn ChangeHandler>,
    lease_manager: Arc<LeaseManager>,
    enumerator: PartitionEnumerator,
    /// Advisory registry of running dispatch tasks, one per owned partition
    tasks: DashMap<PartitionId, PartitionTask>,
    /// Partitions halted by handler exhaustion or an invalid token; not
    /// re-acquired by this instance until restart
    halted: DashSet<PartitionId>,
}

/// Builder for [`ChangeFeedProcessor`].
///
/// # Example
/// ```ignore
/// let processor = ChangeFeedProcessorBuilder::new(&settings)
///     .source(source_store)
///     .lease_store(lease_store)
///     .handler(handler)
///     .build()?;
/// ```
pub struct ChangeFeedProcessorBuilder {
    config: ProcessorConfig,
    source_collection: String,
    source: Option<Arc<dyn SourceStore>>,
    lease_store: Option<Arc<dyn LeaseStore>>,
    handler: Option<Arc<dyn ChangeHandler>>,
}

impl ChangeFeedProcessorBuilder {
    pub fn new(settings: &Settings) -> Self {
        Self {
            config: settings.processor.clone(),
            source_collection: settings.storage.source_collection.clone(),
            source: None,
            lease_store: None,
            handler: None,
        }
    }

    pub fn source(
        mut self,
        source: Arc<dyn SourceStore>,
    ) -> Self {
        self.source = Some(source);
        self
    }

    pub fn lease_store(
        mut self,
        lease_store: Arc<dyn LeaseStore>,
    ) -> Self {
        self.lease_store = Some(lease_store);
        self
    }

    pub fn handler(
        mut self,
        handler: Arc<dyn ChangeHandler>,
    ) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<ChangeFeedProcessor> {
        let source = self
            .source
            .ok_or_else(|| Error::Fatal("processor requires a source store".to_string()))?;
        let lease_store = self
            .lease_store
            .ok_or_else(|| Error::Fatal("processor requires a lease store".to_string()))?;
        let handler = self
            .handler
            .ok_or_else(|| Error::Fatal("processor requires a change handler".to_string()))?;

        let lease_manager = Arc::new(LeaseManager::new(
            lease_store.clone(),
            self.config.instance_name.clone(),
            self.config.lease_duration(),
        ));
        let enumerator = PartitionEnumerator::new(
            source.clone(),
            lease_store,
            self.source_collection.clone(),
        );

        let (stop_tx, _) = watch::channel(());
        Ok(ChangeFeedProcessor {
            state: Arc::new(ProcessorState {
                config: self.config,
                source_collection: self.source_collection,
                source,
                handler,
                lease_manager,
                enumerator,
                tasks: DashMap::new(),
                halted: DashSet::new(),
            }),
            stop_tx,
            control_handle: None,
        })
    }
}

pub struct ChangeFeedProcessor {
    state: Arc<ProcessorState>,
    stop_tx: watch::Sender<()>,
    control_handle: Option<JoinHandle<()>>,
}

impl ChangeFeedProcessor {
    /// Run the initial partition reconciliation and spawn the control loop.
    /// Fails if the source stays unreachable through the startup retries.
    pub async fn start(&mut self) -> Result<()> {
        if self.control_handle.is_some() {
            return Err(Error::Fatal("processor already started".to_string()));
        }

        let created = retry_with_backoff(
            "initial partition reconciliation",
            STARTUP_RECONCILE_ATTEMPTS,
            self.state.config.retry_backoff_base(),
            self.state.config.poll_backoff_max(),
            || self.state.enumerator.reconcile(),
        )
        .await?;
        info!(
            "processor {} started ({} lease(s) created on startup)",
            self.state.config.instance_name, created
        );

        let state = self.state.clone();
        let shutdown = self.stop_tx.subscribe();
        self.control_handle = Some(tokio::spawn(control_loop(state, shutdown)));
        Ok(())
    }

    /// Cooperative stop: signals every dispatch loop, lets in-flight handler
    /// invocations complete, releases owned leases, and returns only after
    /// every task has exited.
    pub async fn stop(&mut self) -> Result<()> {
        let handle = match self.control_handle.take() {
            Some(h) => h,
            None => return Ok(()),
        };

        info!("stopping processor {}", self.state.config.instance_name);
        self.stop_tx
            .send(())
            .map_err(|_| ProcessingError::ShutdownChannelClosed)?;
        handle.await?;
        info!("processor {} stopped", self.state.config.instance_name);
        Ok(())
    }

    /// Number of partitions this instance currently runs a dispatch loop for.
    pub fn owned_partitions(&self) -> usize {
        self.state.tasks.len()
    }
}

async fn control_loop(
    state: Arc<ProcessorState>,
    mut shutdown: watch::Receiver<()>,
) {
    let mut discovery_tick = interval(state.config.discovery_interval());
    discovery_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut renew_tick = interval(state.config.renew_interval());
    renew_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            _ = discovery_tick.tick() => {
                discovery_pass(&state).await;
            }

            _ = renew_tick.tick() => {
                renew_pass(&state).await;
            }
        }
    }

    shutdown_tasks(&state).await;
}

/// Re-discover partitions, then try to acquire every eligible lease this
/// instance is not already running a task for.
async fn discovery_pass(state: &Arc<ProcessorState>) {
    if let Err(e) = state.enumerator.reconcile().await {
        warn!("partition reconciliation failed: {:?}", e);
        return;
    }

    let acquirable = match state.lease_manager.acquirable_leases().await {
        Ok(leases) => leases,
        Err(e) => {
            warn!("lease sweep failed: {:?}", e);
            return;
        }
    };

    for lease in acquirable {
        let partition = lease.partition_id.clone();
        if state.tasks.contains_key(&partition) || state.halted.contains(&partition) {
            continue;
        }

        match state.lease_manager.try_acquire(&lease).await {
            Ok(AcquireOutcome::Owned(owned)) => spawn_partition_task(state, owned),
            Ok(AcquireOutcome::Contended) => {
                // Normal race outcome; another instance got there first
            }
            Err(e) => warn!("acquisition of partition {} failed: {:?}", partition, e),
        }
    }
}

fn spawn_partition_task(
    state: &Arc<ProcessorState>,
    owned: crate::Lease,
) {
    let partition = owned.partition_id.clone();
    let (stop_tx, stop_rx) = watch::channel(());

    let reader = FeedReader::new(
        state.source.clone(),
        state.source_collection.clone(),
        state.config.max_batch_size,
    );
    let dispatch = DispatchLoop::new(
        owned,
        reader,
        state.handler.clone(),
        state.lease_manager.clone(),
        &state.config,
        stop_rx,
    );

    let handle = tokio::spawn(dispatch.run());
    state
        .tasks
        .insert(partition, PartitionTask { stop_tx, handle });
}

/// Reap finished dispatch tasks, then renew the leases of the live ones.
async fn renew_pass(state: &Arc<ProcessorState>) {
    // Reap first so a task that already lost its lease frees the slot
    let finished: Vec<PartitionId> = state
        .tasks
        .iter()
        .filter(|entry| entry.value().handle.is_finished())
        .map(|entry| entry.key().clone())
        .collect();
    for partition in finished {
        if let Some((_, task)) = state.tasks.remove(&partition) {
            reap_task(state, &partition, task).await;
        }
    }

    let running: Vec<PartitionId> = state.tasks.iter().map(|e| e.key().clone()).collect();
    for partition in running {
        match state.lease_manager.renew(&partition).await {
            Ok(RenewOutcome::Owned(_)) => {}
            Ok(RenewOutcome::Lost) => {
                // Stop the local task; the reap on the next tick collects it
                if let Some(entry) = state.tasks.get(&partition) {
                    let _ = entry.value().stop_tx.send(());
                }
            }
            Err(e) => warn!("renewal of partition {} failed: {:?}", partition, e),
        }
    }
}

async fn reap_task(
    state: &Arc<ProcessorState>,
    partition: &PartitionId,
    task: PartitionTask,
) {
    match task.handle.await {
        Ok(Ok(())) => {}
        Ok(Err(Error::Processing(ProcessingError::HandlerExhausted { .. }))) => {
            // Fatal for the partition; surfaced already by the dispatch loop.
            // Keep it off this instance until an operator restarts.
            state.halted.insert(partition.clone());
        }
        Ok(Err(Error::Processing(ProcessingError::LeaseLost { .. }))) => {
            // Ownership moved; eligible again if it ever expires back to us
        }
        Ok(Err(e @ Error::Source(SourceError::InvalidToken { .. }))) => {
            // Re-acquiring would just replay the same failing read
            error!(
                "dispatch task for partition {} halted on bad token: {:?}",
                partition, e
            );
            state.halted.insert(partition.clone());
        }
        Ok(Err(e)) => {
            error!("dispatch task for partition {} failed: {:?}", partition, e)
        }
        Err(e) => error!("dispatch task for partition {} panicked: {:?}", partition, e),
    }
}

/// Broadcast stop to every dispatch task, then wait for all of them to exit.
async fn shutdown_tasks(state: &Arc<ProcessorState>) {
    let partitions: Vec<PartitionId> = state.tasks.iter().map(|e| e.key().clone()).collect();
    let mut stopping = Vec::with_capacity(partitions.len());
    for partition in partitions {
        if let Some((_, task)) = state.tasks.remove(&partition) {
            let _ = task.stop_tx.send(());
            stopping.push((partition, task));
        }
    }

    join_all(
        stopping
            .into_iter()
            .map(|(partition, task)| async move { reap_task(state, &partition, task).await }),
    )
    .await;
}
