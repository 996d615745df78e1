use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cf_engine::ChangeEvent;
use cf_engine::ChangeHandler;
use cf_engine::HandlerError;
use cf_engine::ProcessorConfig;
use cf_engine::Settings;
use cf_engine::SledLeaseStore;
use cf_engine::SledSourceStore;
use cf_engine::SourceStore;
use cf_engine::StorageConfig;
use tempfile::TempDir;
use tokio::time::sleep;

pub const TEST_COLLECTION: &str = "items";
pub const LEASE_COLLECTION: &str = "leases";
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings with intervals short enough for wall-clock integration tests.
pub fn test_settings(instance_name: &str) -> Settings {
    Settings {
        storage: StorageConfig {
            source_collection: TEST_COLLECTION.to_string(),
            lease_collection: LEASE_COLLECTION.to_string(),
            ..StorageConfig::default()
        },
        processor: ProcessorConfig {
            instance_name: instance_name.to_string(),
            lease_duration_ms: 2_000,
            renew_interval_ms: 100,
            discovery_interval_ms: 50,
            max_batch_size: 10,
            handler_retry_limit: 3,
            retry_backoff_base_ms: 10,
            poll_backoff_base_ms: 10,
            poll_backoff_max_ms: 40,
        },
    }
}

pub struct TestStores {
    pub _dir: TempDir,
    pub source: Arc<SledSourceStore>,
    pub lease_store: Arc<SledLeaseStore>,
}

/// One sled db shared by every processor instance in the test, standing in
/// for the common backing service.
pub async fn setup_stores() -> TestStores {
    let dir = TempDir::new().expect("create temp dir");
    let db = sled::open(dir.path()).expect("open sled db");
    let source = Arc::new(SledSourceStore::new(db.clone()));
    source
        .create_collection_if_absent(TEST_COLLECTION, "/partitionKey")
        .await
        .expect("create source collection");
    let lease_store =
        Arc::new(SledLeaseStore::new(db, LEASE_COLLECTION).expect("open lease tree"));
    TestStores {
        _dir: dir,
        source,
        lease_store,
    }
}

pub async fn wait_until<F>(
    what: &str,
    mut condition: F,
) where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {}",
            what
        );
        sleep(Duration::from_millis(10)).await;
    }
}

/// Handler that records every delivered event, for assertions on coverage,
/// duplication and per-partition order.
pub struct CountingHandler {
    pub delivered: Mutex<Vec<ChangeEvent>>,
}

impl CountingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().expect("handler mutex poisoned").len()
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .expect("handler mutex poisoned")
            .iter()
            .map(|e| e.record.id.clone())
            .collect()
    }

    /// Delivered events grouped by partition key, in delivery order.
    pub fn by_partition(&self) -> HashMap<String, Vec<ChangeEvent>> {
        let mut grouped: HashMap<String, Vec<ChangeEvent>> = HashMap::new();
        for event in self.delivered.lock().expect("handler mutex poisoned").iter() {
            grouped
                .entry(event.record.partition_key.clone())
                .or_default()
                .push(event.clone());
        }
        grouped
    }

    /// Tokens must be strictly increasing within each partition.
    pub fn assert_partition_order(&self) {
        for (partition, events) in self.by_partition() {
            for pair in events.windows(2) {
                assert!(
                    pair[0].token < pair[1].token,
                    "out-of-order delivery in partition {}",
                    partition
                );
            }
        }
    }
}

#[async_trait]
impl ChangeHandler for CountingHandler {
    async fn handle_changes(
        &self,
        batch: &[ChangeEvent],
    ) -> Result<(), HandlerError> {
        self.delivered
            .lock()
            .expect("handler mutex poisoned")
            .extend_from_slice(batch);
        Ok(())
    }
}
