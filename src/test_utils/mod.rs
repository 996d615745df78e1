//! Shared fixtures for unit tests: tempdir-backed stores and scripted
//! handlers.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::ChangeEvent;
use crate::ChangeHandler;
use crate::HandlerError;
use crate::ProcessorConfig;
use crate::Settings;
use crate::SledLeaseStore;
use crate::storage::SourceStore;
use crate::SledSourceStore;
use crate::StorageConfig;

pub const TEST_COLLECTION: &str = "items";
pub const TEST_LEASE_COLLECTION: &str = "leases";

/// Settings with intervals short enough for tests that run wall-clock time.
pub fn test_settings(instance_name: &str) -> Settings {
    Settings {
        storage: StorageConfig {
            source_collection: TEST_COLLECTION.to_string(),
            lease_collection: TEST_LEASE_COLLECTION.to_string(),
            ..StorageConfig::default()
        },
        processor: ProcessorConfig {
            instance_name: instance_name.to_string(),
            lease_duration_ms: 1_500,
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

pub struct StoreFixture {
    pub dir: TempDir,
    pub db: sled::Db,
    pub source: Arc<SledSourceStore>,
    pub lease_store: Arc<SledLeaseStore>,
}

/// Open a fresh sled db with the source collection already created.
pub async fn setup_stores() -> StoreFixture {
    let dir = TempDir::new().expect("create temp dir");
    let db = sled::open(dir.path()).expect("open sled db");
    let source = Arc::new(SledSourceStore::new(db.clone()));
    source
        .create_collection_if_absent(TEST_COLLECTION, "/partitionKey")
        .await
        .expect("create source collection");
    let lease_store =
        Arc::new(SledLeaseStore::new(db.clone(), TEST_LEASE_COLLECTION).expect("open lease tree"));
    StoreFixture {
        dir,
        db,
        source,
        lease_store,
    }
}

/// Handler that records every delivered event and optionally fails the first
/// `fail_first` attempts.
pub struct RecordingHandler {
    pub delivered: Mutex<Vec<ChangeEvent>>,
    pub attempts: AtomicUsize,
    fail_first: usize,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_first,
        })
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .expect("handler mutex poisoned")
            .iter()
            .map(|e| e.record.id.clone())
            .collect()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().expect("handler mutex poisoned").len()
    }
}

#[async_trait]
impl ChangeHandler for RecordingHandler {
    async fn handle_changes(
        &self,
        batch: &[ChangeEvent],
    ) -> std::result::Result<(), HandlerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(HandlerError::new(format!("scripted failure {attempt}")));
        }
        self.delivered
            .lock()
            .expect("handler mutex poisoned")
            .extend_from_slice(batch);
        Ok(())
    }
}
