use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Embedded store location and the two collections the engine needs: the
/// source collection the change feed is read from, and the lease collection
/// the coordination state lives in.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory the embedded database is opened in
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Source collection name
    #[serde(default = "default_source_collection")]
    pub source_collection: String,

    /// Lease collection name
    #[serde(default = "default_lease_collection")]
    pub lease_collection: String,

    /// Partition key path recorded when creating the source collection
    #[serde(default = "default_partition_key_path")]
    pub partition_key_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            source_collection: default_source_collection(),
            lease_collection: default_lease_collection(),
            partition_key_path: default_partition_key_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source_collection.is_empty() || self.lease_collection.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "'source_collection' and 'lease_collection' settings are required".into(),
            )));
        }

        if self.source_collection == self.lease_collection {
            return Err(Error::Config(ConfigError::Message(
                "source_collection and lease_collection must differ".into(),
            )));
        }

        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/cf-engine")
}

fn default_source_collection() -> String {
    "source-items".to_string()
}

fn default_lease_collection() -> String {
    "leases".to_string()
}

fn default_partition_key_path() -> String {
    "/partitionKey".to_string()
}
