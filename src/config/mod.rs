//! Configuration management for the change-feed engine.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Main config file (`config/cf-engine.toml`)
//! 3. Caller-supplied override file
//! 4. Environment variables (highest priority, `CF_ENGINE__` prefix)

mod processor;
mod storage;
pub use processor::*;
pub use storage::*;

#[cfg(test)]
mod config_test;

//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Embedded store location and collection names
    #[serde(default)]
    pub storage: StorageConfig,
    /// Lease timing, batching and retry parameters
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl Settings {
    /// Load configuration with proper priority ordering.
    ///
    /// # Arguments
    /// * `override_path` - Optional path to an instance-specific config file
    pub fn load(override_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Main config (optional; defaults cover a missing file)
        config = config.add_source(File::with_name("config/cf-engine").required(false));

        // 2. Instance-specific overrides
        if let Some(path) = override_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        // 3. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix("CF_ENGINE")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates all subsystem configurations; fails fast at startup.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.processor.validate()?;
        Ok(())
    }
}
