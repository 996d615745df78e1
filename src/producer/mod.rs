//! Synthetic load driver: inserts freshly-identified records into the source
//! collection on demand. Not part of the engine's correctness surface.


use std::sync::Arc;

use nanoid::nanoid;
use tracing::error;
use tracing::info;

use crate::Record;
use crate::Result;
use crate::SourceStore;

/// Console command accepted by the interactive driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Insert this many records
    Insert(usize),
    Exit,
}

/// Parse one line of console input. `exit` is case-insensitive; a
/// non-negative integer is an insert count; anything else is ignored and the
/// caller re-prompts.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return Some(ConsoleCommand::Exit);
    }
    trimmed.parse::<usize>().ok().map(ConsoleCommand::Insert)
}

/// Outcome of one generation run. `inserted < requested` means the run was
/// aborted by an insert failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub requested: usize,
    pub inserted: usize,
}

pub struct Producer {
    source: Arc<dyn SourceStore>,
    source_collection: String,
}

impl Producer {
    pub fn new(
        source: Arc<dyn SourceStore>,
        source_collection: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_collection: source_collection.into(),
        }
    }

    /// Insert `count` records one at a time, each with a fresh unique id and
    /// the current timestamp. The partition key mirrors the id, matching the
    /// sample workload. An insert failure aborts the run; the report carries
    /// the count actually completed.
    pub async fn generate(
        &self,
        count: usize,
    ) -> Result<GenerateReport> {
        info!("generating {} record(s)...", count);
        for inserted in 0..count {
            let id = nanoid!();
            let record = Record::new(id.clone(), id);
            if let Err(e) = self.source.insert(&self.source_collection, record).await {
                error!(
                    "insert aborted after {} of {} record(s): {:?}",
                    inserted, count, e
                );
                return Ok(GenerateReport {
                    requested: count,
                    inserted,
                });
            }
        }
        Ok(GenerateReport {
            requested: count,
            inserted: count,
        })
    }
}
