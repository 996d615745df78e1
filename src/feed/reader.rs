use std::sync::Arc;

use tracing::trace;

use crate::ContinuationToken;
use crate::FeedResponse;
use crate::PartitionId;
use crate::Result;
use crate::SourceStore;

/// Polls one collection's change feed on behalf of dispatch loops.
///
/// Thin by design: ordering and no-skip/no-duplicate guarantees live in the
/// [`SourceStore`] contract; the reader pins the collection and batch bound.
pub struct FeedReader {
    source: Arc<dyn SourceStore>,
    source_collection: String,
    max_batch_size: usize,
}

impl FeedReader {
    pub fn new(
        source: Arc<dyn SourceStore>,
        source_collection: impl Into<String>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            source,
            source_collection: source_collection.into(),
            max_batch_size,
        }
    }

    /// Read the next batch of changes past `token`.
    pub async fn read_next(
        &self,
        partition: &PartitionId,
        token: Option<&ContinuationToken>,
    ) -> Result<FeedResponse> {
        trace!("polling partition {} past {:?}", partition, token);
        self.source
            .read_changes_since(
                &self.source_collection,
                partition.clone(),
                token.cloned(),
                self.max_batch_size,
            )
            .await
    }
}
