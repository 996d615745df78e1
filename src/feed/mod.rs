//! Per-partition feed consumption: polling, batch delivery and
//! checkpointing.

mod dispatcher;
mod reader;
pub use dispatcher::*;
pub use reader::*;


///--------------------------------------
/// Trait Definition
use async_trait::async_trait;

use crate::ChangeEvent;
use crate::HandlerError;

/// User-supplied batch handler.
///
/// Receives an ordered, non-empty sequence of change events from a single
/// partition. Delivery is at-least-once: the same batch may be invoked again
/// after a failover or a failed checkpoint, so side effects should be
/// idempotent where possible.
#[async_trait]
pub trait ChangeHandler: Send + Sync + 'static {
    async fn handle_changes(
        &self,
        batch: &[ChangeEvent],
    ) -> std::result::Result<(), HandlerError>;
}
