//! Driving Ports (API - Inbound)
//!
//! Entry points called by the host ledger engine and by query clients.

use crate::domain::errors::QueryError;
use crate::domain::query::ActionHistoryQuery;
use shared_types::{ActionHistoryRecord, AppliedBlock, BlockNum};

/// Block lifecycle notifications from the ledger engine.
pub trait HistoryLifecycleApi: Send + Sync {
    /// Copy every applied record into the transient index. Returns the
    /// number of records indexed.
    fn on_block_applied(&self, block: &AppliedBlock) -> usize;

    /// Move every transient record with `block_num < height` into the
    /// persistence pipeline. Returns the number of records moved.
    fn on_irreversible(&self, height: BlockNum) -> usize;
}

/// Read access to persisted action history.
pub trait ActionHistoryApi: Send + Sync {
    fn query_action_history(
        &self,
        query: &ActionHistoryQuery,
    ) -> Result<Vec<ActionHistoryRecord>, QueryError>;
}
