//! # Lifecycle Bridge
//!
//! Moves records from the host's transient index into the persistence
//! pipeline as blocks become irreversible.
//!
//! Every record is enqueued strictly before it is removed from the index,
//! in non-decreasing `block_num` order, exactly once.

use crate::domain::queue::BackpressureQueue;
use crate::ports::inbound::HistoryLifecycleApi;
use crate::ports::outbound::TransientIndex;
use shared_types::{AppliedBlock, BlockNum};
use std::sync::Arc;

pub struct LifecycleBridge {
    index: Arc<dyn TransientIndex>,
    queue: Arc<BackpressureQueue>,
}

impl LifecycleBridge {
    pub fn new(index: Arc<dyn TransientIndex>, queue: Arc<BackpressureQueue>) -> Self {
        Self { index, queue }
    }

    /// Records still waiting for irreversibility.
    pub fn reversible_count(&self) -> usize {
        self.index.len()
    }
}

impl HistoryLifecycleApi for LifecycleBridge {
    fn on_block_applied(&self, block: &AppliedBlock) -> usize {
        let mut indexed = 0;
        for record in block.records() {
            let mut copy = record.clone();
            copy.irreversible_state = false;
            tracing::debug!(
                storage_id = copy.storage_id,
                block_num = copy.block_num,
                "[history-sync] Indexed reversible record"
            );
            self.index.insert(copy);
            indexed += 1;
        }
        indexed
    }

    fn on_irreversible(&self, height: BlockNum) -> usize {
        let mut moved = 0;

        while let Some(mut record) = self.index.lowest() {
            if record.block_num >= height {
                break;
            }

            let storage_id = record.storage_id;
            if !record.mark_irreversible() {
                tracing::warn!(storage_id, "[history-sync] Record was already irreversible");
            }
            tracing::debug!(
                storage_id,
                block_num = record.block_num,
                "[history-sync] Queueing irreversible record"
            );

            self.queue.enqueue(record);
            self.index.remove(storage_id);
            moved += 1;
        }

        moved
    }
}
