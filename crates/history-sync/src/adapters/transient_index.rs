//! In-memory `TransientIndex` ordered by `(block_num, storage_id)`.

use crate::ports::outbound::TransientIndex;
use parking_lot::RwLock;
use shared_types::{ActionHistoryRecord, BlockNum, StorageId};
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct IndexState {
    by_order: BTreeMap<(BlockNum, StorageId), ActionHistoryRecord>,
    block_of: HashMap<StorageId, BlockNum>,
}

/// Reversible records awaiting irreversibility.
#[derive(Default)]
pub struct InMemoryTransientIndex {
    state: RwLock<IndexState>,
}

impl InMemoryTransientIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, storage_id: StorageId) -> Option<ActionHistoryRecord> {
        let state = self.state.read();
        let block = state.block_of.get(&storage_id)?;
        state.by_order.get(&(*block, storage_id)).cloned()
    }

    /// Storage ids in `(block_num, storage_id)` order.
    pub fn storage_ids(&self) -> Vec<StorageId> {
        self.state
            .read()
            .by_order
            .keys()
            .map(|(_, storage_id)| *storage_id)
            .collect()
    }
}

impl TransientIndex for InMemoryTransientIndex {
    fn insert(&self, record: ActionHistoryRecord) {
        let mut state = self.state.write();
        let (block_num, storage_id) = record.block_order_key();
        if let Some(previous) = state.block_of.insert(storage_id, block_num) {
            state.by_order.remove(&(previous, storage_id));
        }
        state.by_order.insert((block_num, storage_id), record);
    }

    fn lowest(&self) -> Option<ActionHistoryRecord> {
        self.state
            .read()
            .by_order
            .first_key_value()
            .map(|(_, record)| record.clone())
    }

    fn remove(&self, storage_id: StorageId) -> bool {
        let mut state = self.state.write();
        match state.block_of.remove(&storage_id) {
            Some(block_num) => state.by_order.remove(&(block_num, storage_id)).is_some(),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.state.read().by_order.len()
    }
}
