//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Everything the pipeline needs from its host and from the document
//! database. Calls are synchronous; the worker thread owns all writes.

use crate::domain::document::{Document, Filter, FindOptions};
use crate::domain::errors::SchemaError;
use shared_types::{AccountId, ActionHistoryRecord, BlockNum, StorageId};
use thiserror::Error;

/// Document store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection lost, timeout, server refused.
    #[error("Document store unavailable: {message}")]
    Unavailable { message: String },

    /// A document with this `_id` already exists.
    #[error("Duplicate key: {id}")]
    DuplicateKey { id: i64 },

    /// The store refused the document itself.
    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },
}

impl StoreError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Source of per-account schema definitions (ABI JSON).
pub trait AbiProvider: Send + Sync {
    /// Raw ABI JSON of `account`, `None` if the account publishes none.
    fn account_abi(&self, account: AccountId) -> Result<Option<String>, SchemaError>;
}

/// Host-owned index of reversible records, ordered by
/// `(block_num, storage_id)`.
pub trait TransientIndex: Send + Sync {
    /// Insert or replace by storage id.
    fn insert(&self, record: ActionHistoryRecord);

    /// Copy of the record with the lowest `(block_num, storage_id)`.
    fn lowest(&self) -> Option<ActionHistoryRecord>;

    /// Remove by storage id; returns whether it was present.
    fn remove(&self, storage_id: StorageId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest block number currently held.
    fn lowest_block(&self) -> Option<BlockNum> {
        self.lowest().map(|record| record.block_num)
    }
}

/// Document database keyed by a signed 64-bit `_id`.
pub trait DocumentStore: Send + Sync {
    /// Ensure an ascending secondary index on a dotted path.
    fn create_index(&self, collection: &str, path: &str) -> Result<(), StoreError>;

    fn find_by_id(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError>;

    /// Atomic insert-if-absent. An existing `_id` yields
    /// [`StoreError::DuplicateKey`].
    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;
}
