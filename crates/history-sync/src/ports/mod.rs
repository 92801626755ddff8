//! Hexagonal ports.

pub mod inbound;
pub mod outbound;

pub use inbound::{ActionHistoryApi, HistoryLifecycleApi};
pub use outbound::{AbiProvider, DocumentStore, StoreError, TransientIndex};
