//! Adapters implementing the outbound ports: in memory, plus a file-backed
//! document store.

pub mod abi_registry;
pub mod file_store;
pub mod memory_store;
pub mod transient_index;

pub use abi_registry::InMemoryAbiProvider;
pub use file_store::FileDocumentStore;
pub use memory_store::InMemoryDocumentStore;
pub use transient_index::InMemoryTransientIndex;
