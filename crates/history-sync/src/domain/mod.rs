//! Domain layer: pure logic with no I/O.

pub mod abi;
pub mod document;
pub mod errors;
pub mod field_map;
pub mod query;
pub mod queue;

pub use abi::{AbiDefinition, AbiSerializer, MAX_DECODE_DEPTH};
pub use document::{
    record_from_document, Document, Filter, FindOptions, PersistableAction, SortOrder,
};
pub use errors::{DocumentError, QueryError, SchemaError};
pub use field_map::{FieldMap, MapDirection, ACTION_FIELD_MAP};
pub use query::{ActionHistoryQuery, INDEXED_PATHS};
pub use queue::{BackpressureConfig, BackpressureQueue, Drained};
