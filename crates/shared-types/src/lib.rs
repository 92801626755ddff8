//! # Shared Types Crate
//!
//! Record model shared by the ledger engine and the action history
//! synchronization pipeline.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: the `ActionHistoryRecord` defined here is the
//!   only in-memory shape of an executed action.
//! - **Schema Vocabulary on the Wire**: serde output uses the schema library's
//!   generic field names; stored document naming lives in the pipeline.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
