//! # Domain Errors
//!
//! Error types for schema rendering, stored-document translation and queries.
//!
//! Store connectivity errors live with the store port
//! (`ports::outbound::StoreError`).

use crate::ports::outbound::StoreError;
use shared_types::AccountId;
use thiserror::Error;

/// Failures while resolving or applying an account schema.
///
/// Any of these degrades the affected record to an identity-only document;
/// none of them stops the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The host could not serve the account's schema.
    #[error("Schema lookup failed for account {account}: {message}")]
    ProviderUnavailable { account: AccountId, message: String },

    /// The schema definition is not valid ABI JSON.
    #[error("Malformed ABI: {message}")]
    Parse { message: String },

    /// A type referenced by the schema is not defined.
    #[error("Unknown ABI type: {type_name}")]
    UnknownType { type_name: String },

    /// Payload bytes do not match the declared type.
    #[error("Cannot decode {type_name}: {message}")]
    Decode { type_name: String, message: String },

    /// Type nesting exceeded the decoder's recursion bound.
    #[error("Type nesting deeper than {max}")]
    DepthExceeded { max: usize },

    /// The record could not be turned into a JSON tree.
    #[error("Render error: {message}")]
    Render { message: String },
}

/// Stored document does not have the shape the pipeline writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Identity-only document, or a document written by something else.
    #[error("Document {id:?} has no action body")]
    MissingAction { id: Option<i64> },

    /// An identifier field (`account`, `name`) is absent after reverse mapping.
    #[error("Document {id:?} is missing identifier field {field}")]
    MissingIdentifier { id: Option<i64>, field: &'static str },

    /// Renaming would overwrite an existing field.
    #[error("Field {field} already present, refusing to overwrite")]
    FieldCollision { field: String },

    /// Deserialization into the record model failed.
    #[error("Document {id:?} has an invalid shape: {message}")]
    InvalidShape { id: Option<i64>, message: String },
}

/// Errors surfaced to query callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The document store rejected or failed the read.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A result document could not be translated back into a record.
    ///
    /// Signals store corruption or a stored-shape version mismatch; the whole
    /// query fails rather than returning a partial page.
    #[error("Malformed stored document: {0}")]
    MalformedDocument(#[from] DocumentError),
}
