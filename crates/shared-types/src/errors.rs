//! # Error Types
//!
//! Errors raised by the shared record model.

use thiserror::Error;

/// Failure to parse an account object id (`1.2.N`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountIdParseError {
    /// Not three dot-separated integers.
    #[error("Malformed account id: {0:?}")]
    Format(String),

    /// Well-formed object id, but not an account.
    #[error("Object {space}.{kind}.x is not an account")]
    WrongObjectType { space: u8, kind: u8 },
}
