//! # Action History Query
//!
//! Query parameters and their translation into store filters and options.
//!
//! ## Filter Precedence
//!
//! | sender | receiver | Filter |
//! |--------|----------|--------|
//! | set | set | `contractId == sender OR contractId == receiver` |
//! | set | - | `contractId == sender` |
//! | - | set | `contractId == receiver` |
//! | - | - | `txid == txid` if given, else everything |
//!
//! An id of `0` counts as not set.

use crate::domain::document::{Filter, FindOptions, SortOrder, ID_FIELD};
use serde::{Deserialize, Serialize};
use shared_types::AccountId;

/// Path of the invoked contract inside a stored document.
pub const CONTRACT_ID_PATH: &str = "action.act.contractId";
/// Path of the transaction id.
pub const TXID_PATH: &str = "action.txid";
pub const SENDER_PATH: &str = "action.sender";
pub const RECEIVER_PATH: &str = "action.receiver";
/// Decoded call arguments.
pub const ARGS_PATH: &str = "action.act.args";
/// Decoded return value.
pub const RESULT_ARGS_PATH: &str = "action.resultArgs";

/// Secondary indexes created on the collection at startup.
pub const INDEXED_PATHS: [&str; 4] = [TXID_PATH, SENDER_PATH, RECEIVER_PATH, CONTRACT_ID_PATH];

/// Parameters of an action history lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionHistoryQuery {
    /// Maximum number of records; `0` asks for the service maximum.
    pub limit: u32,
    /// Newest first (descending storage id).
    pub reverse: bool,
    pub sender_id: Option<u64>,
    pub receiver_id: Option<u64>,
    pub txid: Option<String>,
}

impl ActionHistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn with_sender(mut self, sender_id: u64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn with_receiver(mut self, receiver_id: u64) -> Self {
        self.receiver_id = Some(receiver_id);
        self
    }

    pub fn with_txid(mut self, txid: impl Into<String>) -> Self {
        self.txid = Some(txid.into());
        self
    }

    /// Sender account, ignoring the `0` placeholder.
    pub fn sender(&self) -> Option<AccountId> {
        self.sender_id.filter(|id| *id != 0).map(AccountId)
    }

    /// Receiver account, ignoring the `0` placeholder.
    pub fn receiver(&self) -> Option<AccountId> {
        self.receiver_id.filter(|id| *id != 0).map(AccountId)
    }

    /// Store filter for this query.
    pub fn filter(&self) -> Filter {
        let by_contract = |account: AccountId| Filter::eq(CONTRACT_ID_PATH, account.to_string());

        match (self.sender(), self.receiver()) {
            (Some(sender), Some(receiver)) => {
                Filter::Or(vec![by_contract(sender), by_contract(receiver)])
            }
            (Some(sender), None) => by_contract(sender),
            (None, Some(receiver)) => by_contract(receiver),
            (None, None) => match &self.txid {
                Some(txid) => Filter::eq(TXID_PATH, txid.as_str()),
                None => Filter::All,
            },
        }
    }

    /// Store options: limit capped at `max_limit` (`0` meaning the cap),
    /// `_id` order, decoded bodies projected away.
    pub fn find_options(&self, max_limit: u32) -> FindOptions {
        let limit = match self.limit {
            0 => max_limit,
            requested => requested.min(max_limit),
        };
        FindOptions {
            limit: Some(limit as usize),
            sort: if self.reverse {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            },
            exclude: vec![
                ID_FIELD.to_string(),
                ARGS_PATH.to_string(),
                RESULT_ARGS_PATH.to_string(),
            ],
        }
    }
}
