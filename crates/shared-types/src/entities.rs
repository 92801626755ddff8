//! # Action History Entities
//!
//! The canonical action-history record produced by the ledger engine and
//! consumed by the history synchronization pipeline.
//!
//! ## Clusters
//!
//! - **Identity**: `AccountId`, `StorageId`, `BlockNum`
//! - **Execution**: `ActionCall`, `InlineAction`, `ActionHistoryRecord`
//! - **Notifications**: `AppliedBlock`
//!
//! The serde representation of these types is the schema library's generic
//! vocabulary (`account`, `name`, `hexData`). Renaming into the stored
//! document vocabulary is the pipeline's job, not the model's.

use crate::errors::AccountIdParseError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, hex::Hex, DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;

/// Stable integer identity of a history record (document `_id`).
pub type StorageId = u64;

/// Block height.
pub type BlockNum = u32;

/// Protocol space of account objects.
pub const ACCOUNT_SPACE_ID: u8 = 1;

/// Object type of account objects inside the protocol space.
pub const ACCOUNT_TYPE_ID: u8 = 2;

// =============================================================================
// IDENTITY
// =============================================================================

/// Account object identifier, rendered as `1.2.N`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub struct AccountId(pub u64);

impl AccountId {
    /// Create an account id from its instance number.
    pub const fn new(instance: u64) -> Self {
        Self(instance)
    }

    /// Instance number inside the account object space.
    pub const fn instance(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", ACCOUNT_SPACE_ID, ACCOUNT_TYPE_ID, self.0)
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(space), Some(kind), Some(instance), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AccountIdParseError::Format(s.to_string()));
        };

        let space: u8 = space
            .parse()
            .map_err(|_| AccountIdParseError::Format(s.to_string()))?;
        let kind: u8 = kind
            .parse()
            .map_err(|_| AccountIdParseError::Format(s.to_string()))?;
        if space != ACCOUNT_SPACE_ID || kind != ACCOUNT_TYPE_ID {
            return Err(AccountIdParseError::WrongObjectType { space, kind });
        }

        instance
            .parse()
            .map(AccountId)
            .map_err(|_| AccountIdParseError::Format(s.to_string()))
    }
}

impl From<u64> for AccountId {
    fn from(instance: u64) -> Self {
        Self(instance)
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

/// A single contract invocation: target contract, method and raw payload.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Contract account that owns the method.
    #[serde(rename = "account")]
    pub contract_id: AccountId,
    /// Method name.
    #[serde(rename = "name")]
    pub method_name: String,
    /// Packed call arguments.
    #[serde(rename = "hexData")]
    #[serde_as(as = "Hex")]
    pub data: Vec<u8>,
}

impl ActionCall {
    pub fn new(contract_id: AccountId, method_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            contract_id,
            method_name: method_name.into(),
            data,
        }
    }
}

/// An action triggered synchronously while another action executed.
///
/// Same shape as the top-level action; nested calls keep execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineAction {
    pub sender: AccountId,
    pub receiver: AccountId,
    pub act: ActionCall,
    #[serde(default)]
    pub inline_actions: Vec<InlineAction>,
}

/// One executed action and everything it triggered.
///
/// ## Invariants
///
/// - `storage_id` is unique and never reassigned.
/// - `irreversible_state` flips to `true` exactly once, when the record is
///   handed to the persistence pipeline.
/// - `inline_actions` are in execution order.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHistoryRecord {
    pub storage_id: StorageId,
    pub block_num: BlockNum,
    pub trx_in_block: u16,
    pub op_in_trx: u16,
    pub sender: AccountId,
    pub receiver: AccountId,
    pub act: ActionCall,
    #[serde(default)]
    pub inline_actions: Vec<InlineAction>,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub result: Vec<u8>,
    pub txid: String,
    #[serde(default)]
    pub irreversible_state: bool,
}

impl ActionHistoryRecord {
    /// Flag the record as irreversible.
    ///
    /// Returns `false` if it already was, so callers can detect a second
    /// transition.
    pub fn mark_irreversible(&mut self) -> bool {
        let changed = !self.irreversible_state;
        self.irreversible_state = true;
        changed
    }

    /// Ordering key used by the transient index.
    pub fn block_order_key(&self) -> (BlockNum, StorageId) {
        (self.block_num, self.storage_id)
    }

    /// Total number of inline actions at every nesting level.
    pub fn inline_action_count(&self) -> usize {
        fn count(actions: &[InlineAction]) -> usize {
            actions
                .iter()
                .map(|a| 1 + count(&a.inline_actions))
                .sum()
        }
        count(&self.inline_actions)
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Records applied by the ledger engine while committing one block.
///
/// Slots without a history object are `None` and carry nothing to index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedBlock {
    pub block_num: BlockNum,
    pub actions: Vec<Option<ActionHistoryRecord>>,
}

impl AppliedBlock {
    pub fn new(block_num: BlockNum, actions: Vec<ActionHistoryRecord>) -> Self {
        Self {
            block_num,
            actions: actions.into_iter().map(Some).collect(),
        }
    }

    /// Records actually present in this block, in execution order.
    pub fn records(&self) -> impl Iterator<Item = &ActionHistoryRecord> {
        self.actions.iter().flatten()
    }
}
