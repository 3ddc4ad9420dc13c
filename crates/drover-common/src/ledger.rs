//! Ledger-facing data model and gateway trait.

use std::sync::Arc;

use crate::tx::TransactionSet;
use crate::types::{AccountId, Hash256, SlotIndex};

/// Header of a closed ledger, as consensus sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerHeader {
    /// Ledger sequence number.
    pub seq: SlotIndex,
    /// Hash of this ledger.
    pub hash: Hash256,
    /// Close time, seconds since epoch.
    pub close_time: u64,
    /// Base fee charged per transaction in this ledger.
    pub base_fee: u32,
    /// Hash of the ledger before this one.
    pub previous_ledger_hash: Hash256,
}

/// Account state relevant to transaction admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntry {
    /// The account's identity.
    pub account_id: AccountId,
    /// Spendable balance in base units.
    pub balance: i64,
    /// Last consumed sequence number.
    pub seq_num: u64,
}

/// Interface the consensus layer consumes from the ledger subsystem.
///
/// The ledger applies committed transaction sets and answers account and
/// fee queries; everything else about it is out of scope here.
pub trait LedgerGateway: Send + Sync {
    /// Header of the last closed ledger.
    fn last_closed_header(&self) -> LedgerHeader;

    /// The uniform per-transaction network fee.
    fn tx_fee(&self) -> i64;

    /// Load an account, or None if it does not exist.
    fn load_account(&self, account: &AccountId) -> Option<AccountEntry>;

    /// Hand a committed transaction set to the ledger for application.
    fn externalize_value(&self, tx_set: Arc<TransactionSet>);
}
