//! Transactions and transaction sets.
//!
//! A [`Transaction`] is the minimal payment record the consensus layer
//! cares about: who pays, who receives, the fee bid, how much moves,
//! and at which source sequence number. Its identity is the SHA-512/256
//! of its canonical encoding. A [`TransactionSet`] is the ordered
//! collection proposed for one ledger close; its content hash is the
//! identifier ballots carry.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ledger::{AccountEntry, LedgerGateway};
use crate::types::{AccountId, Hash256};

/// A single payment transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Paying account.
    pub source: AccountId,
    /// Receiving account.
    pub destination: AccountId,
    /// Source account sequence number this transaction consumes.
    pub seq_num: u64,
    /// Fee bid, in base units.
    pub fee: u32,
    /// Amount transferred, in base units.
    pub amount: i64,
}

impl Transaction {
    /// Canonical identity of this transaction.
    pub fn full_hash(&self) -> Hash256 {
        let bytes = bincode::serialize(self).unwrap_or_default();
        Hash256::sha512_256(&bytes)
    }

    /// Load the paying account, or None if it does not exist.
    pub fn source_account(&self, ledger: &dyn LedgerGateway) -> Option<AccountEntry> {
        ledger.load_account(&self.source)
    }

    /// Structural validity against the current ledger.
    ///
    /// Balance and sequence admission checks happen separately when the
    /// transaction enters the received queue.
    pub fn check_valid(&self, ledger: &dyn LedgerGateway) -> bool {
        if self.amount <= 0 {
            return false;
        }
        if self.source == self.destination {
            return false;
        }
        if (self.fee as i64) < ledger.tx_fee() {
            return false;
        }
        self.source_account(ledger).is_some()
    }
}

/// An ordered collection of transactions linked to the previous ledger.
///
/// The content hash covers the previous ledger hash and the transaction
/// identities in sorted order, so two nodes assembling the same
/// transactions in different orders agree on the identifier.
#[derive(Debug, Clone)]
pub struct TransactionSet {
    /// Hash of the ledger this set builds on.
    pub previous_ledger_hash: Hash256,
    /// Transactions in the set.
    pub transactions: Vec<Arc<Transaction>>,
    hash: Hash256,
}

impl TransactionSet {
    /// Create a set over the given transactions.
    pub fn new(previous_ledger_hash: Hash256, transactions: Vec<Arc<Transaction>>) -> Self {
        let hash = Self::compute_hash(&previous_ledger_hash, &transactions);
        Self {
            previous_ledger_hash,
            transactions,
            hash,
        }
    }

    /// Create an empty set on top of the given ledger.
    pub fn empty(previous_ledger_hash: Hash256) -> Self {
        Self::new(previous_ledger_hash, Vec::new())
    }

    fn compute_hash(previous_ledger_hash: &Hash256, transactions: &[Arc<Transaction>]) -> Hash256 {
        let mut tx_hashes: Vec<Hash256> = transactions.iter().map(|tx| tx.full_hash()).collect();
        tx_hashes.sort();

        let mut chunks: Vec<&[u8]> = Vec::with_capacity(tx_hashes.len() + 1);
        chunks.push(previous_ledger_hash.as_bytes());
        for h in &tx_hashes {
            chunks.push(h.as_bytes());
        }
        Hash256::sha512_256_multi(&chunks)
    }

    /// Canonical identifier of this set.
    pub fn content_hash(&self) -> Hash256 {
        self.hash
    }

    /// Whether the set contains a transaction with the given identity.
    pub fn contains(&self, tx_hash: &Hash256) -> bool {
        self.transactions.iter().any(|tx| tx.full_hash() == *tx_hash)
    }

    /// Number of transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Structural and per-transaction validity against the current ledger.
    pub fn check_valid(&self, ledger: &dyn LedgerGateway) -> bool {
        if self.previous_ledger_hash != ledger.last_closed_header().hash {
            return false;
        }
        self.transactions.iter().all(|tx| tx.check_valid(ledger))
    }
}
