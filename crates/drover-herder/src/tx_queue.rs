//! Received-transaction aging queue.
//!
//! Transactions accepted from the network wait here until they are
//! committed to a ledger. The queue is a fixed sequence of age cohorts:
//! new arrivals enter cohort 0, and every externalization shifts the
//! survivors one cohort older. Cohort 1 gets rebroadcast after each
//! close; the oldest cohort is the set a proposed transaction set must
//! include before this node will vote for it, so nominators cannot drop
//! transactions our quorum has been flooding for three slots.

use std::sync::Arc;

use drover_common::{Hash256, LedgerGateway, Transaction};

use crate::NUM_RECEIVED_BUCKETS;

/// Pending transactions bucketed by age.
pub struct ReceivedTxQueue {
    buckets: [Vec<Arc<Transaction>>; NUM_RECEIVED_BUCKETS],
}

impl ReceivedTxQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Read-only view of the cohorts, youngest first.
    pub fn buckets(&self) -> &[Vec<Arc<Transaction>>] {
        &self.buckets
    }

    /// The cohort a proposed set must include.
    pub fn oldest(&self) -> &[Arc<Transaction>] {
        &self.buckets[NUM_RECEIVED_BUCKETS - 1]
    }

    /// The cohort rebroadcast after each externalization: transactions
    /// flooded one slot ago that survived.
    pub fn rebroadcast_cohort(&self) -> &[Arc<Transaction>] {
        &self.buckets[1]
    }

    /// Every pending transaction across all cohorts.
    pub fn all(&self) -> Vec<Arc<Transaction>> {
        self.buckets.iter().flatten().cloned().collect()
    }

    /// Total pending transactions.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Whether no transactions are pending.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Admit a transaction into cohort 0.
    ///
    /// Returns true iff the transaction is newly accepted. Rejections:
    /// already held, unknown source account, stale sequence number,
    /// balance insufficient for the account's in-flight obligations, or
    /// structural invalidity.
    pub fn try_enqueue(&mut self, tx: Arc<Transaction>, ledger: &dyn LedgerGateway) -> bool {
        let tx_hash = tx.full_hash();

        let mut num_others: i64 = 0;
        for bucket in &self.buckets {
            for held in bucket {
                if held.full_hash() == tx_hash {
                    return false;
                }
                if held.source == tx.source {
                    num_others += 1;
                }
            }
        }

        let account = match tx.source_account(ledger) {
            Some(account) => account,
            None => return false,
        };

        if tx.seq_num < account.seq_num + 1 {
            return false;
        }

        // The account must cover the fee for every transaction it
        // already has in flight plus this one. Full minimum-balance
        // rules don't apply here; accounts may still move credit around.
        if account.balance < (num_others + 1) * ledger.tx_fee() {
            return false;
        }

        if !tx.check_valid(ledger) {
            return false;
        }

        self.buckets[0].push(tx);
        true
    }

    /// Remove a transaction from whichever cohort holds it, stopping at
    /// the first hit.
    pub fn remove(&mut self, tx_hash: &Hash256) {
        for bucket in &mut self.buckets {
            if let Some(pos) = bucket.iter().position(|tx| tx.full_hash() == *tx_hash) {
                bucket.remove(pos);
                return;
            }
        }
    }

    /// Age every cohort by one slot. The oldest cohort accumulates; the
    /// youngest empties.
    pub fn shift(&mut self) {
        for n in (1..NUM_RECEIVED_BUCKETS).rev() {
            let moved = std::mem::take(&mut self.buckets[n - 1]);
            self.buckets[n].extend(moved);
        }
    }
}

impl Default for ReceivedTxQueue {
    fn default() -> Self {
        Self::new()
    }
}
