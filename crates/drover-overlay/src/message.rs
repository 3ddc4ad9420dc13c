//! Messages the node hands to the overlay for flooding.

use std::sync::Arc;

use drover_common::{Hash256, Transaction};
use drover_fba::Envelope;

/// Tagged union of everything this node broadcasts.
#[derive(Debug, Clone)]
pub enum NodeMessage {
    /// An agreement-protocol envelope.
    FbaMessage(Envelope),
    /// Request for a transaction set by content hash.
    TxSetRequest(Hash256),
    /// Request for a quorum set by content hash.
    QuorumSetRequest(Hash256),
    /// A transaction being flooded.
    Transaction(Arc<Transaction>),
}

impl NodeMessage {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeMessage::FbaMessage(_) => "fba",
            NodeMessage::TxSetRequest(_) => "tx-set-request",
            NodeMessage::QuorumSetRequest(_) => "qset-request",
            NodeMessage::Transaction(_) => "transaction",
        }
    }
}

/// Wrapping a transaction for flooding.
///
/// Lives here rather than on [`Transaction`] because the message type
/// belongs to the overlay boundary.
pub trait TransactionBroadcast {
    /// The broadcast form of this transaction.
    fn to_message(&self) -> NodeMessage;
}

impl TransactionBroadcast for Arc<Transaction> {
    fn to_message(&self) -> NodeMessage {
        NodeMessage::Transaction(self.clone())
    }
}
