//! Ballots, statements and envelopes.

use serde::{Deserialize, Serialize};

use drover_common::{Hash256, NodeId, SlotIndex};

use crate::value::Value;

/// A ballot: a retry counter paired with the value being voted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Retry counter, bumped when a round times out.
    pub counter: u32,
    /// The value under vote.
    pub value: Value,
}

/// What a validator is asserting about a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// Proposes a ballot.
    Prepare(Ballot),
    /// Asserts the ballot is prepared.
    Prepared(Ballot),
    /// Votes to commit the ballot.
    Commit(Ballot),
    /// Asserts the ballot is committed.
    Committed(Ballot),
}

impl Statement {
    /// The ballot this statement is about.
    pub fn ballot(&self) -> &Ballot {
        match self {
            Statement::Prepare(b)
            | Statement::Prepared(b)
            | Statement::Commit(b)
            | Statement::Committed(b) => b,
        }
    }
}

/// One validator's statement for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The sender.
    pub node_id: NodeId,
    /// The slot the statement is about.
    pub slot_index: SlotIndex,
    /// Identifier of the sender's quorum set.
    pub quorum_set_hash: Hash256,
    /// The statement itself.
    pub statement: Statement,
}
