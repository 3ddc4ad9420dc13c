//! The two traits that cross the engine boundary.
//!
//! The engine is isolated and stateless with respect to application
//! logic: it cannot validate a transaction set, look up a quorum set, or
//! reach the network. All of that is delegated through [`FbaDriver`],
//! implemented by the node's Herder. In the other direction the Herder
//! drives the engine through [`Fba`].
//!
//! Validation is asynchronous by construction. A validation callback may
//! run inline when everything it needs is already at hand, or later when
//! a referenced artifact arrives from the network; either way it runs at
//! most once, which is why continuations are `FnOnce`.

use std::cmp::Ordering;
use std::sync::Arc;

use drover_common::{Hash256, NodeId, SlotIndex};

use crate::message::{Ballot, Envelope};
use crate::quorum::QuorumSet;
use crate::value::Value;

/// Continuation receiving an asynchronous validation verdict.
pub type ValidationCallback = Box<dyn FnOnce(bool) + Send>;

/// Continuation receiving a resolved quorum set.
pub type QuorumSetCallback = Box<dyn FnOnce(Arc<QuorumSet>) + Send>;

/// Capability set the engine requires from its host.
pub trait FbaDriver: Send + Sync {
    /// Asynchronously decide whether `value` is acceptable for `slot`.
    fn validate_value(
        &self,
        slot: SlotIndex,
        node_id: &NodeId,
        value: &Value,
        cont: ValidationCallback,
    );

    /// Asynchronously decide whether `ballot` is acceptable for `slot`.
    ///
    /// Stricter than value validation: it additionally bounds close-time
    /// drift, ballot-counter growth and the base fee.
    fn validate_ballot(
        &self,
        slot: SlotIndex,
        node_id: &NodeId,
        ballot: &Ballot,
        cont: ValidationCallback,
    );

    /// Deterministic total order on values, identical across all nodes.
    fn compare_values(
        &self,
        slot: SlotIndex,
        ballot_counter: u32,
        v1: &Value,
        v2: &Value,
    ) -> Ordering;

    /// A transitive quorum has been observed on `ballot`.
    fn ballot_did_hear_from_quorum(&self, slot: SlotIndex, ballot: &Ballot);

    /// Consensus committed `value` for `slot`.
    fn value_externalized(&self, slot: SlotIndex, value: &Value);

    /// Resolve a quorum set by hash, fetching it if necessary.
    fn retrieve_quorum_set(&self, node_id: &NodeId, qset_hash: &Hash256, cont: QuorumSetCallback);

    /// Broadcast one of our own envelopes.
    fn emit_envelope(&self, envelope: &Envelope);
}

/// The engine surface the node consumes.
pub trait Fba: Send + Sync {
    /// Propose `value` for `slot`; with `bump` set, also advance the
    /// ballot counter.
    fn prepare_value(&self, slot: SlotIndex, value: &Value, bump: bool);

    /// Feed a peer envelope into the protocol. The callback reports
    /// whether the envelope was accepted as valid.
    fn receive_envelope(&self, envelope: Envelope, cb: ValidationCallback);

    /// This node's identity.
    fn local_node_id(&self) -> NodeId;
}
