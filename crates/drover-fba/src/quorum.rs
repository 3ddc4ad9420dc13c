//! Quorum sets.

use serde::{Deserialize, Serialize};

use drover_common::{Hash256, NodeId};

/// A threshold plus the validators whose statements count toward it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuorumSet {
    /// How many of the validators must agree.
    pub threshold: u32,
    /// The validator identities.
    pub validators: Vec<NodeId>,
}

impl QuorumSet {
    /// Create a quorum set.
    pub fn new(threshold: u32, validators: Vec<NodeId>) -> Self {
        Self {
            threshold,
            validators,
        }
    }

    /// Canonical identifier: SHA-512/256 over the normalized encoding.
    ///
    /// Validators are sorted before hashing so two nodes configured with
    /// the same set in different orders agree on the identifier.
    pub fn hash(&self) -> Hash256 {
        let mut normalized = self.clone();
        normalized.validators.sort();
        let bytes = bincode::serialize(&normalized).unwrap_or_default();
        Hash256::sha512_256(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(seed: u8) -> NodeId {
        NodeId::from_bytes([seed; 32])
    }

    #[test]
    fn hash_ignores_validator_order() {
        let a = QuorumSet::new(2, vec![node(1), node(2), node(3)]);
        let b = QuorumSet::new(2, vec![node(3), node(1), node(2)]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_binds_threshold_and_members() {
        let base = QuorumSet::new(2, vec![node(1), node(2)]);
        assert_ne!(base.hash(), QuorumSet::new(1, vec![node(1), node(2)]).hash());
        assert_ne!(base.hash(), QuorumSet::new(2, vec![node(1), node(4)]).hash());
    }

    #[test]
    fn empty_set_hashes() {
        // A bootstrap node may run with an empty quorum.
        let empty = QuorumSet::new(0, Vec::new());
        assert!(!empty.hash().is_zero());
    }
}
