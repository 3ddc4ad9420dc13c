//! Ballot payloads.
//!
//! Consensus runs over opaque byte strings so that value comparison is a
//! plain bytewise order, identical on every node. The structured form
//! only exists transiently: encode before handing a value to the engine,
//! decode when a peer's value comes back for validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use drover_common::Hash256;

/// Decode failure for a ballot payload.
#[derive(Debug, Error)]
#[error("malformed ledger value: {0}")]
pub struct ValueError(String);

/// An opaque ballot payload.
///
/// Equality and total ordering are bytewise over the encoding; the
/// engine relies on this to break ties identically across all honest
/// nodes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Value(pub Vec<u8>);

impl Value {
    /// Raw bytes of the encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this value carries no payload.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let take = self.0.len().min(6);
        write!(f, "Value({}", hex::encode(&self.0[..take]))?;
        if self.0.len() > take {
            write!(f, "..")?;
        }
        write!(f, ")")
    }
}

/// The structured record a [`Value`] encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerValue {
    /// Identifier of the proposed transaction set.
    pub tx_set_hash: Hash256,
    /// Proposed close time, seconds since epoch.
    pub close_time: u64,
    /// Proposed base fee.
    pub base_fee: u32,
}

impl LedgerValue {
    /// Encode to the canonical opaque form.
    pub fn encode(&self) -> Value {
        Value(bincode::serialize(self).unwrap_or_default())
    }

    /// Decode a value received from a peer.
    pub fn decode(value: &Value) -> Result<Self, ValueError> {
        bincode::deserialize(&value.0).map_err(|e| ValueError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(close_time: u64) -> LedgerValue {
        LedgerValue {
            tx_set_hash: Hash256::hash(b"txset"),
            close_time,
            base_fee: 10,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let value = sample(1_000).encode();
        assert!(!value.is_empty());
        let decoded = LedgerValue::decode(&value).unwrap();
        assert_eq!(decoded, sample(1_000));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(LedgerValue::decode(&Value(vec![0xff; 3])).is_err());
        assert!(LedgerValue::decode(&Value(Vec::new())).is_err());
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(sample(42).encode(), sample(42).encode());
        assert_ne!(sample(42).encode(), sample(43).encode());
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = Value(vec![0, 1, 2]);
        let b = Value(vec![0, 1, 3]);
        let prefix = Value(vec![0, 1]);
        assert!(a < b);
        assert!(prefix < a);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }
}
