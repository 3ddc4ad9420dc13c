//! Overlay-network boundary for drover.
//!
//! The overlay itself (connections, handshakes, flooding) is an external
//! collaborator; this crate defines what the node sends into it
//! ([`NodeMessage`] via [`OverlayGateway`]) and the [`ItemFetcher`] that
//! deduplicates content-addressed requests and caches the artifacts
//! peers send back.

mod item_fetcher;
mod message;

pub use item_fetcher::{FetchItem, ItemFetcher, ItemFetcherStats};
pub use message::{NodeMessage, TransactionBroadcast};

use std::fmt;

/// Identity of a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

/// Interface the node consumes from the overlay.
pub trait OverlayGateway: Send + Sync {
    /// Flood a message to connected peers.
    fn broadcast_message(&self, msg: NodeMessage);
}

impl FetchItem for drover_common::TransactionSet {
    fn fetch_hash(&self) -> drover_common::Hash256 {
        self.content_hash()
    }
}

impl FetchItem for drover_fba::QuorumSet {
    fn fetch_hash(&self) -> drover_common::Hash256 {
        self.hash()
    }
}
