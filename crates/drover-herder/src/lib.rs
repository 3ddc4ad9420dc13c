//! The Herder: node-local driver for the federated agreement engine.
//!
//! The Herder sits between the agreement engine and the rest of the node.
//! It nominates a value for each ledger slot, validates values and
//! ballots proposed by peers, fetches any content they reference before
//! voting, drives consensus timeouts, and hands each committed
//! transaction set to the ledger subsystem.
//!
//! ```text
//! +------------------+
//! |      Herder      |
//! |------------------|
//! | - received txs   |  <-- ReceivedTxQueue (age cohorts 0..3)
//! | - tx-set fetchers|  <-- two ItemFetchers, rotated on commit
//! | - qset fetcher   |
//! | - timers         |  <-- trigger + ballot-bump
//! +------------------+
//!         |
//!         v
//! +------------------+     +------------------+
//! | Agreement engine | <-> |     Overlay      |
//! +------------------+     +------------------+
//!         |
//!         v
//! +------------------+
//! |      Ledger      |
//! +------------------+
//! ```
//!
//! The node must never emit a message, vote, or commit for a slot it is
//! not fully synced to; every entry point below is gated on the sync-wait
//! counter.

mod error;
mod herder;
mod timers;
mod tx_queue;

pub use error::HerderError;
pub use herder::{Herder, HerderTimerHook};
pub use timers::{TimerCallback, TimerHandle, TimerManager};
pub use tx_queue::ReceivedTxQueue;

use drover_common::NodeId;
use drover_fba::QuorumSet;

/// Result type for Herder operations.
pub type Result<T> = std::result::Result<T, HerderError>;

/// Number of age cohorts received transactions move through.
pub const NUM_RECEIVED_BUCKETS: usize = 4;

/// Ledgers to observe after sync before participating.
pub const SYNC_WAIT_LEDGERS: u32 = 3;

// Externalization rebroadcasts cohort 1.
const _: () = assert!(NUM_RECEIVED_BUCKETS >= 2);

/// Tunables and identity for one Herder instance.
#[derive(Debug, Clone)]
pub struct HerderConfig {
    /// This node's identity.
    pub node_id: NodeId,
    /// The local quorum set, pre-published to the quorum-set fetcher.
    pub quorum_set: QuorumSet,
    /// Base fee nominated and accepted (within a 0.5x..2x band).
    pub desired_base_fee: u32,
    /// Whether `bootstrap` is permitted.
    pub start_new_network: bool,
    /// Tolerated wall-clock skew against peers, in seconds.
    pub max_time_slip_secs: u64,
    /// Cap on a single ballot timeout, in seconds.
    pub max_fba_timeout_secs: u64,
    /// Minimum spacing between nomination triggers, in seconds.
    pub exp_ledger_timespan_secs: u64,
    /// Envelope slots further than this from the last closed ledger are
    /// ignored.
    pub ledger_validity_bracket: u64,
}

impl Default for HerderConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from_bytes([0u8; 32]),
            quorum_set: QuorumSet::default(),
            desired_base_fee: 10,
            start_new_network: false,
            max_time_slip_secs: 60,
            max_fba_timeout_secs: 1800,
            exp_ledger_timespan_secs: 5,
            ledger_validity_bracket: 10,
        }
    }
}

impl HerderConfig {
    /// Build from the node's configuration file.
    pub fn from_node_config(config: &drover_common::Config) -> Result<Self> {
        let node_id = config.node_id()?;
        let validators = config.quorum_validators()?;
        Ok(Self {
            node_id,
            quorum_set: QuorumSet::new(config.quorum_threshold, validators),
            desired_base_fee: config.desired_base_fee,
            start_new_network: config.start_new_network,
            ..Self::default()
        })
    }
}
