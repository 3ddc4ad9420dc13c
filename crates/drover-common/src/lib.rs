//! Shared foundation types for drover.
//!
//! This crate holds everything the other drover crates agree on:
//!
//! - Content hashes and node/account identities ([`Hash256`], [`NodeId`])
//! - The ledger-facing data model ([`LedgerHeader`], [`AccountEntry`],
//!   [`Transaction`], [`TransactionSet`]) and the [`LedgerGateway`] trait
//!   through which the consensus layer talks to the ledger subsystem
//! - Node configuration loaded from TOML ([`Config`])
//! - Clock access ([`Clock`], [`SystemClock`], [`VirtualClock`])

mod config;
mod error;
mod ledger;
mod time;
mod tx;
mod types;

pub use config::Config;
pub use error::Error;
pub use ledger::{AccountEntry, LedgerGateway, LedgerHeader};
pub use time::{current_timestamp, Clock, SystemClock, VirtualClock};
pub use tx::{Transaction, TransactionSet};
pub use types::{AccountId, Hash256, NodeId, SlotIndex};

/// Result type for common operations.
pub type Result<T> = std::result::Result<T, Error>;
