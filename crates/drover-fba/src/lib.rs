//! Boundary types for the federated Byzantine agreement engine.
//!
//! The agreement engine itself lives outside this repository; what lives
//! here is everything the node and the engine must agree on:
//!
//! - The opaque ballot payload ([`Value`]) and its decoded form
//!   ([`LedgerValue`])
//! - Ballots, statements and envelopes exchanged between validators
//! - Quorum sets and their canonical identifiers
//! - The [`FbaDriver`] capability set the engine calls back into, and the
//!   [`Fba`] surface the node drives the engine through
//!
//! The engine is polymorphic over [`FbaDriver`] and nothing else; no
//! other dynamic dispatch crosses this boundary.

mod driver;
mod message;
mod quorum;
mod value;

pub use driver::{Fba, FbaDriver, QuorumSetCallback, ValidationCallback};
pub use message::{Ballot, Envelope, Statement};
pub use quorum::QuorumSet;
pub use value::{LedgerValue, Value, ValueError};
