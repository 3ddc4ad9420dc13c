//! Error types for Herder operations.
//!
//! Recoverable consensus-path failures never surface here; they fold
//! into a `false` validation verdict or a silent drop. These errors
//! cover construction and configuration only.

use thiserror::Error;

/// Errors that can occur while setting up or commanding the Herder.
#[derive(Debug, Error)]
pub enum HerderError {
    /// `bootstrap` was called without `start_new_network` set.
    #[error("bootstrap requires start_new_network")]
    BootstrapDisabled,

    /// The node configuration could not be turned into a Herder
    /// configuration.
    #[error("config error: {0}")]
    Config(#[from] drover_common::Error),
}
