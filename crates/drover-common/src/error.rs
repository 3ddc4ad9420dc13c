//! Error type shared by the foundation crate.

use thiserror::Error;

/// Errors raised while loading configuration or parsing identities.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error, typically while reading a configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed or is inconsistent.
    #[error("config error: {0}")]
    Config(String),

    /// A hex-encoded identity or hash could not be decoded.
    #[error("invalid hex identity: {0}")]
    InvalidHex(String),
}
