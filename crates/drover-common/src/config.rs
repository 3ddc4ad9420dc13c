//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::NodeId;
use crate::Error;

/// Node configuration, loaded from a TOML file.
///
/// `validation_key` and the quorum set entries are hex-encoded 32-byte
/// identities; use [`Config::node_id`] and [`Config::quorum_validators`]
/// to get them in decoded form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This node's signing identity, hex encoded.
    pub validation_key: String,

    /// Number of quorum-set validators whose agreement we require.
    #[serde(default)]
    pub quorum_threshold: u32,

    /// Validator identities in our quorum set, hex encoded.
    #[serde(default)]
    pub quorum_set: Vec<String>,

    /// The base fee this node nominates and accepts ballots around.
    #[serde(default = "default_base_fee")]
    pub desired_base_fee: u32,

    /// Whether this node may bootstrap a fresh network.
    #[serde(default)]
    pub start_new_network: bool,
}

fn default_base_fee() -> u32 {
    10
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// This node's decoded identity.
    pub fn node_id(&self) -> Result<NodeId, Error> {
        NodeId::from_hex(&self.validation_key)
    }

    /// The decoded quorum-set validator identities.
    pub fn quorum_validators(&self) -> Result<Vec<NodeId>, Error> {
        self.quorum_set.iter().map(|s| NodeId::from_hex(s)).collect()
    }
}
