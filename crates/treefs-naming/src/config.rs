//! Naming service configuration.

use serde::{Deserialize, Serialize};

/// How the naming service picks a storage node for a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Uniformly at random among registered nodes.
    #[default]
    Random,
    /// The node currently serving the fewest files.
    FewestFiles,
}

/// Naming service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Placement policy for `create_file`.
    pub placement: Placement,
}

impl NamingConfig {
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}
