//! Storage node configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use treefs_types::Endpoint;

use crate::constants::DEFAULT_COPY_CHUNK_SIZE;

/// Settings for one storage node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local directory whose contents the node serves.
    pub root: PathBuf,
    /// Address clients use for the storage surface. Also the node's identity.
    pub storage_endpoint: Endpoint,
    /// Address the naming service uses for the command surface.
    pub command_endpoint: Endpoint,
    #[serde(default = "default_copy_chunk_size")]
    pub copy_chunk_size: usize,
}

fn default_copy_chunk_size() -> usize {
    DEFAULT_COPY_CHUNK_SIZE
}

impl StorageConfig {
    pub fn new(
        root: impl Into<PathBuf>,
        storage_endpoint: Endpoint,
        command_endpoint: Endpoint,
    ) -> Self {
        Self {
            root: root.into(),
            storage_endpoint,
            command_endpoint,
            copy_chunk_size: DEFAULT_COPY_CHUNK_SIZE,
        }
    }

    pub fn with_copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size.max(1);
        self
    }
}
