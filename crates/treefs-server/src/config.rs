//! Cluster configuration, loaded from RON.
//!
//! ```ron
//! (
//!     naming: (placement: FewestFiles),
//!     storage: [
//!         (
//!             root: "/srv/treefs/a",
//!             storage_endpoint: "127.0.0.1:7001",
//!             command_endpoint: "127.0.0.1:7002",
//!         ),
//!     ],
//! )
//! ```

use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use treefs_naming::NamingConfig;
use treefs_storage::StorageConfig;

/// Error type for config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A naming service and the storage nodes that join it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub naming: NamingConfig,
    /// Started in order; earlier nodes win duplicate files.
    pub storage: Vec<StorageConfig>,
}

impl ClusterConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<FsPath>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_ron(&text)
    }

    /// Reject settings no node could start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for node in &self.storage {
            node.storage_endpoint
                .validate()
                .and_then(|_| node.command_endpoint.validate())
                .map_err(ConfigError::Invalid)?;
            if node.root.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "storage node {} has an empty root",
                    node.storage_endpoint
                )));
            }
            if node.copy_chunk_size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "storage node {} has a zero copy_chunk_size",
                    node.storage_endpoint
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treefs_naming::Placement;
    use treefs_storage::DEFAULT_COPY_CHUNK_SIZE;

    #[test]
    fn test_parse_cluster() {
        let config = ClusterConfig::from_ron(
            r#"(
                naming: (placement: FewestFiles),
                storage: [
                    (root: "/tmp/a", storage_endpoint: "127.0.0.1:7001", command_endpoint: "127.0.0.1:7002"),
                    (root: "/tmp/b", storage_endpoint: "127.0.0.1:7003", command_endpoint: "127.0.0.1:7004", copy_chunk_size: 4096),
                ],
            )"#,
        )
        .unwrap();

        assert_eq!(config.naming.placement, Placement::FewestFiles);
        assert_eq!(config.storage.len(), 2);
        assert_eq!(config.storage[0].copy_chunk_size, DEFAULT_COPY_CHUNK_SIZE);
        assert_eq!(config.storage[1].copy_chunk_size, 4096);
        assert_eq!(config.storage[1].storage_endpoint.port(), 7003);
    }

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::from_ron("()").unwrap();
        assert_eq!(config.naming.placement, Placement::Random);
        assert!(config.storage.is_empty());
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            ClusterConfig::from_ron("(storage: [(root: \"/x\""),
            Err(ConfigError::Ron(_))
        ));
        assert!(matches!(
            ClusterConfig::from_ron(
                r#"(storage: [(root: "/x", storage_endpoint: "h:1", command_endpoint: "h:2", copy_chunk_size: 0)])"#
            ),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            ClusterConfig::load(dir.path().join("none.ron")).await,
            Err(ConfigError::Io(_))
        ));
    }
}
