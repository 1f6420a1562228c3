//! In-process cluster: one naming service and its storage nodes.

use std::sync::Arc;

use treefs_naming::NamingService;
use treefs_storage::{StartError, StartReport, StorageNode};
use treefs_types::{NamingResult, Path, Service};

use crate::config::ClusterConfig;

/// A booted cluster.
#[derive(Debug)]
pub struct Cluster {
    naming: Arc<NamingService>,
    nodes: Vec<Arc<StorageNode>>,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub is_directory: bool,
}

impl Cluster {
    /// Start the naming service, then each storage node in config order.
    ///
    /// Fails on the first node that cannot join; nodes already started stay
    /// registered.
    pub async fn boot(config: ClusterConfig) -> Result<(Self, Vec<StartReport>), StartError> {
        let naming = Arc::new(NamingService::new(config.naming));
        let mut nodes = Vec::with_capacity(config.storage.len());
        let mut reports = Vec::with_capacity(config.storage.len());

        for storage in config.storage {
            let node = Arc::new(StorageNode::new(storage));
            let report = node.start(naming.as_ref()).await?;
            tracing::info!(
                "Storage node {} joined: {} offered, {} rejected, {} pruned",
                node.node_id(),
                report.offered,
                report.rejected.len(),
                report.pruned
            );
            nodes.push(node);
            reports.push(report);
        }

        Ok((Self { naming, nodes }, reports))
    }

    pub fn naming(&self) -> &Arc<NamingService> {
        &self.naming
    }

    pub fn nodes(&self) -> &[Arc<StorageNode>] {
        &self.nodes
    }

    /// The children of `directory`, each tagged as file or directory.
    pub async fn list(&self, directory: &Path) -> NamingResult<Vec<ListEntry>> {
        let names = self.naming.list(directory).await?;
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let child = directory.join(&name)?;
            let is_directory = self.naming.is_directory(&child).await?;
            entries.push(ListEntry { name, is_directory });
        }
        Ok(entries)
    }
}
