//! The naming service.
//!
//! Owns the namespace, the lock table and the storage registry, and serves
//! both the client [`Service`] surface and the storage-node
//! [`Registration`] surface.
//!
//! Every operation takes its locks through the lock table before touching
//! the tree:
//!
//! | operation                      | lock on target |
//! |--------------------------------|----------------|
//! | `is_directory`, `list`, `get_storage` | shared  |
//! | `create_*`, `delete`, `replicate`     | exclusive |
//! | `register`                     | exclusive on every offered path |
//!
//! plus shared locks on every ancestor, as the lock table does for any chain.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use treefs_types::{
    CommandHandle, DeleteFailure, NamingError, NamingResult, NodeId, Path, Registration, Service,
    StorageHandle,
};

use crate::config::NamingConfig;
use crate::lock_table::{LockMode, LockTable};
use crate::namespace::{EntryKind, Namespace};
use crate::registry::{NodeRecord, Registry};

/// The naming service.
pub struct NamingService {
    config: NamingConfig,
    namespace: Namespace,
    locks: Arc<LockTable>,
    registry: Registry,
}

impl std::fmt::Debug for NamingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamingService")
            .field("config", &self.config)
            .field("files", &self.namespace.len())
            .field("nodes", &self.registry.len())
            .field("locks", &self.locks)
            .finish()
    }
}

impl Default for NamingService {
    fn default() -> Self {
        Self::new(NamingConfig::default())
    }
}

impl NamingService {
    pub fn new(config: NamingConfig) -> Self {
        Self {
            config,
            namespace: Namespace::new(),
            locks: Arc::new(LockTable::new()),
            registry: Registry::new(),
        }
    }

    /// Registered storage nodes, sorted by id.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.registry.ids()
    }

    /// The lock table, for diagnostics.
    pub fn locks(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Read-only view of the namespace, without locking.
    ///
    /// For diagnostics and tests; concurrent operations may be mid-flight.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn record(&self, id: &NodeId) -> NamingResult<Arc<NodeRecord>> {
        self.registry
            .get(id)
            .ok_or_else(|| NamingError::not_found(format!("storage node {}", id)))
    }

    /// Copy a file to another node, optionally moving its binding there.
    ///
    /// Without `migrate`, `target` is recorded as a replica holder. With it,
    /// the file is rebound to `target` and deleted from its previous owner;
    /// if that delete fails the previous owner stays on as a holder. Returns
    /// `Ok(false)` when `target` already serves the file.
    #[tracing::instrument(skip_all, fields(path = %path, target = %target), name = "naming.replicate")]
    pub async fn replicate(&self, path: &Path, target: &NodeId, migrate: bool) -> NamingResult<bool> {
        let _guard = self.locks.lock(path, LockMode::Exclusive).await;

        let owner = self
            .namespace
            .owner(path)
            .ok_or_else(|| NamingError::not_found(path))?;
        if &owner == target {
            return Ok(false);
        }
        let source = self.record(&owner)?;
        let destination = self.record(target)?;

        destination.command.copy(path, &source.storage).await?;
        tracing::info!("Copied {} from {} to {}", path, owner, target);

        if !migrate {
            self.namespace.add_replica(path, target.clone());
            return Ok(true);
        }

        self.namespace.rebind(path, target.clone());
        match source.command.delete(path).await {
            Ok(_) => tracing::debug!("Removed migrated {} from {}", path, owner),
            Err(e) => {
                tracing::warn!("Migrated {} but could not remove it from {}: {}", path, owner, e);
                self.namespace.add_replica(path, owner);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Service for NamingService {
    #[tracing::instrument(skip_all, fields(path = %path, exclusive), name = "naming.lock")]
    async fn lock(&self, path: &Path, exclusive: bool) -> NamingResult<()> {
        let guard = self
            .locks
            .lock(path, LockMode::from_exclusive(exclusive))
            .await;
        if !self.namespace.contains(path) {
            return Err(NamingError::not_found(path));
        }
        // Held until the client's matching unlock.
        guard.into_held();
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(path = %path, exclusive), name = "naming.unlock")]
    async fn unlock(&self, path: &Path, exclusive: bool) -> NamingResult<()> {
        let plan = LockTable::plan([(path.clone(), LockMode::from_exclusive(exclusive))]);
        if !self.locks.release_plan(&plan) {
            return Err(NamingError::not_locked(path));
        }
        Ok(())
    }

    async fn is_directory(&self, path: &Path) -> NamingResult<bool> {
        let _guard = self.locks.lock(path, LockMode::Shared).await;
        self.namespace
            .is_directory(path)
            .ok_or_else(|| NamingError::not_found(path))
    }

    async fn list(&self, directory: &Path) -> NamingResult<Vec<String>> {
        let _guard = self.locks.lock(directory, LockMode::Shared).await;
        self.namespace.list(directory)
    }

    #[tracing::instrument(skip_all, fields(path = %path), name = "naming.create_file")]
    async fn create_file(&self, path: &Path) -> NamingResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.locks.lock(path, LockMode::Exclusive).await;

        if !self.namespace.can_create(path)? {
            return Ok(false);
        }
        let node = self
            .registry
            .choose(self.config.placement, |id| self.namespace.file_count(id))
            .ok_or(NamingError::NoStorageNodes)?;

        // The tree is only touched once the node has an empty file.
        if !node.command.create(path).await? {
            tracing::warn!("{} already present on {}, resetting it", path, node.id);
            node.command.delete(path).await?;
            if !node.command.create(path).await? {
                return Err(NamingError::transport(format!(
                    "{} could not be reset on {}",
                    path, node.id
                )));
            }
        }
        self.namespace.insert_file(path, node.id.clone())?;
        tracing::info!("Created {} on {}", path, node.id);
        Ok(true)
    }

    #[tracing::instrument(skip_all, fields(path = %path), name = "naming.create_directory")]
    async fn create_directory(&self, path: &Path) -> NamingResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.locks.lock(path, LockMode::Exclusive).await;
        self.namespace.insert_directory(path)
    }

    #[tracing::instrument(skip_all, fields(path = %path), name = "naming.delete")]
    async fn delete(&self, path: &Path) -> NamingResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.locks.lock(path, LockMode::Exclusive).await;

        if !self.namespace.contains(path) {
            return Err(NamingError::not_found(path));
        }

        // Owners and replica holders alike.
        let holders = self.namespace.subtree_holders(path);
        let deletions = holders.into_iter().map(|(file, holder)| async move {
            let Some(node) = self.registry.get(&holder) else {
                tracing::warn!("{} is held by unknown node {}, dropping it", file, holder);
                return (file, holder, Ok(false));
            };
            let result = node.command.delete(&file).await;
            (file, holder, result)
        });

        let mut failed = Vec::new();
        let mut gone: BTreeMap<Path, BTreeSet<NodeId>> = BTreeMap::new();
        for (file, holder, result) in join_all(deletions).await {
            match result {
                Ok(removed) => {
                    if !removed {
                        tracing::debug!("{} was already gone from {}", file, holder);
                    }
                    gone.entry(file).or_default().insert(holder);
                }
                Err(e) => {
                    tracing::warn!("Remote delete of {} on {} failed: {}", file, holder, e);
                    failed.push(DeleteFailure {
                        path: file,
                        reason: format!("{}: {}", holder, e),
                    });
                }
            }
        }

        let keep: BTreeSet<Path> = failed.iter().map(|f| f.path.clone()).collect();
        for file in &keep {
            if let Some(gone) = gone.get(file) {
                self.namespace.drop_holders(file, gone);
            }
        }
        let removed = self.namespace.remove(path, &keep);
        tracing::info!("Deleted {} ({} entries, {} failed)", path, removed, failed.len());

        if failed.is_empty() {
            Ok(true)
        } else {
            Err(NamingError::PartialDelete {
                path: path.clone(),
                failed,
            })
        }
    }

    async fn get_storage(&self, path: &Path) -> NamingResult<StorageHandle> {
        let _guard = self.locks.lock(path, LockMode::Shared).await;
        match self.namespace.kind(path) {
            Some(EntryKind::File(owner)) => Ok(self.record(&owner)?.storage.clone()),
            _ => Err(NamingError::not_found(path)),
        }
    }
}

#[async_trait]
impl Registration for NamingService {
    #[tracing::instrument(skip(self, storage, command, files), fields(node = %storage.endpoint(), offered = files.len()), name = "naming.register")]
    async fn register(
        &self,
        storage: StorageHandle,
        command: CommandHandle,
        files: Vec<Path>,
    ) -> NamingResult<Vec<Path>> {
        storage.endpoint().validate().map_err(NamingError::Validation)?;
        command.endpoint().validate().map_err(NamingError::Validation)?;

        let record = self.registry.insert(storage, command)?;
        tracing::info!("Registered storage node {}", record.id);

        let offered: BTreeSet<Path> = files.into_iter().filter(|p| !p.is_root()).collect();
        let _guard = self
            .locks
            .lock_many(offered.iter().map(|p| (p.clone(), LockMode::Exclusive)))
            .await;

        let total = offered.len();
        let rejected = self.namespace.admit(&record.id, offered);
        tracing::info!(
            "Node {} contributed {} files, {} duplicates rejected",
            record.id,
            total - rejected.len(),
            rejected.len()
        );
        Ok(rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use parking_lot::Mutex;
    use treefs_types::{Command, Endpoint, Storage, StorageError, StorageResult};

    use crate::config::Placement;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    /// In-memory stand-in for a storage node.
    #[derive(Default)]
    struct FakeNode {
        files: Mutex<HashMap<Path, Vec<u8>>>,
        fail: Mutex<HashSet<Path>>,
        create_delay: Option<Duration>,
        creates: Mutex<Vec<Path>>,
        deletes: Mutex<Vec<Path>>,
    }

    impl FakeNode {
        fn failing_on(self, path: &str) -> Self {
            self.fail.lock().insert(p(path));
            self
        }

        fn has(&self, path: &str) -> bool {
            self.files.lock().contains_key(&p(path))
        }
    }

    #[async_trait]
    impl Storage for FakeNode {
        async fn size(&self, path: &Path) -> StorageResult<u64> {
            self.files
                .lock()
                .get(path)
                .map(|d| d.len() as u64)
                .ok_or_else(|| StorageError::not_found(path))
        }

        async fn read(&self, path: &Path, offset: i64, length: i64) -> StorageResult<Vec<u8>> {
            let files = self.files.lock();
            let data = files.get(path).ok_or_else(|| StorageError::not_found(path))?;
            Ok(data[offset as usize..(offset + length) as usize].to_vec())
        }

        async fn write(&self, path: &Path, _offset: i64, data: &[u8]) -> StorageResult<()> {
            self.files.lock().insert(path.clone(), data.to_vec());
            Ok(())
        }
    }

    #[async_trait]
    impl Command for FakeNode {
        async fn create(&self, path: &Path) -> StorageResult<bool> {
            if let Some(delay) = self.create_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.lock().contains(path) {
                return Err(StorageError::transport("connection reset"));
            }
            self.creates.lock().push(path.clone());
            Ok(self.files.lock().insert(path.clone(), Vec::new()).is_none())
        }

        async fn delete(&self, path: &Path) -> StorageResult<bool> {
            if self.fail.lock().contains(path) {
                return Err(StorageError::transport("connection reset"));
            }
            self.deletes.lock().push(path.clone());
            Ok(self.files.lock().remove(path).is_some())
        }

        async fn copy(&self, path: &Path, source: &StorageHandle) -> StorageResult<bool> {
            let size = source.size(path).await? as i64;
            let data = source.read(path, 0, size).await?;
            self.files.lock().insert(path.clone(), data);
            Ok(true)
        }
    }

    fn handles(port: u16, node: &Arc<FakeNode>) -> (StorageHandle, CommandHandle) {
        (
            StorageHandle::new(Endpoint::new("127.0.0.1", port), node.clone()),
            CommandHandle::new(Endpoint::new("127.0.0.1", port + 1), node.clone()),
        )
    }

    async fn register(
        naming: &NamingService,
        port: u16,
        node: &Arc<FakeNode>,
        files: &[&str],
    ) -> Vec<Path> {
        let (s, c) = handles(port, node);
        naming
            .register(s, c, files.iter().map(|f| p(f)).collect())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_makes_files_visible() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default());
        let rejected = register(&naming, 7000, &node, &["/a/b", "/a/c", "/d"]).await;
        assert!(rejected.is_empty());

        assert_eq!(naming.list(&Path::root()).await.unwrap(), vec!["a", "d"]);
        assert_eq!(naming.list(&p("/a")).await.unwrap(), vec!["b", "c"]);
        assert!(naming.is_directory(&p("/a")).await.unwrap());
        assert!(!naming.is_directory(&p("/a/b")).await.unwrap());

        let storage = naming.get_storage(&p("/a/c")).await.unwrap();
        assert_eq!(storage.endpoint(), &Endpoint::new("127.0.0.1", 7000));
        assert!(naming.locks().is_empty());
    }

    #[tokio::test]
    async fn test_second_node_duplicates_rejected() {
        let naming = NamingService::default();
        let first = Arc::new(FakeNode::default());
        let second = Arc::new(FakeNode::default());
        register(&naming, 7000, &first, &["/shared", "/only-first"]).await;

        let rejected = register(&naming, 7100, &second, &["/shared", "/only-second"]).await;
        assert_eq!(rejected, vec![p("/shared")]);

        let owner = naming.get_storage(&p("/shared")).await.unwrap();
        assert_eq!(owner.endpoint().port(), 7000);
        let owner = naming.get_storage(&p("/only-second")).await.unwrap();
        assert_eq!(owner.endpoint().port(), 7100);
    }

    #[tokio::test]
    async fn test_reregistration_rejected() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default());
        register(&naming, 7000, &node, &[]).await;

        let (s, c) = handles(7000, &node);
        let err = naming.register(s, c, vec![]).await.unwrap_err();
        assert!(matches!(err, NamingError::AlreadyRegistered(_)));

        // A fresh storage endpoint reusing a taken command endpoint
        let s = StorageHandle::new(Endpoint::new("127.0.0.1", 7500), node.clone());
        let c = CommandHandle::new(Endpoint::new("127.0.0.1", 7001), node.clone());
        let err = naming.register(s, c, vec![]).await.unwrap_err();
        assert!(matches!(err, NamingError::AlreadyRegistered(_)));
        assert_eq!(naming.nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_register_validates_endpoints() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default());
        let s = StorageHandle::new(Endpoint::new("", 7000), node.clone());
        let c = CommandHandle::new(Endpoint::new("127.0.0.1", 7001), node.clone());
        let err = naming.register(s, c, vec![p("/a")]).await.unwrap_err();
        assert!(matches!(err, NamingError::Validation(_)));
        assert!(naming.nodes().is_empty());
        assert!(naming.namespace().is_empty());
    }

    #[tokio::test]
    async fn test_create_file_delegates_to_node() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default());
        register(&naming, 7000, &node, &[]).await;

        assert!(naming.create_directory(&p("/docs")).await.unwrap());
        assert!(naming.create_file(&p("/docs/readme")).await.unwrap());
        assert!(node.has("/docs/readme"));
        assert!(!naming.is_directory(&p("/docs/readme")).await.unwrap());

        // Existing paths of either kind
        assert!(!naming.create_file(&p("/docs/readme")).await.unwrap());
        assert!(!naming.create_file(&p("/docs")).await.unwrap());
        assert!(!naming.create_directory(&p("/docs/readme")).await.unwrap());
        assert!(!naming.create_directory(&p("/docs")).await.unwrap());
        assert!(!naming.create_file(&Path::root()).await.unwrap());
        assert_eq!(node.creates.lock().len(), 1);

        assert!(matches!(
            naming.create_file(&p("/missing/file")).await,
            Err(NamingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_file_without_nodes() {
        let naming = NamingService::default();
        assert!(matches!(
            naming.create_file(&p("/a")).await,
            Err(NamingError::NoStorageNodes)
        ));
        assert!(!naming.namespace().contains(&p("/a")));
    }

    #[tokio::test]
    async fn test_create_file_transport_failure_leaves_tree() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default().failing_on("/broken"));
        register(&naming, 7000, &node, &[]).await;

        let err = naming.create_file(&p("/broken")).await.unwrap_err();
        assert!(matches!(err, NamingError::Transport(_)));
        assert!(!naming.namespace().contains(&p("/broken")));
        assert!(naming.locks().is_empty());
    }

    #[tokio::test]
    async fn test_fewest_files_placement() {
        let naming = NamingService::new(NamingConfig::default().with_placement(Placement::FewestFiles));
        let busy = Arc::new(FakeNode::default());
        let idle = Arc::new(FakeNode::default());
        register(&naming, 7000, &busy, &["/x", "/y"]).await;
        register(&naming, 7100, &idle, &[]).await;

        assert!(naming.create_file(&p("/new")).await.unwrap());
        assert!(idle.has("/new"));
        assert!(!busy.has("/new"));
    }

    #[tokio::test]
    async fn test_delete_directory_removes_subtree() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default());
        for f in ["/a/b", "/a/c/d", "/e"] {
            node.files.lock().insert(p(f), Vec::new());
        }
        register(&naming, 7000, &node, &["/a/b", "/a/c/d", "/e"]).await;

        assert!(naming.delete(&p("/a")).await.unwrap());
        let mut deleted = node.deletes.lock().clone();
        deleted.sort();
        assert_eq!(deleted, vec![p("/a/b"), p("/a/c/d")]);

        assert_eq!(naming.list(&Path::root()).await.unwrap(), vec!["e"]);
        assert!(matches!(
            naming.get_storage(&p("/a/b")).await,
            Err(NamingError::NotFound(_))
        ));
        assert!(matches!(
            naming.delete(&p("/a")).await,
            Err(NamingError::NotFound(_))
        ));
        assert!(!naming.delete(&Path::root()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reports_partial_failure() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default().failing_on("/a/stuck"));
        register(&naming, 7000, &node, &["/a/ok", "/a/stuck", "/a/sub/ok"]).await;

        match naming.delete(&p("/a")).await {
            Err(NamingError::PartialDelete { path, failed }) => {
                assert_eq!(path, p("/a"));
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].path, p("/a/stuck"));
            }
            other => panic!("expected partial delete, got {:?}", other),
        }

        // The survivor is still bound and reachable; the rest is gone
        assert_eq!(naming.list(&p("/a")).await.unwrap(), vec!["stuck"]);
        assert!(naming.get_storage(&p("/a/stuck")).await.is_ok());
        assert!(naming.locks().is_empty());
    }

    #[tokio::test]
    async fn test_client_lock_surface() {
        let naming = Arc::new(NamingService::default());
        let node = Arc::new(FakeNode::default());
        register(&naming, 7000, &node, &["/a/b"]).await;

        naming.lock(&p("/a/b"), true).await.unwrap();

        // A reader of the locked file waits for the unlock
        let reader = {
            let naming = Arc::clone(&naming);
            tokio::spawn(async move { naming.get_storage(&p("/a/b")).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        // A sibling is unaffected
        assert!(naming.create_file(&p("/a/c")).await.unwrap());

        // Wrong mode is refused and changes nothing
        assert!(matches!(
            naming.unlock(&p("/a/b"), false).await,
            Err(NamingError::NotLocked(_))
        ));
        naming.unlock(&p("/a/b"), true).await.unwrap();
        reader.await.unwrap().unwrap();

        assert!(matches!(
            naming.unlock(&p("/a/b"), true).await,
            Err(NamingError::NotLocked(_))
        ));
        assert!(matches!(
            naming.lock(&p("/nope"), false).await,
            Err(NamingError::NotFound(_))
        ));
        assert!(naming.locks().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_same_path() {
        let naming = Arc::new(NamingService::default());
        let node = Arc::new(FakeNode {
            create_delay: Some(Duration::from_millis(5)),
            ..FakeNode::default()
        });
        register(&naming, 7000, &node, &[]).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let naming = Arc::clone(&naming);
                tokio::spawn(async move { naming.create_file(&p("/race")).await.unwrap() })
            })
            .collect();
        let results: Vec<bool> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results.iter().filter(|created| **created).count(), 1);
        assert_eq!(node.creates.lock().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_creates_do_not_serialize() {
        let naming = Arc::new(NamingService::default());
        let node = Arc::new(FakeNode {
            create_delay: Some(Duration::from_millis(200)),
            ..FakeNode::default()
        });
        register(&naming, 7000, &node, &[]).await;
        naming.create_directory(&p("/left")).await.unwrap();
        naming.create_directory(&p("/right")).await.unwrap();

        let start = std::time::Instant::now();
        let a = {
            let naming = Arc::clone(&naming);
            tokio::spawn(async move { naming.create_file(&p("/left/f")).await.unwrap() })
        };
        let b = {
            let naming = Arc::clone(&naming);
            tokio::spawn(async move { naming.create_file(&p("/right/f")).await.unwrap() })
        };
        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        // Serialized creates would take at least 400ms
        assert!(start.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_replicate_and_migrate() {
        let naming = NamingService::default();
        let first = Arc::new(FakeNode::default());
        let second = Arc::new(FakeNode::default());
        first.files.lock().insert(p("/data"), b"payload".to_vec());
        register(&naming, 7000, &first, &["/data"]).await;
        register(&naming, 7100, &second, &[]).await;
        let second_id = NodeId::new(Endpoint::new("127.0.0.1", 7100));

        // Replica only: binding unchanged
        assert!(naming.replicate(&p("/data"), &second_id, false).await.unwrap());
        assert_eq!(second.files.lock().get(&p("/data")).unwrap(), b"payload");
        assert_eq!(naming.get_storage(&p("/data")).await.unwrap().endpoint().port(), 7000);

        // Migration moves the binding and removes the old copy
        assert!(naming.replicate(&p("/data"), &second_id, true).await.unwrap());
        assert_eq!(naming.get_storage(&p("/data")).await.unwrap().endpoint().port(), 7100);
        assert!(!first.has("/data"));

        // Already there
        assert!(!naming.replicate(&p("/data"), &second_id, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reaches_replica_holders() {
        let naming = NamingService::new(NamingConfig::default().with_placement(Placement::FewestFiles));
        let first = Arc::new(FakeNode::default());
        let second = Arc::new(FakeNode::default());
        first.files.lock().insert(p("/data/blob"), b"0123456789".to_vec());
        first.files.lock().insert(p("/other"), Vec::new());
        register(&naming, 7000, &first, &["/data/blob", "/other"]).await;
        register(&naming, 7100, &second, &[]).await;
        let second_id = NodeId::new(Endpoint::new("127.0.0.1", 7100));

        naming.replicate(&p("/data/blob"), &second_id, false).await.unwrap();
        assert_eq!(naming.namespace().replicas(&p("/data/blob")), vec![second_id]);

        assert!(naming.delete(&p("/data")).await.unwrap());
        assert!(!first.has("/data/blob"));
        assert!(!second.has("/data/blob"));

        // A new file at the old path starts empty wherever it lands
        naming.create_directory(&p("/data")).await.unwrap();
        assert!(naming.create_file(&p("/data/blob")).await.unwrap());
        let handle = naming.get_storage(&p("/data/blob")).await.unwrap();
        assert_eq!(handle.endpoint().port(), 7100);
        assert_eq!(handle.size(&p("/data/blob")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_file_resets_untracked_content() {
        let naming = NamingService::default();
        let node = Arc::new(FakeNode::default());
        register(&naming, 7000, &node, &[]).await;
        node.files.lock().insert(p("/stale"), b"left over".to_vec());

        assert!(naming.create_file(&p("/stale")).await.unwrap());
        assert_eq!(node.files.lock().get(&p("/stale")).unwrap(), b"");
        assert_eq!(*node.deletes.lock(), vec![p("/stale")]);
        assert_eq!(naming.namespace().replicas(&p("/stale")), Vec::<NodeId>::new());
    }

    #[tokio::test]
    async fn test_failed_migration_cleanup_keeps_old_holder() {
        let naming = NamingService::default();
        let first = Arc::new(FakeNode::default().failing_on("/data"));
        let second = Arc::new(FakeNode::default());
        first.files.lock().insert(p("/data"), b"payload".to_vec());
        register(&naming, 7000, &first, &["/data"]).await;
        register(&naming, 7100, &second, &[]).await;
        let first_id = NodeId::new(Endpoint::new("127.0.0.1", 7000));
        let second_id = NodeId::new(Endpoint::new("127.0.0.1", 7100));

        assert!(naming.replicate(&p("/data"), &second_id, true).await.unwrap());
        assert_eq!(naming.namespace().owner(&p("/data")), Some(second_id));
        assert_eq!(naming.namespace().replicas(&p("/data")), vec![first_id.clone()]);

        // The delete still targets the old holder, and that failure is reported
        match naming.delete(&p("/data")).await {
            Err(NamingError::PartialDelete { failed, .. }) => {
                assert_eq!(failed.len(), 1);
                assert!(failed[0].reason.contains("7000"));
            }
            other => panic!("expected partial delete, got {:?}", other),
        }
        assert!(!second.has("/data"));
        // The surviving copy now serves the file
        assert_eq!(naming.namespace().owner(&p("/data")), Some(first_id));
        assert!(naming.namespace().replicas(&p("/data")).is_empty());
    }
}
