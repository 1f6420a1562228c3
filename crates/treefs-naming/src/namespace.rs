//! The namespace tree and the path → storage binding.
//!
//! Directories and files are kept in ordered collections keyed by [`Path`].
//! Because a directory's descendants sort contiguously right after it, a
//! subtree is a single range scan.
//!
//! A file has one owner, the node clients are sent to, and possibly replica
//! holders that keep a copy. Every holder is told when the file is deleted.
//!
//! This type only guards memory. Logical isolation between operations comes
//! from the lock table; every method here is a short synchronous section.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use parking_lot::RwLock;
use treefs_types::{NamingError, NamingResult, NodeId, Path};

/// What a path is in the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File(NodeId),
}

#[derive(Debug)]
struct Tree {
    directories: BTreeSet<Path>,
    files: BTreeMap<Path, NodeId>,
    /// Nodes besides the owner holding a copy. Never empty, never the owner.
    replicas: BTreeMap<Path, BTreeSet<NodeId>>,
}

impl Tree {
    fn contains(&self, path: &Path) -> bool {
        self.directories.contains(path) || self.files.contains_key(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }

    /// Offered paths collide with anything already there, or with a file
    /// standing where one of their ancestor directories would go.
    fn collides(&self, path: &Path) -> bool {
        self.contains(path) || path.ancestors().any(|a| self.files.contains_key(&a))
    }

    /// Require that `path` is a new entry directly under a known directory.
    ///
    /// `Ok(false)` when it already exists.
    fn check_new(&self, path: &Path) -> NamingResult<bool> {
        let parent = path.parent()?;
        if !self.is_directory(&parent) {
            return Err(NamingError::not_found(parent));
        }
        Ok(!self.contains(path))
    }
}

/// Strict descendants of `path` in an ordered collection.
fn descendants<'a, V>(
    map: &'a BTreeMap<Path, V>,
    path: &'a Path,
) -> impl Iterator<Item = (&'a Path, &'a V)> + 'a {
    map.range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
        .take_while(move |(p, _)| p.is_subpath(path))
}

fn descendant_dirs<'a>(
    set: &'a BTreeSet<Path>,
    path: &'a Path,
) -> impl Iterator<Item = &'a Path> + 'a {
    set.range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
        .take_while(move |p| p.is_subpath(path))
}

fn remove_replica(replicas: &mut BTreeMap<Path, BTreeSet<NodeId>>, path: &Path, node: &NodeId) {
    if let Some(set) = replicas.get_mut(path) {
        set.remove(node);
        if set.is_empty() {
            replicas.remove(path);
        }
    }
}

/// The naming service's view of the filesystem.
#[derive(Debug)]
pub struct Namespace {
    tree: RwLock<Tree>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    /// An empty namespace holding only the root directory.
    pub fn new() -> Self {
        let mut directories = BTreeSet::new();
        directories.insert(Path::root());
        Self {
            tree: RwLock::new(Tree {
                directories,
                files: BTreeMap::new(),
                replicas: BTreeMap::new(),
            }),
        }
    }

    pub fn kind(&self, path: &Path) -> Option<EntryKind> {
        let tree = self.tree.read();
        if tree.is_directory(path) {
            return Some(EntryKind::Directory);
        }
        tree.files.get(path).cloned().map(EntryKind::File)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tree.read().contains(path)
    }

    /// `Some(true)` for directories, `Some(false)` for files.
    pub fn is_directory(&self, path: &Path) -> Option<bool> {
        self.kind(path).map(|k| k == EntryKind::Directory)
    }

    /// Immediate child names of a directory, sorted, each listed once.
    pub fn list(&self, directory: &Path) -> NamingResult<Vec<String>> {
        let tree = self.tree.read();
        if !tree.is_directory(directory) {
            return Err(NamingError::not_found(directory));
        }

        let depth = directory.depth() + 1;
        let dirs = descendant_dirs(&tree.directories, directory);
        let files = descendants(&tree.files, directory).map(|(p, _)| p);
        let names: BTreeSet<String> = dirs
            .chain(files)
            .filter(|p| p.depth() == depth)
            .filter_map(|p| p.last().ok().map(str::to_owned))
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Check the preconditions for creating `path` without creating it.
    ///
    /// `Ok(false)` if it already exists (or is the root); `NotFound` if its
    /// parent is not a directory.
    pub fn can_create(&self, path: &Path) -> NamingResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        self.tree.read().check_new(path)
    }

    /// Add a directory. `Ok(false)` if the path already exists.
    pub fn insert_directory(&self, path: &Path) -> NamingResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let mut tree = self.tree.write();
        if !tree.check_new(path)? {
            return Ok(false);
        }
        tree.directories.insert(path.clone());
        Ok(true)
    }

    /// Add a file bound to `node`. `Ok(false)` if the path already exists.
    pub fn insert_file(&self, path: &Path, node: NodeId) -> NamingResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let mut tree = self.tree.write();
        if !tree.check_new(path)? {
            return Ok(false);
        }
        tree.files.insert(path.clone(), node);
        Ok(true)
    }

    /// Fold a registering node's files into the tree.
    ///
    /// Paths are processed in ascending order; the root is ignored. Returns
    /// the paths that collided and were not admitted. Every admitted file has
    /// its missing ancestors materialized as directories and is bound to
    /// `node`.
    pub fn admit<I>(&self, node: &NodeId, offered: I) -> Vec<Path>
    where
        I: IntoIterator<Item = Path>,
    {
        let offered: BTreeSet<Path> = offered.into_iter().filter(|p| !p.is_root()).collect();

        let mut tree = self.tree.write();
        let mut rejected = Vec::new();
        for path in offered {
            if tree.collides(&path) {
                rejected.push(path);
                continue;
            }
            for ancestor in path.ancestors() {
                tree.directories.insert(ancestor);
            }
            tree.files.insert(path, node.clone());
        }
        rejected
    }

    /// The node serving a file.
    pub fn owner(&self, path: &Path) -> Option<NodeId> {
        self.tree.read().files.get(path).cloned()
    }

    /// Point a file at a different node. Returns the previous owner.
    ///
    /// The new owner stops counting as a replica holder.
    pub fn rebind(&self, path: &Path, node: NodeId) -> Option<NodeId> {
        let mut tree = self.tree.write();
        let previous = tree
            .files
            .get_mut(path)
            .map(|owner| std::mem::replace(owner, node.clone()))?;
        remove_replica(&mut tree.replicas, path, &node);
        Some(previous)
    }

    /// Record that `node` holds a copy of a file it does not own.
    ///
    /// False if the file is missing or `node` is its owner.
    pub fn add_replica(&self, path: &Path, node: NodeId) -> bool {
        let mut tree = self.tree.write();
        let foreign = tree.files.get(path).is_some_and(|owner| *owner != node);
        if foreign {
            tree.replicas.entry(path.clone()).or_default().insert(node);
        }
        foreign
    }

    /// Replica holders of a file, sorted. Excludes the owner.
    pub fn replicas(&self, path: &Path) -> Vec<NodeId> {
        self.tree
            .read()
            .replicas
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every (file, holder) pair at or beneath `path`, owner first per file.
    pub fn subtree_holders(&self, path: &Path) -> Vec<(Path, NodeId)> {
        let tree = self.tree.read();
        let own = tree.files.get_key_value(path);
        let mut holders = Vec::new();
        for (file, owner) in own.into_iter().chain(descendants(&tree.files, path)) {
            holders.push((file.clone(), owner.clone()));
            if let Some(replicas) = tree.replicas.get(file) {
                holders.extend(replicas.iter().map(|n| (file.clone(), n.clone())));
            }
        }
        holders
    }

    /// Forget the holders in `gone` for a file that stays in the tree.
    ///
    /// If the owner is among them, a surviving replica takes over.
    pub fn drop_holders(&self, path: &Path, gone: &BTreeSet<NodeId>) {
        let mut tree = self.tree.write();
        for node in gone {
            remove_replica(&mut tree.replicas, path, node);
        }
        let owner_gone = tree.files.get(path).is_some_and(|owner| gone.contains(owner));
        if !owner_gone {
            return;
        }
        let successor = tree
            .replicas
            .get(path)
            .and_then(|set| set.iter().next().cloned());
        if let Some(successor) = successor {
            remove_replica(&mut tree.replicas, path, &successor);
            tree.files.insert(path.clone(), successor);
        }
    }

    /// Remove `path` and its subtree, except the files in `keep` and the
    /// directories needed to reach them.
    ///
    /// The root itself is never removed. Returns the number of entries
    /// removed.
    pub fn remove(&self, path: &Path, keep: &BTreeSet<Path>) -> usize {
        let mut tree = self.tree.write();

        let doomed_files: Vec<Path> = tree
            .files
            .get_key_value(path)
            .map(|(p, _)| p)
            .into_iter()
            .chain(descendants(&tree.files, path).map(|(p, _)| p))
            .filter(|p| !keep.contains(*p))
            .cloned()
            .collect();

        let shelters = |dir: &Path| keep.iter().any(|k| k.is_subpath(dir));
        let doomed_dirs: Vec<Path> = tree
            .directories
            .get(path)
            .into_iter()
            .chain(descendant_dirs(&tree.directories, path))
            .filter(|d| !d.is_root() && !shelters(d))
            .cloned()
            .collect();

        for file in &doomed_files {
            tree.files.remove(file);
            tree.replicas.remove(file);
        }
        for dir in &doomed_dirs {
            tree.directories.remove(dir);
        }
        doomed_files.len() + doomed_dirs.len()
    }

    /// Number of files bound to `node`.
    pub fn file_count(&self, node: &NodeId) -> usize {
        self.tree.read().files.values().filter(|n| *n == node).count()
    }

    /// Total number of files in the namespace.
    pub fn len(&self) -> usize {
        self.tree.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
