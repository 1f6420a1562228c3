//! Local directory access for a storage node.
//!
//! Maps namespace paths beneath the node's root and keeps them there:
//! components such as `..` are refused, and existing paths are
//! canonicalized so a symlink cannot lead outside the root.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use tokio::fs;
use treefs_types::{Path, StorageError, StorageResult};

use crate::constants::COPY_TEMP_MARKER;

/// A storage node's root directory.
#[derive(Debug, Clone)]
pub struct LocalRoot {
    root: PathBuf,
}

impl LocalRoot {
    /// Wrap a root directory.
    ///
    /// The root is canonicalized when it exists (e.g. macOS `/tmp` →
    /// `/private/tmp`) so later prefix checks compare like with like.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.root
    }

    /// Fail with `NotFound` unless the root is an existing directory.
    pub async fn check(&self) -> StorageResult<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::not_found(format!(
                "storage root {} is not a directory",
                self.root.display()
            ))),
            Err(_) => Err(StorageError::not_found(format!(
                "storage root {} does not exist",
                self.root.display()
            ))),
        }
    }

    /// Join `path` onto the root without touching the disk.
    fn join(&self, path: &Path) -> StorageResult<PathBuf> {
        if path.components().any(|c| c == "." || c == "..") {
            return Err(StorageError::invalid_path(format!(
                "{} has a relative component",
                path
            )));
        }
        Ok(path.to_local(&self.root))
    }

    fn ensure_inside(&self, canonical: &std::path::Path, path: &Path) -> StorageResult<()> {
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(StorageError::not_found(format!("{} escapes the storage root", path)))
        }
    }

    /// Resolve an existing regular file.
    pub async fn existing_file(&self, path: &Path) -> StorageResult<PathBuf> {
        let full = self.join(path)?;
        let canonical = dunce::canonicalize(&full).map_err(|_| StorageError::not_found(path))?;
        self.ensure_inside(&canonical, path)?;

        let meta = fs::metadata(&canonical)
            .await
            .map_err(|_| StorageError::not_found(path))?;
        if !meta.is_file() {
            return Err(StorageError::not_found(format!("{} is not a regular file", path)));
        }
        Ok(canonical)
    }

    /// Resolve a path that may not exist yet.
    ///
    /// The nearest existing ancestor must lie inside the root.
    pub async fn creatable(&self, path: &Path) -> StorageResult<PathBuf> {
        let full = self.join(path)?;
        let mut probe = full.as_path();
        loop {
            if fs::symlink_metadata(probe).await.is_ok() {
                let canonical = dunce::canonicalize(probe)?;
                self.ensure_inside(&canonical, path)?;
                return Ok(full);
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => return Ok(full),
            }
        }
    }

    /// Every regular file beneath the root, as sorted namespace paths.
    ///
    /// Entries whose names cannot be namespace components are skipped.
    pub async fn scan_files(&self) -> StorageResult<Vec<Path>> {
        self.check().await?;
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            walk(&root, &Path::root(), &mut files)?;
            Ok::<_, io::Error>(files)
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))??;

        let mut files = files;
        files.sort();
        Ok(files)
    }

    /// Remove directories left empty by deleting `removed`, deepest first.
    ///
    /// Never removes the root. Returns how many directories went away.
    pub async fn prune_empty_ancestors(&self, removed: &[Path]) -> usize {
        let candidates: BTreeSet<Path> = removed
            .iter()
            .flat_map(|p| p.ancestors())
            .filter(|a| !a.is_root())
            .collect();

        let mut pruned = 0;
        // Reverse path order visits children before their parents.
        for dir in candidates.iter().rev() {
            let Ok(full) = self.join(dir) else {
                continue;
            };
            if fs::remove_dir(&full).await.is_ok() {
                tracing::debug!("Pruned empty directory {}", dir);
                pruned += 1;
            }
        }
        pruned
    }
}

/// List every regular file beneath `root` as sorted namespace paths.
pub async fn scan_files(root: impl Into<PathBuf>) -> StorageResult<Vec<Path>> {
    LocalRoot::new(root).scan_files().await
}

fn walk(dir: &std::path::Path, at: &Path, out: &mut Vec<Path>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| n.contains(COPY_TEMP_MARKER)) {
            tracing::debug!("Skipping unfinished copy {}", entry.path().display());
            continue;
        }
        let Some(child) = name.to_str().and_then(|n| at.join(n).ok()) else {
            tracing::warn!(
                "Skipping {}: not a valid path component",
                entry.path().display()
            );
            continue;
        };

        if file_type.is_dir() {
            walk(&entry.path(), &child, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

/// Remove a directory tree, attempting every entry.
///
/// Returns true only if everything, including `dir` itself, was removed.
pub(crate) fn remove_tree(dir: &std::path::Path) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot list {}: {}", dir.display(), e);
            return false;
        }
    };

    let mut complete = true;
    for entry in entries {
        let Ok(entry) = entry else {
            complete = false;
            continue;
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let removed = if is_dir {
            remove_tree(&path)
        } else {
            match std::fs::remove_file(&path) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Cannot remove {}: {}", path.display(), e);
                    false
                }
            }
        };
        complete &= removed;
    }

    if !complete {
        return false;
    }
    match std::fs::remove_dir(dir) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Cannot remove {}: {}", dir.display(), e);
            false
        }
    }
}
