//! Error types shared across the naming service and storage nodes.

use std::io;
use thiserror::Error;

use crate::path::Path;

/// Path construction and navigation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string was empty.
    #[error("path string is empty")]
    Empty,

    /// The path string does not begin with `/`.
    #[error("path does not start with '/': {0}")]
    NotAbsolute(String),

    /// A component is empty or contains a reserved character.
    #[error("invalid path component: {0:?}")]
    InvalidComponent(String),

    /// `parent()` called on the root.
    #[error("the root directory has no parent")]
    RootHasNoParent,

    /// `last()` called on the root.
    #[error("the root directory has no last component")]
    RootHasNoLast,
}

impl PathError {
    /// Create a NotAbsolute error.
    pub fn not_absolute(path: impl Into<String>) -> Self {
        Self::NotAbsolute(path.into())
    }

    /// Create an InvalidComponent error.
    pub fn invalid_component(component: impl Into<String>) -> Self {
        Self::InvalidComponent(component.into())
    }
}

/// Errors from the client-facing storage surface and the command surface.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path missing, or not a regular file.
    #[error("not found: {0}")]
    NotFound(String),

    /// Offset or length outside what the file or a single I/O call allows.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Local path could not be mapped beneath the storage root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The remote call could not complete.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Disk-level failure on the storage node.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create a NotFound error.
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound(path.to_string())
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a Transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;

/// A file that survived a directory delete, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub path: Path,
    pub reason: String,
}

/// Errors from the naming service's client and registration surfaces.
#[derive(Debug, Error)]
pub enum NamingError {
    /// Malformed argument, rejected before any state change.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Path absent, or of the wrong kind.
    #[error("not found: {0}")]
    NotFound(String),

    /// A node with this identity or endpoint is already registered.
    #[error("storage node already registered: {0}")]
    AlreadyRegistered(String),

    /// `unlock` on a path that is not held in the given mode.
    #[error("path is not locked: {0}")]
    NotLocked(String),

    /// File creation with an empty registry.
    #[error("no storage nodes registered")]
    NoStorageNodes,

    /// A call to a storage node failed; its side of the operation is unknown.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A delete removed some of the subtree but not all of it.
    #[error("partial delete of {path}: {} file(s) could not be removed", .failed.len())]
    PartialDelete {
        path: Path,
        failed: Vec<DeleteFailure>,
    },

    /// Path navigation failed.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl NamingError {
    /// Create a Validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound(path.to_string())
    }

    /// Create an AlreadyRegistered error.
    pub fn already_registered(node: impl ToString) -> Self {
        Self::AlreadyRegistered(node.to_string())
    }

    /// Create a NotLocked error.
    pub fn not_locked(path: impl ToString) -> Self {
        Self::NotLocked(path.to_string())
    }

    /// Create a Transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Failures reported by a storage node's command surface become transport
/// failures from the naming service's point of view: the remote side's state
/// is unknown.
impl From<StorageError> for NamingError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Transport(msg) => NamingError::Transport(msg),
            other => NamingError::Transport(other.to_string()),
        }
    }
}

/// Naming result type.
pub type NamingResult<T> = Result<T, NamingError>;
