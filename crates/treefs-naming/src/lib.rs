//! # treefs-naming
//!
//! The naming service owns the logical directory tree of a treefs cluster
//! and maps every file to the storage node that holds its bytes.
//!
//! - [`Namespace`] - directory/file sets and the path → node binding
//! - [`LockTable`] - hierarchical shared/exclusive path locks
//! - [`Registry`] - registered storage nodes and placement
//! - [`NamingService`] - the client and registration surfaces

pub mod config;
pub mod lock_table;
pub mod namespace;
pub mod registry;
pub mod service;

pub use config::{NamingConfig, Placement};
pub use lock_table::{LockMode, LockState, LockTable, PathGuard};
pub use namespace::{EntryKind, Namespace};
pub use registry::{NodeRecord, Registry};
pub use service::NamingService;
