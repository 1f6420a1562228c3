//! # treefs-types
//!
//! Foundation types shared by the naming service and storage nodes:
//! hierarchical paths, node identity, error taxonomy, and the four remote
//! call surfaces.

pub mod endpoint;
pub mod error;
pub mod path;
pub mod rpc;

pub use endpoint::{Endpoint, NodeId};
pub use error::{
    DeleteFailure, NamingError, NamingResult, PathError, StorageError, StorageResult,
};
pub use path::{Components, Path};
pub use rpc::{Command, CommandHandle, Registration, Service, Storage, StorageHandle};
