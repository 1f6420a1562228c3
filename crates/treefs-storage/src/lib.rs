//! # treefs-storage
//!
//! A storage node keeps file bytes in a local directory. It serves byte
//! ranges to clients through the storage surface, accepts create, delete
//! and copy commands from the naming service, and registers its existing
//! files with the naming service on startup.

pub mod config;
pub mod constants;
pub mod error;
pub mod local;
pub mod node;

pub use config::StorageConfig;
pub use constants::{DEFAULT_COPY_CHUNK_SIZE, MAX_IO_LEN};
pub use error::StartError;
pub use local::{LocalRoot, scan_files};
pub use node::{StartReport, StorageNode};
