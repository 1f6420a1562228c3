//! # treefs-server
//!
//! Boots a treefs cluster inside one process: the naming service plus each
//! configured storage node, wired together through in-memory handles.

pub mod cluster;
pub mod config;
pub mod constants;

pub use cluster::{Cluster, ListEntry};
pub use config::{ClusterConfig, ConfigError};
