//! Storage node startup errors.

use thiserror::Error;
use treefs_types::{NamingError, StorageError};

/// Why a storage node failed to join the cluster.
#[derive(Debug, Error)]
pub enum StartError {
    /// The local root could not be scanned.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The naming service refused or failed the registration.
    #[error("registration failed: {0}")]
    Registration(#[from] NamingError),
}
