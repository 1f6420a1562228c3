//! Remote call surfaces.
//!
//! Four interfaces cross process boundaries:
//!
//! - [`Service`] - clients → naming service (metadata, locking)
//! - [`Registration`] - storage node → naming service (startup handshake)
//! - [`Storage`] - clients → storage node (byte access)
//! - [`Command`] - naming service → storage node (create, delete, copy)
//!
//! A transport implements these with client stubs. Handles pair the stub
//! with the endpoint it was built for, so they can be passed by value in
//! other calls (the naming service hands a [`StorageHandle`] to a client).

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::{Endpoint, NodeId};
use crate::error::{NamingResult, StorageResult};
use crate::path::Path;

/// Client-facing data surface of a storage node.
///
/// Offsets and lengths are signed to match the wire representation; negative
/// values are rejected with `OutOfRange`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Size of a regular file in bytes.
    async fn size(&self, path: &Path) -> StorageResult<u64>;

    /// Read exactly `length` bytes starting at `offset`.
    async fn read(&self, path: &Path, offset: i64, length: i64) -> StorageResult<Vec<u8>>;

    /// Write `data` at `offset`, extending the file if needed.
    async fn write(&self, path: &Path, offset: i64, data: &[u8]) -> StorageResult<()>;
}

/// Naming-service-facing command surface of a storage node.
#[async_trait]
pub trait Command: Send + Sync {
    /// Create an empty file and its ancestors. `false` if it already existed.
    async fn create(&self, path: &Path) -> StorageResult<bool>;

    /// Delete a file or directory tree. `false` if anything was left behind.
    async fn delete(&self, path: &Path) -> StorageResult<bool>;

    /// Replace the local copy of `path` with the content held by `source`.
    async fn copy(&self, path: &Path, source: &StorageHandle) -> StorageResult<bool>;
}

/// Client-facing surface of the naming service.
#[async_trait]
pub trait Service: Send + Sync {
    /// Lock `path` (and share-lock its ancestors). Blocks until granted.
    async fn lock(&self, path: &Path, exclusive: bool) -> NamingResult<()>;

    /// Release a lock previously taken with [`Service::lock`].
    async fn unlock(&self, path: &Path, exclusive: bool) -> NamingResult<()>;

    async fn is_directory(&self, path: &Path) -> NamingResult<bool>;

    /// Names of the immediate children of a directory.
    async fn list(&self, directory: &Path) -> NamingResult<Vec<String>>;

    /// `Ok(false)` if the path already exists.
    async fn create_file(&self, path: &Path) -> NamingResult<bool>;

    /// `Ok(false)` if the path already exists.
    async fn create_directory(&self, path: &Path) -> NamingResult<bool>;

    async fn delete(&self, path: &Path) -> NamingResult<bool>;

    /// The storage node currently serving a file.
    async fn get_storage(&self, path: &Path) -> NamingResult<StorageHandle>;
}

/// Storage-node-facing surface of the naming service.
#[async_trait]
pub trait Registration: Send + Sync {
    /// Join the cluster, offering the node's files.
    ///
    /// Returns the offered paths the node must delete locally because they
    /// collide with the existing namespace.
    async fn register(
        &self,
        storage: StorageHandle,
        command: CommandHandle,
        files: Vec<Path>,
    ) -> NamingResult<Vec<Path>>;
}

macro_rules! impl_handle {
    ($Handle:ident, $Trait:ident) => {
        /// Endpoint plus the stub that reaches it.
        #[derive(Clone)]
        pub struct $Handle {
            endpoint: Endpoint,
            client: Arc<dyn $Trait>,
        }

        impl $Handle {
            pub fn new(endpoint: Endpoint, client: Arc<dyn $Trait>) -> Self {
                Self { endpoint, client }
            }

            /// The advertised endpoint this handle reaches.
            pub fn endpoint(&self) -> &Endpoint {
                &self.endpoint
            }

            /// The underlying stub.
            pub fn client(&self) -> &Arc<dyn $Trait> {
                &self.client
            }
        }

        impl Deref for $Handle {
            type Target = dyn $Trait;

            fn deref(&self) -> &Self::Target {
                self.client.as_ref()
            }
        }

        impl PartialEq for $Handle {
            fn eq(&self, other: &Self) -> bool {
                self.endpoint == other.endpoint
            }
        }

        impl Eq for $Handle {}

        impl fmt::Debug for $Handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($Handle))
                    .field("endpoint", &self.endpoint)
                    .finish()
            }
        }
    };
}

impl_handle!(StorageHandle, Storage);
impl_handle!(CommandHandle, Command);

impl StorageHandle {
    /// Identity of the node behind this handle.
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.endpoint.clone())
    }
}
