//! The naming server's outbound seam to storage-server command interfaces.

use async_trait::async_trait;

use crate::error::Result;
use crate::path::FsPath;
use crate::proto::StorageRef;

/// Storage commands issued by the naming server while it holds path locks.
///
/// Implementations must never call back into the naming server: the caller
/// is inside the lock manager, and a re-entrant service call would deadlock.
#[async_trait]
pub trait StorageGateway: Send + Sync + 'static {
    async fn create(&self, on: &StorageRef, path: &FsPath) -> Result<bool>;

    async fn delete(&self, on: &StorageRef, path: &FsPath) -> Result<bool>;

    async fn copy(&self, on: &StorageRef, path: &FsPath, source: &StorageRef) -> Result<bool>;
}

/// Gateway over the real command stubs.
#[derive(Debug, Default)]
pub struct RemoteStorage;

#[async_trait]
impl StorageGateway for RemoteStorage {
    async fn create(&self, on: &StorageRef, path: &FsPath) -> Result<bool> {
        on.command().create(path).await
    }

    async fn delete(&self, on: &StorageRef, path: &FsPath) -> Result<bool> {
        on.command().delete(path).await
    }

    async fn copy(&self, on: &StorageRef, path: &FsPath, source: &StorageRef) -> Result<bool> {
        on.command().copy(path, *source).await
    }
}
