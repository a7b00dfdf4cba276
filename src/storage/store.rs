//! Byte storage under a fixed host root directory.
//!
//! The exported filesystem is precisely the subtree under the root: paths
//! map 1:1 to host paths by component-wise join and no metadata file is
//! kept. Operations are serialized per server by a single async mutex; the
//! naming server's path locks provide the cross-server discipline.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::FsPath;
use crate::proto::StorageRef;

/// Chunk size used when pulling a replica from a peer.
const COPY_CHUNK: u64 = 1 << 20;

pub struct LocalStore {
    root: PathBuf,
    gate: Mutex<()>,
}

impl LocalStore {
    /// Opens the root directory, creating it if necessary.
    pub fn open(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root).map_err(Error::io)?;
        let root = root.canonicalize().map_err(Error::io)?;
        Ok(LocalStore { root, gate: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &FsPath) -> PathBuf {
        let mut host = self.root.clone();
        for component in path.components() {
            host.push(component);
        }
        host
    }

    /// Byte length of the regular file at `path`.
    pub async fn size(&self, path: &FsPath) -> Result<u64> {
        let _gate = self.gate.lock().await;
        self.size_unlocked(path).await
    }

    /// Exactly `length` bytes starting at `offset`.
    pub async fn read(&self, path: &FsPath, offset: u64, length: u64) -> Result<Vec<u8>> {
        let _gate = self.gate.lock().await;
        self.read_unlocked(path, offset, length).await
    }

    /// Writes `data` at `offset` into an existing regular file.
    ///
    /// Writing past the current end leaves a gap that reads back as zeros.
    /// Writing within the file overwrites in place and never truncates.
    pub async fn write(&self, path: &FsPath, offset: u64, data: &[u8]) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.write_unlocked(path, offset, data).await
    }

    /// Creates an empty regular file and any missing ancestor directories.
    ///
    /// False if `path` already exists or the host refuses; illegal-argument
    /// for the root.
    pub async fn create(&self, path: &FsPath) -> Result<bool> {
        let _gate = self.gate.lock().await;
        self.create_unlocked(path).await
    }

    /// Deletes a regular file, or a directory with everything below it.
    ///
    /// False if `path` does not exist or the host refuses; illegal-argument
    /// for the root.
    pub async fn delete(&self, path: &FsPath) -> Result<bool> {
        let _gate = self.gate.lock().await;
        self.delete_unlocked(path).await
    }

    /// Replaces any local copy of `path` with the bytes `source` holds.
    ///
    /// Orchestrated through the per-operation gate rather than under one
    /// hold: the gate must not be held across calls to the peer, or two
    /// servers copying toward each other would block on each other's gates.
    /// Atomicity against conflicting commands comes from the naming server's
    /// path locks.
    pub async fn copy(&self, path: &FsPath, source: &StorageRef) -> Result<bool> {
        let peer = source.client();
        let total = peer.size(path).await?;
        if self.host_exists(path).await? {
            self.delete(path).await?;
        }
        if !self.create(path).await? {
            return Ok(false);
        }
        let mut offset = 0;
        while offset < total {
            let length = COPY_CHUNK.min(total - offset);
            let data = peer.read(path, offset, length).await?;
            self.write(path, offset, &data).await?;
            offset += length;
        }
        debug!(%path, from = %source.client_addr, bytes = total, "replica copied");
        Ok(true)
    }

    /// One path per regular file under the root.
    ///
    /// Host entries that cannot be expressed as filesystem paths (non-UTF-8
    /// names, names containing `:`) cannot be served and are skipped with a
    /// warning.
    pub fn scan(&self) -> Result<Vec<FsPath>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(Error::io)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).map_err(Error::io)?;
            match host_to_path(rel) {
                Ok(path) => files.push(path),
                Err(err) => {
                    warn!(entry = %entry.path().display(), %err, "skipping unservable entry")
                }
            }
        }
        Ok(files)
    }

    /// Deletes a duplicate reported at registration and prunes now-empty
    /// ancestor directories, stopping before the root.
    pub fn purge(&self, path: &FsPath) {
        let host = self.resolve(path);
        if let Err(err) = std::fs::remove_file(&host) {
            warn!(%path, %err, "duplicate was already gone");
        }
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current.is_root() {
                break;
            }
            if std::fs::remove_dir(self.resolve(&current)).is_err() {
                break; // not empty, stop pruning
            }
            dir = current.parent();
        }
    }

    async fn host_exists(&self, path: &FsPath) -> Result<bool> {
        fs::try_exists(self.resolve(path)).await.map_err(Error::io)
    }

    async fn size_unlocked(&self, path: &FsPath) -> Result<u64> {
        let meta = fs::metadata(self.resolve(path))
            .await
            .map_err(|_| Error::not_found(format!("{path} is not a file on this server")))?;
        if !meta.is_file() {
            return Err(Error::not_found(format!("{path} is not a regular file")));
        }
        Ok(meta.len())
    }

    async fn read_unlocked(&self, path: &FsPath, offset: u64, length: u64) -> Result<Vec<u8>> {
        let size = self.size_unlocked(path).await?;
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::OutOfBounds(format!("offset {offset} + {length} overflows")))?;
        if end > size {
            return Err(Error::OutOfBounds(format!(
                "read of {length} bytes at offset {offset} exceeds the {size} bytes of {path}"
            )));
        }
        let mut file = File::open(self.resolve(path)).await.map_err(Error::io)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(Error::io)?;
        let mut data = vec![0u8; length as usize];
        file.read_exact(&mut data).await.map_err(Error::io)?;
        Ok(data)
    }

    async fn write_unlocked(&self, path: &FsPath, offset: u64, data: &[u8]) -> Result<()> {
        // Only files create() has materialized are writable; write never
        // creates.
        self.size_unlocked(path).await?;
        let mut file =
            OpenOptions::new().write(true).open(self.resolve(path)).await.map_err(Error::io)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(Error::io)?;
        file.write_all(data).await.map_err(Error::io)?;
        file.flush().await.map_err(Error::io)?;
        Ok(())
    }

    async fn create_unlocked(&self, path: &FsPath) -> Result<bool> {
        if path.is_root() {
            return Err(Error::bad_argument("the root directory cannot be created as a file"));
        }
        let host = self.resolve(path);
        if fs::try_exists(&host).await.map_err(Error::io)? {
            return Ok(false);
        }
        if let Some(parent) = host.parent() {
            if let Err(err) = fs::create_dir_all(parent).await {
                warn!(%path, %err, "ancestor creation failed");
                return Ok(false);
            }
        }
        match File::create(&host).await {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(%path, %err, "create failed");
                Ok(false)
            }
        }
    }

    async fn delete_unlocked(&self, path: &FsPath) -> Result<bool> {
        if path.is_root() {
            return Err(Error::bad_argument("the storage root cannot be deleted"));
        }
        let host = self.resolve(path);
        let meta = match fs::symlink_metadata(&host).await {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&host).await
        } else {
            fs::remove_file(&host).await
        };
        match removed {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(%path, %err, "delete failed");
                Ok(false)
            }
        }
    }
}

fn host_to_path(rel: &Path) -> Result<FsPath> {
    let mut path = FsPath::root();
    for component in rel.components() {
        let name = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| Error::bad_argument("file name is not valid UTF-8"))?;
        path = path.join(name)?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        _dir: TempDir,
        store: LocalStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("create temp dir");
            let store = LocalStore::open(dir.path().to_path_buf()).expect("open store");
            Fixture { _dir: dir, store }
        }
    }

    fn path(raw: &str) -> FsPath {
        FsPath::parse(raw).expect("valid path")
    }

    #[tokio::test]
    async fn create_makes_missing_ancestors() {
        let fx = Fixture::new();
        assert!(fx.store.create(&path("/a/b/c")).await.expect("create succeeds"));
        assert_eq!(fx.store.size(&path("/a/b/c")).await.expect("size succeeds"), 0);
        // a second create of the same path reports it already there
        assert!(!fx.store.create(&path("/a/b/c")).await.expect("create succeeds"));
    }

    #[tokio::test]
    async fn create_and_delete_refuse_the_root() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.store.create(&FsPath::root()).await,
            Err(Error::IllegalArgument(_))
        ));
        assert!(matches!(
            fx.store.delete(&FsPath::root()).await,
            Err(Error::IllegalArgument(_))
        ));
    }

    #[tokio::test]
    async fn gapped_write_reads_back_zero_filled() {
        let fx = Fixture::new();
        let file = path("/f");
        assert!(fx.store.create(&file).await.expect("create succeeds"));
        fx.store.write(&file, 10, b"data!").await.expect("write succeeds");
        assert_eq!(fx.store.size(&file).await.expect("size succeeds"), 15);
        let contents = fx.store.read(&file, 0, 15).await.expect("read succeeds");
        assert_eq!(&contents[..10], &[0u8; 10]);
        assert_eq!(&contents[10..], b"data!");
    }

    #[tokio::test]
    async fn overwrite_does_not_truncate() {
        let fx = Fixture::new();
        let file = path("/f");
        assert!(fx.store.create(&file).await.expect("create succeeds"));
        fx.store.write(&file, 0, b"longer contents").await.expect("write succeeds");
        fx.store.write(&file, 0, b"short").await.expect("write succeeds");
        assert_eq!(
            fx.store.read(&file, 0, 15).await.expect("read succeeds"),
            b"shortr contents"
        );
    }

    #[tokio::test]
    async fn read_bounds_are_enforced() {
        let fx = Fixture::new();
        let file = path("/f");
        assert!(fx.store.create(&file).await.expect("create succeeds"));
        fx.store.write(&file, 0, b"abc").await.expect("write succeeds");
        assert!(matches!(fx.store.read(&file, 0, 4).await, Err(Error::OutOfBounds(_))));
        assert!(matches!(fx.store.read(&file, 4, 0).await, Err(Error::OutOfBounds(_))));
        assert!(matches!(fx.store.read(&file, u64::MAX, 2).await, Err(Error::OutOfBounds(_))));
        assert_eq!(fx.store.read(&file, 0, 0).await.expect("empty read succeeds"), b"");
        assert_eq!(fx.store.read(&file, 1, 2).await.expect("tail read succeeds"), b"bc");
    }

    #[tokio::test]
    async fn byte_access_requires_a_regular_file() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.store.root().join("d")).expect("create host dir");
        for err in [
            fx.store.size(&path("/missing")).await.expect_err("size fails"),
            fx.store.size(&path("/d")).await.expect_err("size of dir fails"),
            fx.store.read(&path("/missing"), 0, 0).await.expect_err("read fails"),
            fx.store.write(&path("/missing"), 0, b"x").await.expect_err("write fails"),
        ] {
            assert!(matches!(err, Error::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn delete_is_recursive_for_directories() {
        let fx = Fixture::new();
        assert!(fx.store.create(&path("/a/b/c")).await.expect("create succeeds"));
        assert!(fx.store.create(&path("/a/d")).await.expect("create succeeds"));
        assert!(fx.store.delete(&path("/a")).await.expect("delete succeeds"));
        assert!(!fx.store.root().join("a").exists());
        assert!(!fx.store.delete(&path("/a")).await.expect("delete of absent is false"));
    }

    #[tokio::test]
    async fn scan_lists_regular_files_only() {
        let fx = Fixture::new();
        assert!(fx.store.create(&path("/x")).await.expect("create succeeds"));
        assert!(fx.store.create(&path("/sub/y")).await.expect("create succeeds"));
        std::fs::create_dir(fx.store.root().join("empty")).expect("create host dir");
        let mut found = fx.store.scan().expect("scan succeeds");
        found.sort();
        assert_eq!(found, vec![path("/sub/y"), path("/x")]);
    }

    #[tokio::test]
    async fn purge_prunes_empty_ancestors() {
        let fx = Fixture::new();
        assert!(fx.store.create(&path("/a/b/c")).await.expect("create succeeds"));
        assert!(fx.store.create(&path("/a/keep")).await.expect("create succeeds"));
        fx.store.purge(&path("/a/b/c"));
        assert!(!fx.store.root().join("a/b").exists(), "emptied ancestor is pruned");
        assert!(fx.store.root().join("a/keep").exists(), "non-empty ancestor survives");
    }
}
