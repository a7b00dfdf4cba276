//! The naming server: directory-tree metadata, path locking and storage
//! registration for the herdfs filesystem.
//!
//! Clients consult the service interface for structure and lookup; storage
//! servers call the registration interface once at startup. All tree
//! consistency flows through [`lock::PathLocks`]: every operation acquires
//! its path chain before touching [`tree::DirectoryTree`], and outbound
//! storage commands are issued while the chain is held.

pub mod gateway;
pub mod lock;
pub mod registry;
pub mod tree;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use rand::thread_rng;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::path::FsPath;
use crate::proto::{frame, RegistrationRequest, Reply, ServiceRequest, StorageRef};

use self::gateway::{RemoteStorage, StorageGateway};
use self::lock::{Mode, PathGuard, PathLocks};
use self::registry::Registry;
use self::tree::DirectoryTree;

pub struct NamingServer {
    tree: Mutex<DirectoryTree>,
    locks: PathLocks,
    registry: Mutex<Registry>,
    /// Locks taken through the client-visible lock operation, parked here
    /// until the matching unlock arrives.
    held: Mutex<HashMap<FsPath, Vec<(Mode, PathGuard)>>>,
    gateway: Arc<dyn StorageGateway>,
    replication_threshold: u32,
    started: AtomicBool,
}

impl NamingServer {
    /// A naming server talking to real storage servers over TCP.
    pub fn new(replication_threshold: u32) -> Arc<Self> {
        Self::with_gateway(replication_threshold, Arc::new(RemoteStorage))
    }

    /// A naming server with a custom storage gateway.
    pub fn with_gateway(
        replication_threshold: u32,
        gateway: Arc<dyn StorageGateway>,
    ) -> Arc<Self> {
        Arc::new(NamingServer {
            tree: Mutex::new(DirectoryTree::new()),
            locks: PathLocks::new(),
            registry: Mutex::new(Registry::new()),
            held: Mutex::new(HashMap::new()),
            gateway,
            replication_threshold,
            started: AtomicBool::new(false),
        })
    }

    /// Binds the service and registration listeners and begins serving.
    ///
    /// May be called at most once; a failure to bind either listener is
    /// fatal. Returns the bound addresses (useful when binding port 0).
    pub async fn start(
        self: &Arc<Self>,
        service_addr: SocketAddr,
        registration_addr: SocketAddr,
    ) -> Result<(SocketAddr, SocketAddr)> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::bad_state("naming server already started"));
        }
        let service = TcpListener::bind(service_addr).await.map_err(Error::io)?;
        let registration = TcpListener::bind(registration_addr).await.map_err(Error::io)?;
        let bound =
            (service.local_addr().map_err(Error::io)?, registration.local_addr().map_err(Error::io)?);
        tokio::spawn(Arc::clone(self).accept_service(service));
        tokio::spawn(Arc::clone(self).accept_registration(registration));
        info!(service = %bound.0, registration = %bound.1, "naming server listening");
        Ok(bound)
    }

    // ------------------------------------------------------------------
    // Service operations.

    /// True iff `path` refers to a directory.
    pub async fn is_directory(self: &Arc<Self>, path: &FsPath) -> Result<bool> {
        let _chain = self.lock_tracked(path, Mode::Shared).await;
        self.tree().is_directory(path)
    }

    /// The names of the immediate children of a directory.
    pub async fn list(self: &Arc<Self>, path: &FsPath) -> Result<Vec<String>> {
        let _chain = self.lock_tracked(path, Mode::Shared).await;
        self.tree().children(path)
    }

    /// Creates an empty file on one randomly chosen storage server and
    /// records it in the tree. False if `path` already exists.
    pub async fn create_file(self: &Arc<Self>, path: &FsPath) -> Result<bool> {
        let Some(parent) = path.parent() else {
            // The root always exists; there is nothing to create.
            return Ok(false);
        };
        let _chain = self.lock_tracked(&parent, Mode::Exclusive).await;
        {
            let tree = self.tree();
            if !tree.is_directory(&parent)? {
                return Err(Error::not_found(format!("{parent} is not a directory")));
            }
            if tree.exists(path) {
                return Ok(false);
            }
        }
        let target = self.registry().pick(&mut thread_rng())?;
        // Materialize on storage before touching the tree, so a storage or
        // transport failure leaves no mutation to roll back.
        if !self.gateway.create(&target, path).await? {
            return Ok(false);
        }
        self.tree().insert_file(path, target)?;
        debug!(%path, on = %target.command_addr, "file created");
        Ok(true)
    }

    /// Records a new empty directory. False if `path` already exists.
    pub async fn create_directory(self: &Arc<Self>, path: &FsPath) -> Result<bool> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };
        let _chain = self.lock_tracked(&parent, Mode::Exclusive).await;
        let mut tree = self.tree();
        if !tree.is_directory(&parent)? {
            return Err(Error::not_found(format!("{parent} is not a directory")));
        }
        if tree.exists(path) {
            return Ok(false);
        }
        tree.insert_directory(path)?;
        Ok(true)
    }

    /// Deletes `path` (recursively for directories) from every replica and
    /// from the tree.
    ///
    /// All-or-nothing from the client's view: a transport failure aborts the
    /// operation, and if any replica refuses its delete the tree is left
    /// unmutated and false is returned.
    pub async fn delete(self: &Arc<Self>, path: &FsPath) -> Result<bool> {
        if path.is_root() {
            return Err(Error::bad_argument("the root directory cannot be deleted"));
        }
        let _chain = self.lock_tracked(path, Mode::Exclusive).await;
        if !self.tree().exists(path) {
            return Err(Error::not_found(format!("{path} is not in the tree")));
        }
        let victims = self.tree().files_under(path);
        let calls = victims.iter().flat_map(|(file, replicas)| {
            replicas.iter().map(move |server| async move {
                (file, server, self.gateway.delete(server, file).await)
            })
        });
        let mut clean = true;
        for (file, server, outcome) in join_all(calls).await {
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    warn!(%file, on = %server.command_addr, "replica refused delete");
                    clean = false;
                }
                Err(err) => {
                    warn!(%file, on = %server.command_addr, %err, "replica delete failed");
                    return Err(err);
                }
            }
        }
        if !clean {
            return Ok(false);
        }
        self.tree().remove(path)?;
        Ok(true)
    }

    /// A storage server holding `path`, chosen uniformly at random.
    pub async fn get_storage(self: &Arc<Self>, path: &FsPath) -> Result<StorageRef> {
        let _chain = self.lock_tracked(path, Mode::Shared).await;
        self.tree().pick_replica(path, &mut thread_rng())
    }

    /// Client-visible lock; parked until the matching unlock.
    ///
    /// Fails not-found unless `path` is in the tree at lock time.
    pub async fn lock(self: &Arc<Self>, path: &FsPath, exclusive: bool) -> Result<()> {
        let mode = if exclusive { Mode::Exclusive } else { Mode::Shared };
        let chain = self.lock_tracked(path, mode).await;
        if !self.tree().exists(path) {
            drop(chain);
            return Err(Error::not_found(format!("{path} is not in the tree")));
        }
        self.held().entry(path.clone()).or_default().push((mode, chain));
        Ok(())
    }

    /// Releases one parked lock of the given mode on `path`.
    pub fn unlock(&self, path: &FsPath, exclusive: bool) -> Result<()> {
        let mode = if exclusive { Mode::Exclusive } else { Mode::Shared };
        let mut held = self.held();
        let Some(entries) = held.get_mut(path) else {
            return Err(Error::bad_argument(format!("{path} is not locked")));
        };
        let Some(at) = entries.iter().position(|(parked, _)| *parked == mode) else {
            return Err(Error::bad_argument(format!("{path} is not locked in that mode")));
        };
        entries.swap_remove(at);
        if entries.is_empty() {
            held.remove(path);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registration.

    /// Admits a storage server and merges its advertised files into the
    /// tree. Returns the paths the server must delete locally: everything
    /// already claimed in the tree, whichever kind of node claimed it.
    pub async fn register(
        self: &Arc<Self>,
        server: StorageRef,
        files: Vec<FsPath>,
    ) -> Result<Vec<FsPath>> {
        self.registry().register(server)?;
        info!(
            client = %server.client_addr,
            command = %server.command_addr,
            files = files.len(),
            "storage server registered"
        );
        let mut duplicates = Vec::new();
        for path in files {
            let Some(parent) = path.parent() else {
                continue; // the root itself is never a file
            };
            // Exclusive on the advertised path, shared on the ancestors it
            // traverses; sibling registrations only share the ancestors'
            // shared locks.
            let _chain = self.locks.lock(&path, Mode::Exclusive).await;
            let mut tree = self.tree();
            if tree.exists(&path) || tree.ensure_directory(&parent).is_err() {
                duplicates.push(path);
                continue;
            }
            tree.insert_file(&path, server)?;
        }
        debug!(duplicates = duplicates.len(), "registration merge complete");
        Ok(duplicates)
    }

    // ------------------------------------------------------------------
    // Lock accounting.

    /// Acquires the path chain and applies file access accounting: shared
    /// acquisitions feed the replication counter, exclusive acquisitions
    /// demote the file to its primary replica.
    async fn lock_tracked(self: &Arc<Self>, path: &FsPath, mode: Mode) -> PathGuard {
        let chain = self.locks.lock(path, mode).await;
        match mode {
            Mode::Shared => self.note_shared_access(path),
            Mode::Exclusive => self.demote_replicas(path).await,
        }
        chain
    }

    /// Bumps the access counter; past the threshold, schedules an
    /// asynchronous copy onto a server not yet holding the file. The counter
    /// only resets when a copy is actually scheduled, so a system that gains
    /// its second storage server later still replicates promptly.
    fn note_shared_access(self: &Arc<Self>, path: &FsPath) {
        let due = match self.tree().record_access(path) {
            Ok(hits) => hits >= self.replication_threshold,
            Err(_) => return, // not a file
        };
        if !due {
            return;
        }
        let candidate = {
            let tree = self.tree();
            let registry = self.registry();
            match tree.replicas(path) {
                Ok(replicas) => registry.pick_other(&replicas, &mut thread_rng()).is_some(),
                Err(_) => false,
            }
        };
        if !candidate {
            return;
        }
        self.tree().reset_access(path);
        let server = Arc::clone(self);
        let path = path.clone();
        tokio::spawn(async move { server.replicate(path).await });
    }

    /// Copies `path` onto one more storage server and extends its replica
    /// set. Runs in its own task under a fresh shared lock.
    async fn replicate(self: Arc<Self>, path: FsPath) {
        let _chain = self.locks.lock(&path, Mode::Shared).await;
        let (source, target) = {
            let tree = self.tree();
            let registry = self.registry();
            let Ok(replicas) = tree.replicas(&path) else {
                return; // deleted in the meantime
            };
            let Some(source) = replicas.first().copied() else {
                return;
            };
            let Some(target) = registry.pick_other(&replicas, &mut thread_rng()) else {
                return;
            };
            (source, target)
        };
        match self.gateway.copy(&target, &path, &source).await {
            Ok(true) => {
                if self.tree().add_replica(&path, target).is_ok() {
                    info!(%path, to = %target.command_addr, "file replicated");
                }
            }
            Ok(false) => warn!(%path, to = %target.command_addr, "replication copy refused"),
            Err(err) => warn!(%path, to = %target.command_addr, %err, "replication copy failed"),
        }
    }

    /// On an exclusive file lock, shrinks the replica set to the primary and
    /// tells the other servers to drop their copies. A replica that cannot
    /// be reached is dropped from the set anyway; its stray bytes are
    /// reclaimed by registration dedup if the server ever comes back.
    async fn demote_replicas(&self, path: &FsPath) {
        let Ok(extras) = self.tree().demote_to_primary(path) else {
            return; // not a file
        };
        if extras.is_empty() {
            return;
        }
        let deletes = extras.iter().map(|server| self.gateway.delete(server, path));
        for (server, outcome) in extras.iter().zip(join_all(deletes).await) {
            match outcome {
                Ok(true) => {}
                Ok(false) => warn!(%path, on = %server.command_addr, "stale replica refused delete"),
                Err(err) => warn!(%path, on = %server.command_addr, %err, "stale replica delete failed"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Wire plumbing.

    async fn accept_service(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move { server.serve_service(socket).await });
                }
                Err(err) => warn!(%err, "service accept failed"),
            }
        }
    }

    async fn accept_registration(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move { server.serve_registration(socket).await });
                }
                Err(err) => warn!(%err, "registration accept failed"),
            }
        }
    }

    async fn serve_service(self: Arc<Self>, mut socket: TcpStream) {
        loop {
            let request: ServiceRequest = match frame::recv(&mut socket).await {
                Ok(request) => request,
                Err(_) => break, // peer hung up
            };
            let sent = match request {
                ServiceRequest::IsDirectory { path } => {
                    respond(&mut socket, &self.is_directory(&path).await).await
                }
                ServiceRequest::List { path } => respond(&mut socket, &self.list(&path).await).await,
                ServiceRequest::CreateFile { path } => {
                    respond(&mut socket, &self.create_file(&path).await).await
                }
                ServiceRequest::CreateDirectory { path } => {
                    respond(&mut socket, &self.create_directory(&path).await).await
                }
                ServiceRequest::Delete { path } => {
                    respond(&mut socket, &self.delete(&path).await).await
                }
                ServiceRequest::GetStorage { path } => {
                    respond(&mut socket, &self.get_storage(&path).await).await
                }
                ServiceRequest::Lock { path, exclusive } => {
                    respond(&mut socket, &self.lock(&path, exclusive).await).await
                }
                ServiceRequest::Unlock { path, exclusive } => {
                    respond(&mut socket, &self.unlock(&path, exclusive)).await
                }
            };
            if !sent {
                break;
            }
        }
    }

    async fn serve_registration(self: Arc<Self>, mut socket: TcpStream) {
        loop {
            let request: RegistrationRequest = match frame::recv(&mut socket).await {
                Ok(request) => request,
                Err(_) => break,
            };
            let RegistrationRequest::Register { server, files } = request;
            if !respond(&mut socket, &self.register(server, files).await).await {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Interior state access, recovering from poisoning.

    fn tree(&self) -> MutexGuard<'_, DirectoryTree> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn held(&self) -> MutexGuard<'_, HashMap<FsPath, Vec<(Mode, PathGuard)>>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn respond<T: serde::Serialize>(socket: &mut TcpStream, reply: &Reply<T>) -> bool {
    match frame::send(socket, reply).await {
        Ok(()) => true,
        Err(err) => {
            debug!(%err, "reply dropped");
            false
        }
    }
}
