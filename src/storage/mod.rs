//! The storage server: a [`store::LocalStore`] plus its two wire
//! interfaces.
//!
//! Startup follows the registration handshake: bind both listeners on
//! ephemeral ports, scan the root, advertise everything to the naming
//! server, then delete the duplicates it reports before serving traffic.

pub mod store;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::proto::{frame, Reply, StorageClientRequest, StorageCommandRequest, StorageRef};
use crate::stub::RegistrationStub;

use self::store::LocalStore;

pub struct StorageServer {
    store: Arc<LocalStore>,
    local: StorageRef,
    tasks: Vec<JoinHandle<()>>,
}

impl StorageServer {
    /// Starts a storage server rooted at `root`, advertising `advertise` as
    /// its host address, registering against the naming server at `naming`.
    pub async fn start(
        root: PathBuf,
        advertise: IpAddr,
        naming: SocketAddr,
    ) -> Result<StorageServer> {
        let store = Arc::new(LocalStore::open(root)?);
        let client_listener = TcpListener::bind((advertise, 0)).await.map_err(Error::io)?;
        let command_listener = TcpListener::bind((advertise, 0)).await.map_err(Error::io)?;
        let local = StorageRef {
            client_addr: client_listener.local_addr().map_err(Error::io)?,
            command_addr: command_listener.local_addr().map_err(Error::io)?,
        };
        let files = store.scan()?;
        let duplicates = RegistrationStub::new(naming).register(local, files).await?;
        for path in &duplicates {
            store.purge(path);
        }
        info!(
            client = %local.client_addr,
            command = %local.command_addr,
            root = %store.root().display(),
            pruned = duplicates.len(),
            "storage server registered"
        );
        let tasks = vec![
            tokio::spawn(accept_clients(Arc::clone(&store), client_listener)),
            tokio::spawn(accept_commands(Arc::clone(&store), command_listener)),
        ];
        Ok(StorageServer { store, local, tasks })
    }

    /// The replica reference this server advertised at registration.
    pub fn local(&self) -> StorageRef {
        self.local
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

impl Drop for StorageServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn accept_clients(store: Arc<LocalStore>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((socket, _)) => {
                let store = Arc::clone(&store);
                tokio::spawn(async move { serve_client(store, socket).await });
            }
            Err(err) => warn!(%err, "client accept failed"),
        }
    }
}

async fn accept_commands(store: Arc<LocalStore>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((socket, _)) => {
                let store = Arc::clone(&store);
                tokio::spawn(async move { serve_command(store, socket).await });
            }
            Err(err) => warn!(%err, "command accept failed"),
        }
    }
}

async fn serve_client(store: Arc<LocalStore>, mut socket: TcpStream) {
    loop {
        let request: StorageClientRequest = match frame::recv(&mut socket).await {
            Ok(request) => request,
            Err(_) => break,
        };
        let sent = match request {
            StorageClientRequest::Size { path } => {
                respond(&mut socket, &store.size(&path).await).await
            }
            StorageClientRequest::Read { path, offset, length } => {
                respond(&mut socket, &store.read(&path, offset, length).await).await
            }
            StorageClientRequest::Write { path, offset, data } => {
                respond(&mut socket, &store.write(&path, offset, &data).await).await
            }
        };
        if !sent {
            break;
        }
    }
}

async fn serve_command(store: Arc<LocalStore>, mut socket: TcpStream) {
    loop {
        let request: StorageCommandRequest = match frame::recv(&mut socket).await {
            Ok(request) => request,
            Err(_) => break,
        };
        let sent = match request {
            StorageCommandRequest::Create { path } => {
                respond(&mut socket, &store.create(&path).await).await
            }
            StorageCommandRequest::Delete { path } => {
                respond(&mut socket, &store.delete(&path).await).await
            }
            StorageCommandRequest::Copy { path, source } => {
                respond(&mut socket, &store.copy(&path, &source).await).await
            }
        };
        if !sent {
            break;
        }
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
