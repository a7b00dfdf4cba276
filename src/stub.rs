//! Client stubs for the herdfs wire interfaces.
//!
//! A stub issues one logical call per TCP connection, mirroring the
//! request/reply discipline of the server dispatch loops. Transport failures
//! surface as [`Error::Transport`]; remote failures arrive inside the reply
//! and are returned as-is.

use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::path::FsPath;
use crate::proto::{
    frame, RegistrationRequest, Reply, ServiceRequest, StorageClientRequest, StorageCommandRequest,
    StorageRef,
};

async fn call<Req, T>(addr: SocketAddr, request: &Req) -> Result<T>
where
    Req: Serialize,
    T: DeserializeOwned,
{
    let mut stream = TcpStream::connect(addr).await.map_err(Error::transport)?;
    frame::send(&mut stream, request).await?;
    let reply: Reply<T> = frame::recv(&mut stream).await?;
    reply
}

/// Stub for the naming server's client-facing service interface.
#[derive(Debug, Clone, Copy)]
pub struct ServiceStub {
    addr: SocketAddr,
}

impl ServiceStub {
    pub fn new(addr: SocketAddr) -> Self {
        ServiceStub { addr }
    }

    pub async fn is_directory(&self, path: &FsPath) -> Result<bool> {
        call(self.addr, &ServiceRequest::IsDirectory { path: path.clone() }).await
    }

    pub async fn list(&self, path: &FsPath) -> Result<Vec<String>> {
        call(self.addr, &ServiceRequest::List { path: path.clone() }).await
    }

    pub async fn create_file(&self, path: &FsPath) -> Result<bool> {
        call(self.addr, &ServiceRequest::CreateFile { path: path.clone() }).await
    }

    pub async fn create_directory(&self, path: &FsPath) -> Result<bool> {
        call(self.addr, &ServiceRequest::CreateDirectory { path: path.clone() }).await
    }

    pub async fn delete(&self, path: &FsPath) -> Result<bool> {
        call(self.addr, &ServiceRequest::Delete { path: path.clone() }).await
    }

    /// Returns a server holding `path`; byte access goes through
    /// [`StorageRef::client`].
    pub async fn get_storage(&self, path: &FsPath) -> Result<StorageRef> {
        call(self.addr, &ServiceRequest::GetStorage { path: path.clone() }).await
    }

    pub async fn lock(&self, path: &FsPath, exclusive: bool) -> Result<()> {
        call(self.addr, &ServiceRequest::Lock { path: path.clone(), exclusive }).await
    }

    pub async fn unlock(&self, path: &FsPath, exclusive: bool) -> Result<()> {
        call(self.addr, &ServiceRequest::Unlock { path: path.clone(), exclusive }).await
    }
}

/// Stub for the naming server's registration interface.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationStub {
    addr: SocketAddr,
}

impl RegistrationStub {
    pub fn new(addr: SocketAddr) -> Self {
        RegistrationStub { addr }
    }

    /// Advertises `server` and its file list; returns the duplicates the
    /// storage server must delete locally.
    pub async fn register(&self, server: StorageRef, files: Vec<FsPath>) -> Result<Vec<FsPath>> {
        call(self.addr, &RegistrationRequest::Register { server, files }).await
    }
}

/// Stub for a storage server's byte-access interface.
#[derive(Debug, Clone, Copy)]
pub struct StorageClientStub {
    addr: SocketAddr,
}

impl StorageClientStub {
    pub fn new(addr: SocketAddr) -> Self {
        StorageClientStub { addr }
    }

    pub async fn size(&self, path: &FsPath) -> Result<u64> {
        call(self.addr, &StorageClientRequest::Size { path: path.clone() }).await
    }

    pub async fn read(&self, path: &FsPath, offset: u64, length: u64) -> Result<Vec<u8>> {
        call(self.addr, &StorageClientRequest::Read { path: path.clone(), offset, length }).await
    }

    pub async fn write(&self, path: &FsPath, offset: u64, data: Vec<u8>) -> Result<()> {
        call(self.addr, &StorageClientRequest::Write { path: path.clone(), offset, data }).await
    }
}

/// Stub for a storage server's command interface.
#[derive(Debug, Clone, Copy)]
pub struct StorageCommandStub {
    addr: SocketAddr,
}

impl StorageCommandStub {
    pub fn new(addr: SocketAddr) -> Self {
        StorageCommandStub { addr }
    }

    pub async fn create(&self, path: &FsPath) -> Result<bool> {
        call(self.addr, &StorageCommandRequest::Create { path: path.clone() }).await
    }

    pub async fn delete(&self, path: &FsPath) -> Result<bool> {
        call(self.addr, &StorageCommandRequest::Delete { path: path.clone() }).await
    }

    pub async fn copy(&self, path: &FsPath, source: StorageRef) -> Result<bool> {
        call(self.addr, &StorageCommandRequest::Copy { path: path.clone(), source }).await
    }
}

impl StorageRef {
    pub fn client(&self) -> StorageClientStub {
        StorageClientStub::new(self.client_addr)
    }

    pub fn command(&self) -> StorageCommandStub {
        StorageCommandStub::new(self.command_addr)
    }
}
