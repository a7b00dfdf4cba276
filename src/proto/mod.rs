//! Wire messages for the four herdfs interface families.
//!
//! The naming server exposes the *service* interface to clients and the
//! *registration* interface to storage servers, both on well-known ports. A
//! storage server exposes a *client* interface (byte access) and a *command*
//! interface (naming-server-driven mutations) on ephemeral ports advertised
//! at registration.
//!
//! Every reply on the wire is a serialized `Result` pairing the operation's
//! value with [`crate::error::Error`].

pub mod frame;

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::path::FsPath;

/// Reply body for an operation returning `T`.
pub type Reply<T> = std::result::Result<T, crate::error::Error>;

/// One storage server, identified by its two advertised listening addresses.
///
/// This doubles as the replica reference kept in the naming server's tree:
/// holding a file's bytes and being reachable at these addresses are the same
/// statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRef {
    /// The size/read/write interface handed out to clients.
    pub client_addr: SocketAddr,
    /// The create/delete/copy interface driven by the naming server.
    pub command_addr: SocketAddr,
}

/// Client-facing naming server operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceRequest {
    IsDirectory { path: FsPath },
    List { path: FsPath },
    CreateFile { path: FsPath },
    CreateDirectory { path: FsPath },
    Delete { path: FsPath },
    GetStorage { path: FsPath },
    Lock { path: FsPath, exclusive: bool },
    Unlock { path: FsPath, exclusive: bool },
}

/// Storage-server-facing naming server operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationRequest {
    Register { server: StorageRef, files: Vec<FsPath> },
}

/// Byte access against one storage server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageClientRequest {
    Size { path: FsPath },
    Read { path: FsPath, offset: u64, length: u64 },
    Write { path: FsPath, offset: u64, data: Vec<u8> },
}

/// Naming-server-driven mutations against one storage server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageCommandRequest {
    Create { path: FsPath },
    Delete { path: FsPath },
    Copy { path: FsPath, source: StorageRef },
}
