#![allow(dead_code)]

//! Shared fixture: a live naming server plus tempdir-rooted storage servers,
//! all on ephemeral loopback ports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use herdfs::naming::NamingServer;
use herdfs::path::FsPath;
use herdfs::storage::StorageServer;
use herdfs::stub::{RegistrationStub, ServiceStub};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub struct Cluster {
    pub naming: Arc<NamingServer>,
    pub service: ServiceStub,
    pub registration_addr: SocketAddr,
    pub storages: Vec<StorageNode>,
}

pub struct StorageNode {
    pub dir: TempDir,
    pub server: StorageServer,
}

pub async fn cluster(storages: usize) -> Cluster {
    cluster_with_threshold(storages, herdfs::config::REPLICATION_THRESHOLD).await
}

pub async fn cluster_with_threshold(storages: usize, threshold: u32) -> Cluster {
    let naming = NamingServer::new(threshold);
    let (service_addr, registration_addr) = naming
        .start(SocketAddr::new(LOCALHOST, 0), SocketAddr::new(LOCALHOST, 0))
        .await
        .expect("start naming server");
    let mut cluster = Cluster {
        naming,
        service: ServiceStub::new(service_addr),
        registration_addr,
        storages: Vec::new(),
    };
    for _ in 0..storages {
        cluster.add_storage().await;
    }
    cluster
}

impl Cluster {
    pub fn registration(&self) -> RegistrationStub {
        RegistrationStub::new(self.registration_addr)
    }

    /// Starts one more storage server on a fresh temp root.
    pub async fn add_storage(&mut self) -> &StorageNode {
        self.add_seeded_storage(&[]).await
    }

    /// Starts one more storage server whose root already holds `files`.
    pub async fn add_seeded_storage(&mut self, files: &[(&str, &[u8])]) -> &StorageNode {
        let dir = TempDir::new().expect("create storage root");
        for (raw, data) in files {
            let host = dir.path().join(raw.trim_start_matches('/'));
            if let Some(parent) = host.parent() {
                std::fs::create_dir_all(parent).expect("seed ancestor directories");
            }
            std::fs::write(host, data).expect("seed file");
        }
        let server = StorageServer::start(dir.path().to_path_buf(), LOCALHOST, self.registration_addr)
            .await
            .expect("start storage server");
        self.storages.push(StorageNode { dir, server });
        self.storages.last().expect("just pushed")
    }
}

pub fn path(raw: &str) -> FsPath {
    FsPath::parse(raw).expect("valid path")
}

pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
