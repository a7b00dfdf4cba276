//! The set of registered storage servers.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::proto::StorageRef;

/// Storage-server records live for the lifetime of the naming server; there
/// is no unregistration.
#[derive(Debug, Default)]
pub struct Registry {
    servers: Vec<StorageRef>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { servers: Vec::new() }
    }

    /// Admits a server. Either advertised address may appear at most once.
    pub fn register(&mut self, server: StorageRef) -> Result<()> {
        let taken = self.servers.iter().any(|known| {
            known.command_addr == server.command_addr || known.client_addr == server.client_addr
        });
        if taken {
            return Err(Error::AlreadyRegistered);
        }
        self.servers.push(server);
        Ok(())
    }

    /// One uniformly random server; illegal-state when none is registered.
    pub fn pick(&self, rng: &mut impl Rng) -> Result<StorageRef> {
        self.servers
            .choose(rng)
            .copied()
            .ok_or_else(|| Error::bad_state("no storage servers are registered"))
    }

    /// One uniformly random server not in `exclude`, if any.
    pub fn pick_other(&self, exclude: &[StorageRef], rng: &mut impl Rng) -> Option<StorageRef> {
        let candidates: Vec<&StorageRef> =
            self.servers.iter().filter(|server| !exclude.contains(server)).collect();
        candidates.choose(rng).map(|server| **server)
    }
}
