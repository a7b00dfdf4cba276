//! Per-path shared/exclusive locks with ancestor-chain acquisition.
//!
//! Locking a path first takes a shared lock on every proper ancestor, root
//! first, then the requested mode on the path itself. All acquirers walk the
//! same root-to-leaf order, so no cycle can form in the wait-for graph.
//! While an operation holds its chain, no ancestor of its path can be
//! created or deleted out from under it, and an exclusive leaf lock safely
//! coexists with concurrent access to siblings.
//!
//! Fairness comes from tokio's `RwLock` queueing: requests are served in
//! arrival order and a shared request that arrives while an exclusive
//! request is queued waits behind it, so writers do not starve. Reentrant
//! acquisition is not supported; locking a path twice from one task
//! deadlocks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::path::FsPath;

/// Lock mode requested for the final path of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Shared,
    Exclusive,
}

/// Map size above which idle entries are swept on the next acquisition.
const SWEEP_AT: usize = 1024;

/// Lazily populated map from path to its lock cell.
#[derive(Debug, Default)]
pub struct PathLocks {
    cells: DashMap<FsPath, Arc<RwLock<()>>>,
}

enum Held {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// A held lock chain. Dropping it releases leaf-first.
#[must_use]
pub struct PathGuard {
    chain: Vec<Held>,
}

impl PathLocks {
    pub fn new() -> Self {
        PathLocks { cells: DashMap::new() }
    }

    /// Locks `path` in `mode`, acquiring shared locks along its lineage
    /// first.
    pub async fn lock(&self, path: &FsPath, mode: Mode) -> PathGuard {
        self.sweep();
        let lineage = path.lineage();
        let leaf = lineage.len() - 1;
        let mut chain = Vec::with_capacity(lineage.len());
        for (depth, step) in lineage.into_iter().enumerate() {
            let cell = self.cell(step);
            let held = if depth == leaf && mode == Mode::Exclusive {
                Held::Exclusive(cell.write_owned().await)
            } else {
                Held::Shared(cell.read_owned().await)
            };
            chain.push(held);
        }
        PathGuard { chain }
    }

    fn cell(&self, path: FsPath) -> Arc<RwLock<()>> {
        self.cells.entry(path).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    /// Drops cells nothing references any more. A cell with a holder or a
    /// queued waiter is kept alive by its guard's or waiter's `Arc`.
    fn sweep(&self) {
        if self.cells.len() > SWEEP_AT {
            self.cells.retain(|_, cell| Arc::strong_count(cell) > 1);
        }
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        while let Some(held) = self.chain.pop() {
            drop(held);
        }
    }
}
