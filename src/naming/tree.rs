//! The naming server's in-memory directory tree.
//!
//! Every known path maps to exactly one [`Node`]. The tree is a plain data
//! structure: callers are responsible for wrapping it in a mutex and for the
//! path-lock discipline that makes multi-step mutations consistent.

use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::path::FsPath;
use crate::proto::StorageRef;

/// One tree entry.
///
/// A file carries its replica list (insertion order; the first entry is the
/// primary) and the access counter driving the replication policy. A
/// directory carries the full paths of its immediate children.
#[derive(Debug, Clone)]
pub enum Node {
    File { replicas: Vec<StorageRef>, hits: u32 },
    Directory { children: BTreeSet<FsPath> },
}

#[derive(Debug)]
pub struct DirectoryTree {
    nodes: HashMap<FsPath, Node>,
}

impl DirectoryTree {
    /// A tree containing only the root directory.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(FsPath::root(), Node::Directory { children: BTreeSet::new() });
        DirectoryTree { nodes }
    }

    pub fn exists(&self, path: &FsPath) -> bool {
        self.nodes.contains_key(path)
    }

    /// True iff `path` is a directory; not-found when absent.
    pub fn is_directory(&self, path: &FsPath) -> Result<bool> {
        match self.nodes.get(path) {
            Some(Node::Directory { .. }) => Ok(true),
            Some(Node::File { .. }) => Ok(false),
            None => Err(Error::not_found(format!("{path} is not in the tree"))),
        }
    }

    /// The names of the immediate children of a directory, sorted.
    pub fn children(&self, path: &FsPath) -> Result<Vec<String>> {
        match self.nodes.get(path) {
            Some(Node::Directory { children }) => Ok(children
                .iter()
                .filter_map(|child| child.last().map(str::to_owned))
                .collect()),
            Some(Node::File { .. }) => {
                Err(Error::not_found(format!("{path} is a file, not a directory")))
            }
            None => Err(Error::not_found(format!("{path} is not in the tree"))),
        }
    }

    /// The replica list of a file; not-found otherwise.
    pub fn replicas(&self, path: &FsPath) -> Result<Vec<StorageRef>> {
        match self.nodes.get(path) {
            Some(Node::File { replicas, .. }) => Ok(replicas.clone()),
            Some(Node::Directory { .. }) => {
                Err(Error::not_found(format!("{path} is a directory, not a file")))
            }
            None => Err(Error::not_found(format!("{path} is not in the tree"))),
        }
    }

    /// One uniformly random replica of a file.
    pub fn pick_replica(&self, path: &FsPath, rng: &mut impl Rng) -> Result<StorageRef> {
        let replicas = self.replicas(path)?;
        replicas
            .choose(rng)
            .copied()
            .ok_or_else(|| Error::bad_state(format!("{path} has no replicas")))
    }

    /// Every file at or below `path`, with its replicas.
    ///
    /// This is the fan-out set a subtree delete must visit.
    pub fn files_under(&self, path: &FsPath) -> Vec<(FsPath, Vec<StorageRef>)> {
        self.nodes
            .iter()
            .filter(|(candidate, _)| candidate.starts_with(path))
            .filter_map(|(candidate, node)| match node {
                Node::File { replicas, .. } => Some((candidate.clone(), replicas.clone())),
                Node::Directory { .. } => None,
            })
            .collect()
    }

    /// Inserts a file node whose sole replica is `server`.
    ///
    /// The parent must already exist as a directory and `path` must be
    /// absent.
    pub fn insert_file(&mut self, path: &FsPath, server: StorageRef) -> Result<()> {
        self.attach(path)?;
        self.nodes.insert(path.clone(), Node::File { replicas: vec![server], hits: 0 });
        Ok(())
    }

    /// Inserts an empty directory node, under the same contract as
    /// [`DirectoryTree::insert_file`].
    pub fn insert_directory(&mut self, path: &FsPath) -> Result<()> {
        self.attach(path)?;
        self.nodes.insert(path.clone(), Node::Directory { children: BTreeSet::new() });
        Ok(())
    }

    /// Creates every missing directory along `path`.
    ///
    /// Idempotent; fails with illegal-argument if any prefix already exists
    /// as a file.
    pub fn ensure_directory(&mut self, path: &FsPath) -> Result<()> {
        for prefix in path.lineage() {
            match self.nodes.get(&prefix) {
                Some(Node::Directory { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(Error::bad_argument(format!("{prefix} is a file")));
                }
                None => self.insert_directory(&prefix)?,
            }
        }
        Ok(())
    }

    /// Removes `path` and everything below it. The root is not removable.
    ///
    /// The caller is responsible for having told every replica of every file
    /// in the subtree to drop its bytes.
    pub fn remove(&mut self, path: &FsPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::bad_argument("the root directory cannot be removed"));
        }
        if !self.nodes.contains_key(path) {
            return Err(Error::not_found(format!("{path} is not in the tree")));
        }
        let victims: Vec<FsPath> =
            self.nodes.keys().filter(|key| key.starts_with(path)).cloned().collect();
        for victim in victims {
            self.nodes.remove(&victim);
        }
        if let Some(parent) = path.parent() {
            if let Some(Node::Directory { children }) = self.nodes.get_mut(&parent) {
                children.remove(path);
            }
        }
        Ok(())
    }

    /// Increments a file's access counter and returns the new value.
    pub fn record_access(&mut self, path: &FsPath) -> Result<u32> {
        match self.nodes.get_mut(path) {
            Some(Node::File { hits, .. }) => {
                *hits = hits.saturating_add(1);
                Ok(*hits)
            }
            _ => Err(Error::not_found(format!("{path} is not a file in the tree"))),
        }
    }

    pub fn reset_access(&mut self, path: &FsPath) {
        if let Some(Node::File { hits, .. }) = self.nodes.get_mut(path) {
            *hits = 0;
        }
    }

    /// Records one more server holding the file's bytes.
    pub fn add_replica(&mut self, path: &FsPath, server: StorageRef) -> Result<()> {
        match self.nodes.get_mut(path) {
            Some(Node::File { replicas, .. }) => {
                if !replicas.contains(&server) {
                    replicas.push(server);
                }
                Ok(())
            }
            _ => Err(Error::not_found(format!("{path} is not a file in the tree"))),
        }
    }

    /// Shrinks a file to its primary replica, returning the dropped ones and
    /// resetting the access counter.
    pub fn demote_to_primary(&mut self, path: &FsPath) -> Result<Vec<StorageRef>> {
        match self.nodes.get_mut(path) {
            Some(Node::File { replicas, hits }) => {
                *hits = 0;
                if replicas.len() <= 1 {
                    return Ok(Vec::new());
                }
                Ok(replicas.split_off(1))
            }
            _ => Err(Error::not_found(format!("{path} is not a file in the tree"))),
        }
    }

    fn attach(&mut self, path: &FsPath) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::bad_argument("the root directory cannot be replaced"))?;
        if self.nodes.contains_key(path) {
            return Err(Error::bad_argument(format!("{path} is already in the tree")));
        }
        match self.nodes.get_mut(&parent) {
            Some(Node::Directory { children }) => {
                children.insert(path.clone());
                Ok(())
            }
            Some(Node::File { .. }) => {
                Err(Error::not_found(format!("{parent} is a file, not a directory")))
            }
            None => Err(Error::not_found(format!("{parent} is not in the tree"))),
        }
    }

    /// Panics unless the structural invariants hold. Test support.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert!(
            matches!(self.nodes.get(&FsPath::root()), Some(Node::Directory { .. })),
            "the root must always exist as a directory"
        );
        for (path, node) in &self.nodes {
            if let Node::File { replicas, .. } = node {
                assert!(!replicas.is_empty(), "file {path} has no replicas");
            }
            if !path.is_root() {
                let parent = path.parent().expect("non-root path has a parent");
                match self.nodes.get(&parent) {
                    Some(Node::Directory { children }) => {
                        assert!(children.contains(path), "{parent} does not list child {path}")
                    }
                    other => panic!("parent of {path} is not a directory: {other:?}"),
                }
            }
            if let Node::Directory { children } = node {
                for child in children {
                    assert_eq!(child.parent().as_ref(), Some(path), "stray child {child}");
                    assert!(self.nodes.contains_key(child), "dangling child {child}");
                }
            }
        }
    }
}

impl Default for DirectoryTree {
    fn default() -> Self {
        DirectoryTree::new()
    }
}
