//! Filesystem path values exchanged between clients, the naming server and
//! storage servers.
//!
//! An [`FsPath`] is an immutable sequence of non-empty components. Components
//! never contain `/` or `:`. The empty sequence is the root directory. The
//! serialized form is `/` for the root, otherwise `/` followed by the
//! components joined with `/`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Component delimiter in the serialized form.
pub const SEPARATOR: char = '/';

/// An absolute, canonical filesystem path.
///
/// Parsing drops empty components, so `//a///b` equals `/a/b`. Ordering is
/// lexicographic over the serialized form, which places every ancestor
/// strictly before its descendants; the lock manager relies on that when it
/// walks [`FsPath::lineage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath {
    components: Vec<String>,
}

impl FsPath {
    /// The root directory.
    pub fn root() -> Self {
        FsPath { components: Vec::new() }
    }

    /// Parses a serialized path, validating it as described at module level.
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.starts_with(SEPARATOR) {
            return Err(Error::bad_argument(format!("path must start with '/': {raw:?}")));
        }
        if raw.contains(':') {
            return Err(Error::bad_argument(format!("path must not contain ':': {raw:?}")));
        }
        let components =
            raw.split(SEPARATOR).filter(|c| !c.is_empty()).map(str::to_owned).collect();
        Ok(FsPath { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Appends one component, validating it.
    pub fn join(&self, component: &str) -> Result<Self> {
        if component.is_empty() {
            return Err(Error::bad_argument("path component must not be empty"));
        }
        if component.contains(SEPARATOR) || component.contains(':') {
            return Err(Error::bad_argument(format!(
                "path component must not contain '/' or ':': {component:?}"
            )));
        }
        let mut components = self.components.clone();
        components.push(component.to_owned());
        Ok(FsPath { components })
    }

    /// The path with the last component removed; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        match self.components.split_last() {
            Some((_, rest)) => Some(FsPath { components: rest.to_vec() }),
            None => None,
        }
    }

    /// The last component; `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// True iff `prefix`'s components are a prefix of this path's components.
    ///
    /// Every path starts with the root and with itself.
    pub fn starts_with(&self, prefix: &FsPath) -> bool {
        self.components.len() >= prefix.components.len()
            && self.components[..prefix.components.len()] == prefix.components[..]
    }

    /// Read-only left-to-right component iteration.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Every prefix of this path, from the root down to the path itself.
    ///
    /// This is the chain the lock manager acquires, in order.
    pub fn lineage(&self) -> Vec<FsPath> {
        (0..=self.components.len())
            .map(|n| FsPath { components: self.components[..n].to_vec() })
            .collect()
    }

    fn serialized_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.components.iter().flat_map(|c| std::iter::once(SEPARATOR).chain(c.chars()))
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

impl FromStr for FsPath {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        FsPath::parse(raw)
    }
}

impl Ord for FsPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serialized_chars().cmp(other.serialized_chars())
    }
}

impl PartialOrd for FsPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for FsPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FsPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|err: Error| D::Error::custom(err.to_string()))
    }
}
