//! Crate-wide error type shared by both server roles and the wire protocol.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Result of herdfs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by naming and storage operations.
///
/// The enum is serializable because replies carry it across the wire
/// unmodified; the receiving stub hands it back as if the failure had been
/// raised locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    /// The path is absent or does not refer to the expected kind of object.
    #[error("not found: {0}")]
    NotFound(String),
    /// An offset/length pair fell outside the file.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    /// Malformed path, component or request.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    /// The operation cannot be performed in the current server state.
    /// For example, creating a file while no storage server is registered.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// A storage server advertised an address that is already registered.
    #[error("storage server already registered")]
    AlreadyRegistered,
    /// Host filesystem failure not covered by an operation's boolean result.
    #[error("i/o failure: {0}")]
    Io(String),
    /// A remote call could not be delivered or completed.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn bad_argument(what: impl Into<String>) -> Self {
        Error::IllegalArgument(what.into())
    }

    pub fn bad_state(what: impl Into<String>) -> Self {
        Error::IllegalState(what.into())
    }

    pub fn io(err: impl Display) -> Self {
        Error::Io(err.to_string())
    }

    pub fn transport(err: impl Display) -> Self {
        Error::Transport(err.to_string())
    }
}
