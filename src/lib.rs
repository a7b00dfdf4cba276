//! herdfs - a small distributed filesystem implemented in Rust.
//!
//! One naming server owns the directory tree as metadata, coordinates all
//! concurrent access through per-path locks, and maps files to the herd of
//! storage servers holding their bytes. Clients look structure up at the
//! naming server and exchange bytes directly with storage servers.

pub mod config;
pub mod error;
pub mod naming;
pub mod path;
pub mod proto;
pub mod storage;
pub mod stub;

pub use error::{Error, Result};
pub use path::FsPath;
