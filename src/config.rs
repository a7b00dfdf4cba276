//! TOML configuration for the two herdfs server roles.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Well-known port of the naming server's client-facing service interface.
pub const SERVICE_PORT: u16 = 8080;

/// Well-known port of the naming server's registration interface.
pub const REGISTRATION_PORT: u16 = 8090;

/// Shared-access count at which a file is copied to one more server.
pub const REPLICATION_THRESHOLD: u32 = 20;

fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn any() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    pub bind: IpAddr,
    pub service_port: u16,
    pub registration_port: u16,
    pub replication_threshold: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig {
            bind: any(),
            service_port: SERVICE_PORT,
            registration_port: REGISTRATION_PORT,
            replication_threshold: REPLICATION_THRESHOLD,
        }
    }
}

impl NamingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        parse(path)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Host directory this server exports.
    pub root: PathBuf,
    /// Address advertised to the naming server; must be reachable by it and
    /// by clients.
    #[serde(default = "loopback")]
    pub advertise_host: IpAddr,
    #[serde(default = "loopback")]
    pub naming_host: IpAddr,
    #[serde(default = "default_naming_port")]
    pub naming_port: u16,
}

fn default_naming_port() -> u16 {
    REGISTRATION_PORT
}

impl StorageConfig {
    pub fn load(path: &Path) -> Result<Self> {
        parse(path)
    }
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(Error::io)?;
    toml::from_str(&raw)
        .map_err(|err| Error::bad_argument(format!("invalid config {}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_defaults_fill_missing_fields() {
        let config: NamingConfig = toml::from_str("service_port = 9000").expect("valid config");
        assert_eq!(config.service_port, 9000);
        assert_eq!(config.registration_port, REGISTRATION_PORT);
        assert_eq!(config.replication_threshold, REPLICATION_THRESHOLD);
    }

    #[test]
    fn storage_requires_a_root() {
        assert!(toml::from_str::<StorageConfig>("naming_port = 8090").is_err());
        let config: StorageConfig =
            toml::from_str("root = \"/srv/herd\"").expect("valid config");
        assert_eq!(config.root, PathBuf::from("/srv/herd"));
        assert_eq!(config.naming_port, REGISTRATION_PORT);
    }
}
