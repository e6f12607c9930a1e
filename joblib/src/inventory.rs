use crate::error::InventoryError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_SSH_PORT: u16 = 22;

/// A deploy target as listed in the inventory file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub ip: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Overrides the default deploy script for this server.
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Server {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            alias: None,
            user: None,
            port: None,
            script: None,
            active: true,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn ssh_user(&self) -> &str {
        self.user.as_deref().unwrap_or(DEFAULT_SSH_USER)
    }

    pub fn ssh_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

/// The set of servers jobs may target. Loaded once from a JSON array.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    servers: Vec<Server>,
}

impl Inventory {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let servers: Vec<Server> =
            serde_json::from_str(&raw).map_err(|source| InventoryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_servers(servers)
    }

    /// Build an inventory, rejecting repeated ips or aliases. An alias that equals another
    /// server's ip is rejected too, since lookups match either.
    pub fn from_servers(servers: Vec<Server>) -> Result<Self, InventoryError> {
        let mut seen = HashSet::new();
        for server in &servers {
            let idents = std::iter::once(&server.ip).chain(server.alias.as_ref());
            for ident in idents {
                if !seen.insert(ident.as_str()) {
                    return Err(InventoryError::Duplicate(ident.clone()));
                }
            }
        }
        Ok(Self { servers })
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Exact match on ip or alias. Inactive servers are not valid targets.
    pub fn resolve(&self, ident: &str) -> Result<&Server, InventoryError> {
        let server = self
            .servers
            .iter()
            .find(|s| s.ip == ident || s.alias.as_deref() == Some(ident))
            .ok_or_else(|| InventoryError::Unknown(ident.to_string()))?;
        if !server.active {
            return Err(InventoryError::Inactive(ident.to_string()));
        }
        Ok(server)
    }
}
