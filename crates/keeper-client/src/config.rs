//! Connection settings for a ZooKeeper ensemble

use std::time::Duration;

use keeper_common::ROOT;
use serde::{Deserialize, Serialize};

/// Configuration for connecting to a ZooKeeper ensemble
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Ensemble member addresses (`host:port`)
    pub servers: Vec<String>,
    /// Session timeout negotiated with the ensemble, in milliseconds
    pub session_timeout_ms: u64,
    /// Upper bound on establishing the session, in milliseconds
    pub connect_timeout_ms: u64,
    /// Optional chroot applied to every path (e.g. "/apps/keeper")
    pub chroot: String,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            servers: vec![format!("127.0.0.1:{}", keeper_common::DEFAULT_PORT)],
            session_timeout_ms: 30000,
            connect_timeout_ms: 10000,
            chroot: String::new(),
        }
    }
}

impl KeeperConfig {
    /// Create a new config with a single server address
    pub fn new(server_addr: &str) -> Self {
        Self {
            servers: vec![server_addr.to_string()],
            ..Default::default()
        }
    }

    /// Create a config with multiple server addresses
    pub fn with_servers(servers: Vec<String>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    /// Set the session timeout
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the chroot
    pub fn with_chroot(mut self, chroot: &str) -> Self {
        self.chroot = chroot.to_string();
        self
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Render the connect string understood by the client,
    /// e.g. `zk1:2181,zk2:2181/apps`.
    pub fn connect_string(&self) -> String {
        let hosts = self.servers.join(",");
        let chroot = self.chroot.trim_end_matches('/');
        if chroot.is_empty() {
            hosts
        } else if chroot.starts_with(ROOT) {
            format!("{}{}", hosts, chroot)
        } else {
            format!("{}/{}", hosts, chroot)
        }
    }
}
