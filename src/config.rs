//! File configuration with CLI overrides.
//!
//! ```toml
//! [etcd]
//! disabled = false
//! member_name = "server-1-5f2c9a1e"
//! member_address = "https://10.0.0.1:2380"
//!
//! [controller]
//! workers = 2
//! resync_secs = 0
//!
//! [[nodes]]
//! name = "server-1"
//! ```

use std::path::Path;
use std::time::Duration;

use nodemeta_core::{Error, Node, Result};
use nodemeta_events::ControllerConfig;
use nodemeta_reconciler::{LocalIdentity, MemberIdentity};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Etcd membership of this process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// This process does not run etcd.
    pub disabled: bool,
    /// Member name, required unless disabled.
    pub member_name: String,
    /// Peer address, required unless disabled.
    pub member_address: String,
}

/// Controller tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Worker task count.
    pub workers: usize,
    /// Full resync period in seconds; 0 disables resync.
    pub resync_secs: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            workers: 2,
            resync_secs: 0,
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub etcd: EtcdConfig,
    pub controller: ControllerSection,
    /// Nodes seeded into the in-memory registry at startup.
    pub nodes: Vec<Node>,
}

impl Config {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TomlParseFailed`] on malformed input.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileReadFailed`] or [`Error::TomlParseFailed`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml(&text)
    }

    /// Load from `path` if given, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Propagates [`Config::load`] errors.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if cli.disable_etcd {
            self.etcd.disabled = true;
        }
        if let Some(name) = &cli.member_name {
            self.etcd.member_name.clone_from(name);
        }
        if let Some(address) = &cli.member_address {
            self.etcd.member_address.clone_from(address);
        }
        if let Some(workers) = cli.workers {
            self.controller.workers = workers;
        }
        self
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.controller.workers == 0 {
            return Err(Error::invalid_config("controller.workers must be at least 1"));
        }
        if !self.etcd.disabled {
            if self.etcd.member_name.is_empty() {
                return Err(Error::invalid_config(
                    "etcd.member_name is required unless etcd is disabled",
                ));
            }
            if self.etcd.member_address.is_empty() {
                return Err(Error::invalid_config(
                    "etcd.member_address is required unless etcd is disabled",
                ));
            }
        }
        Ok(())
    }

    /// Member identity, `None` when etcd is disabled.
    pub fn member(&self) -> Option<MemberIdentity> {
        (!self.etcd.disabled).then(|| {
            MemberIdentity::new(&self.etcd.member_name, &self.etcd.member_address)
        })
    }

    /// Identity for a node name pinned on the command line.
    pub fn pinned_identity(&self, node_name: &str) -> LocalIdentity {
        let identity = LocalIdentity::new(node_name);
        match self.member() {
            Some(member) => identity.with_member(member),
            None => identity,
        }
    }

    /// Controller configuration for the dispatcher.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.controller.workers,
            resync_period: (self.controller.resync_secs > 0)
                .then(|| Duration::from_secs(self.controller.resync_secs)),
        }
    }
}
