//! Project configuration read from `migrate.toml`.
//!
//! Layered file → environment → CLI. The file format:
//!
//! ```toml
//! [project]
//! migrations_dir = "migrations"
//! data_dir = "data"
//! default_network = "hardhat"
//!
//! [executor]
//! command = "node scripts/executor.js"
//! timeout_secs = 120
//!
//! [signer]
//! address = "0x..."
//!
//! [components]
//! ProxyAdmin = "artifacts/ProxyAdmin.json"
//! Vault = "artifacts/Vault.json"
//!
//! [networks.mainnet-fork]
//! fork_of = "mainnet"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::state::validate_network_name;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "migrate.toml";

/// Environment variable selecting the network.
pub const ENV_NETWORK: &str = "MIGRATE_NETWORK";
/// Environment variable overriding `[executor] command`.
pub const ENV_EXECUTOR_CMD: &str = "MIGRATE_EXECUTOR_CMD";
/// Environment variable overriding `[signer] address`.
pub const ENV_SIGNER: &str = "MIGRATE_SIGNER";

const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_NETWORK: &str = "hardhat";
/// Signer used when none is configured, e.g. for simulated runs.
pub const DEFAULT_SIGNER: &str = "0x0000000000000000000000000000000000000001";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_network")]
    pub default_network: String,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MIGRATIONS_DIR)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            migrations_dir: default_migrations_dir(),
            data_dir: default_data_dir(),
            default_network: default_network(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSection {
    /// Shell command speaking the JSON executor protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Per-primitive timeout. No timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Network whose state seeds this one on `--reset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrateToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub signer: SignerSection,
    /// Component name to build artifact.
    #[serde(default)]
    pub components: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSection>,
}

impl MigrateToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse migrate.toml")
    }

    /// Load `migrate.toml` from the project directory, or defaults if it doesn't exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize migrate.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Executor command, with the environment taking precedence over the file.
    pub fn executor_cmd(&self) -> Option<String> {
        std::env::var(ENV_EXECUTOR_CMD)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.executor.command.clone())
    }

    /// Signer address, with the environment taking precedence over the file.
    pub fn signer_address(&self) -> Option<String> {
        std::env::var(ENV_SIGNER)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.signer.address.clone())
    }

    /// Network to use when the CLI doesn't name one: environment, then file default.
    pub fn default_network(&self) -> String {
        std::env::var(ENV_NETWORK)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.project.default_network.clone())
    }

    /// Fork source of a network, if it is configured as a fork.
    pub fn fork_of(&self, network: &str) -> Option<&str> {
        self.networks
            .get(network)
            .and_then(|n| n.fork_of.as_deref())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.project.default_network.trim().is_empty() {
            warnings.push("project.default_network is empty".to_string());
        } else if validate_network_name(&self.project.default_network).is_err() {
            warnings.push(format!(
                "project.default_network '{}' is not a single path segment",
                self.project.default_network
            ));
        }

        if self.project.migrations_dir.as_os_str().is_empty() {
            warnings.push("project.migrations_dir is empty".to_string());
        }

        if let Some(ref command) = self.executor.command
            && command.trim().is_empty()
        {
            warnings.push("executor.command is empty".to_string());
        }

        if self.executor.timeout_secs == Some(0) {
            warnings.push("executor.timeout_secs must be greater than 0".to_string());
        }

        if let Some(ref address) = self.signer.address
            && !is_hex_address(address)
        {
            warnings.push(format!(
                "signer.address '{}' is not a 0x-prefixed 20-byte hex address",
                address
            ));
        }

        for (name, network) in &self.networks {
            if validate_network_name(name).is_err() {
                warnings.push(format!("Network name '{}' is not a single path segment", name));
            }
            if let Some(ref source) = network.fork_of {
                if validate_network_name(source).is_err() {
                    warnings.push(format!(
                        "Network '{}' forks '{}', which is not a single path segment",
                        name, source
                    ));
                } else if source == name {
                    warnings.push(format!("Network '{}' is configured as a fork of itself", name));
                } else if self.fork_of(source).is_some() {
                    warnings.push(format!(
                        "Network '{}' forks '{}', which is itself a fork; only one level is seeded",
                        name, source
                    ));
                }
            }
        }

        warnings
    }
}

fn is_hex_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Starter `migrate.toml` written by `migrator init`.
pub fn default_config_content() -> String {
    format!(
        r#"[project]
migrations_dir = "{DEFAULT_MIGRATIONS_DIR}"
data_dir = "{DEFAULT_DATA_DIR}"
default_network = "{DEFAULT_NETWORK}"

[executor]
# Shell command that reads one JSON request on stdin and prints one JSON response.
# command = "node scripts/executor.js"
# timeout_secs = 120

[signer]
# address = "0x..."

[components]
# ProxyAdmin = "artifacts/ProxyAdmin.json"

# [networks.mainnet-fork]
# fork_of = "mainnet"
"#
    )
}
