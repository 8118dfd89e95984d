use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::execution::{
    CommandExecutor, ComponentRegistry, ExecutionContext, Executor, Signer, SimulatedExecutor,
};
use crate::migrate_config::{DEFAULT_SIGNER, MigrateToml};
use crate::state::{FileStateStore, validate_network_name};

/// Runtime configuration for one invocation.
///
/// Bridges `migrate.toml` (plus environment overrides) with the CLI flags and resolves
/// every path against the project directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub migrations_dir: PathBuf,
    pub data_dir: PathBuf,
    pub network: String,
    /// Network whose state seeds this one on reset.
    pub fork_of: Option<String>,
    pub signer: String,
    pub executor_cmd: Option<String>,
    pub executor_timeout: Option<u64>,
    pub verbose: bool,
    toml: MigrateToml,
}

impl Config {
    /// Build the configuration for `project_dir`, with `network` overriding the
    /// configured default when given.
    pub fn new(project_dir: PathBuf, network: Option<String>, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve project directory: {}", project_dir.display()))?;

        let toml = MigrateToml::load_or_default(&project_dir)?;
        let network = network
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| toml.default_network());
        validate_network_name(&network)?;
        let fork_of = toml.fork_of(&network).map(str::to_string);
        if let Some(source) = fork_of.as_deref() {
            validate_network_name(source)
                .with_context(|| format!("Invalid fork_of for network '{}'", network))?;
        }

        Ok(Self {
            migrations_dir: project_dir.join(&toml.project.migrations_dir),
            data_dir: project_dir.join(&toml.project.data_dir),
            fork_of,
            signer: toml
                .signer_address()
                .unwrap_or_else(|| DEFAULT_SIGNER.to_string()),
            executor_cmd: toml.executor_cmd(),
            executor_timeout: toml.executor.timeout_secs,
            project_dir,
            network,
            verbose,
            toml,
        })
    }

    /// The parsed `migrate.toml` (defaults when the file is absent).
    pub fn toml(&self) -> &MigrateToml {
        &self.toml
    }

    pub fn state_store(&self) -> FileStateStore {
        FileStateStore::new(&self.data_dir)
    }

    /// Per-network directory holding `state.json` and the run records.
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(&self.network)
    }

    pub fn component_registry(&self) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for (name, artifact) in &self.toml.components {
            registry.register(name, Some(self.resolve(artifact)));
        }
        registry
    }

    /// The executor for this run. Simulated runs never touch the external environment.
    pub fn build_executor(&self, simulate: bool) -> Result<Arc<dyn Executor>> {
        if simulate {
            return Ok(Arc::new(SimulatedExecutor::new()));
        }
        let Some(command) = self.executor_cmd.as_deref() else {
            bail!(
                "No executor configured. Set [executor] command in migrate.toml, \
                 export MIGRATE_EXECUTOR_CMD, or pass --simulate"
            );
        };
        Ok(Arc::new(
            CommandExecutor::new(command, &self.network, &self.project_dir)
                .with_timeout(self.executor_timeout),
        ))
    }

    pub fn execution_context(&self, simulate: bool) -> Result<ExecutionContext> {
        Ok(ExecutionContext::new(
            Signer::new(&self.signer),
            self.component_registry(),
            self.build_executor(simulate)?,
        ))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate_config::CONFIG_FILE;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), Some("local".into()), false).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.migrations_dir, root.join("migrations"));
        assert_eq!(config.data_dir, root.join("data"));
        assert_eq!(config.network_dir(), root.join("data/local"));
        assert_eq!(config.network, "local");
        assert_eq!(config.signer, DEFAULT_SIGNER);
        assert!(config.fork_of.is_none());
    }

    #[test]
    fn test_paths_and_fork_come_from_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[project]
migrations_dir = "deploy"
data_dir = "state"

[components]
Vault = "artifacts/Vault.json"

[networks.mainnet-fork]
fork_of = "mainnet"
"#,
        )
        .unwrap();

        let config =
            Config::new(dir.path().to_path_buf(), Some("mainnet-fork".into()), true).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.migrations_dir, root.join("deploy"));
        assert_eq!(config.data_dir, root.join("state"));
        assert_eq!(config.fork_of.as_deref(), Some("mainnet"));

        let registry = config.component_registry();
        let vault = registry.get("Vault").unwrap();
        assert_eq!(vault.artifact, Some(root.join("artifacts/Vault.json")));
        assert!(registry.get("Other").is_err());
    }

    #[test]
    fn test_missing_project_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let result = Config::new(dir.path().join("nope"), None, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_network_must_stay_inside_data_dir() {
        let dir = tempdir().unwrap();
        for name in ["../victim", "..", "/tmp/elsewhere", "a/b"] {
            let err = Config::new(dir.path().to_path_buf(), Some(name.into()), false)
                .err()
                .unwrap();
            assert!(err.to_string().contains("Invalid network name"), "{name}: {err}");
        }

        fs::write(
            dir.path().join(CONFIG_FILE),
            "[networks.local-fork]\nfork_of = \"../../victim\"\n",
        )
        .unwrap();
        let err = Config::new(dir.path().to_path_buf(), Some("local-fork".into()), false)
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("Invalid fork_of"));
    }

    #[test]
    fn test_live_executor_requires_command() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path().to_path_buf(), Some("x".into()), false).unwrap();
        config.executor_cmd = None;

        let err = config.build_executor(false).err().unwrap();
        assert!(err.to_string().contains("No executor configured"));
        assert!(config.build_executor(true).is_ok());

        config.executor_cmd = Some("true".into());
        assert!(config.execution_context(false).is_ok());
    }
}
