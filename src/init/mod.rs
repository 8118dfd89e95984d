//! `migrator init`: lay out a migration project.
//!
//! ```text
//! <project>/
//! ├── migrate.toml     # Project configuration
//! ├── migrations/      # <key>_<description>.toml units
//! └── data/            # Per-network state.json and run records
//! ```
//!
//! Directory names follow `migrate.toml` when it already exists.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::migrate_config::{CONFIG_FILE, MigrateToml, default_config_content};

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    pub config_file: PathBuf,
    pub migrations_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Whether `migrate.toml` was newly written (false if it already existed)
    pub created: bool,
}

/// Initialize a migration project in `project_dir`. Existing files are left alone; missing
/// directories are created.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let config_file = project_dir.join(CONFIG_FILE);

    let created = if config_file.exists() {
        false
    } else {
        std::fs::create_dir_all(project_dir).with_context(|| {
            format!("Failed to create project directory: {}", project_dir.display())
        })?;
        std::fs::write(&config_file, default_config_content())
            .with_context(|| format!("Failed to write {}", config_file.display()))?;
        true
    };

    let toml = MigrateToml::load(&config_file)?;
    let migrations_dir = project_dir.join(&toml.project.migrations_dir);
    let data_dir = project_dir.join(&toml.project.data_dir);

    std::fs::create_dir_all(&migrations_dir).with_context(|| {
        format!(
            "Failed to create migrations directory: {}",
            migrations_dir.display()
        )
    })?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

    tracing::debug!(project = %project_dir.display(), created, "project initialized");

    Ok(InitResult {
        config_file,
        migrations_dir,
        data_dir,
        created,
    })
}

/// Check if a project has a `migrate.toml`.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(CONFIG_FILE).is_file()
}
