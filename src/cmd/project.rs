//! Project initialization and migration scaffolding commands.

use anyhow::{Context, Result, bail};
use std::path::Path;

use migrator::catalog::{KEY_DELIMITER, MIGRATION_EXTENSION};
use migrator::config::Config;
use migrator::migration::manifest::scaffold;

use super::super::Cli;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use migrator::init::init_project;

    let result = init_project(project_dir)?;

    if result.created {
        println!("Initialized migration project at {}", project_dir.display());
        println!();
        println!("Created:");
        println!("  migrate.toml   # Project configuration");
        println!("  migrations/    # Migration manifests");
        println!("  data/          # Per-network state and run records");
        println!();
        println!("Next steps:");
        println!("  1. Set [executor] command in migrate.toml");
        println!("  2. Run `migrator new <name>` to create a migration");
        println!("  3. Run `migrator migrate --simulate` to preview it");
    } else {
        println!(
            "Project already initialized at {}",
            result.config_file.display()
        );
        println!("Directory structure verified.");
    }

    Ok(())
}

/// Scaffold `<unix-timestamp>_<name>.toml` in the migrations directory.
pub fn cmd_new(cli: &Cli, project_dir: &Path, name: &str) -> Result<()> {
    let slug = slugify(name);
    if slug.is_empty() {
        bail!("Migration name '{}' has no usable characters", name);
    }

    let config = Config::new(project_dir.to_path_buf(), cli.network.clone(), cli.verbose)?;
    std::fs::create_dir_all(&config.migrations_dir).with_context(|| {
        format!(
            "Failed to create migrations directory: {}",
            config.migrations_dir.display()
        )
    })?;

    let key = chrono::Utc::now().timestamp();
    let file_name = format!("{key}{KEY_DELIMITER}{slug}.{MIGRATION_EXTENSION}");
    let path = config.migrations_dir.join(&file_name);
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    std::fs::write(&path, scaffold(name))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {}", path.display());
    Ok(())
}

/// Lowercase, with runs of anything but ASCII alphanumerics collapsed to `_`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}
