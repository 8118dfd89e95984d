//! Configuration view and validation commands: `migrator config`.

use anyhow::Result;
use std::path::Path;

use migrator::config::Config;
use migrator::migrate_config::{CONFIG_FILE, MigrateToml, default_config_content};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Migrator Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                MigrateToml::load(&config_path)?
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using default configuration.");
                MigrateToml::default()
            };
            println!();

            println!("[project]");
            println!(
                "  migrations_dir = \"{}\"",
                toml.project.migrations_dir.display()
            );
            println!("  data_dir = \"{}\"", toml.project.data_dir.display());
            println!("  default_network = \"{}\"", toml.project.default_network);
            println!();

            if !toml.components.is_empty() {
                println!("[components]");
                for (name, artifact) in &toml.components {
                    println!("  {} = \"{}\"", name, artifact.display());
                }
                println!();
            }

            if !toml.networks.is_empty() {
                println!("[networks]");
                for (name, network) in &toml.networks {
                    match &network.fork_of {
                        Some(source) => println!("  {} (fork of {})", name, source),
                        None => println!("  {}", name),
                    }
                }
                println!();
            }

            // Effective values include environment and CLI overrides
            let config = Config::new(project_dir.to_path_buf(), cli.network.clone(), cli.verbose)?;
            println!("Effective values (with env/CLI overrides):");
            println!("  network = \"{}\"", config.network);
            println!("  signer = \"{}\"", config.signer);
            match &config.executor_cmd {
                Some(cmd) => println!("  executor = \"{}\"", cmd),
                None => println!("  executor = (none; only --simulate runs are possible)"),
            }
            if let Some(secs) = config.executor_timeout {
                println!("  executor timeout = {}s", secs);
            }
            println!("  state dir = \"{}\"", config.network_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = MigrateToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::write(&config_path, default_config_content())?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] migrations_dir, data_dir, default_network");
            println!("  - [executor] command, timeout_secs");
            println!("  - [networks.\"name\"] fork_of");
            println!();
        }
    }

    Ok(())
}
