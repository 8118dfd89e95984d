//! Migration listing, status, reset, and run history commands.

use anyhow::Result;
use console::style;
use std::path::Path;

use migrator::audit::{AuditLogger, RunOutcomeRecord};
use migrator::catalog::{discover, pending};
use migrator::config::Config;
use migrator::init::is_initialized;
use migrator::state::StateStore;
use migrator::ui::icons::{CHECK, CLOCK, CROSS, WARN};

use super::super::Cli;

fn load_config(cli: &Cli, project_dir: &Path) -> Result<Config> {
    Config::new(project_dir.to_path_buf(), cli.network.clone(), cli.verbose)
}

pub fn cmd_list(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let catalog = discover(&config.migrations_dir)?;

    if catalog.is_empty() {
        println!();
        println!(
            "No migrations found in {}. Run 'migrator new <name>' to create one.",
            config.migrations_dir.display()
        );
        println!();
        return Ok(());
    }

    let latest = config
        .state_store()
        .load(&config.network)?
        .latest_migration();

    println!();
    println!("Migrations for network '{}':", config.network);
    println!();
    println!("{:<10} {:<16} Name", "Status", "Key");
    println!("{:<10} {:<16} ----", "------", "---");
    for descriptor in &catalog {
        let status = if descriptor.key <= latest {
            style("applied").green()
        } else {
            style("pending").yellow()
        };
        println!("{:<10} {:<16} {}", status, descriptor.key, descriptor.name);
    }
    println!();
    Ok(())
}

pub fn cmd_status(cli: &Cli, project_dir: &Path) -> Result<()> {
    println!();
    println!("Migration Status");
    println!("================");
    println!();

    if !is_initialized(project_dir) {
        println!("Project: Not initialized (using defaults)");
        println!();
        println!("Run 'migrator init' to create migrate.toml.");
        println!();
    }

    let config = load_config(cli, project_dir)?;
    let store = config.state_store();

    println!("Network:    {}", config.network);
    if let Some(ref source) = config.fork_of {
        println!("Fork of:    {}", source);
    }
    println!("Migrations: {}", config.migrations_dir.display());

    if !store.exists(&config.network) {
        println!("State:      none (run 'migrator migrate' to initialize)");
    } else {
        println!("State:      {}", store.state_file(&config.network).display());
    }

    let state = store.load(&config.network)?;
    let catalog = discover(&config.migrations_dir)?;
    let waiting = pending(&catalog, state.latest_migration());

    println!();
    if state.has_applied_any() {
        println!("Checkpoint: {}", style(state.latest_migration()).cyan());
    } else {
        println!("Checkpoint: {} (nothing applied)", state.latest_migration());
    }
    println!("Applied:    {}", catalog.len() - waiting.len());
    println!("Pending:    {}", waiting.len());
    for descriptor in &waiting {
        println!("  {}", descriptor.name);
    }
    if !state.network_state.is_empty() {
        println!();
        println!("Recorded state keys:");
        for key in state.network_state.keys() {
            println!("  {}", key);
        }
    }

    let logger = AuditLogger::new(&config.network_dir());
    if logger.load_interrupted()?.is_some() {
        println!();
        println!(
            "{} A previous run did not finish. See 'migrator history'.",
            WARN
        );
    }
    println!();
    Ok(())
}

pub fn cmd_reset(cli: &Cli, project_dir: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(cli, project_dir)?;
    let store = config.state_store();

    if !store.exists(&config.network) && !config.network_dir().exists() {
        println!("Nothing to reset for network '{}'", config.network);
        return Ok(());
    }

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "This will delete all migration state for '{}'. Are you sure?",
                config.network
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    store.reset(&config.network)?;
    println!("Reset complete for network '{}'", config.network);
    Ok(())
}

pub fn cmd_history(cli: &Cli, project_dir: &Path, limit: usize) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let logger = AuditLogger::new(&config.network_dir());

    println!();
    if let Some(run) = logger.load_interrupted()? {
        println!(
            "{} Interrupted run {} started {} ({} migration(s) pending)",
            WARN,
            &run.run_id.to_string()[..8],
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.migrations.len()
        );
        println!();
    }

    let runs = logger.list_runs()?;
    if runs.is_empty() {
        println!("No recorded runs for network '{}'", config.network);
        println!();
        return Ok(());
    }

    println!("Runs for network '{}' (most recent first):", config.network);
    println!();
    for path in runs.iter().take(limit) {
        let run = match logger.load_run(path) {
            Ok(run) => run,
            Err(e) => {
                println!("  {} {}: {}", CROSS, path.display(), e);
                continue;
            }
        };

        let icon = match run.outcome {
            RunOutcomeRecord::Completed => CHECK,
            RunOutcomeRecord::RolledBack { .. } => WARN,
            RunOutcomeRecord::AbortedUnrecoverable { .. } | RunOutcomeRecord::InProgress => {
                CROSS
            }
        };
        let duration = run
            .duration_secs()
            .map(|s| format!(" {}{}s", CLOCK, s))
            .unwrap_or_default();
        let checkpoint = run
            .checkpoint
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {}{} {} {} applied, {} reverted, checkpoint {}{}",
            icon,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            style(&run.outcome).bold(),
            run.applied.len(),
            run.reverted.len(),
            checkpoint,
            duration
        );
        if cli.verbose {
            for migration in &run.migrations {
                println!("      {}", migration.name);
            }
        }
        match run.outcome {
            RunOutcomeRecord::RolledBack { ref cause }
            | RunOutcomeRecord::AbortedUnrecoverable { ref cause } => {
                println!("      {}", style(cause).dim());
            }
            _ => {}
        }
    }
    println!();
    Ok(())
}
