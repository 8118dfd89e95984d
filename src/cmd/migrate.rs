//! `migrator migrate`: apply pending migrations to the selected network.

use anyhow::Result;
use console::style;
use std::path::Path;

use migrator::audit::{AuditLogger, MigrationAudit, RunConfig};
use migrator::catalog::discover;
use migrator::config::Config;
use migrator::engine::MigrationEngine;
use migrator::migration::MigrationRegistry;
use migrator::state::{FileStateStore, MemoryStateStore, StateStore, prepare_state};
use migrator::ui::MigrationUI;
use migrator::ui::icons::{CHECK, WARN};

use super::super::Cli;

/// Run the migrate command and return the process exit code.
pub async fn cmd_migrate(cli: &Cli, project_dir: &Path, reset: bool, simulate: bool) -> Result<i32> {
    let config = Config::new(project_dir.to_path_buf(), cli.network.clone(), cli.verbose)?;
    let network = config.network.as_str();

    let catalog = discover(&config.migrations_dir)?;
    // Every manifest must load before any state is touched, including by --reset.
    let resolved = MigrationRegistry::new().resolve_all(&catalog)?;

    let file_store = config.state_store();
    let simulated_store;
    let store: &dyn StateStore = if simulate {
        simulated_store = preload_simulation(&file_store, network, config.fork_of.as_deref())?;
        &simulated_store
    } else {
        &file_store
    };

    let initial = prepare_state(store, network, reset, config.fork_of.as_deref())?;
    let units: Vec<_> = resolved
        .into_iter()
        .filter(|unit| unit.key() > initial.latest_migration())
        .collect();

    if simulate {
        println!(
            "{} Simulating against '{}'; nothing will be written",
            WARN,
            style(network).yellow()
        );
    }

    if units.is_empty() {
        println!(
            "{} '{}' is up to date at checkpoint {}",
            CHECK,
            style(network).yellow(),
            style(initial.latest_migration()).cyan()
        );
        return Ok(0);
    }

    let ctx = config.execution_context(simulate)?;

    let mut audit = if simulate {
        None
    } else {
        let mut logger = AuditLogger::new(&config.network_dir());
        if let Some(interrupted) = logger.load_interrupted()? {
            tracing::warn!(
                run_id = %interrupted.run_id,
                started_at = %interrupted.started_at,
                "previous run never finished; its record is replaced"
            );
        }
        let run_config = RunConfig {
            project_dir: config.project_dir.clone(),
            simulate,
            reset,
            fork_of: config.fork_of.clone(),
            executor: config.executor_cmd.clone(),
            signer: config.signer.clone(),
        };
        logger.start_run(
            network,
            run_config,
            units.iter().map(MigrationAudit::from).collect(),
        )?;
        Some(logger)
    };

    let ui = MigrationUI::new(network, units.len() as u64, cli.verbose);
    let report = MigrationEngine::new(store, network, &ctx)
        .with_observer(&ui)
        .run(&units, initial)
        .await;
    ui.finish(&report);

    if let Some(ref mut logger) = audit {
        let run_file = logger.finish_run(&report)?;
        if cli.verbose {
            println!("Run record: {}", run_file.display());
        }
    }

    Ok(report.outcome.exit_code())
}

/// Copy the persisted documents a simulated run may read into memory.
fn preload_simulation(
    file_store: &FileStateStore,
    network: &str,
    fork_of: Option<&str>,
) -> Result<MemoryStateStore> {
    let memory = MemoryStateStore::new();
    for name in std::iter::once(network).chain(fork_of) {
        if file_store.exists(name) {
            memory.preload(name, file_store.load(name)?)?;
        }
    }
    Ok(memory)
}
