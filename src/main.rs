use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "migrator")]
#[command(version, about = "Checkpointed, self-verifying deployment migrations")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Network to operate on. Defaults to MIGRATE_NETWORK, then migrate.toml.
    #[arg(short, long, global = true)]
    pub network: Option<String>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new migration project
    Init,
    /// Apply pending migrations
    Migrate {
        /// Delete the network's state first (re-seeding forks from their source)
        #[arg(long)]
        reset: bool,
        /// Run against a simulated environment without writing anything
        #[arg(long)]
        simulate: bool,
    },
    /// Show the network's checkpoint and pending migrations
    Status,
    /// List migrations with their applied/pending status
    List,
    /// Delete the network's migration state
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// Create a new migration manifest
    New {
        /// Short description, used in the file name
        name: String,
    },
    /// Show recorded runs for the network
    History {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default migrate.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    migrator::logging::init_logging(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Migrate { reset, simulate } => {
            let code = cmd::cmd_migrate(&cli, &project_dir, *reset, *simulate).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Status => cmd::cmd_status(&cli, &project_dir)?,
        Commands::List => cmd::cmd_list(&cli, &project_dir)?,
        Commands::Reset { force } => cmd::cmd_reset(&cli, &project_dir, *force)?,
        Commands::New { name } => cmd::cmd_new(&cli, &project_dir, name)?,
        Commands::History { limit } => cmd::cmd_history(&cli, &project_dir, *limit)?,
        Commands::Config { command } => cmd::cmd_config(&cli, &project_dir, command.clone())?,
    }

    Ok(())
}
