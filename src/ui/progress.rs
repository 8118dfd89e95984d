use crate::engine::{MigrationEvent, RunObserver, RunOutcome, RunReport};
use crate::migration::Phase;
use crate::ui::icons::{CHECK, CLOCK, CROSS, REVERT, RUNNING, SAVE, SPARKLE, VERIFY, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Terminal UI for a migration run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Run bar: how many pending migrations have been checkpointed
/// - Unit bar: spinner with the migration and phase currently executing
pub struct MigrationUI {
    multi: MultiProgress,
    run_bar: ProgressBar,
    unit_bar: ProgressBar,
    verbose: bool,
    started: Instant,
}

impl MigrationUI {
    /// Create the UI for a run of `total` pending migrations.
    pub fn new(network: &str, total: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let run_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let run_bar = multi.add(ProgressBar::new(total));
        run_bar.set_style(run_style);
        run_bar.set_prefix("Migrations");
        run_bar.set_message(format!("{}", style(network).yellow()));

        let unit_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let unit_bar = multi.add(ProgressBar::new_spinner());
        unit_bar.set_style(unit_style);
        unit_bar.set_prefix("      Unit");

        Self {
            multi,
            run_bar,
            unit_bar,
            verbose,
            started: Instant::now(),
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Stop the bars and print the run summary to stdout.
    pub fn finish(&self, report: &RunReport) {
        self.unit_bar.finish_and_clear();
        self.run_bar.finish_and_clear();

        let elapsed = format_elapsed(self.started.elapsed());
        match &report.outcome {
            RunOutcome::Completed => println!(
                "\n{} {} migration(s) applied, checkpoint {} {}{}\n",
                SPARKLE,
                style(report.applied.len()).green().bold(),
                style(report.checkpoint).cyan(),
                CLOCK,
                elapsed
            ),
            RunOutcome::RolledBack { cause } => println!(
                "\n{} Rolled back {} migration(s) to checkpoint {}\n   {}\n",
                WARN,
                style(report.reverted.len()).yellow().bold(),
                style(report.checkpoint).cyan(),
                style(cause).yellow()
            ),
            RunOutcome::AbortedUnrecoverable { cause } => println!(
                "\n{} Aborted. Durable checkpoint is {}; manual recovery required.\n   {}\n",
                CROSS,
                style(report.checkpoint).cyan(),
                style(cause).red()
            ),
        }
    }
}

impl RunObserver for MigrationUI {
    fn on_phase_start(&self, key: i64, name: &str, phase: Phase) {
        let icon = match phase {
            Phase::Up => RUNNING,
            Phase::HealthCheck => VERIFY,
            Phase::Down => REVERT,
        };
        self.unit_bar.set_message(format!(
            "{}{} {}",
            icon,
            style(name).cyan(),
            style(format!("({})", phase)).dim()
        ));
        self.unit_bar.enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "    {} {} {}",
                style("→").dim(),
                style(key).dim(),
                style(phase).dim()
            ));
        }
    }

    fn on_event(&self, event: &MigrationEvent) {
        match event {
            MigrationEvent::Started { pending, checkpoint } => {
                self.print_line(format!(
                    "{} {} pending from checkpoint {}",
                    RUNNING,
                    style(pending).bold(),
                    style(checkpoint).cyan()
                ));
            }
            MigrationEvent::Applied { .. } => {}
            MigrationEvent::Verified { name, .. } => {
                self.run_bar.inc(1);
                self.print_line(format!("{} {}", CHECK, style(name).green()));
            }
            MigrationEvent::Checkpointed { latest_migration } => {
                if self.verbose {
                    self.print_line(format!(
                        "    {} checkpoint {}",
                        SAVE,
                        style(latest_migration).dim()
                    ));
                }
            }
            MigrationEvent::VerifyFailed { name, error, .. } => {
                self.print_line(format!(
                    "{} Health check of {} failed: {}",
                    CROSS,
                    style(name).red().bold(),
                    error
                ));
            }
            MigrationEvent::Reverting { name, .. } => {
                self.print_line(format!("{} Reverting {}", REVERT, style(name).yellow()));
            }
            MigrationEvent::Reverted { .. } => {
                self.run_bar.set_position(self.run_bar.position().saturating_sub(1));
            }
            MigrationEvent::Aborted {
                name, phase, error, ..
            } => {
                let phase = phase.map_or_else(|| "checkpoint".to_string(), |p| p.to_string());
                self.unit_bar
                    .finish_with_message(format!("{} {} failed during {}", CROSS, name, phase));
                if self.verbose {
                    self.print_line(format!("    {}", style(error).red()));
                }
            }
            MigrationEvent::Finished { .. } => {
                self.unit_bar.finish_and_clear();
            }
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
