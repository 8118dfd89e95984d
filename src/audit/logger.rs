use super::{AuditRun, MigrationAudit, RunConfig};
use crate::engine::RunReport;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes run records under a network's data directory.
///
/// While a run is in flight it lives in `current-run.json`; a leftover file means the
/// process died mid-run. Finished runs move to `runs/<timestamp>_<id>.json`.
pub struct AuditLogger {
    audit_dir: PathBuf,
    current_run: Option<AuditRun>,
    current_run_file: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        let current_run_file = audit_dir.join("current-run.json");
        Self {
            audit_dir: audit_dir.to_path_buf(),
            current_run: None,
            current_run_file,
        }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.audit_dir.join("runs")
    }

    pub fn start_run(
        &mut self,
        network: &str,
        config: RunConfig,
        migrations: Vec<MigrationAudit>,
    ) -> Result<()> {
        fs::create_dir_all(self.runs_dir()).context("Failed to create runs directory")?;
        let mut run = AuditRun::new(network, config);
        run.migrations = migrations;
        self.current_run = Some(run);
        self.save_current()?;
        Ok(())
    }

    pub fn finish_run(&mut self, report: &RunReport) -> Result<PathBuf> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No current run to finish"))?;

        run.finish(report);

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run.run_id.to_string()[..8]
        );
        let run_file = self.audit_dir.join("runs").join(&filename);

        let json = serde_json::to_string_pretty(&run).context("Failed to serialize audit run")?;
        fs::write(&run_file, json).context("Failed to write audit run file")?;

        if self.current_run_file.exists() {
            fs::remove_file(&self.current_run_file)
                .context("Failed to remove current-run.json after finishing run")?;
        }

        self.current_run = None;
        Ok(run_file)
    }

    pub fn save_current(&self) -> Result<()> {
        if let Some(ref run) = self.current_run {
            let json =
                serde_json::to_string_pretty(&run).context("Failed to serialize current run")?;
            fs::write(&self.current_run_file, json).context("Failed to write current run file")?;
        }
        Ok(())
    }

    /// Load a run left behind by a process that never finished it.
    pub fn load_interrupted(&self) -> Result<Option<AuditRun>> {
        if !self.current_run_file.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.current_run_file)
            .context("Failed to read current run file")?;
        let run: AuditRun =
            serde_json::from_str(&content).context("Failed to parse current run file")?;
        Ok(Some(run))
    }

    pub fn current_run(&self) -> Option<&AuditRun> {
        self.current_run.as_ref()
    }

    /// Finished run files, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let runs_dir = self.runs_dir();
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<AuditRun> {
        let content = fs::read_to_string(path).context("Failed to read audit run file")?;
        let run: AuditRun =
            serde_json::from_str(&content).context("Failed to parse audit run file")?;
        Ok(run)
    }
}
