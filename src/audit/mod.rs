use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::engine::{MigrationEvent, RunOutcome, RunReport};
use crate::migration::ResolvedMigration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub network: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    /// Pending units of the run, in execution order.
    pub migrations: Vec<MigrationAudit>,
    pub outcome: RunOutcomeRecord,
    /// `latestMigration` left durable when the run ended.
    pub checkpoint: Option<i64>,
    #[serde(default)]
    pub applied: Vec<i64>,
    #[serde(default)]
    pub reverted: Vec<i64>,
    #[serde(default)]
    pub events: Vec<MigrationEvent>,
}

impl AuditRun {
    pub fn new(network: &str, config: RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            network: network.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            migrations: Vec::new(),
            outcome: RunOutcomeRecord::InProgress,
            checkpoint: None,
            applied: Vec::new(),
            reverted: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Record the report of a finished run.
    pub fn finish(&mut self, report: &RunReport) {
        self.ended_at = Some(Utc::now());
        self.outcome = RunOutcomeRecord::from(&report.outcome);
        self.checkpoint = Some(report.checkpoint);
        self.applied = report.applied.clone();
        self.reverted = report.reverted.clone();
        self.events = report.events.clone();
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub project_dir: PathBuf,
    pub simulate: bool,
    pub reset: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    pub signer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationAudit {
    pub key: i64,
    pub name: String,
    /// SHA-256 of the manifest, for units backed by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl From<&ResolvedMigration> for MigrationAudit {
    fn from(unit: &ResolvedMigration) -> Self {
        Self {
            key: unit.key(),
            name: unit.name().to_string(),
            checksum: unit.unit.checksum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunOutcomeRecord {
    InProgress,
    Completed,
    RolledBack { cause: String },
    AbortedUnrecoverable { cause: String },
}

impl From<&RunOutcome> for RunOutcomeRecord {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunOutcomeRecord::Completed,
            RunOutcome::RolledBack { cause } => RunOutcomeRecord::RolledBack {
                cause: cause.to_string(),
            },
            RunOutcome::AbortedUnrecoverable { cause } => RunOutcomeRecord::AbortedUnrecoverable {
                cause: cause.to_string(),
            },
        }
    }
}

impl std::fmt::Display for RunOutcomeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcomeRecord::InProgress => write!(f, "in progress"),
            RunOutcomeRecord::Completed => write!(f, "completed"),
            RunOutcomeRecord::RolledBack { .. } => write!(f, "rolled back"),
            RunOutcomeRecord::AbortedUnrecoverable { .. } => write!(f, "aborted"),
        }
    }
}

pub mod logger;
pub use logger::AuditLogger;
