use serde::{Deserialize, Serialize};

use crate::migration::Phase;

/// Something the engine did, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    /// A run began with this many pending units.
    Started { pending: usize, checkpoint: i64 },
    /// `up` of a unit returned.
    Applied { key: i64, name: String },
    /// The unit's health check passed.
    Verified { key: i64, name: String },
    /// A state document was written.
    Checkpointed { latest_migration: i64 },
    VerifyFailed {
        key: i64,
        name: String,
        error: String,
    },
    /// `down` of a unit is about to run.
    Reverting {
        key: i64,
        name: String,
        ledger_index: usize,
    },
    Reverted { key: i64, name: String },
    /// The run stopped without a clean outcome.
    Aborted {
        key: i64,
        name: String,
        /// `None` when the failure was a checkpoint write, not a unit call.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
        error: String,
        checkpoint: i64,
    },
    Finished { outcome: String, checkpoint: i64 },
}

impl MigrationEvent {
    pub fn label(&self) -> &'static str {
        match self {
            MigrationEvent::Started { .. } => "started",
            MigrationEvent::Applied { .. } => "applied",
            MigrationEvent::Verified { .. } => "verified",
            MigrationEvent::Checkpointed { .. } => "checkpointed",
            MigrationEvent::VerifyFailed { .. } => "verify_failed",
            MigrationEvent::Reverting { .. } => "reverting",
            MigrationEvent::Reverted { .. } => "reverted",
            MigrationEvent::Aborted { .. } => "aborted",
            MigrationEvent::Finished { .. } => "finished",
        }
    }
}

/// Receives engine events as they happen, e.g. to drive progress output.
pub trait RunObserver: Send + Sync {
    /// A unit is about to run `phase`.
    fn on_phase_start(&self, _key: i64, _name: &str, _phase: Phase) {}

    fn on_event(&self, event: &MigrationEvent);
}
