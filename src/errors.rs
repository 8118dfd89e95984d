//! Typed error hierarchy for the migrator.
//!
//! Four enums cover the subsystems:
//! - `MigrationError`: catalog discovery, setup and engine failures
//! - `StateError`: persisted state document failures
//! - `ManifestError`: declarative migration manifest failures
//! - `ExecutorError`: failures reported by the execution backend

use std::path::PathBuf;
use thiserror::Error;

use crate::migration::Phase;

/// Errors from discovery, setup and the migration engine.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Malformed migration name '{name}': expected '<number>_<description>'")]
    MalformedMigrationName { name: String },

    #[error("Duplicate migration key {key}: '{first}' and '{second}'")]
    DuplicateMigrationKey {
        key: i64,
        first: String,
        second: String,
    },

    #[error("No implementation found for migration '{name}'")]
    UnknownMigration { name: String },

    #[error("Migration '{name}' has an invalid manifest: {source}")]
    InvalidManifest {
        name: String,
        #[source]
        source: ManifestError,
    },

    #[error("Fork source network '{source_network}' has no persisted state, aborting")]
    MissingForkSource { source_network: String },

    #[error("Migration {key} ({name}) failed to apply: {source}")]
    ForwardApplyFailed {
        key: i64,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Health check of migration {key} ({name}) failed: {source}")]
    VerifyFailed {
        key: i64,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "Reverting migration {key} ({name}) failed at ledger index {ledger_index}; \
         manual recovery must resume from checkpoint {checkpoint}: {source}"
    )]
    ReverseApplyFailed {
        key: i64,
        name: String,
        ledger_index: usize,
        checkpoint: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to checkpoint state after migration {key} ({name}): {source}")]
    CheckpointFailed {
        key: i64,
        name: String,
        #[source]
        source: StateError,
    },

    #[error("Failed to read migrations directory {path}: {source}")]
    DiscoveryFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

impl MigrationError {
    /// The phase in which a unit failed, if this error came from a unit.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            MigrationError::ForwardApplyFailed { .. } => Some(Phase::Up),
            MigrationError::VerifyFailed { .. } => Some(Phase::HealthCheck),
            MigrationError::ReverseApplyFailed { .. } => Some(Phase::Down),
            _ => None,
        }
    }
}

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file at {path} is not a valid state document: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to remove state directory {path}: {source}")]
    ResetFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No persisted state for network '{network}'")]
    NotFound { network: String },

    #[error("Invalid network name '{network}': must be a single path segment")]
    InvalidNetwork { network: String },
}

/// Errors from declarative migration manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Template '{template}' references unknown path '{path}'")]
    UnresolvedPath { template: String, path: String },

    #[error("Template '{template}' resolved to a non-scalar value and cannot be interpolated")]
    NonScalarInterpolation { template: String },

    #[error("Expected an address string for '{field}', got {value}")]
    NotAnAddress { field: String, value: String },

    #[error("Check {method} on {target}: expected {expected}, got {actual}")]
    CheckMismatch {
        method: String,
        target: String,
        expected: String,
        actual: String,
    },

    #[error("Required state key '{key}' is missing after migration")]
    MissingStateKey { key: String },

    #[error("State key '{key}' changed: was {before}, now {after}")]
    StateKeyChanged {
        key: String,
        before: String,
        after: String,
    },
}

/// Errors from the execution backend.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn executor command '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Executor command exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("Executor timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("Executor returned malformed output: {0}")]
    MalformedResponse(String),

    #[error("Executor rejected {op}: {message}")]
    Rejected { op: String, message: String },

    #[error("Unknown component '{0}'")]
    UnknownComponent(String),

    #[error("No deployed instance at {0}")]
    UnknownInstance(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
