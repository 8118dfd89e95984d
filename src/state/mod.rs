//! Persisted system state and the stores that own it.
//!
//! A network's state document lives at `<data_dir>/<network>/state.json`:
//!
//! ```json
//! {
//!   "migrationState": { "latestMigration": 4 },
//!   "networkState": { "proxyAdmin": "0x...", "vault": "0x..." }
//! }
//! ```
//!
//! The engine is the only writer during a run; every write replaces the whole document.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::errors::{MigrationError, StateError};

/// Sentinel for "no migration applied yet".
pub const NO_MIGRATION: i64 = -1;

/// Open-ended mapping from component name to deployed address or metadata.
pub type NetworkState = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    pub latest_migration: i64,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self {
            latest_migration: NO_MIGRATION,
        }
    }
}

/// The unit of persisted truth for one network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub migration_state: MigrationState,
    #[serde(default)]
    pub network_state: NetworkState,
}

impl SystemState {
    /// The zero state: nothing applied, nothing deployed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(latest_migration: i64, network_state: NetworkState) -> Self {
        Self {
            migration_state: MigrationState { latest_migration },
            network_state,
        }
    }

    pub fn latest_migration(&self) -> i64 {
        self.migration_state.latest_migration
    }

    pub fn has_applied_any(&self) -> bool {
        self.latest_migration() != NO_MIGRATION
    }
}

/// Check that `network` names exactly one directory below the data root.
///
/// Empty names, `.`, `..`, absolute paths and anything containing a separator are
/// rejected, so a network's data can never resolve outside the root.
pub fn validate_network_name(network: &str) -> Result<(), StateError> {
    let invalid = || StateError::InvalidNetwork {
        network: network.to_string(),
    };
    if network.trim().is_empty() || network.contains(['/', '\\']) {
        return Err(invalid());
    }
    let mut components = Path::new(network).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Durable storage for per-network state documents.
///
/// `save` must replace the document atomically: a crash mid-write leaves either the
/// previous document or the new one, never a partial one.
pub trait StateStore: Send + Sync {
    /// Whether a document exists for the network.
    fn exists(&self, network: &str) -> bool;

    /// Read the network's document, or the zero state if none exists (not persisted).
    fn load(&self, network: &str) -> Result<SystemState, StateError>;

    /// Replace the network's document.
    fn save(&self, network: &str, state: &SystemState) -> Result<(), StateError>;

    /// Remove all persisted data for the network.
    fn reset(&self, network: &str) -> Result<(), StateError>;

    /// Write the zero state if the network has no document yet.
    fn ensure_initialized(&self, network: &str) -> Result<(), StateError> {
        if !self.exists(network) {
            self.save(network, &SystemState::empty())?;
        }
        Ok(())
    }

    /// Load the fork source's document as a new starting point.
    fn seed_from_fork(&self, source_network: &str) -> Result<SystemState, MigrationError> {
        if !self.exists(source_network) {
            return Err(MigrationError::MissingForkSource {
                source_network: source_network.to_string(),
            });
        }
        Ok(self.load(source_network)?)
    }
}

/// Bring a network's state document into a runnable condition and return it.
///
/// With `reset`, the network's data is destroyed first. When no document exists
/// afterwards, the fork source's state is written if the network is a fork being reset,
/// otherwise the zero state.
pub fn prepare_state<S: StateStore + ?Sized>(
    store: &S,
    network: &str,
    reset: bool,
    fork_of: Option<&str>,
) -> Result<SystemState, MigrationError> {
    if reset {
        tracing::warn!(network, "resetting migration state");
        store.reset(network)?;
    }

    if !store.exists(network) {
        match fork_of {
            Some(source) if reset => {
                tracing::warn!(network, source, "seeding state from fork source");
                let seeded = store.seed_from_fork(source)?;
                store.save(network, &seeded)?;
            }
            _ => store.ensure_initialized(network)?,
        }
    }

    Ok(store.load(network)?)
}
