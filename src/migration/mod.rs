//! Migration units and their resolution.
//!
//! A unit is a named transformation of the network state with three operations:
//! `up` produces the new state, `health_check` verifies it against the prior state, and
//! `down` compensates a verified-or-not `up` by issuing inverse operations.

pub mod manifest;
pub mod registry;
pub mod template;

pub use manifest::ManifestMigration;
pub use registry::{MigrationRegistry, ResolvedMigration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::execution::ExecutionContext;
use crate::state::NetworkState;

/// The operation a unit was executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Up,
    HealthCheck,
    Down,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Up => write!(f, "up"),
            Phase::HealthCheck => write!(f, "health check"),
            Phase::Down => write!(f, "down"),
        }
    }
}

#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the change and return the new network state.
    ///
    /// `state` is the unit's own copy; the engine keeps the prior snapshot separately.
    async fn up(&self, ctx: &ExecutionContext, state: NetworkState)
    -> anyhow::Result<NetworkState>;

    /// Verify the state `up` produced. Any error triggers a rollback.
    async fn health_check(
        &self,
        ctx: &ExecutionContext,
        previous: &NetworkState,
        current: &NetworkState,
    ) -> anyhow::Result<()>;

    /// Undo the change, given the state before `up` and the state to revert from.
    async fn down(
        &self,
        ctx: &ExecutionContext,
        previous: NetworkState,
        current: NetworkState,
    ) -> anyhow::Result<NetworkState>;

    /// Content fingerprint recorded in the run history, if the unit has one.
    fn checksum(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Up.to_string(), "up");
        assert_eq!(Phase::HealthCheck.to_string(), "health check");
        assert_eq!(Phase::Down.to_string(), "down");
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Phase::HealthCheck).unwrap(),
            serde_json::json!("health_check")
        );
    }
}
