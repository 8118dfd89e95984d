//! The migration engine.
//!
//! ```text
//! Idle -> Running -> Completed
//!              |---> RollingBack -> RolledBack
//!              |          '------> AbortedUnrecoverable
//!              '---> AbortedUnrecoverable
//! ```
//!
//! Forward-apply failures abort without compensation: nothing of the failed unit was
//! checkpointed and whatever it did to the live environment is left for the operator.

pub mod events;
pub mod ledger;
pub mod runner;

pub use events::{MigrationEvent, RunObserver};
pub use ledger::RunLedger;
pub use runner::{
    EXIT_ABORTED, EXIT_ROLLED_BACK, EngineState, MigrationEngine, RunOutcome, RunReport,
};
