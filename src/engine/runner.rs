use serde::Serialize;

use super::events::{MigrationEvent, RunObserver};
use super::ledger::RunLedger;
use crate::errors::MigrationError;
use crate::execution::ExecutionContext;
use crate::migration::{Phase, ResolvedMigration};
use crate::state::{StateStore, SystemState};

/// Process exit code of a run that rolled back to its starting point.
pub const EXIT_ROLLED_BACK: i32 = 2;

/// Process exit code of a run that stopped part-way and needs an operator.
pub const EXIT_ABORTED: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    RollingBack,
    Completed,
    RolledBack,
    AbortedUnrecoverable,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Completed | EngineState::RolledBack | EngineState::AbortedUnrecoverable
        )
    }

    pub fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Completed)
                | (Running, Completed)
                | (Running, RollingBack)
                | (Running, AbortedUnrecoverable)
                | (RollingBack, RolledBack)
                | (RollingBack, AbortedUnrecoverable)
        )
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every pending unit applied, verified and checkpointed.
    Completed,
    /// A health check failed and every unit of the run was reverted.
    RolledBack { cause: MigrationError },
    /// A forward apply, reverse apply or checkpoint write failed. The persisted state is
    /// the last checkpoint and may not match the live environment.
    AbortedUnrecoverable { cause: MigrationError },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::RolledBack { .. } => EXIT_ROLLED_BACK,
            RunOutcome::AbortedUnrecoverable { .. } => EXIT_ABORTED,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::RolledBack { .. } => "rolled_back",
            RunOutcome::AbortedUnrecoverable { .. } => "aborted_unrecoverable",
        }
    }

    pub fn cause(&self) -> Option<&MigrationError> {
        match self {
            RunOutcome::Completed => None,
            RunOutcome::RolledBack { cause } | RunOutcome::AbortedUnrecoverable { cause } => {
                Some(cause)
            }
        }
    }

    pub fn engine_state(&self) -> EngineState {
        match self {
            RunOutcome::Completed => EngineState::Completed,
            RunOutcome::RolledBack { .. } => EngineState::RolledBack,
            RunOutcome::AbortedUnrecoverable { .. } => EngineState::AbortedUnrecoverable,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Keys checkpointed going forward, in order.
    pub applied: Vec<i64>,
    /// Keys reverted during rollback, in order.
    pub reverted: Vec<i64>,
    /// `latestMigration` of the last document successfully written (or the initial one).
    pub checkpoint: i64,
    /// The engine's working state when it stopped.
    pub final_state: SystemState,
    pub events: Vec<MigrationEvent>,
}

/// Bookkeeping for one run.
struct Run {
    state: EngineState,
    applied: Vec<i64>,
    reverted: Vec<i64>,
    checkpoint: i64,
    events: Vec<MigrationEvent>,
}

impl Run {
    fn new(checkpoint: i64) -> Self {
        Self {
            state: EngineState::Idle,
            applied: Vec::new(),
            reverted: Vec::new(),
            checkpoint,
            events: Vec::new(),
        }
    }

    fn transition(&mut self, next: EngineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid engine transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "engine transition");
        self.state = next;
    }
}

/// Applies pending migrations one at a time, checkpointing after each verified unit and
/// rolling back the whole run when a health check fails.
pub struct MigrationEngine<'a> {
    store: &'a dyn StateStore,
    network: &'a str,
    ctx: &'a ExecutionContext,
    observer: Option<&'a dyn RunObserver>,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(store: &'a dyn StateStore, network: &'a str, ctx: &'a ExecutionContext) -> Self {
        Self {
            store,
            network,
            ctx,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, run: &mut Run, event: MigrationEvent) {
        if let Some(observer) = self.observer {
            observer.on_event(&event);
        }
        run.events.push(event);
    }

    fn phase_start(&self, unit: &ResolvedMigration, phase: Phase) {
        if let Some(observer) = self.observer {
            observer.on_phase_start(unit.key(), unit.name(), phase);
        }
    }

    /// Run `pending` (ascending by key, all keys above `initial`'s checkpoint) starting
    /// from `initial`. Never returns an error: every failure is classified into the
    /// report's outcome.
    pub async fn run(&self, pending: &[ResolvedMigration], initial: SystemState) -> RunReport {
        let mut run = Run::new(initial.latest_migration());

        if pending.is_empty() {
            tracing::info!(network = self.network, "no pending migrations");
            return self.finish(run, RunOutcome::Completed, initial);
        }

        run.transition(EngineState::Running);
        tracing::info!(
            network = self.network,
            pending = pending.len(),
            checkpoint = run.checkpoint,
            "starting migration run"
        );
        let checkpoint = run.checkpoint;
        self.emit(
            &mut run,
            MigrationEvent::Started {
                pending: pending.len(),
                checkpoint,
            },
        );

        let mut ledger = RunLedger::new();
        ledger.push(initial.clone());
        let mut current = initial;

        for (index, unit) in pending.iter().enumerate() {
            tracing::info!(key = unit.key(), name = unit.name(), "applying migration");
            self.phase_start(unit, Phase::Up);

            let next_network = match unit.unit.up(self.ctx, current.network_state.clone()).await
            {
                Ok(state) => state,
                Err(source) => {
                    let cause = MigrationError::ForwardApplyFailed {
                        key: unit.key(),
                        name: unit.name().to_string(),
                        source,
                    };
                    return self.abort(run, unit, Some(Phase::Up), cause, current);
                }
            };
            self.emit(
                &mut run,
                MigrationEvent::Applied {
                    key: unit.key(),
                    name: unit.name().to_string(),
                },
            );

            self.phase_start(unit, Phase::HealthCheck);
            let verified = unit
                .unit
                .health_check(self.ctx, &ledger[index].network_state, &next_network)
                .await;

            if let Err(source) = verified {
                tracing::warn!(
                    key = unit.key(),
                    name = unit.name(),
                    error = %source,
                    "health check failed, rolling back"
                );
                self.emit(
                    &mut run,
                    MigrationEvent::VerifyFailed {
                        key: unit.key(),
                        name: unit.name().to_string(),
                        error: format!("{source:#}"),
                    },
                );
                let cause = MigrationError::VerifyFailed {
                    key: unit.key(),
                    name: unit.name().to_string(),
                    source,
                };
                // The unverified state is what the rollback starts from; its checkpoint
                // still names the last verified unit.
                let unverified = SystemState {
                    migration_state: current.migration_state.clone(),
                    network_state: next_network,
                };
                return self
                    .rollback(run, pending, &ledger, index, unverified, cause)
                    .await;
            }
            self.emit(
                &mut run,
                MigrationEvent::Verified {
                    key: unit.key(),
                    name: unit.name().to_string(),
                },
            );

            let next = SystemState::new(unit.key(), next_network);
            if let Err(source) = self.store.save(self.network, &next) {
                let cause = MigrationError::CheckpointFailed {
                    key: unit.key(),
                    name: unit.name().to_string(),
                    source,
                };
                return self.abort(run, unit, None, cause, next);
            }
            run.checkpoint = unit.key();
            run.applied.push(unit.key());
            self.emit(
                &mut run,
                MigrationEvent::Checkpointed {
                    latest_migration: unit.key(),
                },
            );
            tracing::info!(key = unit.key(), name = unit.name(), "migration checkpointed");

            ledger.push(next.clone());
            current = next;
        }

        run.transition(EngineState::Completed);
        self.finish(run, RunOutcome::Completed, current)
    }

    async fn rollback(
        &self,
        mut run: Run,
        pending: &[ResolvedMigration],
        ledger: &RunLedger,
        from: usize,
        mut current: SystemState,
        cause: MigrationError,
    ) -> RunReport {
        run.transition(EngineState::RollingBack);

        for i in ledger.rollback_order(from) {
            // Ledger entry i is the state before pending[i]; the ledger never outgrows the run.
            let unit = &pending[i];
            let target = &ledger[i];

            tracing::warn!(
                key = unit.key(),
                name = unit.name(),
                ledger_index = i,
                "reverting migration"
            );
            self.emit(
                &mut run,
                MigrationEvent::Reverting {
                    key: unit.key(),
                    name: unit.name().to_string(),
                    ledger_index: i,
                },
            );
            self.phase_start(unit, Phase::Down);

            let reversed = match unit
                .unit
                .down(
                    self.ctx,
                    target.network_state.clone(),
                    current.network_state.clone(),
                )
                .await
            {
                Ok(state) => state,
                Err(source) => {
                    let cause = MigrationError::ReverseApplyFailed {
                        key: unit.key(),
                        name: unit.name().to_string(),
                        ledger_index: i,
                        checkpoint: run.checkpoint,
                        source,
                    };
                    return self.abort(run, unit, Some(Phase::Down), cause, current);
                }
            };

            let next = SystemState::new(target.latest_migration(), reversed);
            if let Err(source) = self.store.save(self.network, &next) {
                let cause = MigrationError::CheckpointFailed {
                    key: unit.key(),
                    name: unit.name().to_string(),
                    source,
                };
                return self.abort(run, unit, None, cause, next);
            }
            run.checkpoint = target.latest_migration();
            run.reverted.push(unit.key());
            self.emit(
                &mut run,
                MigrationEvent::Reverted {
                    key: unit.key(),
                    name: unit.name().to_string(),
                },
            );
            let latest_migration = run.checkpoint;
            self.emit(&mut run, MigrationEvent::Checkpointed { latest_migration });
            current = next;
        }

        run.transition(EngineState::RolledBack);
        tracing::warn!(
            network = self.network,
            checkpoint = run.checkpoint,
            "run rolled back"
        );
        self.finish(run, RunOutcome::RolledBack { cause }, current)
    }

    fn abort(
        &self,
        mut run: Run,
        unit: &ResolvedMigration,
        phase: Option<Phase>,
        cause: MigrationError,
        current: SystemState,
    ) -> RunReport {
        run.transition(EngineState::AbortedUnrecoverable);
        let phase_label = phase.map_or_else(|| "checkpoint".to_string(), |p| p.to_string());
        tracing::error!(
            key = unit.key(),
            name = unit.name(),
            phase = %phase_label,
            checkpoint = run.checkpoint,
            error = %cause,
            "aborting"
        );
        let checkpoint = run.checkpoint;
        self.emit(
            &mut run,
            MigrationEvent::Aborted {
                key: unit.key(),
                name: unit.name().to_string(),
                phase,
                error: cause.to_string(),
                checkpoint,
            },
        );
        self.finish(run, RunOutcome::AbortedUnrecoverable { cause }, current)
    }

    fn finish(&self, mut run: Run, outcome: RunOutcome, final_state: SystemState) -> RunReport {
        if run.state == EngineState::Idle {
            run.transition(outcome.engine_state());
        }
        let checkpoint = run.checkpoint;
        self.emit(
            &mut run,
            MigrationEvent::Finished {
                outcome: outcome.label().to_string(),
                checkpoint,
            },
        );
        RunReport {
            outcome,
            applied: run.applied,
            reverted: run.reverted,
            checkpoint: run.checkpoint,
            final_state,
            events: run.events,
        }
    }
}
