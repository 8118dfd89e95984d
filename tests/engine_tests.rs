//! Engine tests: forward application, checkpointing, rollback and abort paths.
//!
//! Units here are scripted in-process migrations so every failure can be placed exactly.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use migrator::catalog::{MigrationDescriptor, catalog_from_paths, pending};
use migrator::engine::{
    EXIT_ABORTED, EXIT_ROLLED_BACK, MigrationEngine, MigrationEvent, RunObserver, RunOutcome,
};
use migrator::errors::{MigrationError, StateError};
use migrator::execution::{ComponentRegistry, ExecutionContext, Signer, SimulatedExecutor};
use migrator::migration::{Migration, MigrationRegistry, Phase, ResolvedMigration};
use migrator::state::{
    FileStateStore, MemoryStateStore, NetworkState, StateStore, SystemState, prepare_state,
};

const NETWORK: &str = "hardhat";

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default, Clone, Copy)]
struct Faults {
    up: bool,
    verify: bool,
    down: bool,
}

/// Writes `m<key>` into the state on `up` and journals every call.
struct Scripted {
    key: i64,
    faults: Faults,
    journal: Journal,
}

#[async_trait]
impl Migration for Scripted {
    async fn up(
        &self,
        _ctx: &ExecutionContext,
        mut state: NetworkState,
    ) -> anyhow::Result<NetworkState> {
        self.journal.lock().unwrap().push(format!("up:{}", self.key));
        if self.faults.up {
            anyhow::bail!("up of {} exploded", self.key);
        }
        state.insert(format!("m{}", self.key), json!(self.key));
        Ok(state)
    }

    async fn health_check(
        &self,
        _ctx: &ExecutionContext,
        previous: &NetworkState,
        current: &NetworkState,
    ) -> anyhow::Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("verify:{}", self.key));
        assert!(!previous.contains_key(&format!("m{}", self.key)));
        assert!(current.contains_key(&format!("m{}", self.key)));
        if self.faults.verify {
            anyhow::bail!("health check of {} failed", self.key);
        }
        Ok(())
    }

    async fn down(
        &self,
        _ctx: &ExecutionContext,
        previous: NetworkState,
        _current: NetworkState,
    ) -> anyhow::Result<NetworkState> {
        self.journal.lock().unwrap().push(format!("down:{}", self.key));
        if self.faults.down {
            anyhow::bail!("down of {} exploded", self.key);
        }
        Ok(previous)
    }
}

struct Harness {
    journal: Journal,
    ctx: ExecutionContext,
}

impl Harness {
    fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            ctx: ExecutionContext::new(
                Signer::new("0x00000000000000000000000000000000000000aa"),
                ComponentRegistry::new(),
                Arc::new(SimulatedExecutor::new()),
            ),
        }
    }

    fn unit(&self, key: i64, faults: Faults) -> ResolvedMigration {
        let descriptor = MigrationDescriptor {
            key,
            name: format!("{key}_unit.toml"),
            path: PathBuf::from(format!("migrations/{key}_unit.toml")),
        };
        ResolvedMigration::new(
            descriptor,
            Arc::new(Scripted {
                key,
                faults,
                journal: self.journal.clone(),
            }),
        )
    }

    fn units(&self, keys: &[i64]) -> Vec<ResolvedMigration> {
        keys.iter().map(|k| self.unit(*k, Faults::default())).collect()
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

fn seeded_state() -> SystemState {
    let mut network = NetworkState::new();
    network.insert("bnt".into(), json!("0xbnt"));
    SystemState::new(-1, network)
}

#[derive(Default)]
struct Recorder {
    labels: Mutex<Vec<String>>,
}

impl RunObserver for Recorder {
    fn on_phase_start(&self, key: i64, _name: &str, phase: Phase) {
        self.labels.lock().unwrap().push(format!("{phase}:{key}"));
    }

    fn on_event(&self, event: &MigrationEvent) {
        self.labels.lock().unwrap().push(event.label().to_string());
    }
}

/// Fails every save whose checkpoint equals `fail_at`.
struct FlakyStore {
    inner: MemoryStateStore,
    fail_at: i64,
}

impl StateStore for FlakyStore {
    fn exists(&self, network: &str) -> bool {
        self.inner.exists(network)
    }

    fn load(&self, network: &str) -> Result<SystemState, StateError> {
        self.inner.load(network)
    }

    fn save(&self, network: &str, state: &SystemState) -> Result<(), StateError> {
        if state.latest_migration() == self.fail_at {
            return Err(StateError::WriteFailed {
                path: PathBuf::from("state.json"),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.save(network, state)
    }

    fn reset(&self, network: &str) -> Result<(), StateError> {
        self.inner.reset(network)
    }
}

// =============================================================================
// Forward path
// =============================================================================

#[tokio::test]
async fn test_applies_in_order_and_checkpoints_each_unit() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let units = h.units(&[10, 20, 30]);

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    assert!(matches!(report.outcome, RunOutcome::Completed));
    assert_eq!(report.outcome.exit_code(), 0);
    assert_eq!(report.applied, vec![10, 20, 30]);
    assert!(report.reverted.is_empty());
    assert_eq!(report.checkpoint, 30);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![10, 20, 30]);
    assert_eq!(
        h.journal(),
        vec!["up:10", "verify:10", "up:20", "verify:20", "up:30", "verify:30"]
    );

    let persisted = store.load(NETWORK).unwrap();
    assert_eq!(persisted.latest_migration(), 30);
    assert_eq!(persisted.network_state["bnt"], "0xbnt");
    assert_eq!(persisted.network_state["m20"], 20);
    assert_eq!(persisted, report.final_state);
}

#[tokio::test]
async fn test_empty_pending_is_a_noop() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let initial = SystemState::new(30, NetworkState::new());

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&[], initial.clone())
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(report.checkpoint, 30);
    assert_eq!(report.final_state, initial);
    assert!(store.saves().is_empty());
    assert!(h.journal().is_empty());
}

#[tokio::test]
async fn test_second_run_has_nothing_pending() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let paths = ["migrations/2_b.toml", "migrations/1_a.toml"];
    let catalog = catalog_from_paths(paths).unwrap();
    let units: Vec<_> = catalog
        .iter()
        .map(|d| ResolvedMigration::new(d.clone(), h.unit(d.key, Faults::default()).unit))
        .collect();

    let initial = prepare_state(&store, NETWORK, false, None).unwrap();
    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, initial)
        .await;
    assert_eq!(report.applied, vec![1, 2]);

    let reloaded = prepare_state(&store, NETWORK, false, None).unwrap();
    assert_eq!(reloaded.latest_migration(), 2);
    assert!(pending(&catalog, reloaded.latest_migration()).is_empty());
}

#[tokio::test]
async fn test_resumes_after_last_checkpoint() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    store
        .save(NETWORK, &SystemState::new(20, NetworkState::new()))
        .unwrap();

    let catalog = catalog_from_paths(["10_a.toml", "20_b.toml", "30_c.toml"]).unwrap();
    let todo = pending(&catalog, store.load(NETWORK).unwrap().latest_migration());
    assert_eq!(todo.len(), 1);

    let units = h.units(&[todo[0].key]);
    let initial = store.load(NETWORK).unwrap();
    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, initial)
        .await;

    assert_eq!(report.applied, vec![30]);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![20, 30]);
}

#[test]
fn test_duplicate_keys_are_rejected_before_running() {
    let err = catalog_from_paths(["5_a.toml", "5_b.toml"]).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DuplicateMigrationKey { key: 5, .. }
    ));
}

// =============================================================================
// Rollback path
// =============================================================================

#[tokio::test]
async fn test_verify_failure_rolls_back_the_whole_run() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let mut units = h.units(&[10, 20]);
    units.push(h.unit(
        30,
        Faults {
            verify: true,
            ..Faults::default()
        },
    ));

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    let RunOutcome::RolledBack { ref cause } = report.outcome else {
        panic!("expected rollback, got {:?}", report.outcome);
    };
    assert!(matches!(cause, MigrationError::VerifyFailed { key: 30, .. }));
    assert_eq!(report.outcome.exit_code(), EXIT_ROLLED_BACK);

    assert_eq!(report.applied, vec![10, 20]);
    assert_eq!(report.reverted, vec![30, 20, 10]);
    assert_eq!(report.checkpoint, -1);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![10, 20, 20, 10, -1]);

    let journal = h.journal();
    let downs: Vec<_> = journal.iter().filter(|e| e.starts_with("down")).collect();
    assert_eq!(downs, vec!["down:30", "down:20", "down:10"]);

    let persisted = store.load(NETWORK).unwrap();
    assert_eq!(persisted, seeded_state());
    assert_eq!(report.final_state, seeded_state());
}

#[tokio::test]
async fn test_verify_failure_on_first_unit_reverts_only_it() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let units = vec![
        h.unit(
            10,
            Faults {
                verify: true,
                ..Faults::default()
            },
        ),
        h.unit(20, Faults::default()),
    ];

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    assert!(matches!(report.outcome, RunOutcome::RolledBack { .. }));
    assert_eq!(report.reverted, vec![10]);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![-1]);
    assert!(!h.journal().contains(&"up:20".to_string()));
}

#[tokio::test]
async fn test_rollback_stops_at_the_runs_starting_checkpoint() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let start = SystemState::new(5, NetworkState::new());
    store.save(NETWORK, &start).unwrap();

    let units = vec![
        h.unit(10, Faults::default()),
        h.unit(
            20,
            Faults {
                verify: true,
                ..Faults::default()
            },
        ),
    ];
    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, start)
        .await;

    assert_eq!(report.checkpoint, 5);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![5, 10, 10, 5]);
    assert_eq!(store.load(NETWORK).unwrap().latest_migration(), 5);
}

// =============================================================================
// Abort paths
// =============================================================================

#[tokio::test]
async fn test_forward_failure_aborts_without_rollback() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let units = vec![
        h.unit(10, Faults::default()),
        h.unit(
            20,
            Faults {
                up: true,
                ..Faults::default()
            },
        ),
        h.unit(30, Faults::default()),
    ];

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    let RunOutcome::AbortedUnrecoverable { ref cause } = report.outcome else {
        panic!("expected abort, got {:?}", report.outcome);
    };
    assert!(matches!(
        cause,
        MigrationError::ForwardApplyFailed { key: 20, .. }
    ));
    assert_eq!(cause.phase(), Some(Phase::Up));
    assert_eq!(report.outcome.exit_code(), EXIT_ABORTED);
    assert_eq!(report.checkpoint, 10);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![10]);
    assert!(report.reverted.is_empty());
    assert!(h.journal().iter().all(|e| !e.starts_with("down")));
    assert!(!h.journal().contains(&"up:30".to_string()));
}

#[tokio::test]
async fn test_down_failure_aborts_with_ledger_position() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let units = vec![
        h.unit(10, Faults::default()),
        h.unit(
            20,
            Faults {
                down: true,
                ..Faults::default()
            },
        ),
        h.unit(
            30,
            Faults {
                verify: true,
                ..Faults::default()
            },
        ),
    ];

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    let RunOutcome::AbortedUnrecoverable { ref cause } = report.outcome else {
        panic!("expected abort, got {:?}", report.outcome);
    };
    match cause {
        MigrationError::ReverseApplyFailed {
            key,
            ledger_index,
            checkpoint,
            ..
        } => {
            assert_eq!(*key, 20);
            assert_eq!(*ledger_index, 1);
            assert_eq!(*checkpoint, 20);
        }
        other => panic!("unexpected cause: {other}"),
    }
    assert_eq!(report.reverted, vec![30]);
    assert_eq!(store.checkpoint_sequence(NETWORK), vec![10, 20, 20]);
    assert!(!h.journal().contains(&"down:10".to_string()));
}

#[tokio::test]
async fn test_checkpoint_failure_aborts() {
    let h = Harness::new();
    let store = FlakyStore {
        inner: MemoryStateStore::new(),
        fail_at: 20,
    };
    let units = h.units(&[10, 20, 30]);

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    let RunOutcome::AbortedUnrecoverable { ref cause } = report.outcome else {
        panic!("expected abort, got {:?}", report.outcome);
    };
    assert!(matches!(
        cause,
        MigrationError::CheckpointFailed { key: 20, .. }
    ));
    assert_eq!(cause.phase(), None);
    assert_eq!(report.checkpoint, 10);
    assert_eq!(store.inner.checkpoint_sequence(NETWORK), vec![10]);
    assert!(!h.journal().contains(&"up:30".to_string()));
}

// =============================================================================
// Observation
// =============================================================================

#[tokio::test]
async fn test_observer_sees_events_in_order() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let units = vec![
        h.unit(10, Faults::default()),
        h.unit(
            20,
            Faults {
                verify: true,
                ..Faults::default()
            },
        ),
    ];
    let recorder = Recorder::default();

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .with_observer(&recorder)
        .run(&units, seeded_state())
        .await;

    let labels = recorder.labels.lock().unwrap().clone();
    assert_eq!(
        labels,
        vec![
            "started",
            "up:10",
            "applied",
            "health check:10",
            "verified",
            "checkpointed",
            "up:20",
            "applied",
            "health check:20",
            "verify_failed",
            "reverting",
            "down:20",
            "reverted",
            "checkpointed",
            "reverting",
            "down:10",
            "reverted",
            "checkpointed",
            "finished",
        ]
    );

    let reported: Vec<_> = report.events.iter().map(|e| e.label()).collect();
    let observed: Vec<_> = labels.iter().filter(|l| !l.contains(':')).collect();
    assert_eq!(reported, observed);
    assert_eq!(
        report.events.last(),
        Some(&MigrationEvent::Finished {
            outcome: "rolled_back".into(),
            checkpoint: -1,
        })
    );
}

#[tokio::test]
async fn test_events_carry_the_checkpoint_at_emission() {
    let h = Harness::new();
    let store = MemoryStateStore::new();
    let start = SystemState::new(5, NetworkState::new());
    store.save(NETWORK, &start).unwrap();
    let units = vec![
        h.unit(10, Faults::default()),
        h.unit(
            20,
            Faults {
                verify: true,
                ..Faults::default()
            },
        ),
    ];

    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, start)
        .await;

    let checkpoints: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| match e {
            MigrationEvent::Started { checkpoint, .. } => Some(("started", *checkpoint)),
            MigrationEvent::Checkpointed { latest_migration } => {
                Some(("checkpointed", *latest_migration))
            }
            MigrationEvent::Finished { checkpoint, .. } => Some(("finished", *checkpoint)),
            _ => None,
        })
        .collect();
    assert_eq!(
        checkpoints,
        vec![
            ("started", 5),
            ("checkpointed", 10),
            ("checkpointed", 10),
            ("checkpointed", 5),
            ("finished", 5),
        ]
    );

    let h = Harness::new();
    let store = MemoryStateStore::new();
    let units = vec![
        h.unit(10, Faults::default()),
        h.unit(
            20,
            Faults {
                up: true,
                ..Faults::default()
            },
        ),
    ];
    let report = MigrationEngine::new(&store, NETWORK, &h.ctx)
        .run(&units, seeded_state())
        .await;

    let tail: Vec<_> = report.events.iter().rev().take(2).collect();
    assert!(matches!(
        tail[1],
        MigrationEvent::Aborted {
            key: 20,
            checkpoint: 10,
            ..
        }
    ));
    assert!(matches!(
        tail[0],
        MigrationEvent::Finished { checkpoint: 10, .. }
    ));
}

// =============================================================================
// Manifests on disk
// =============================================================================

const ADMIN_MANIFEST: &str = r#"
description = "Deploy the proxy admin"

[[up]]
action = "deploy"
component = "ProxyAdmin"
save_as = "proxyAdmin"

[[verify]]
component = "ProxyAdmin"
target = "{{ proxyAdmin }}"
method = "owner"
expect = "{{ signer }}"

[verify_state]
require = ["proxyAdmin"]
"#;

const SETTINGS_MANIFEST: &str = r#"
[[up]]
action = "deploy_proxy"
component = "NetworkSettings"
admin = "{{ proxyAdmin }}"
save_as = "networkSettings"

[[up]]
action = "execute"
component = "NetworkSettings"
target = "{{ networkSettings }}"
method = "setFee"
args = [1000]

[[verify]]
component = "NetworkSettings"
target = "{{ networkSettings }}"
method = "setFee"
expect = [2000]

[verify_state]
unchanged = ["proxyAdmin"]

[[down]]
action = "execute"
component = "NetworkSettings"
target = "{{ networkSettings }}"
method = "setFee"
args = [0]
"#;

#[tokio::test]
async fn test_manifest_rollback_persists_starting_state() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    std::fs::create_dir_all(&migrations).unwrap();
    std::fs::write(migrations.join("1_deploy_proxy_admin.toml"), ADMIN_MANIFEST).unwrap();
    std::fs::write(migrations.join("2_network_settings.toml"), SETTINGS_MANIFEST).unwrap();

    let store = FileStateStore::new(dir.path().join("data"));
    let executor = Arc::new(SimulatedExecutor::new());
    let ctx = ExecutionContext::new(
        Signer::new("0x00000000000000000000000000000000000000aa"),
        ComponentRegistry::new(),
        executor.clone(),
    );

    let catalog = migrator::catalog::discover(&migrations).unwrap();
    let initial = prepare_state(&store, NETWORK, false, None).unwrap();
    let units = MigrationRegistry::new()
        .resolve_all(&pending(&catalog, initial.latest_migration()))
        .unwrap();
    assert!(units.iter().all(|u| u.unit.checksum().is_some()));

    let report = MigrationEngine::new(&store, NETWORK, &ctx)
        .run(&units, initial)
        .await;

    assert!(matches!(report.outcome, RunOutcome::RolledBack { .. }));
    assert_eq!(report.reverted, vec![2, 1]);

    let persisted = store.load(NETWORK).unwrap();
    assert_eq!(persisted, SystemState::empty());

    let compensations: Vec<_> = executor
        .calls()
        .into_iter()
        .filter(|c| c.op == "execute" && c.args == vec![json!(0)])
        .collect();
    assert_eq!(compensations.len(), 1);
}

#[tokio::test]
async fn test_manifest_forward_run_records_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    std::fs::create_dir_all(&migrations).unwrap();
    std::fs::write(migrations.join("1_deploy_proxy_admin.toml"), ADMIN_MANIFEST).unwrap();

    let store = FileStateStore::new(dir.path().join("data"));
    let ctx = ExecutionContext::new(
        Signer::new("0x00000000000000000000000000000000000000aa"),
        ComponentRegistry::new(),
        Arc::new(SimulatedExecutor::new()),
    );

    let catalog = migrator::catalog::discover(&migrations).unwrap();
    let units = MigrationRegistry::new().resolve_all(&catalog).unwrap();
    let report = MigrationEngine::new(&store, NETWORK, &ctx)
        .run(&units, SystemState::empty())
        .await;

    assert!(report.outcome.is_success());
    let persisted = store.load(NETWORK).unwrap();
    assert_eq!(persisted.latest_migration(), 1);
    let address = persisted.network_state["proxyAdmin"].as_str().unwrap();
    assert!(address.starts_with("0x") && address.len() == 42);
}

#[tokio::test]
async fn test_demo_project_applies_cleanly() {
    let migrations = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/migrations");
    let store = MemoryStateStore::new();
    let ctx = ExecutionContext::new(
        Signer::new("0x00000000000000000000000000000000000000aa"),
        ComponentRegistry::new(),
        Arc::new(SimulatedExecutor::new()),
    );

    let catalog = migrator::catalog::discover(&migrations).unwrap();
    let units = MigrationRegistry::new().resolve_all(&catalog).unwrap();
    let report = MigrationEngine::new(&store, NETWORK, &ctx)
        .run(&units, SystemState::empty())
        .await;

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(report.applied, vec![1, 2, 3, 4]);
    let state = store.load(NETWORK).unwrap();
    for key in ["proxyAdmin", "networkSettings", "BNT", "vault"] {
        assert!(state.network_state.contains_key(key), "missing {key}");
    }
}
