//! Declarative migrations.
//!
//! A manifest lists the forward actions, the checks that make up the health check, and the
//! compensating actions. See [`scaffold`] for the shape of a new file.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::Migration;
use super::template::{Scope, get_path, remove_path, set_path};
use crate::errors::ManifestError;
use crate::execution::ExecutionContext;
use crate::state::NetworkState;

/// Component type proxies are administered by unless an action says otherwise.
pub const DEFAULT_ADMIN_COMPONENT: &str = "ProxyAdmin";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub up: Vec<Action>,
    #[serde(default)]
    pub verify: Vec<Check>,
    #[serde(default)]
    pub verify_state: StateChecks,
    #[serde(default)]
    pub down: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Deploy {
        component: String,
        #[serde(default)]
        args: Vec<Value>,
        save_as: String,
    },
    DeployProxy {
        component: String,
        admin: String,
        #[serde(default)]
        admin_component: Option<String>,
        #[serde(default)]
        args: Vec<Value>,
        save_as: String,
    },
    Execute {
        component: String,
        target: String,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        save_as: Option<String>,
    },
    Set {
        key: String,
        value: Value,
    },
    Remove {
        key: String,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Deploy { .. } => "deploy",
            Action::DeployProxy { .. } => "deploy_proxy",
            Action::Execute { .. } => "execute",
            Action::Set { .. } => "set",
            Action::Remove { .. } => "remove",
        }
    }
}

/// A read-only call whose result must equal `expect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Check {
    pub component: String,
    pub target: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    pub expect: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateChecks {
    /// Keys that must exist in the new state.
    #[serde(default)]
    pub require: Vec<String>,
    /// Keys whose value must be the same before and after.
    #[serde(default)]
    pub unchanged: Vec<String>,
}

impl Manifest {
    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A migration backed by a manifest file.
#[derive(Debug, Clone)]
pub struct ManifestMigration {
    path: PathBuf,
    manifest: Manifest,
    checksum: String,
}

impl ManifestMigration {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let manifest = Manifest::parse(path, content)?;
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            checksum: compute_checksum(content),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn description(&self) -> Option<&str> {
        self.manifest.description.as_deref()
    }
}

/// Hex SHA-256 of a manifest's content.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn apply_action(
    ctx: &ExecutionContext,
    action: &Action,
    state: &mut NetworkState,
    previous: Option<&NetworkState>,
) -> anyhow::Result<()> {
    let resolved = {
        let mut scope = Scope::new(&ctx.signer.address, state);
        if let Some(previous) = previous {
            scope = scope.with_previous(previous);
        }
        ResolvedAction::resolve(action, &scope)?
    };

    match resolved {
        ResolvedAction::Deploy {
            component,
            args,
            save_as,
        } => {
            let instance = ctx.deploy(&component, &args).await?;
            tracing::info!(%component, address = %instance.address, "deployed");
            set_path(state, &save_as, Value::String(instance.address));
        }
        ResolvedAction::DeployProxy {
            component,
            admin,
            admin_component,
            args,
            save_as,
        } => {
            let admin = ctx.attach(&admin_component, &admin).await?;
            let instance = ctx.deploy_proxy(&admin, &component, &args).await?;
            tracing::info!(%component, address = %instance.address, "deployed behind proxy");
            set_path(state, &save_as, Value::String(instance.address));
        }
        ResolvedAction::Execute {
            component,
            target,
            method,
            args,
            save_as,
        } => {
            let instance = ctx.attach(&component, &target).await?;
            let result = ctx.execute(&instance, &method, &args).await?;
            tracing::info!(%component, %method, "executed");
            if let Some(key) = save_as {
                set_path(state, &key, result);
            }
        }
        ResolvedAction::Set { key, value } => set_path(state, &key, value),
        ResolvedAction::Remove { key } => {
            remove_path(state, &key);
        }
    }
    Ok(())
}

/// An action with all templates substituted.
enum ResolvedAction {
    Deploy {
        component: String,
        args: Vec<Value>,
        save_as: String,
    },
    DeployProxy {
        component: String,
        admin: String,
        admin_component: String,
        args: Vec<Value>,
        save_as: String,
    },
    Execute {
        component: String,
        target: String,
        method: String,
        args: Vec<Value>,
        save_as: Option<String>,
    },
    Set {
        key: String,
        value: Value,
    },
    Remove {
        key: String,
    },
}

impl ResolvedAction {
    fn resolve(action: &Action, scope: &Scope<'_>) -> Result<Self, ManifestError> {
        Ok(match action {
            Action::Deploy {
                component,
                args,
                save_as,
            } => ResolvedAction::Deploy {
                component: component.clone(),
                args: scope.resolve_all(args)?,
                save_as: save_as.clone(),
            },
            Action::DeployProxy {
                component,
                admin,
                admin_component,
                args,
                save_as,
            } => ResolvedAction::DeployProxy {
                component: component.clone(),
                admin: scope.resolve_address("admin", admin)?,
                admin_component: admin_component
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ADMIN_COMPONENT.to_string()),
                args: scope.resolve_all(args)?,
                save_as: save_as.clone(),
            },
            Action::Execute {
                component,
                target,
                method,
                args,
                save_as,
            } => ResolvedAction::Execute {
                component: component.clone(),
                target: scope.resolve_address("target", target)?,
                method: method.clone(),
                args: scope.resolve_all(args)?,
                save_as: save_as.clone(),
            },
            Action::Set { key, value } => ResolvedAction::Set {
                key: key.clone(),
                value: scope.resolve(value)?,
            },
            Action::Remove { key } => ResolvedAction::Remove { key: key.clone() },
        })
    }
}

/// Compare a check result with its expectation. Hex strings compare case-insensitively.
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(e), Value::String(a)) if e.starts_with("0x") && a.starts_with("0x") => {
            e.eq_ignore_ascii_case(a)
        }
        _ => expected == actual,
    }
}

#[async_trait]
impl Migration for ManifestMigration {
    async fn up(
        &self,
        ctx: &ExecutionContext,
        state: NetworkState,
    ) -> anyhow::Result<NetworkState> {
        let mut state = state;
        for (i, action) in self.manifest.up.iter().enumerate() {
            apply_action(ctx, action, &mut state, None)
                .await
                .with_context(|| format!("up action #{} ({})", i + 1, action.name()))?;
        }
        Ok(state)
    }

    async fn health_check(
        &self,
        ctx: &ExecutionContext,
        previous: &NetworkState,
        current: &NetworkState,
    ) -> anyhow::Result<()> {
        let scope = Scope::new(&ctx.signer.address, current).with_previous(previous);

        for check in &self.manifest.verify {
            let target = scope.resolve_address("target", &check.target)?;
            let args = scope.resolve_all(&check.args)?;
            let expected = scope.resolve(&check.expect)?;

            let instance = ctx.attach(&check.component, &target).await?;
            let actual = ctx
                .call(&instance, &check.method, &args)
                .await
                .with_context(|| format!("calling {} on {}", check.method, target))?;

            if !values_match(&expected, &actual) {
                return Err(ManifestError::CheckMismatch {
                    method: check.method.clone(),
                    target,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                }
                .into());
            }
        }

        for key in &self.manifest.verify_state.require {
            if get_path(current, key).is_none() {
                return Err(ManifestError::MissingStateKey { key: key.clone() }.into());
            }
        }

        for key in &self.manifest.verify_state.unchanged {
            let before = get_path(previous, key);
            let after = get_path(current, key);
            if before != after {
                let show = |v: Option<&Value>| v.map_or("<absent>".to_string(), Value::to_string);
                return Err(ManifestError::StateKeyChanged {
                    key: key.clone(),
                    before: show(before),
                    after: show(after),
                }
                .into());
            }
        }

        Ok(())
    }

    async fn down(
        &self,
        ctx: &ExecutionContext,
        previous: NetworkState,
        current: NetworkState,
    ) -> anyhow::Result<NetworkState> {
        let mut working = current;
        for (i, action) in self.manifest.down.iter().enumerate() {
            apply_action(ctx, action, &mut working, Some(&previous))
                .await
                .with_context(|| format!("down action #{} ({})", i + 1, action.name()))?;
        }
        Ok(previous)
    }

    fn checksum(&self) -> Option<String> {
        Some(self.checksum.clone())
    }
}

/// Content of a freshly scaffolded manifest.
pub fn scaffold(description: &str) -> String {
    let description = description.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"description = "{description}"

# Forward actions, applied in order to a copy of the current network state.
# [[up]]
# action = "deploy"
# component = "ProxyAdmin"
# save_as = "proxyAdmin"

# Read-only checks run after `up`. Any mismatch rolls the run back.
# [[verify]]
# component = "ProxyAdmin"
# target = "{{{{ proxyAdmin }}}}"
# method = "owner"
# expect = "{{{{ signer }}}}"

[verify_state]
require = []
unchanged = []

# Compensating actions. The network state reverts to its value before `up`.
# [[down]]
# action = "execute"
# component = "ProxyAdmin"
# target = "{{{{ proxyAdmin }}}}"
# method = "renounceOwnership"
"#
    )
}
