//! In-process execution environment.
//!
//! Addresses are handed out sequentially, every instance is owned by its deployer, and
//! every primitive call is recorded. Used for `--simulate` runs and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::{Component, Executor, Instance, Signer};
use crate::errors::ExecutorError;

/// One recorded primitive call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorCall {
    pub op: String,
    pub target: String,
    pub method: Option<String>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
struct SimInstance {
    component: String,
    owner: String,
    admin: Option<String>,
    storage: BTreeMap<String, Value>,
}

#[derive(Default)]
struct Inner {
    next_address: u64,
    instances: HashMap<String, SimInstance>,
    calls: Vec<ExecutorCall>,
    failing: HashSet<String>,
    responses: HashMap<String, Value>,
}

#[derive(Default)]
pub struct SimulatedExecutor {
    inner: Mutex<Inner>,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation or method named `name` fail.
    pub fn fail_on(&self, name: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.insert(name.into());
        }
    }

    /// Answer read-only calls of `method` with a fixed value.
    pub fn respond(&self, method: impl Into<String>, value: Value) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.responses.insert(method.into(), value);
        }
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.inner
            .lock()
            .map(|i| i.calls.clone())
            .unwrap_or_default()
    }

    pub fn deployed_count(&self) -> usize {
        self.inner.lock().map(|i| i.instances.len()).unwrap_or(0)
    }

    fn with_inner<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, ExecutorError>,
    ) -> Result<T, ExecutorError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| ExecutorError::MalformedResponse("simulator lock poisoned".into()))?;
        f(&mut inner)
    }
}

impl Inner {
    fn record(&mut self, op: &str, target: &str, method: Option<&str>, args: &[Value]) {
        self.calls.push(ExecutorCall {
            op: op.to_string(),
            target: target.to_string(),
            method: method.map(str::to_string),
            args: args.to_vec(),
        });
    }

    fn check_failure(&self, op: &str, method: Option<&str>) -> Result<(), ExecutorError> {
        let hit = self.failing.contains(op) || method.is_some_and(|m| self.failing.contains(m));
        if hit {
            return Err(ExecutorError::Rejected {
                op: method.unwrap_or(op).to_string(),
                message: "simulated failure".into(),
            });
        }
        Ok(())
    }

    fn allocate(&mut self, component: &str, owner: &str, admin: Option<String>) -> Instance {
        self.next_address += 1;
        let address = format!("0x{:040x}", self.next_address);
        self.instances.insert(
            address.clone(),
            SimInstance {
                component: component.to_string(),
                owner: owner.to_string(),
                admin,
                storage: BTreeMap::new(),
            },
        );
        Instance {
            component: component.to_string(),
            address,
        }
    }

    fn instance_mut(&mut self, address: &str) -> Result<&mut SimInstance, ExecutorError> {
        self.instances
            .get_mut(address)
            .ok_or_else(|| ExecutorError::UnknownInstance(address.to_string()))
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn deploy(
        &self,
        signer: &Signer,
        component: &Component,
        args: &[Value],
    ) -> Result<Instance, ExecutorError> {
        self.with_inner(|inner| {
            inner.record("deploy", &component.name, None, args);
            inner.check_failure("deploy", None)?;
            Ok(inner.allocate(&component.name, &signer.address, None))
        })
    }

    async fn deploy_proxy(
        &self,
        signer: &Signer,
        admin: &Instance,
        component: &Component,
        args: &[Value],
    ) -> Result<Instance, ExecutorError> {
        self.with_inner(|inner| {
            inner.record("deploy_proxy", &component.name, None, args);
            inner.check_failure("deploy_proxy", None)?;
            if !inner.instances.contains_key(&admin.address) {
                return Err(ExecutorError::UnknownInstance(admin.address.clone()));
            }
            Ok(inner.allocate(
                &component.name,
                &signer.address,
                Some(admin.address.clone()),
            ))
        })
    }

    async fn attach(
        &self,
        component: &Component,
        address: &str,
    ) -> Result<Instance, ExecutorError> {
        self.with_inner(|inner| {
            inner.record("attach", address, None, &[]);
            inner.check_failure("attach", None)?;
            let instance = inner.instance_mut(address)?;
            if instance.component != component.name {
                return Err(ExecutorError::Rejected {
                    op: "attach".into(),
                    message: format!(
                        "{} is a {}, not a {}",
                        address, instance.component, component.name
                    ),
                });
            }
            Ok(Instance {
                component: component.name.clone(),
                address: address.to_string(),
            })
        })
    }

    async fn execute(
        &self,
        signer: &Signer,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError> {
        self.with_inner(|inner| {
            inner.record("execute", &instance.address, Some(method), args);
            inner.check_failure("execute", Some(method))?;
            let target = inner.instance_mut(&instance.address)?;
            if method == "transferOwnership" {
                if target.owner != signer.address {
                    return Err(ExecutorError::Rejected {
                        op: method.to_string(),
                        message: "caller is not the owner".into(),
                    });
                }
                if let Some(Value::String(new_owner)) = args.first() {
                    target.owner = new_owner.clone();
                }
            }
            target
                .storage
                .insert(method.to_string(), Value::Array(args.to_vec()));
            Ok(Value::Null)
        })
    }

    async fn call(
        &self,
        _signer: &Signer,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError> {
        self.with_inner(|inner| {
            inner.record("call", &instance.address, Some(method), args);
            inner.check_failure("call", Some(method))?;
            if let Some(value) = inner.responses.get(method) {
                return Ok(value.clone());
            }
            let target = inner.instance_mut(&instance.address)?;
            match method {
                "owner" => Ok(Value::String(target.owner.clone())),
                "admin" => Ok(target
                    .admin
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null)),
                "hasRole" => {
                    let account = args.get(1).and_then(Value::as_str).unwrap_or_default();
                    Ok(Value::Bool(account == target.owner))
                }
                other => target.storage.get(other).cloned().ok_or_else(|| {
                    ExecutorError::Rejected {
                        op: other.to_string(),
                        message: format!("{} has no method '{}'", target.component, other),
                    }
                }),
            }
        })
    }
}
