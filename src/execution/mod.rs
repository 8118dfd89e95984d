//! The capability bundle handed to every migration.
//!
//! An `ExecutionContext` carries the signing identity, the registry of known components,
//! and an `Executor` that talks to the external environment. The engine never looks inside
//! it; it only forwards a reference to each migration call.

pub mod command;
pub mod simulated;

pub use command::CommandExecutor;
pub use simulated::SimulatedExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::ExecutorError;

/// The identity operations are submitted as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: String,
}

impl Signer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// A deployable component type, e.g. `ProxyAdmin` or `Vault`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    /// Build artifact the executor deploys from, when the backend needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Known components by name.
///
/// An empty registry is open: any name resolves to a component without an artifact.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, Component>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, artifact: Option<PathBuf>) {
        let name = name.into();
        self.components.insert(
            name.clone(),
            Component {
                name,
                artifact,
            },
        );
    }

    pub fn get(&self, name: &str) -> Result<Component, ExecutorError> {
        if self.components.is_empty() {
            return Ok(Component {
                name: name.to_string(),
                artifact: None,
            });
        }
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownComponent(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// A component instance living at an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub component: String,
    pub address: String,
}

/// Low-level primitives of the external environment.
///
/// Every call may be slow and may fail after partially taking effect; nothing here is
/// transactional.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Deploy a new instance of `component`.
    async fn deploy(
        &self,
        signer: &Signer,
        component: &Component,
        args: &[Value],
    ) -> Result<Instance, ExecutorError>;

    /// Deploy `component` behind an upgradeable proxy administered by `admin`.
    async fn deploy_proxy(
        &self,
        signer: &Signer,
        admin: &Instance,
        component: &Component,
        args: &[Value],
    ) -> Result<Instance, ExecutorError>;

    /// Bind to an existing instance at `address`.
    async fn attach(&self, component: &Component, address: &str)
    -> Result<Instance, ExecutorError>;

    /// Submit a state-changing method call.
    async fn execute(
        &self,
        signer: &Signer,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError>;

    /// Query a read-only method.
    async fn call(
        &self,
        signer: &Signer,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError>;
}

/// Signer, components and executor for one run.
#[derive(Clone)]
pub struct ExecutionContext {
    pub signer: Signer,
    pub components: ComponentRegistry,
    executor: Arc<dyn Executor>,
}

impl ExecutionContext {
    pub fn new(signer: Signer, components: ComponentRegistry, executor: Arc<dyn Executor>) -> Self {
        Self {
            signer,
            components,
            executor,
        }
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub async fn deploy(&self, component: &str, args: &[Value]) -> Result<Instance, ExecutorError> {
        let component = self.components.get(component)?;
        self.executor.deploy(&self.signer, &component, args).await
    }

    pub async fn deploy_proxy(
        &self,
        admin: &Instance,
        component: &str,
        args: &[Value],
    ) -> Result<Instance, ExecutorError> {
        let component = self.components.get(component)?;
        self.executor
            .deploy_proxy(&self.signer, admin, &component, args)
            .await
    }

    pub async fn attach(&self, component: &str, address: &str) -> Result<Instance, ExecutorError> {
        let component = self.components.get(component)?;
        self.executor.attach(&component, address).await
    }

    pub async fn execute(
        &self,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError> {
        self.executor
            .execute(&self.signer, instance, method, args)
            .await
    }

    pub async fn call(
        &self,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError> {
        self.executor.call(&self.signer, instance, method, args).await
    }
}
