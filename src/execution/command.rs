//! Executor backed by an external command.
//!
//! Each primitive spawns the configured command through `sh -c`, writes one JSON request
//! to its stdin and reads one JSON response from its stdout:
//!
//! ```text
//! stdin:  {"op": "deploy_proxy", "network": "mainnet", "signer": "0x..",
//!          "component": "Vault", "artifact": "artifacts/Vault.json",
//!          "admin": "0x..", "args": ["0x.."]}
//! stdout: {"ok": true, "result": {"address": "0x.."}}
//!     or  {"ok": false, "error": "execution reverted"}
//! ```
//!
//! A non-zero exit code is a failure regardless of stdout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{Component, Executor, Instance, Signer};
use crate::errors::ExecutorError;

#[derive(Debug, Clone, Serialize)]
struct ExecutorRequest<'a> {
    op: &'a str,
    network: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    signer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    component: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    args: &'a [Value],
}

impl<'a> ExecutorRequest<'a> {
    fn new(op: &'a str, network: &'a str, args: &'a [Value]) -> Self {
        Self {
            op,
            network,
            signer: None,
            component: None,
            artifact: None,
            admin: None,
            target: None,
            method: None,
            args,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecutorResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

pub struct CommandExecutor {
    command: String,
    network: String,
    working_dir: PathBuf,
    timeout_secs: Option<u64>,
}

impl CommandExecutor {
    pub fn new(
        command: impl Into<String>,
        network: impl Into<String>,
        working_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            command: command.into(),
            network: network.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout_secs: None,
        }
    }

    /// Give up on a single primitive after `secs` seconds.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    async fn invoke(&self, request: &ExecutorRequest<'_>) -> Result<Value, ExecutorError> {
        let payload = serde_json::to_string(request)
            .map_err(|e| ExecutorError::MalformedResponse(e.to_string()))?;

        tracing::debug!(op = request.op, command = %self.command, "invoking executor");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("MIGRATE_OP", request.op)
            .env("MIGRATE_NETWORK", &self.network)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutorError::SpawnFailed {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = match self.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), child.wait_with_output())
                .await
                .map_err(|_| ExecutorError::TimedOut { secs })??,
            None => child.wait_with_output().await?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            tracing::debug!(op = request.op, %stderr, "executor stderr");
        }

        if !output.status.success() {
            return Err(ExecutorError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        parse_response(request.op, &String::from_utf8_lossy(&output.stdout))
    }

    async fn invoke_for_instance(
        &self,
        request: &ExecutorRequest<'_>,
        component: &str,
    ) -> Result<Instance, ExecutorError> {
        let result = self.invoke(request).await?;
        let address = match &result {
            Value::String(address) => address.clone(),
            Value::Object(map) => map
                .get("address")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ExecutorError::MalformedResponse(format!(
                        "{} result has no address: {}",
                        request.op, result
                    ))
                })?,
            other => {
                return Err(ExecutorError::MalformedResponse(format!(
                    "{} result has no address: {}",
                    request.op, other
                )));
            }
        };
        Ok(Instance {
            component: component.to_string(),
            address,
        })
    }
}

/// Interpret executor stdout. The last non-empty line is the response.
fn parse_response(op: &str, stdout: &str) -> Result<Value, ExecutorError> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ExecutorError::MalformedResponse(format!("{} produced no output", op)))?;

    let response: ExecutorResponse = serde_json::from_str(line.trim())
        .map_err(|e| ExecutorError::MalformedResponse(format!("{}: {}", e, line.trim())))?;

    if response.ok {
        Ok(response.result)
    } else {
        Err(ExecutorError::Rejected {
            op: op.to_string(),
            message: response
                .error
                .unwrap_or_else(|| "no error message".to_string()),
        })
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn deploy(
        &self,
        signer: &Signer,
        component: &Component,
        args: &[Value],
    ) -> Result<Instance, ExecutorError> {
        let mut request = ExecutorRequest::new("deploy", &self.network, args);
        request.signer = Some(&signer.address);
        request.component = Some(&component.name);
        request.artifact = component.artifact.as_deref();
        self.invoke_for_instance(&request, &component.name).await
    }

    async fn deploy_proxy(
        &self,
        signer: &Signer,
        admin: &Instance,
        component: &Component,
        args: &[Value],
    ) -> Result<Instance, ExecutorError> {
        let mut request = ExecutorRequest::new("deploy_proxy", &self.network, args);
        request.signer = Some(&signer.address);
        request.component = Some(&component.name);
        request.artifact = component.artifact.as_deref();
        request.admin = Some(&admin.address);
        self.invoke_for_instance(&request, &component.name).await
    }

    async fn attach(
        &self,
        component: &Component,
        address: &str,
    ) -> Result<Instance, ExecutorError> {
        let mut request = ExecutorRequest::new("attach", &self.network, &[]);
        request.component = Some(&component.name);
        request.artifact = component.artifact.as_deref();
        request.target = Some(address);
        self.invoke_for_instance(&request, &component.name).await
    }

    async fn execute(
        &self,
        signer: &Signer,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError> {
        let mut request = ExecutorRequest::new("execute", &self.network, args);
        request.signer = Some(&signer.address);
        request.component = Some(&instance.component);
        request.target = Some(&instance.address);
        request.method = Some(method);
        self.invoke(&request).await
    }

    async fn call(
        &self,
        signer: &Signer,
        instance: &Instance,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ExecutorError> {
        let mut request = ExecutorRequest::new("call", &self.network, args);
        request.signer = Some(&signer.address);
        request.component = Some(&instance.component);
        request.target = Some(&instance.address);
        request.method = Some(method);
        self.invoke(&request).await
    }
}
