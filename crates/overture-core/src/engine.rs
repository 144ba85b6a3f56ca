// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestration engine seam.
//!
//! The engine executes the actual deploy/undeploy/notify/update work and is
//! opaque to the core: each operation either completes or fails, and its
//! textual output is streamed into the caller's capture buffer. Engines are
//! pure executors; they never touch the invocation store.
//!
//! [`CliEngine`] runs an orchestrator executable as a subprocess, one
//! subcommand per operation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::capture::CaptureBuffer;
use crate::invocation::FailureDetail;

/// Errors from engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine process could not be launched.
    #[error("Failed to launch engine: {0}")]
    Spawn(String),

    /// The engine ran and reported failure through its exit code.
    #[error("Engine exited with code {exit_code}")]
    ExitCode {
        /// Exit code from the engine process.
        exit_code: i32,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of operation inputs failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Stable lowercase kind, recorded in failure details.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "spawn_failed",
            Self::ExitCode { .. } => "nonzero_exit",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

impl From<&EngineError> for FailureDetail {
    fn from(err: &EngineError) -> Self {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        FailureDetail {
            kind: err.kind().to_string(),
            message: err.to_string(),
            trace: (!chain.is_empty()).then(|| chain.join("\ncaused by: ")),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The engine contract consumed by the worker.
///
/// Every method streams its textual output into `output` and returns a
/// discriminated result — failure is data, not an unwinding path.
#[async_trait]
pub trait OrchestrationEngine: Send + Sync {
    /// Deploy a service template.
    async fn deploy(
        &self,
        service_template: &str,
        inputs: &BTreeMap<String, Value>,
        clean_state: bool,
        output: &CaptureBuffer,
    ) -> Result<()>;

    /// Tear down the current deployment.
    async fn undeploy(&self, output: &CaptureBuffer) -> Result<()>;

    /// Fire a named policy trigger against the current deployment.
    async fn notify(
        &self,
        trigger: &str,
        inputs: &BTreeMap<String, Value>,
        output: &CaptureBuffer,
    ) -> Result<()>;

    /// Update the current deployment to a new template revision.
    async fn update(
        &self,
        service_template: &str,
        inputs: &BTreeMap<String, Value>,
        output: &CaptureBuffer,
    ) -> Result<()>;
}

/// Subprocess-backed engine adapter.
///
/// Invokes the orchestrator executable with one subcommand per operation,
/// passing inputs as a JSON argument, and pipes the child's stdout/stderr
/// line-by-line into the capture buffer. A non-zero exit is the engine's
/// recognized failure signal.
#[derive(Debug, Clone)]
pub struct CliEngine {
    binary: PathBuf,
    workdir: Option<PathBuf>,
}

impl CliEngine {
    /// Create an adapter around the given engine executable.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workdir: None,
        }
    }

    /// Run the engine from `dir` instead of the current directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    fn inputs_arg(inputs: &BTreeMap<String, Value>) -> Result<Option<String>> {
        if inputs.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(inputs)?))
    }

    async fn run(&self, args: Vec<String>, output: &CaptureBuffer) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        debug!(binary = %self.binary.display(), ?args, "Launching engine");

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let copy_stdout = async {
            if let Some(handle) = stdout {
                let mut lines = BufReader::new(handle).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    output.append_stdout(&line);
                    output.append_stdout("\n");
                }
            }
        };
        let copy_stderr = async {
            if let Some(handle) = stderr {
                let mut lines = BufReader::new(handle).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    output.append_stderr(&line);
                    output.append_stderr("\n");
                }
            }
        };
        tokio::join!(copy_stdout, copy_stderr);

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::ExitCode {
                exit_code: status.code().unwrap_or(-1),
            })
        }
    }
}

#[async_trait]
impl OrchestrationEngine for CliEngine {
    async fn deploy(
        &self,
        service_template: &str,
        inputs: &BTreeMap<String, Value>,
        clean_state: bool,
        output: &CaptureBuffer,
    ) -> Result<()> {
        let mut args = vec!["deploy".to_string()];
        if let Some(json) = Self::inputs_arg(inputs)? {
            args.push("--inputs".to_string());
            args.push(json);
        }
        if clean_state {
            args.push("--clean-state".to_string());
        }
        args.push(service_template.to_string());
        self.run(args, output).await
    }

    async fn undeploy(&self, output: &CaptureBuffer) -> Result<()> {
        self.run(vec!["undeploy".to_string()], output).await
    }

    async fn notify(
        &self,
        trigger: &str,
        inputs: &BTreeMap<String, Value>,
        output: &CaptureBuffer,
    ) -> Result<()> {
        let mut args = vec!["notify".to_string()];
        if let Some(json) = Self::inputs_arg(inputs)? {
            args.push("--inputs".to_string());
            args.push(json);
        }
        args.push(trigger.to_string());
        self.run(args, output).await
    }

    async fn update(
        &self,
        service_template: &str,
        inputs: &BTreeMap<String, Value>,
        output: &CaptureBuffer,
    ) -> Result<()> {
        let mut args = vec!["update".to_string()];
        if let Some(json) = Self::inputs_arg(inputs)? {
            args.push("--inputs".to_string());
            args.push(json);
        }
        args.push(service_template.to_string());
        self.run(args, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_detail_from_engine_error() {
        let err = EngineError::ExitCode { exit_code: 1 };
        let detail = FailureDetail::from(&err);
        assert_eq!(detail.kind, "nonzero_exit");
        assert_eq!(detail.message, "Engine exited with code 1");
        assert!(detail.trace.is_none());

        let io = EngineError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        let detail = FailureDetail::from(&io);
        assert_eq!(detail.kind, "io");
        assert_eq!(detail.trace.as_deref(), Some("pipe closed"));
    }

    #[test]
    fn test_inputs_arg_empty_is_none() {
        assert!(CliEngine::inputs_arg(&BTreeMap::new()).unwrap().is_none());

        let inputs = BTreeMap::from([("size".to_string(), Value::String("large".to_string()))]);
        let arg = CliEngine::inputs_arg(&inputs).unwrap().unwrap();
        assert_eq!(arg, "{\"size\":\"large\"}");
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script and return its path.
        fn fake_engine(dir: &std::path::Path, body: &str) -> PathBuf {
            let path = dir.join("engine.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn test_deploy_captures_stdout() {
            let dir = tempfile::tempdir().unwrap();
            // args: $1 = "deploy", $2 = "--inputs", $3 = json, $4 = template
            let engine = CliEngine::new(fake_engine(dir.path(), "echo \"deploying $4\""));
            let output = CaptureBuffer::new();

            let inputs =
                BTreeMap::from([("size".to_string(), Value::String("small".to_string()))]);
            engine
                .deploy("service.yaml", &inputs, false, &output)
                .await
                .unwrap();

            let (out, err) = output.snapshot();
            assert_eq!(out, "deploying service.yaml\n");
            assert_eq!(err, "");
        }

        #[tokio::test]
        async fn test_failure_captures_stderr_and_code() {
            let dir = tempfile::tempdir().unwrap();
            let engine = CliEngine::new(fake_engine(
                dir.path(),
                "echo \"tearing down\"\necho \"provider timeout\" >&2\nexit 3",
            ));
            let output = CaptureBuffer::new();

            let err = engine.undeploy(&output).await.unwrap_err();
            assert!(matches!(err, EngineError::ExitCode { exit_code: 3 }));

            let (out, stderr) = output.snapshot();
            assert_eq!(out, "tearing down\n");
            assert_eq!(stderr, "provider timeout\n");
        }

        #[tokio::test]
        async fn test_missing_binary_is_spawn_error() {
            let engine = CliEngine::new("/nonexistent/overture-engine");
            let output = CaptureBuffer::new();

            let err = engine.undeploy(&output).await.unwrap_err();
            assert!(matches!(err, EngineError::Spawn(_)));
            assert_eq!(err.kind(), "spawn_failed");
        }
    }
}
