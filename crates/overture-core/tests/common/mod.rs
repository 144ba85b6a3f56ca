// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test fixtures: a scriptable engine and a runtime harness.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use overture_core::capture::CaptureBuffer;
use overture_core::engine::{EngineError, OrchestrationEngine};
use overture_core::invocation::{Invocation, InvocationState};
use overture_core::persistence::FileInvocationStore;
use overture_core::runtime::{ServiceRuntime, ServiceRuntimeBuilder};
use overture_core::service::InvocationService;

static TRACING: std::sync::Once = std::sync::Once::new();

/// Route worker logs through the test writer, once per binary.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Pause point for exercising in-flight invocations.
///
/// The engine signals `started` when an operation begins, then blocks until
/// `release` is notified.
#[derive(Default)]
pub struct EngineGate {
    pub started: Notify,
    pub release: Notify,
}

/// Scriptable engine for tests.
///
/// Operations append predictable text to the capture buffer and are logged
/// in execution order. A template or trigger named `bad.yaml` / `bad` makes
/// the operation fail with a non-zero exit. An optional gate pauses every
/// operation mid-flight.
#[derive(Default)]
pub struct TestEngine {
    log: Mutex<Vec<String>>,
    gate: Option<Arc<EngineGate>>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<EngineGate>) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            gate: Some(gate),
        }
    }

    /// Operations executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    async fn run(
        &self,
        entry: String,
        fail: bool,
        output: &CaptureBuffer,
    ) -> Result<(), EngineError> {
        self.log.lock().unwrap().push(entry.clone());

        if let Some(gate) = &self.gate {
            output.append_stdout("working...\n");
            gate.started.notify_one();
            gate.release.notified().await;
        }

        if fail {
            output.append_stderr(&format!("engine error: {} rejected\n", entry));
            return Err(EngineError::ExitCode { exit_code: 1 });
        }

        output.append_stdout(&format!("{} complete\n", entry));
        Ok(())
    }
}

#[async_trait]
impl OrchestrationEngine for TestEngine {
    async fn deploy(
        &self,
        service_template: &str,
        _inputs: &BTreeMap<String, Value>,
        _clean_state: bool,
        output: &CaptureBuffer,
    ) -> Result<(), EngineError> {
        self.run(
            format!("deploy {}", service_template),
            service_template == "bad.yaml",
            output,
        )
        .await
    }

    async fn undeploy(&self, output: &CaptureBuffer) -> Result<(), EngineError> {
        self.run("undeploy".to_string(), false, output).await
    }

    async fn notify(
        &self,
        trigger: &str,
        _inputs: &BTreeMap<String, Value>,
        output: &CaptureBuffer,
    ) -> Result<(), EngineError> {
        self.run(format!("notify {}", trigger), trigger == "bad", output)
            .await
    }

    async fn update(
        &self,
        service_template: &str,
        _inputs: &BTreeMap<String, Value>,
        output: &CaptureBuffer,
    ) -> Result<(), EngineError> {
        self.run(
            format!("update {}", service_template),
            service_template == "bad.yaml",
            output,
        )
        .await
    }
}

/// A started runtime over temp directories, plus handles into its parts.
pub struct TestContext {
    pub dir: tempfile::TempDir,
    pub engine: Arc<TestEngine>,
    pub runtime: ServiceRuntime,
}

impl TestContext {
    /// Start a fresh runtime with a default [`TestEngine`].
    pub async fn start() -> Self {
        Self::start_with(Arc::new(TestEngine::new())).await
    }

    /// Start a fresh runtime with the given engine.
    pub async fn start_with(engine: Arc<TestEngine>) -> Self {
        Self::start_in(tempfile::tempdir().unwrap(), engine).await
    }

    /// Start a runtime over an existing directory (for recovery tests that
    /// pre-populate the store).
    pub async fn start_in(dir: tempfile::TempDir, engine: Arc<TestEngine>) -> Self {
        init_tracing();
        let store = Arc::new(
            FileInvocationStore::new(dir.path().join("invocations"))
                .await
                .expect("failed to create store"),
        );
        let runtime = ServiceRuntimeBuilder::new()
            .store(store)
            .engine(engine.clone())
            .instance_state_dir(dir.path().join("instances"))
            .build()
            .expect("failed to build runtime")
            .start()
            .await
            .expect("failed to start runtime");

        Self {
            dir,
            engine,
            runtime,
        }
    }

    pub fn service(&self) -> &Arc<InvocationService> {
        self.runtime.service()
    }

    /// Write an engine instance file, as the engine would after deploying.
    pub fn write_instance(&self, name: &str, state: &str) {
        let instances = self.dir.path().join("instances");
        std::fs::create_dir_all(&instances).unwrap();
        let content = serde_json::json!({
            "tosca_name": { "data": name },
            "state": { "data": state },
        });
        std::fs::write(instances.join(format!("{}_0", name)), content.to_string()).unwrap();
    }

    /// Poll `status` until the invocation reaches a terminal state.
    pub async fn wait_terminal(&self, id: Uuid) -> Invocation {
        for _ in 0..500 {
            if let Some(invocation) = self.service().status(id).await.expect("status failed") {
                if invocation.state.is_terminal() {
                    return invocation;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("invocation {} did not reach a terminal state", id);
    }

    /// Poll until the store no longer reports the record as pending.
    pub async fn wait_not_pending(&self, id: Uuid) -> Invocation {
        for _ in 0..500 {
            if let Some(invocation) = self.service().status(id).await.expect("status failed") {
                if invocation.state != InvocationState::Pending {
                    return invocation;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("invocation {} stayed pending", id);
    }
}
