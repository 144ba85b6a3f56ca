// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The single invocation worker.
//!
//! One long-lived task pulls queued invocations in FIFO order and runs each
//! to completion before taking the next. This serialization is what makes
//! "at most one invocation in progress" a structural guarantee rather than
//! a locking discipline.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Notify, mpsc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::capture::{CaptureBuffer, OutputRegistry};
use crate::engine::{self, OrchestrationEngine};
use crate::invocation::{FailureDetail, InvocationState, OperationRequest};
use crate::persistence::InvocationStore;
use crate::snapshot;

/// One queue entry: the persisted record's id plus the validated request.
#[derive(Debug)]
pub(crate) struct QueuedInvocation {
    pub(crate) id: Uuid,
    pub(crate) request: OperationRequest,
}

/// The sequential executor behind the invocation queue.
pub(crate) struct Worker {
    store: Arc<dyn InvocationStore>,
    engine: Arc<dyn OrchestrationEngine>,
    registry: Arc<OutputRegistry>,
    instance_state_dir: PathBuf,
    queue: mpsc::UnboundedReceiver<QueuedInvocation>,
    shutdown: Arc<Notify>,
}

impl Worker {
    pub(crate) fn new(
        store: Arc<dyn InvocationStore>,
        engine: Arc<dyn OrchestrationEngine>,
        registry: Arc<OutputRegistry>,
        instance_state_dir: PathBuf,
        queue: mpsc::UnboundedReceiver<QueuedInvocation>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            engine,
            registry,
            instance_state_dir,
            queue,
            shutdown,
        }
    }

    /// Run the worker loop until shutdown or queue closure.
    ///
    /// An item that has been dequeued is always processed to its terminal
    /// state; the shutdown signal is only observed between items.
    pub(crate) async fn run(mut self) {
        info!("Invocation worker started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Invocation worker received shutdown signal");
                    break;
                }

                queued = self.queue.recv() => {
                    match queued {
                        Some(queued) => self.process(queued).await,
                        None => {
                            info!("Invocation queue closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Invocation worker stopped");
    }

    /// Drive one invocation through its state machine.
    #[instrument(skip(self, queued), fields(invocation_id = %queued.id, operation = %queued.request.operation()))]
    async fn process(&self, queued: QueuedInvocation) {
        let mut invocation = match self.store.read(queued.id).await {
            Ok(Some(invocation)) => invocation,
            Ok(None) => {
                warn!("Queued invocation has no persisted record, skipping");
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to load queued invocation, skipping");
                return;
            }
        };

        invocation.state = InvocationState::InProgress;
        if let Err(e) = self.store.write(&invocation).await {
            // Leave the record pending; restart recovery will re-enqueue it.
            error!(error = %e, "Failed to persist in-progress state, skipping");
            return;
        }

        let session = self.registry.begin(invocation.id);
        let outcome = self.execute(&queued.request, session.buffer()).await;
        let (stdout, stderr) = session.drain();

        invocation.stdout = stdout;
        invocation.stderr = stderr;
        invocation.instance_snapshot =
            Some(snapshot::read_instance_state(&self.instance_state_dir).await);

        match outcome {
            Ok(()) => {
                invocation.state = InvocationState::Success;
                info!("Invocation succeeded");
            }
            Err(e) => {
                invocation.state = InvocationState::Failed;
                invocation.failure_detail = Some(FailureDetail::from(&e));
                error!(error = %e, "Invocation failed");
            }
        }

        if let Err(e) = self.store.write(&invocation).await {
            error!(error = %e, "Failed to persist terminal state");
        }
    }

    async fn execute(
        &self,
        request: &OperationRequest,
        output: &CaptureBuffer,
    ) -> engine::Result<()> {
        match request {
            OperationRequest::Deploy {
                service_template,
                inputs,
                clean_state,
            } => {
                self.engine
                    .deploy(service_template, inputs, *clean_state, output)
                    .await
            }
            OperationRequest::Undeploy => self.engine.undeploy(output).await,
            OperationRequest::Notify { trigger, inputs } => {
                self.engine.notify(trigger, inputs, output).await
            }
            OperationRequest::Update {
                service_template,
                inputs,
            } => self.engine.update(service_template, inputs, output).await,
        }
    }
}
