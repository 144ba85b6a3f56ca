// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The public invocation service.
//!
//! [`InvocationService`] is the only entry point a transport layer calls:
//! `submit` / `history` / `status` / `latest`. It owns the store handle, the
//! queue sender and the output registry — one explicit instance per process,
//! shared by `Arc`, with no ambient globals.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::capture::OutputRegistry;
use crate::error::CoreError;
use crate::invocation::{FailureDetail, Invocation, InvocationState, OperationRequest};
use crate::persistence::InvocationStore;
use crate::snapshot;
use crate::worker::QueuedInvocation;

type IndexKey = (DateTime<Utc>, Uuid);

/// Coordinator for submission and history queries.
///
/// Records are mutated only by the worker once submitted; the service reads
/// them back and, for the one possibly in-flight record, overlays live
/// captured output and a live instance snapshot.
pub struct InvocationService {
    store: Arc<dyn InvocationStore>,
    registry: Arc<OutputRegistry>,
    instance_state_dir: PathBuf,
    queue: mpsc::UnboundedSender<QueuedInvocation>,
    // Timestamp-sorted ids, seeded by one full scan at startup and appended
    // on every submit, so history() never re-sorts the whole store.
    index: RwLock<BTreeSet<IndexKey>>,
}

impl std::fmt::Debug for InvocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationService")
            .field("instance_state_dir", &self.instance_state_dir)
            .finish()
    }
}

impl InvocationService {
    pub(crate) fn new(
        store: Arc<dyn InvocationStore>,
        registry: Arc<OutputRegistry>,
        instance_state_dir: PathBuf,
        queue: mpsc::UnboundedSender<QueuedInvocation>,
    ) -> Self {
        Self {
            store,
            registry,
            instance_state_dir,
            queue,
            index: RwLock::new(BTreeSet::new()),
        }
    }

    /// Submit an operation for execution.
    ///
    /// Allocates the id and timestamp, durably persists the pending record,
    /// enqueues it for the worker and returns immediately — execution is
    /// never awaited here. Fails only if the store write fails or the
    /// runtime is shutting down ([`CoreError::QueueClosed`]).
    #[instrument(skip(self, request), fields(operation = %request.operation()))]
    pub async fn submit(&self, request: OperationRequest) -> Result<Invocation, CoreError> {
        let id = Uuid::new_v4();
        let submitted_at = Utc::now();
        info!(invocation_id = %id, "Submitting invocation");

        let invocation = Invocation::pending(id, &request, submitted_at);
        self.store.write(&invocation).await?;
        self.index_insert((submitted_at, id));

        self.queue
            .send(QueuedInvocation { id, request })
            .map_err(|_| CoreError::QueueClosed)?;

        Ok(invocation)
    }

    /// All persisted invocations, most recently submitted first.
    ///
    /// Unreadable records are skipped (a gap in history, never a failure of
    /// the whole query); the in-flight record, if any, carries live output.
    pub async fn history(&self) -> Result<Vec<Invocation>, CoreError> {
        let keys: Vec<IndexKey> = {
            let index = self
                .index
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            index.iter().rev().copied().collect()
        };

        let mut records = Vec::with_capacity(keys.len());
        for (_, id) in keys {
            match self.store.read(id).await {
                Ok(Some(invocation)) => records.push(self.overlay(invocation).await),
                Ok(None) => {}
                Err(e) => {
                    warn!(invocation_id = %id, error = %e, "Skipping unreadable record in history");
                }
            }
        }
        Ok(records)
    }

    /// One invocation by id, with the same overlay as [`history`](Self::history).
    pub async fn status(&self, id: Uuid) -> Result<Option<Invocation>, CoreError> {
        match self.store.read(id).await? {
            Some(invocation) => Ok(Some(self.overlay(invocation).await)),
            None => Ok(None),
        }
    }

    /// The most recently submitted invocation, if any.
    pub async fn latest(&self) -> Result<Option<Invocation>, CoreError> {
        let keys: Vec<IndexKey> = {
            let index = self
                .index
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            index.iter().rev().copied().collect()
        };

        for (_, id) in keys {
            if let Some(invocation) = self.store.read(id).await? {
                return Ok(Some(self.overlay(invocation).await));
            }
        }
        Ok(None)
    }

    /// Reconcile the durable store with the (empty) in-memory queue.
    ///
    /// Called once by the runtime before the worker starts: seeds the
    /// history index, re-enqueues pending records oldest-first, and marks
    /// records caught in-progress by a crash as failed.
    pub(crate) async fn recover(&self) -> Result<(), CoreError> {
        let mut records = self.store.list_all().await?;
        records.sort_by_key(|record| record.submitted_at);

        let mut requeued = 0u32;
        let mut orphaned = 0u32;

        for mut record in records {
            self.index_insert((record.submitted_at, record.id));

            match record.state {
                InvocationState::Pending => {
                    match OperationRequest::from_record(record.operation, &record.payload) {
                        Ok(request) => {
                            self.queue
                                .send(QueuedInvocation {
                                    id: record.id,
                                    request,
                                })
                                .map_err(|_| CoreError::QueueClosed)?;
                            requeued += 1;
                        }
                        Err(e) => {
                            warn!(
                                invocation_id = %record.id,
                                error = %e,
                                "Pending record has an invalid payload, marking failed"
                            );
                            record.state = InvocationState::Failed;
                            record.failure_detail = Some(FailureDetail::invalid_payload(&e));
                            self.store.write(&record).await?;
                        }
                    }
                }
                InvocationState::InProgress => {
                    record.state = InvocationState::Failed;
                    record.failure_detail = Some(FailureDetail::lost_on_restart());
                    self.store.write(&record).await?;
                    orphaned += 1;
                }
                InvocationState::Success | InvocationState::Failed => {}
            }
        }

        if requeued > 0 || orphaned > 0 {
            info!(requeued, orphaned, "Recovered persisted invocations");
        }
        Ok(())
    }

    async fn overlay(&self, mut invocation: Invocation) -> Invocation {
        if invocation.state == InvocationState::InProgress {
            if let Some((stdout, stderr)) = self.registry.live_output(invocation.id) {
                invocation.stdout = stdout;
                invocation.stderr = stderr;
            }
            invocation.instance_snapshot =
                Some(snapshot::read_instance_state(&self.instance_state_dir).await);
        }
        invocation
    }

    fn index_insert(&self, key: IndexKey) {
        self.index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key);
    }
}
