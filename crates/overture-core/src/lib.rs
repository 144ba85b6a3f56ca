// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overture Core - Background Invocation Service
//!
//! This crate provides the invocation subsystem for overture: a durable,
//! strictly-serialized job queue in front of an orchestration engine.
//! Callers submit deploy/undeploy/notify/update operations, get an id back
//! immediately, and poll for completion; every run's output and outcome is
//! persisted as one JSON record per invocation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Transport Layer                              │
//! │              (REST API, CLI — out of scope, embeds this crate)      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                │ submit / history / status / latest
//!                ▼
//! ┌──────────────────────────┐      enqueue      ┌─────────────────────┐
//! │    InvocationService     │──────────────────►│       Worker        │
//! │  id + timestamp, index,  │    FIFO channel   │  one task, one item │
//! │  live-output overlay     │                   │  at a time          │
//! └──────────────────────────┘                   └─────────────────────┘
//!                │                                  │            │
//!                ▼                                  ▼            ▼
//! ┌──────────────────────────┐      ┌───────────────────┐ ┌─────────────┐
//! │     InvocationStore      │      │  OutputRegistry   │ │   Engine    │
//! │  invocation-{id}.json    │      │ per-id capture    │ │ (black box, │
//! │  (durable, full record)  │      │ buffers           │ │ subprocess) │
//! └──────────────────────────┘      └───────────────────┘ └─────────────┘
//! ```
//!
//! # Invocation State Machine
//!
//! ```text
//!      ┌─────────┐
//!      │ PENDING │  persisted by submit, before enqueue
//!      └────┬────┘
//!           │ worker dequeues
//!           ▼
//!    ┌─────────────┐
//!    │ IN_PROGRESS │  at most one, ever (single worker)
//!    └──────┬──────┘
//!           │ engine call returns
//!     ┌─────┴─────┐
//!     ▼           ▼
//! ┌─────────┐ ┌────────┐
//! │ SUCCESS │ │ FAILED │  terminal; output + instance snapshot attached
//! └─────────┘ └────────┘
//! ```
//!
//! | State | Description |
//! |-------|-------------|
//! | `pending` | Durably recorded, waiting in the queue |
//! | `in_progress` | The worker is executing the engine call |
//! | `success` | Engine call completed; output and snapshot attached |
//! | `failed` | Engine call failed; `failure_detail` carries the diagnosis |
//!
//! # Guarantees
//!
//! - Operations execute in exact submission order, one at a time.
//! - `submit` returns after the pending record is durable; it never waits
//!   for execution.
//! - Each record is written whole (temp file + fsync + rename), so readers
//!   never observe a torn record, and one corrupt file never breaks history.
//! - Output capture is per-invocation; a status query overlays the live
//!   buffer of the one in-flight run and can never read another run's text.
//! - The queue itself is in-memory: on restart, pending records are
//!   re-enqueued and interrupted in-progress records are marked failed with
//!   a `lost_on_restart` detail.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `OVERTURE_INVOCATION_DIR` | No | `.overture/invocations` | Invocation record directory |
//! | `OVERTURE_INSTANCE_STATE_DIR` | No | `.opera/instances` | Engine instance-state directory |
//! | `OVERTURE_ENGINE_BIN` | No | `opera` | Engine executable for [`CliEngine`](engine::CliEngine) |
//!
//! # Modules
//!
//! - [`capture`]: Per-invocation output buffers and the live-output registry
//! - [`config`]: Configuration from environment variables
//! - [`engine`]: The orchestration engine seam and the subprocess adapter
//! - [`error`]: Error types with transport-layer error code mapping
//! - [`invocation`]: The invocation record and operation types
//! - [`persistence`]: Store trait and the file-backed backend
//! - [`runtime`]: Embeddable runtime (builder, worker task, shutdown)
//! - [`service`]: The public submit/history/status/latest surface
//! - [`snapshot`]: Instance-state snapshots read from the engine's files

#![deny(missing_docs)]

/// Per-invocation output capture buffers and the live-output registry.
pub mod capture;

/// Configuration loaded from environment variables.
pub mod config;

/// Orchestration engine contract and subprocess-backed adapter.
pub mod engine;

/// Error types for core operations with transport error code mapping.
pub mod error;

/// Invocation records, operation types and failure details.
pub mod invocation;

/// Persistence trait and file-backed invocation store.
pub mod persistence;

/// Embeddable runtime wiring store, engine, service and worker.
pub mod runtime;

/// The public invocation service surface.
pub mod service;

/// Instance-state snapshot reader.
pub mod snapshot;

mod worker;
