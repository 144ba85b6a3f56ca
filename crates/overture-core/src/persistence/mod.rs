// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for overture-core.
//!
//! This module defines the persistence abstraction and backend
//! implementations. Every write is a full-record overwrite keyed by the
//! invocation id, so a reader never observes a torn record.

pub mod file;

pub use self::file::FileInvocationStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CoreError;
use crate::invocation::Invocation;

/// Persistence interface used by the service and the worker.
#[async_trait]
pub trait InvocationStore: Send + Sync {
    /// Persist the full record, keyed by its id. Idempotent; the record is
    /// durable before this returns.
    async fn write(&self, invocation: &Invocation) -> Result<(), CoreError>;

    /// Read one record. `None` if no record with this id exists (or its
    /// entry is unreadable — corruption reads as absence, not failure).
    async fn read(&self, id: Uuid) -> Result<Option<Invocation>, CoreError>;

    /// Enumerate all persisted records, in no particular order.
    ///
    /// Malformed entries are skipped; a single bad record never aborts the
    /// listing.
    async fn list_all(&self) -> Result<Vec<Invocation>, CoreError>;
}
