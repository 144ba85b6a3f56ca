// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-invocation output capture.
//!
//! Every run gets its own [`CaptureBuffer`]; a status query can therefore
//! never race with the next invocation's writes, and nothing leaks between
//! runs. The [`OutputRegistry`] maps the id of the currently running
//! invocation to its live buffer so history queries can overlay output that
//! has not been persisted yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use uuid::Uuid;

// Capture is best-effort: a poisoned buffer still holds valid text, take it.
fn lock(m: &Mutex<String>) -> MutexGuard<'_, String> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Accumulates the stdout/stderr text of a single engine call.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    stdout: Mutex<String>,
    stderr: Mutex<String>,
}

impl CaptureBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of standard output.
    pub fn append_stdout(&self, chunk: &str) {
        lock(&self.stdout).push_str(chunk);
    }

    /// Append a chunk of standard error.
    pub fn append_stderr(&self, chunk: &str) {
        lock(&self.stderr).push_str(chunk);
    }

    /// Copy out the current contents without consuming them.
    ///
    /// Used for the in-progress overlay; may observe a prefix of a write
    /// that is still in flight.
    pub fn snapshot(&self) -> (String, String) {
        (lock(&self.stdout).clone(), lock(&self.stderr).clone())
    }

    /// Take the contents, leaving the buffer empty.
    fn take(&self) -> (String, String) {
        (
            std::mem::take(&mut *lock(&self.stdout)),
            std::mem::take(&mut *lock(&self.stderr)),
        )
    }
}

/// Map from running invocation id to its live capture buffer.
///
/// Owned by the service and shared with the worker; replaces any notion of
/// process-global output sinks.
#[derive(Debug, Default)]
pub struct OutputRegistry {
    live: RwLock<HashMap<Uuid, Arc<CaptureBuffer>>>,
}

impl OutputRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh buffer for `id` and return the session guard.
    ///
    /// The entry is removed when the guard is dropped, on every exit path.
    pub fn begin(self: &Arc<Self>, id: Uuid) -> CaptureSession {
        let buffer = Arc::new(CaptureBuffer::new());
        self.live
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, buffer.clone());
        CaptureSession {
            registry: self.clone(),
            id,
            buffer,
        }
    }

    /// Best-effort snapshot of the live output for `id`, if it is running.
    pub fn live_output(&self, id: Uuid) -> Option<(String, String)> {
        let map = self
            .live
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        map.get(&id).map(|buffer| buffer.snapshot())
    }

    fn remove(&self, id: Uuid) {
        self.live
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.live
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// Scoped registration of a capture buffer for one run.
///
/// Deregisters on drop, so an engine failure (or panic unwinding through the
/// worker) cannot leave a stale live entry behind.
#[derive(Debug)]
pub struct CaptureSession {
    registry: Arc<OutputRegistry>,
    id: Uuid,
    buffer: Arc<CaptureBuffer>,
}

impl CaptureSession {
    /// The buffer the engine call writes into.
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Take the captured output and end the session.
    pub fn drain(self) -> (String, String) {
        self.buffer.take()
        // Drop removes the registry entry.
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
