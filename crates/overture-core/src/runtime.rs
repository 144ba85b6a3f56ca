// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for overture-core.
//!
//! This module provides [`ServiceRuntime`] which wires the store, the
//! engine and the invocation service together and owns the worker task.
//! The (out-of-scope) transport layer embeds this into its own process.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use overture_core::config::Config;
//! use overture_core::engine::CliEngine;
//! use overture_core::persistence::FileInvocationStore;
//! use overture_core::runtime::ServiceRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(FileInvocationStore::new(&config.invocation_dir).await?);
//!     let engine = Arc::new(CliEngine::new(&config.engine_bin));
//!
//!     let runtime = ServiceRuntime::builder()
//!         .store(store)
//!         .engine(engine)
//!         .instance_state_dir(&config.instance_state_dir)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let service = runtime.service().clone();
//!     // ... hand `service` to the transport layer ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::capture::OutputRegistry;
use crate::config::Config;
use crate::engine::{CliEngine, OrchestrationEngine};
use crate::persistence::{FileInvocationStore, InvocationStore};
use crate::service::InvocationService;
use crate::worker::Worker;

/// Builder for creating a [`ServiceRuntime`].
pub struct ServiceRuntimeBuilder {
    store: Option<Arc<dyn InvocationStore>>,
    engine: Option<Arc<dyn OrchestrationEngine>>,
    instance_state_dir: PathBuf,
}

impl std::fmt::Debug for ServiceRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRuntimeBuilder")
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("engine", &self.engine.as_ref().map(|_| "..."))
            .field("instance_state_dir", &self.instance_state_dir)
            .finish()
    }
}

impl Default for ServiceRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            engine: None,
            instance_state_dir: PathBuf::from(".opera/instances"),
        }
    }
}

impl ServiceRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the invocation store (required).
    pub fn store(mut self, store: Arc<dyn InvocationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the orchestration engine (required).
    pub fn engine(mut self, engine: Arc<dyn OrchestrationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the directory the engine keeps its instance state in.
    ///
    /// Default: `.opera/instances`
    pub fn instance_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.instance_state_dir = dir.into();
        self
    }

    /// Wire a file-backed store and a CLI engine from `config`.
    ///
    /// Convenience for embedders that run the stock setup; anything else
    /// goes through [`store`](Self::store) / [`engine`](Self::engine).
    pub async fn from_config(config: &Config) -> Result<ServiceRuntimeConfig> {
        let store = Arc::new(FileInvocationStore::new(&config.invocation_dir).await?);
        let engine = Arc::new(CliEngine::new(&config.engine_bin));
        Self::new()
            .store(store)
            .engine(engine)
            .instance_state_dir(&config.instance_state_dir)
            .build()
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ServiceRuntimeConfig> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("engine is required"))?;

        Ok(ServiceRuntimeConfig {
            store,
            engine,
            instance_state_dir: self.instance_state_dir,
        })
    }
}

/// Configuration for a [`ServiceRuntime`].
pub struct ServiceRuntimeConfig {
    store: Arc<dyn InvocationStore>,
    engine: Arc<dyn OrchestrationEngine>,
    instance_state_dir: PathBuf,
}

impl std::fmt::Debug for ServiceRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRuntimeConfig")
            .field("store", &"...")
            .field("engine", &"...")
            .field("instance_state_dir", &self.instance_state_dir)
            .finish()
    }
}

impl ServiceRuntimeConfig {
    /// Start the runtime: run the startup recovery scan, then spawn the
    /// worker task.
    pub async fn start(self) -> Result<ServiceRuntime> {
        let registry = Arc::new(OutputRegistry::new());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let service = Arc::new(InvocationService::new(
            self.store.clone(),
            registry.clone(),
            self.instance_state_dir.clone(),
            queue_tx,
        ));

        // Seed the history index and reconcile records orphaned by a crash
        // before the worker can race us for them.
        service.recover().await?;

        let shutdown = Arc::new(Notify::new());
        let worker = Worker::new(
            self.store,
            self.engine,
            registry,
            self.instance_state_dir,
            queue_rx,
            shutdown.clone(),
        );
        let worker_handle = tokio::spawn(worker.run());

        info!("ServiceRuntime started");

        Ok(ServiceRuntime {
            service,
            worker_handle,
            shutdown,
        })
    }
}

/// A running invocation service that can be embedded in an application.
///
/// The runtime owns the single worker task. Call
/// [`shutdown`](Self::shutdown) for graceful termination; an in-flight
/// invocation always runs to its terminal state first.
pub struct ServiceRuntime {
    service: Arc<InvocationService>,
    worker_handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl ServiceRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ServiceRuntimeBuilder {
        ServiceRuntimeBuilder::new()
    }

    /// Get a reference to the shared invocation service.
    pub fn service(&self) -> &Arc<InvocationService> {
        &self.service
    }

    /// Check if the worker task is still running.
    pub fn is_running(&self) -> bool {
        !self.worker_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the worker and waits for it to stop. The queue may still
    /// contain pending entries; their records stay `pending` in the store
    /// and are re-enqueued by the next start's recovery scan.
    pub async fn shutdown(self) -> Result<()> {
        info!("ServiceRuntime shutting down...");

        self.shutdown.notify_one();

        match self.worker_handle.await {
            Ok(()) => {
                info!("ServiceRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Worker task panicked: {}", e);
                Err(anyhow::anyhow!("worker task panicked: {}", e))
            }
        }
    }
}
