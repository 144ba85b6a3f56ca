// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File-backed invocation store.
//!
//! Stores each record as `invocation-{id}.json` in a flat directory. Writes
//! go through a temp file, fsync and rename so a crash mid-write leaves
//! either the previous record or a skippable temp file, never a torn one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use crate::error::CoreError;
use crate::invocation::Invocation;
use crate::persistence::InvocationStore;

/// File-backed implementation of [`InvocationStore`].
#[derive(Debug)]
pub struct FileInvocationStore {
    dir: PathBuf,
}

impl FileInvocationStore {
    /// Create a store at `dir`, creating the directory if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::persistence("create_dir", e))?;
        Ok(Self { dir })
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("invocation-{}.json", id))
    }

    fn parse_record(path: &Path, content: &str) -> Option<Invocation> {
        match serde_json::from_str(content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed invocation record");
                None
            }
        }
    }
}

#[async_trait]
impl InvocationStore for FileInvocationStore {
    async fn write(&self, invocation: &Invocation) -> Result<(), CoreError> {
        let content = serde_json::to_vec_pretty(invocation)
            .map_err(|e| CoreError::persistence("serialize", e))?;

        // Temp name starts with '.' so the listing scan never picks it up.
        let tmp_path = self
            .dir
            .join(format!(".invocation-{}.json.tmp", invocation.id));

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| CoreError::persistence("write", e))?;
        file.write_all(&content)
            .await
            .map_err(|e| CoreError::persistence("write", e))?;
        file.sync_all()
            .await
            .map_err(|e| CoreError::persistence("sync", e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, self.record_path(invocation.id))
            .await
            .map_err(|e| CoreError::persistence("rename", e))?;

        Ok(())
    }

    async fn read(&self, id: Uuid) -> Result<Option<Invocation>, CoreError> {
        let path = self.record_path(id);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::persistence("read", e)),
        };

        Ok(Self::parse_record(&path, &content))
    }

    async fn list_all(&self) -> Result<Vec<Invocation>, CoreError> {
        let mut records = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CoreError::persistence("list", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::persistence("list", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with("invocation-") || !name.ends_with(".json") {
                continue;
            }

            let path = entry.path();
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    if let Some(record) = Self::parse_record(&path, &content) {
                        records.push(record);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable invocation record");
                }
            }
        }

        Ok(records)
    }
}
