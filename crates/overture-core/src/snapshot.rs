// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance state snapshots.
//!
//! The engine keeps one JSON file per deployed component in its instance
//! directory. This module reduces that directory to a component-name ->
//! lifecycle-state map. Reads are best-effort: the worker may be writing
//! the directory while a status query reads it, so unreadable or malformed
//! entries are skipped rather than surfaced.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

/// Attribute wrapper used by the engine's instance files.
#[derive(Debug, Deserialize)]
struct Attribute {
    data: String,
}

/// The subset of an instance file the snapshot cares about.
#[derive(Debug, Deserialize)]
struct InstanceFile {
    tosca_name: Attribute,
    state: Attribute,
}

/// Read the engine's instance directory into a component -> state map.
///
/// A missing directory yields an empty map; entries that cannot be read or
/// parsed are skipped.
pub async fn read_instance_state(dir: &Path) -> BTreeMap<String, String> {
    let mut snapshot = BTreeMap::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Instance state directory not readable");
            return snapshot;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                break;
            }
        };

        let path = entry.path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable instance file");
                continue;
            }
        };

        match serde_json::from_str::<InstanceFile>(&content) {
            Ok(instance) => {
                snapshot.insert(instance.tosca_name.data, instance.state.data);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping malformed instance file");
            }
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_instance(dir: &Path, file: &str, name: &str, state: &str) {
        let content = serde_json::json!({
            "tosca_name": { "data": name },
            "state": { "data": state },
            "attributes": {}
        });
        std::fs::write(dir.join(file), content.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_reads_component_states() {
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "my-server_0", "my-server", "started");
        write_instance(dir.path(), "my-network_0", "my-network", "configured");

        let snapshot = read_instance_state(dir.path()).await;
        assert_eq!(
            snapshot,
            BTreeMap::from([
                ("my-server".to_string(), "started".to_string()),
                ("my-network".to_string(), "configured".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn test_missing_dir_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(read_instance_state(&missing).await.is_empty());
    }

    #[tokio::test]
    async fn test_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "good_0", "good", "started");
        std::fs::write(dir.path().join("half-written"), "{\"tosca_na").unwrap();
        std::fs::write(dir.path().join("wrong-shape"), "[1, 2, 3]").unwrap();

        let snapshot = read_instance_state(dir.path()).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("good").map(String::as_str), Some("started"));
    }
}
