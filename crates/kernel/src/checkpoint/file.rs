// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed checkpointer: one JSON blob per checkpoint plus an index
//! file for fast listing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

use super::{Checkpoint, CheckpointMeta, Checkpointer};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    created_at: DateTime<Utc>,
    trigger: String,
    session_ids: Vec<String>,
    has_registry: bool,
}

/// Checkpoint storage as `{id}.json` files under a directory.
pub struct FileCheckpointer {
    dir: PathBuf,
    index_path: PathBuf,
    index: Mutex<HashMap<String, IndexEntry>>,
}

impl FileCheckpointer {
    /// Open (or create) a checkpoint directory and load its index.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let index_path = dir.join("index.json");

        let index = match std::fs::read_to_string(&index_path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(error = %e, "checkpoint index unreadable, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Ok(Self { dir: dir.to_owned(), index_path, index: Mutex::new(index) })
    }

    fn checkpoint_path(&self, checkpoint_id: &str) -> PathBuf {
        self.dir.join(format!("{checkpoint_id}.json"))
    }

    fn write_index(&self, index: &HashMap<String, IndexEntry>) -> Result<()> {
        let contents = serde_json::to_string_pretty(index)
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;
        std::fs::write(&self.index_path, contents)?;
        Ok(())
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String> {
        let contents = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;
        std::fs::write(self.checkpoint_path(&checkpoint.checkpoint_id), contents)?;

        let mut index = self.index.lock().await;
        index.insert(
            checkpoint.checkpoint_id.clone(),
            IndexEntry {
                created_at: checkpoint.created_at,
                trigger: checkpoint.trigger.clone(),
                session_ids: checkpoint.sessions.keys().cloned().collect(),
                has_registry: checkpoint.registry.is_some(),
            },
        );
        self.write_index(&index)?;

        Ok(checkpoint.checkpoint_id.clone())
    }

    async fn load(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        let contents = std::fs::read_to_string(self.checkpoint_path(checkpoint_id)).ok()?;
        match serde_json::from_str(&contents) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(id = checkpoint_id, error = %e, "checkpoint blob unreadable");
                None
            }
        }
    }

    async fn list(&self, session_id: Option<&str>, limit: usize) -> Vec<CheckpointMeta> {
        let index = self.index.lock().await;
        let mut metas: Vec<CheckpointMeta> = index
            .iter()
            .filter(|(_, entry)| {
                session_id.is_none_or(|sid| entry.session_ids.iter().any(|s| s == sid))
            })
            .map(|(id, entry)| CheckpointMeta {
                checkpoint_id: id.clone(),
                created_at: entry.created_at,
                trigger: entry.trigger.clone(),
                session_ids: entry.session_ids.clone(),
                has_registry: entry.has_registry,
            })
            .collect();

        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        metas.truncate(limit);
        metas
    }

    async fn delete(&self, checkpoint_id: &str) -> bool {
        let path = self.checkpoint_path(checkpoint_id);
        if !path.exists() {
            return false;
        }
        if std::fs::remove_file(&path).is_err() {
            return false;
        }

        let mut index = self.index.lock().await;
        if index.remove(checkpoint_id).is_some() {
            let _ = self.write_index(&index);
        }
        true
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
