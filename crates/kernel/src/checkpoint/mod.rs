// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpointing: immutable snapshots of registry and pane state for crash
//! recovery and session resumption.

pub mod db;
pub mod file;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::registry::{Agent, MessageRecord, Team};

pub use db::SqliteCheckpointer;
pub use file::FileCheckpointer;

/// Serializable state of one terminal pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub pane_id: String,
    pub persistent_id: String,
    pub name: String,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default)]
    pub is_monitoring: bool,
    #[serde(default)]
    pub last_screen_update: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_command: Option<String>,
    #[serde(default)]
    pub last_output: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_max_lines() -> usize {
    50
}

impl SessionState {
    pub fn new(pane_id: &str, persistent_id: &str, name: &str) -> Self {
        Self {
            pane_id: pane_id.to_owned(),
            persistent_id: persistent_id.to_owned(),
            name: name.to_owned(),
            max_lines: default_max_lines(),
            is_monitoring: false,
            last_screen_update: 0.0,
            created_at: Utc::now(),
            last_command: None,
            last_output: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Serializable snapshot of the agent registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub agents: BTreeMap<String, Agent>,
    #[serde(default)]
    pub teams: BTreeMap<String, Team>,
    #[serde(default)]
    pub active_pane: Option<String>,
    #[serde(default)]
    pub message_history: Vec<MessageRecord>,
}

/// A complete checkpoint. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionState>,
    #[serde(default)]
    pub registry: Option<RegistryState>,
    pub trigger: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Checkpoint {
    pub fn new(
        sessions: BTreeMap<String, SessionState>,
        registry: Option<RegistryState>,
        trigger: &str,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            version: "1.0".to_owned(),
            sessions,
            registry,
            trigger: trigger.to_owned(),
            metadata,
        }
    }
}

/// Summary row returned by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    pub trigger: String,
    pub session_ids: Vec<String>,
    pub has_registry: bool,
}

/// Storage backend contract for checkpoints.
///
/// `load` and `latest` treat corrupt or missing data as a cache miss and
/// return `None`; only `save` surfaces backend errors.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String>;

    async fn load(&self, checkpoint_id: &str) -> Option<Checkpoint>;

    async fn list(&self, session_id: Option<&str>, limit: usize) -> Vec<CheckpointMeta>;

    async fn delete(&self, checkpoint_id: &str) -> bool;

    async fn latest(&self, session_id: Option<&str>) -> Option<Checkpoint> {
        let metas = self.list(session_id, 1).await;
        let meta = metas.first()?;
        self.load(&meta.checkpoint_id).await
    }
}

struct ManagerState {
    operation_count: u32,
    last_checkpoint_id: Option<String>,
}

/// High-level checkpoint operations over any [`Checkpointer`].
pub struct CheckpointManager {
    checkpointer: Box<dyn Checkpointer>,
    auto_checkpoint: bool,
    checkpoint_interval: u32,
    state: Mutex<ManagerState>,
}

impl CheckpointManager {
    pub fn new(
        checkpointer: Box<dyn Checkpointer>,
        auto_checkpoint: bool,
        checkpoint_interval: u32,
    ) -> Self {
        Self {
            checkpointer,
            auto_checkpoint,
            checkpoint_interval: checkpoint_interval.max(1),
            state: Mutex::new(ManagerState { operation_count: 0, last_checkpoint_id: None }),
        }
    }

    /// Create and save a new checkpoint, resetting the auto-checkpoint
    /// counter.
    pub async fn create(
        &self,
        sessions: BTreeMap<String, SessionState>,
        registry: Option<RegistryState>,
        trigger: &str,
        metadata: BTreeMap<String, Value>,
    ) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::new(sessions, registry, trigger, metadata);
        self.checkpointer.save(&checkpoint).await?;

        let mut state = self.state.lock().await;
        state.last_checkpoint_id = Some(checkpoint.checkpoint_id.clone());
        state.operation_count = 0;
        debug!(id = %checkpoint.checkpoint_id, trigger, "checkpoint created");
        Ok(checkpoint)
    }

    /// Restore a specific checkpoint, or the latest when no id is given.
    pub async fn restore(&self, checkpoint_id: Option<&str>) -> Option<Checkpoint> {
        match checkpoint_id {
            Some(id) => self.checkpointer.load(id).await,
            None => self.checkpointer.latest(None).await,
        }
    }

    /// Count an operation and report whether the auto-checkpoint threshold
    /// has been reached.
    pub async fn should_auto_checkpoint(&self) -> bool {
        if !self.auto_checkpoint {
            return false;
        }
        let mut state = self.state.lock().await;
        state.operation_count += 1;
        state.operation_count >= self.checkpoint_interval
    }

    pub async fn list(&self, session_id: Option<&str>, limit: usize) -> Vec<CheckpointMeta> {
        self.checkpointer.list(session_id, limit).await
    }

    pub async fn delete(&self, checkpoint_id: &str) -> bool {
        self.checkpointer.delete(checkpoint_id).await
    }

    pub async fn last_id(&self) -> Option<String> {
        self.state.lock().await.last_checkpoint_id.clone()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
