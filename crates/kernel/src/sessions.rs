// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent pane identities.
//!
//! Backend pane ids change across emulator restarts; the kernel mints a
//! stable UUID per pane and records the last-known backend binding in
//! `persistent_sessions.json` so orchestrators can re-attach by the
//! stable id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Last-known backend binding for one persistent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentSessionEntry {
    pub pane_id: String,
    pub name: String,
}

/// Map from core-minted persistent ids to backend panes.
pub struct PersistentSessions {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, PersistentSessionEntry>>,
}

impl PersistentSessions {
    /// Open the map under `data_dir`, loading any existing file.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("persistent_sessions.json");

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(error = %e, "persistent session map unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Ok(Self { path, entries: Mutex::new(entries) })
    }

    fn save(&self, entries: &BTreeMap<String, PersistentSessionEntry>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries)
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Mint a fresh persistent id bound to the given pane.
    pub fn mint(&self, pane_id: &str, name: &str) -> Result<String> {
        let persistent_id = uuid::Uuid::new_v4().to_string();
        self.bind(&persistent_id, pane_id, name)?;
        Ok(persistent_id)
    }

    /// Bind (or rebind) a persistent id to a backend pane.
    pub fn bind(&self, persistent_id: &str, pane_id: &str, name: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            persistent_id.to_owned(),
            PersistentSessionEntry { pane_id: pane_id.to_owned(), name: name.to_owned() },
        );
        self.save(&entries)
    }

    pub fn get(&self, persistent_id: &str) -> Option<PersistentSessionEntry> {
        self.entries.lock().get(persistent_id).cloned()
    }

    /// Find the persistent id bound to a backend pane, if any.
    pub fn find_by_pane(&self, pane_id: &str) -> Option<String> {
        self.entries
            .lock()
            .iter()
            .find(|(_, entry)| entry.pane_id == pane_id)
            .map(|(id, _)| id.clone())
    }

    pub fn remove(&self, persistent_id: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        if entries.remove(persistent_id).is_none() {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    pub fn all(&self) -> BTreeMap<String, PersistentSessionEntry> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
