// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL journal files for registry state.
//!
//! Agents and teams are small sets, so their journals are rewritten in full
//! on every mutation. Message records are append-only. A malformed line is
//! skipped with a warning so one bad write never poisons the whole load.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

/// Journal file paths for one registry instance.
#[derive(Debug, Clone)]
pub struct Journal {
    agents_path: PathBuf,
    teams_path: PathBuf,
    messages_path: PathBuf,
}

impl Journal {
    /// Create a journal rooted at `data_dir`, creating the directory if
    /// needed.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            agents_path: data_dir.join("agents.jsonl"),
            teams_path: data_dir.join("teams.jsonl"),
            messages_path: data_dir.join("messages.jsonl"),
        })
    }

    pub fn rewrite_agents<T: Serialize>(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        rewrite(&self.agents_path, items)
    }

    pub fn rewrite_teams<T: Serialize>(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        rewrite(&self.teams_path, items)
    }

    pub fn rewrite_messages<T: Serialize>(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        rewrite(&self.messages_path, items)
    }

    pub fn append_message<T: Serialize>(&self, item: &T) -> Result<()> {
        append(&self.messages_path, item)
    }

    pub fn load_agents<T: DeserializeOwned>(&self) -> Vec<T> {
        load(&self.agents_path)
    }

    pub fn load_teams<T: DeserializeOwned>(&self) -> Vec<T> {
        load(&self.teams_path)
    }

    pub fn load_messages<T: DeserializeOwned>(&self) -> Vec<T> {
        load(&self.messages_path)
    }
}

/// Replace the file contents with one JSON line per item.
fn rewrite<T: Serialize>(path: &Path, items: impl IntoIterator<Item = T>) -> Result<()> {
    let mut buf = String::new();
    for item in items {
        buf.push_str(&serde_json::to_string(&item).map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?);
        buf.push('\n');
    }
    std::fs::write(path, buf)?;
    Ok(())
}

/// Append one JSON line to the file.
fn append<T: Serialize>(path: &Path, item: &T) -> Result<()> {
    let mut line = serde_json::to_string(item)
        .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Load every parseable line; skip the rest with a warning.
fn load<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return vec![];
    };
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping malformed journal line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
