// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat-file memory backend: one JSON document holding every namespace.
//! Search is a case-insensitive substring scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

use super::{
    namespace_key, parse_namespace, Memory, MemorySearchResult, MemoryStats, MemoryStore,
    NamespaceCount,
};

type NamespaceMap = IndexMap<String, IndexMap<String, Memory>>;

/// JSON-file memory store for development and single-agent use.
pub struct FileMemoryStore {
    path: PathBuf,
    data: Mutex<NamespaceMap>,
}

impl FileMemoryStore {
    /// Open the store, loading any existing file. An unreadable file
    /// starts the store empty rather than failing.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(file = %path.display(), error = %e, "memory file unreadable, starting empty");
                NamespaceMap::new()
            }),
            Err(_) => NamespaceMap::new(),
        };

        Ok(Self { path: path.to_owned(), data: Mutex::new(data) })
    }

    fn save(&self, data: &NamespaceMap) -> Result<()> {
        let contents = serde_json::to_string_pretty(data)
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Score one memory against a lowercase query per the substring rules:
/// value match 1.0, key match 0.8, metadata match 0.6.
fn score_memory(memory: &Memory, query_lower: &str, query_len: usize) -> Option<(f64, Option<String>)> {
    let mut score = 0.0_f64;
    let mut context = None;

    if memory.key.to_lowercase().contains(query_lower) {
        score = score.max(0.8);
        context = Some(format!("Key: {}", memory.key));
    }

    let value_str = match &memory.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if let Some(idx) = value_str.to_lowercase().find(query_lower) {
        score = score.max(1.0);
        let start = idx.saturating_sub(30);
        let end = (idx + query_len + 30).min(value_str.len());
        // Snap to char boundaries so multi-byte values can't split.
        let start = (0..=start).rev().find(|i| value_str.is_char_boundary(*i)).unwrap_or(0);
        let end = (end..=value_str.len()).find(|i| value_str.is_char_boundary(*i)).unwrap_or(value_str.len());
        context = Some(format!("...{}...", &value_str[start..end]));
    }

    let metadata_str = serde_json::to_string(&memory.metadata).unwrap_or_default();
    if metadata_str.to_lowercase().contains(query_lower) {
        score = score.max(0.6);
        if context.is_none() {
            context = Some("Metadata match".to_owned());
        }
    }

    (score > 0.0).then_some((score, context))
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn store(
        &self,
        namespace: &[String],
        key: &str,
        value: Value,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<()> {
        let memory = Memory {
            namespace: namespace.to_vec(),
            key: key.to_owned(),
            value,
            timestamp: Utc::now(),
            metadata: metadata.unwrap_or_default(),
        };

        let mut data = self.data.lock().await;
        data.entry(namespace_key(namespace)).or_default().insert(key.to_owned(), memory);
        self.save(&data)
    }

    async fn retrieve(&self, namespace: &[String], key: &str) -> Result<Option<Memory>> {
        let data = self.data.lock().await;
        Ok(data.get(&namespace_key(namespace)).and_then(|ns| ns.get(key)).cloned())
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<bool> {
        let ns_key = namespace_key(namespace);
        let mut data = self.data.lock().await;

        let Some(ns) = data.get_mut(&ns_key) else {
            return Ok(false);
        };
        if ns.shift_remove(key).is_none() {
            return Ok(false);
        }
        if ns.is_empty() {
            data.shift_remove(&ns_key);
        }
        self.save(&data)?;
        Ok(true)
    }

    async fn list_keys(&self, namespace: &[String]) -> Result<Vec<String>> {
        let data = self.data.lock().await;
        let mut keys: Vec<String> = data
            .get(&namespace_key(namespace))
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn list_namespaces(&self, prefix: Option<&[String]>) -> Result<Vec<Vec<String>>> {
        let prefix_key = prefix.map(namespace_key);
        let data = self.data.lock().await;
        Ok(data
            .keys()
            .filter(|ns| prefix_key.as_deref().is_none_or(|p| ns.starts_with(p)))
            .map(|ns| parse_namespace(ns))
            .collect())
    }

    async fn search(
        &self,
        namespace: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySearchResult>> {
        let query_lower = query.to_lowercase();
        let ns_prefix = namespace_key(namespace);
        let data = self.data.lock().await;

        let mut results: Vec<MemorySearchResult> = Vec::new();
        for (ns_key, memories) in data.iter() {
            if !ns_key.starts_with(&ns_prefix) {
                continue;
            }
            for memory in memories.values() {
                if let Some((score, match_context)) = score_memory(memory, &query_lower, query.len()) {
                    results.push(MemorySearchResult { memory: memory.clone(), score, match_context });
                }
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn clear_namespace(&self, namespace: &[String]) -> Result<usize> {
        let mut data = self.data.lock().await;
        let Some(removed) = data.shift_remove(&namespace_key(namespace)) else {
            return Ok(0);
        };
        self.save(&data)?;
        Ok(removed.len())
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let data = self.data.lock().await;
        let total_memories = data.values().map(IndexMap::len).sum();

        let mut top: Vec<NamespaceCount> = data
            .iter()
            .map(|(ns, memories)| NamespaceCount { namespace: ns.clone(), count: memories.len() })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count));
        top.truncate(10);

        Ok(MemoryStats {
            total_memories,
            total_namespaces: data.len(),
            top_namespaces: top,
            backend_path: self.path.display().to_string(),
        })
    }

    async fn close(&self) -> Result<()> {
        let data = self.data.lock().await;
        self.save(&data)
    }
}

#[cfg(test)]
#[path = "flat_tests.rs"]
mod tests;
