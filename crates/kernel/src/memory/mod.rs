// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-agent memory store: namespaced key/value records shared between
//! agents, with substring or full-text search depending on the backend.

pub mod flat;
pub mod index;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StoreBackend;
use crate::error::Result;

pub use flat::FileMemoryStore;
pub use index::SqliteMemoryStore;

/// Join a namespace path into its stored string form. Root is `"/"`.
pub fn namespace_key(namespace: &[String]) -> String {
    if namespace.is_empty() {
        "/".to_owned()
    } else {
        namespace.join("/")
    }
}

/// Parse a stored namespace string back into path segments.
pub fn parse_namespace(key: &str) -> Vec<String> {
    if key == "/" {
        vec![]
    } else {
        key.split('/').map(str::to_owned).collect()
    }
}

/// A single memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub namespace: Vec<String>,
    pub key: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A search hit with a relevance score in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySearchResult {
    pub memory: Memory,
    pub score: f64,
    #[serde(default)]
    pub match_context: Option<String>,
}

/// Per-namespace record count for [`MemoryStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceCount {
    pub namespace: String,
    pub count: usize,
}

/// Store-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_namespaces: usize,
    pub top_namespaces: Vec<NamespaceCount>,
    pub backend_path: String,
}

/// Contract shared by every memory backend.
///
/// `search` treats the namespace as a prefix: all descendant namespaces are
/// considered. `store` has upsert semantics on `(namespace, key)` and bumps
/// the timestamp.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(
        &self,
        namespace: &[String],
        key: &str,
        value: Value,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<()>;

    async fn retrieve(&self, namespace: &[String], key: &str) -> Result<Option<Memory>>;

    async fn delete(&self, namespace: &[String], key: &str) -> Result<bool>;

    /// Keys in the namespace, sorted ascending.
    async fn list_keys(&self, namespace: &[String]) -> Result<Vec<String>>;

    async fn list_namespaces(&self, prefix: Option<&[String]>) -> Result<Vec<Vec<String>>>;

    async fn search(
        &self,
        namespace: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySearchResult>>;

    /// Delete every memory in the namespace, returning the count.
    async fn clear_namespace(&self, namespace: &[String]) -> Result<usize>;

    async fn stats(&self) -> Result<MemoryStats>;

    /// Release resources (flush files). Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Open the configured memory backend under the data directory.
pub fn open_store(backend: StoreBackend, data_dir: &Path) -> Result<Box<dyn MemoryStore>> {
    match backend {
        StoreBackend::File => Ok(Box::new(FileMemoryStore::open(&data_dir.join("memories.json"))?)),
        StoreBackend::Sqlite => Ok(Box::new(SqliteMemoryStore::open_default(data_dir)?)),
    }
}
