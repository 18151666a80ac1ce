// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite memory backend with FTS5 ranked search.
//!
//! A contentless FTS5 mirror of the memories table is kept in sync by
//! triggers. The namespace filter is applied as a SQL `LIKE` prefix rather
//! than inside the MATCH expression so path separators never need FTS
//! escaping. Queries the FTS parser rejects fall back to a `LIKE` scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

use super::{
    namespace_key, parse_namespace, Memory, MemorySearchResult, MemoryStats, MemoryStore,
    NamespaceCount,
};

/// Environment override for the database location.
pub const MEMORY_DB_PATH_ENV: &str = "ITERM_MCP_MEMORY_DB_PATH";

const FTS_COLUMNS: [&str; 4] = ["key", "value_text", "metadata_text", "namespace"];

/// SQLite + FTS5 memory store for multi-agent production use.
pub struct SqliteMemoryStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// Open the store at the default location under `data_dir`, honoring
    /// the `ITERM_MCP_MEMORY_DB_PATH` override.
    pub fn open_default(data_dir: &Path) -> Result<Self> {
        let path = match std::env::var(MEMORY_DB_PATH_ENV) {
            Ok(value) if !value.is_empty() => PathBuf::from(value),
            _ => data_dir.join("memories.db"),
        };
        Self::open(&path)
    }

    /// Open the store at an explicit path, creating the schema if needed.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;
        Ok(Self { path: db_path.to_owned(), conn: Mutex::new(conn) })
    }

    fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
        let ns: String = row.get(0)?;
        let key: String = row.get(1)?;
        let value: String = row.get(2)?;
        let timestamp: String = row.get(3)?;
        let metadata: String = row.get(4)?;

        Ok(Memory {
            namespace: parse_namespace(&ns),
            key,
            value: serde_json::from_str(&value).unwrap_or(Value::Null),
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            metadata TEXT DEFAULT '{}',
            UNIQUE(namespace, key)
        );
        CREATE INDEX IF NOT EXISTS idx_memories_namespace ON memories(namespace);
        "#,
    )?;

    // Rebuild the FTS mirror when its column set no longer matches.
    let fts_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'memories_fts'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)?;

    let needs_recreate = if fts_exists {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('memories_fts')")?;
        let columns: Vec<String> =
            stmt.query_map([], |row| row.get::<_, String>(0))?.flatten().collect();
        columns.len() != FTS_COLUMNS.len()
            || FTS_COLUMNS.iter().any(|c| !columns.iter().any(|have| have == c))
    } else {
        false
    };

    if needs_recreate {
        debug!("memory FTS schema mismatch, rebuilding index");
        conn.execute_batch(
            r#"
            DROP TRIGGER IF EXISTS memories_ai;
            DROP TRIGGER IF EXISTS memories_ad;
            DROP TRIGGER IF EXISTS memories_au;
            DROP TABLE IF EXISTS memories_fts;
            "#,
        )?;
    }

    if !fts_exists || needs_recreate {
        conn.execute_batch(
            r#"
            CREATE VIRTUAL TABLE memories_fts USING fts5(
                key,
                value_text,
                metadata_text,
                namespace
            );
            CREATE TRIGGER memories_ai AFTER INSERT ON memories BEGIN
                INSERT INTO memories_fts(rowid, key, value_text, metadata_text, namespace)
                VALUES (new.id, new.key, new.value, new.metadata, new.namespace);
            END;
            CREATE TRIGGER memories_ad AFTER DELETE ON memories BEGIN
                DELETE FROM memories_fts WHERE rowid = old.id;
            END;
            CREATE TRIGGER memories_au AFTER UPDATE ON memories BEGIN
                DELETE FROM memories_fts WHERE rowid = old.id;
                INSERT INTO memories_fts(rowid, key, value_text, metadata_text, namespace)
                VALUES (new.id, new.key, new.value, new.metadata, new.namespace);
            END;
            INSERT INTO memories_fts(rowid, key, value_text, metadata_text, namespace)
                SELECT id, key, value, metadata, namespace FROM memories;
            "#,
        )?;
    }

    Ok(())
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn store(
        &self,
        namespace: &[String],
        key: &str,
        value: Value,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<()> {
        let value_json = serde_json::to_string(&value)
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;
        let metadata_json = serde_json::to_string(&metadata.unwrap_or_default())
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO memories (namespace, key, value, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, key) DO UPDATE SET
                 value = excluded.value,
                 timestamp = excluded.timestamp,
                 metadata = excluded.metadata",
            (
                namespace_key(namespace),
                key,
                value_json,
                Utc::now().to_rfc3339(),
                metadata_json,
            ),
        )?;
        Ok(())
    }

    async fn retrieve(&self, namespace: &[String], key: &str) -> Result<Option<Memory>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT namespace, key, value, timestamp, metadata
             FROM memories WHERE namespace = ?1 AND key = ?2",
            (namespace_key(namespace), key),
            Self::row_to_memory,
        );

        match result {
            Ok(memory) => Ok(Some(memory)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count = conn.execute(
            "DELETE FROM memories WHERE namespace = ?1 AND key = ?2",
            (namespace_key(namespace), key),
        )?;
        Ok(count > 0)
    }

    async fn list_keys(&self, namespace: &[String]) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT key FROM memories WHERE namespace = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map([namespace_key(namespace)], |row| row.get::<_, String>(0))?
            .flatten()
            .collect();
        Ok(keys)
    }

    async fn list_namespaces(&self, prefix: Option<&[String]>) -> Result<Vec<Vec<String>>> {
        let conn = self.conn.lock().await;
        let namespaces: Vec<String> = match prefix {
            Some(prefix) => {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT namespace FROM memories
                     WHERE namespace LIKE ?1 ORDER BY namespace",
                )?;
                let rows: Vec<String> = stmt
                    .query_map([format!("{}%", namespace_key(prefix))], |row| row.get(0))?
                    .flatten()
                    .collect();
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT DISTINCT namespace FROM memories ORDER BY namespace")?;
                let rows: Vec<String> = stmt.query_map([], |row| row.get(0))?.flatten().collect();
                rows
            }
        };
        Ok(namespaces.iter().map(|ns| parse_namespace(ns)).collect())
    }

    async fn search(
        &self,
        namespace: &[String],
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySearchResult>> {
        let ns_prefix = format!("{}%", namespace_key(namespace));
        let conn = self.conn.lock().await;

        // FTS5 phrase query; double quotes are the only character that
        // needs escaping inside a quoted phrase.
        let escaped = query.replace('"', "\"\"");
        let fts_query = format!("\"{escaped}\"");

        // An empty phrase is never valid FTS syntax; route it straight to
        // the LIKE fallback.
        let fts_result: rusqlite::Result<Vec<MemorySearchResult>> = if query.trim().is_empty() {
            Err(rusqlite::Error::InvalidQuery)
        } else {
            (|| {
                let mut stmt = conn.prepare(
                    "SELECT m.namespace, m.key, m.value, m.timestamp, m.metadata,
                            bm25(memories_fts) AS score,
                            snippet(memories_fts, 1, '<b>', '</b>', '...', 32) AS match_context
                     FROM memories_fts
                     JOIN memories m ON memories_fts.rowid = m.id
                     WHERE memories_fts MATCH ?1 AND m.namespace LIKE ?2
                     ORDER BY bm25(memories_fts)
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![fts_query, ns_prefix, limit as i64],
                    |row| {
                        let memory = Self::row_to_memory(row)?;
                        let bm25: f64 = row.get(5)?;
                        let context: String = row.get(6)?;
                        Ok(MemorySearchResult {
                            memory,
                            score: 1.0 / (1.0 + bm25.abs()),
                            match_context: Some(context),
                        })
                    },
                )?;
                rows.collect()
            })()
        };

        match fts_result {
            Ok(results) => Ok(results),
            Err(e) => {
                // FTS parse failures (odd punctuation, bare operators)
                // degrade to a LIKE scan with a flat score.
                debug!(error = %e, "FTS query failed, falling back to LIKE scan");
                let like = format!("%{query}%");
                let mut stmt = conn.prepare(
                    "SELECT namespace, key, value, timestamp, metadata
                     FROM memories
                     WHERE namespace LIKE ?1
                       AND (key LIKE ?2 OR value LIKE ?2 OR metadata LIKE ?2)
                     ORDER BY timestamp DESC
                     LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![ns_prefix, like, limit as i64], |row| {
                        let memory = Self::row_to_memory(row)?;
                        Ok(MemorySearchResult { memory, score: 0.5, match_context: None })
                    })?
                    .flatten()
                    .collect();
                Ok(rows)
            }
        }
    }

    async fn clear_namespace(&self, namespace: &[String]) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count =
            conn.execute("DELETE FROM memories WHERE namespace = ?1", [namespace_key(namespace)])?;
        Ok(count)
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let conn = self.conn.lock().await;

        let total_memories: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let total_namespaces: i64 =
            conn.query_row("SELECT COUNT(DISTINCT namespace) FROM memories", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT namespace, COUNT(*) AS count FROM memories
             GROUP BY namespace ORDER BY count DESC LIMIT 10",
        )?;
        let top_namespaces = stmt
            .query_map([], |row| {
                Ok(NamespaceCount {
                    namespace: row.get(0)?,
                    count: row.get::<_, i64>(1)? as usize,
                })
            })?
            .flatten()
            .collect();

        Ok(MemoryStats {
            total_memories: total_memories as usize,
            total_namespaces: total_namespaces as usize,
            top_namespaces,
            backend_path: self.path.display().to_string(),
        })
    }

    async fn close(&self) -> Result<()> {
        // Connections flush on drop; nothing to do beyond contract parity
        // with the file backend.
        Ok(())
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
