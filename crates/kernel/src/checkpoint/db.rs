// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed checkpointer for deployments with many checkpoints.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

use super::{Checkpoint, CheckpointMeta, Checkpointer};

/// Checkpoint storage in a single SQLite database.
pub struct SqliteCheckpointer {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointer {
    /// Open (or create) the checkpoint database and its schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                version TEXT NOT NULL,
                "trigger" TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS checkpoint_sessions (
                checkpoint_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                PRIMARY KEY (checkpoint_id, session_id),
                FOREIGN KEY (checkpoint_id)
                    REFERENCES checkpoints(checkpoint_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_created_at
                ON checkpoints(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_checkpoint_sessions_session_id
                ON checkpoint_sessions(session_id);
            "#,
        )?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Delete checkpoints older than `max_age_days`, then trim the tail
    /// beyond the newest `max_count`. Returns the number deleted.
    pub async fn cleanup(&self, max_age_days: i64, max_count: usize) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let conn = self.conn.lock().await;

        let mut deleted = conn.execute(
            "DELETE FROM checkpoints WHERE created_at < ?1",
            [cutoff.to_rfc3339()],
        )?;

        deleted += conn.execute(
            "DELETE FROM checkpoints WHERE checkpoint_id IN (
                SELECT checkpoint_id FROM checkpoints
                ORDER BY created_at DESC
                LIMIT -1 OFFSET ?1
            )",
            [max_count as i64],
        )?;

        Ok(deleted)
    }

    fn sessions_for(conn: &Connection, checkpoint_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let Ok(mut stmt) =
            conn.prepare("SELECT session_id FROM checkpoint_sessions WHERE checkpoint_id = ?1")
        else {
            return out;
        };
        let Ok(rows) = stmt.query_map([checkpoint_id], |row| row.get::<_, String>(0)) else {
            return out;
        };
        for row in rows.flatten() {
            out.push(row);
        }
        out
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<String> {
        let data = serde_json::to_string(checkpoint)
            .map_err(|e| crate::error::OrchestratorError::persist(e.to_string()))?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO checkpoints
               (checkpoint_id, created_at, version, "trigger", data)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            (
                &checkpoint.checkpoint_id,
                checkpoint.created_at.to_rfc3339(),
                &checkpoint.version,
                &checkpoint.trigger,
                &data,
            ),
        )?;

        conn.execute(
            "DELETE FROM checkpoint_sessions WHERE checkpoint_id = ?1",
            [&checkpoint.checkpoint_id],
        )?;
        for session_id in checkpoint.sessions.keys() {
            conn.execute(
                "INSERT INTO checkpoint_sessions (checkpoint_id, session_id) VALUES (?1, ?2)",
                (&checkpoint.checkpoint_id, session_id),
            )?;
        }

        Ok(checkpoint.checkpoint_id.clone())
    }

    async fn load(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        let conn = self.conn.lock().await;
        let data: String = conn
            .query_row(
                "SELECT data FROM checkpoints WHERE checkpoint_id = ?1",
                [checkpoint_id],
                |row| row.get(0),
            )
            .ok()?;

        match serde_json::from_str(&data) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(id = checkpoint_id, error = %e, "checkpoint blob unreadable");
                None
            }
        }
    }

    async fn list(&self, session_id: Option<&str>, limit: usize) -> Vec<CheckpointMeta> {
        let conn = self.conn.lock().await;

        type MetaRow = (String, String, String, bool);
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<MetaRow> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        };

        let rows: Vec<MetaRow> = match session_id {
            Some(sid) => {
                let Ok(mut stmt) = conn.prepare(
                    r#"SELECT c.checkpoint_id, c.created_at, c."trigger",
                              json_extract(c.data, '$.registry') IS NOT NULL
                       FROM checkpoints c
                       INNER JOIN checkpoint_sessions cs
                           ON c.checkpoint_id = cs.checkpoint_id
                       WHERE cs.session_id = ?1
                       ORDER BY c.created_at DESC
                       LIMIT ?2"#,
                ) else {
                    return vec![];
                };
                let Ok(mapped) = stmt.query_map(rusqlite::params![sid, limit as i64], map_row)
                else {
                    return vec![];
                };
                mapped.flatten().collect()
            }
            None => {
                let Ok(mut stmt) = conn.prepare(
                    r#"SELECT checkpoint_id, created_at, "trigger",
                              json_extract(data, '$.registry') IS NOT NULL
                       FROM checkpoints
                       ORDER BY created_at DESC
                       LIMIT ?1"#,
                ) else {
                    return vec![];
                };
                let Ok(mapped) = stmt.query_map(rusqlite::params![limit as i64], map_row) else {
                    return vec![];
                };
                mapped.flatten().collect()
            }
        };

        rows.into_iter()
            .map(|(id, created_at, trigger, has_registry)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                let session_ids = Self::sessions_for(&conn, &id);
                CheckpointMeta { checkpoint_id: id, created_at, trigger, session_ids, has_registry }
            })
            .collect()
    }

    async fn delete(&self, checkpoint_id: &str) -> bool {
        let conn = self.conn.lock().await;
        match conn.execute("DELETE FROM checkpoints WHERE checkpoint_id = ?1", [checkpoint_id]) {
            Ok(count) => count > 0,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
