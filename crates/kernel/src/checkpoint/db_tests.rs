// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::checkpoint::{RegistryState, SessionState};
use std::collections::BTreeMap;

fn open_store(dir: &tempfile::TempDir) -> SqliteCheckpointer {
    SqliteCheckpointer::open(&dir.path().join("checkpoints.db")).unwrap()
}

fn checkpoint_with_session(pane_id: &str, trigger: &str) -> Checkpoint {
    let mut sessions = BTreeMap::new();
    sessions.insert(pane_id.to_owned(), SessionState::new(pane_id, "persist-1", "main"));
    Checkpoint::new(sessions, None, trigger, BTreeMap::new())
}

#[tokio::test]
async fn save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut checkpoint = checkpoint_with_session("p1", "manual");
    checkpoint.registry = Some(RegistryState::default());

    let id = store.save(&checkpoint).await.unwrap();
    let loaded = store.load(&id).await.unwrap();
    assert_eq!(loaded, checkpoint);
}

#[tokio::test]
async fn load_missing_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    assert!(store.load("no-such-id").await.is_none());
}

#[tokio::test]
async fn save_is_idempotent_per_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut checkpoint = checkpoint_with_session("p1", "manual");
    store.save(&checkpoint).await.unwrap();
    checkpoint.trigger = "updated".to_owned();
    store.save(&checkpoint).await.unwrap();

    assert_eq!(store.list(None, 10).await.len(), 1);
    assert_eq!(store.load(&checkpoint.checkpoint_id).await.unwrap().trigger, "updated");
}

#[tokio::test]
async fn list_filters_by_session_and_reports_registry() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut with_registry = checkpoint_with_session("p1", "with");
    with_registry.registry = Some(RegistryState::default());
    let without = checkpoint_with_session("p2", "without");

    store.save(&with_registry).await.unwrap();
    store.save(&without).await.unwrap();

    let for_p1 = store.list(Some("p1"), 10).await;
    assert_eq!(for_p1.len(), 1);
    assert_eq!(for_p1[0].trigger, "with");
    assert!(for_p1[0].has_registry);
    assert_eq!(for_p1[0].session_ids, vec!["p1"]);

    let for_p2 = store.list(Some("p2"), 10).await;
    assert!(!for_p2[0].has_registry);
}

#[tokio::test]
async fn list_orders_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut older = checkpoint_with_session("p1", "older");
    older.created_at = Utc::now() - Duration::hours(2);
    let newer = checkpoint_with_session("p1", "newer");

    store.save(&older).await.unwrap();
    store.save(&newer).await.unwrap();

    let metas = store.list(None, 10).await;
    assert_eq!(metas[0].trigger, "newer");

    let latest = store.latest(Some("p1")).await.unwrap();
    assert_eq!(latest.trigger, "newer");
}

#[tokio::test]
async fn delete_cascades_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let checkpoint = checkpoint_with_session("p1", "manual");
    store.save(&checkpoint).await.unwrap();

    assert!(store.delete(&checkpoint.checkpoint_id).await);
    assert!(!store.delete(&checkpoint.checkpoint_id).await);
    assert!(store.list(Some("p1"), 10).await.is_empty());
}

#[tokio::test]
async fn cleanup_by_age_and_count() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut ancient = checkpoint_with_session("p1", "ancient");
    ancient.created_at = Utc::now() - Duration::days(30);
    store.save(&ancient).await.unwrap();

    for i in 0..4 {
        let mut recent = checkpoint_with_session("p1", &format!("recent-{i}"));
        recent.created_at = Utc::now() - Duration::minutes(10 - i);
        store.save(&recent).await.unwrap();
    }

    // Age deletes the 30-day-old one; the count cap trims down to 2.
    let deleted = store.cleanup(7, 2).await.unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(store.list(None, 10).await.len(), 2);
}

#[tokio::test]
async fn db_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = checkpoint_with_session("p1", "manual");
    {
        let store = open_store(&dir);
        store.save(&checkpoint).await.unwrap();
    }
    let reopened = open_store(&dir);
    assert_eq!(reopened.load(&checkpoint.checkpoint_id).await.unwrap(), checkpoint);
}
