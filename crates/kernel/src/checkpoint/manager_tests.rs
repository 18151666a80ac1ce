// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeMap;

fn manager(dir: &tempfile::TempDir, auto: bool, interval: u32) -> CheckpointManager {
    let store = FileCheckpointer::open(dir.path()).unwrap();
    CheckpointManager::new(Box::new(store), auto, interval)
}

#[tokio::test]
async fn create_records_last_id() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir, true, 5);

    assert!(manager.last_id().await.is_none());
    let checkpoint = manager
        .create(BTreeMap::new(), None, "manual", BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(manager.last_id().await.as_deref(), Some(checkpoint.checkpoint_id.as_str()));
    assert_eq!(checkpoint.version, "1.0");
}

#[tokio::test]
async fn restore_by_id_and_latest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir, true, 5);

    let first = manager
        .create(BTreeMap::new(), None, "first", BTreeMap::new())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = manager
        .create(BTreeMap::new(), Some(RegistryState::default()), "second", BTreeMap::new())
        .await
        .unwrap();

    let by_id = manager.restore(Some(&first.checkpoint_id)).await.unwrap();
    assert_eq!(by_id.trigger, "first");

    let latest = manager.restore(None).await.unwrap();
    assert_eq!(latest.checkpoint_id, second.checkpoint_id);
    assert!(latest.registry.is_some());
}

#[tokio::test]
async fn restore_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir, true, 5);
    assert!(manager.restore(None).await.is_none());
    assert!(manager.restore(Some("ghost")).await.is_none());
}

#[tokio::test]
async fn auto_checkpoint_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir, true, 3);

    assert!(!manager.should_auto_checkpoint().await);
    assert!(!manager.should_auto_checkpoint().await);
    assert!(manager.should_auto_checkpoint().await);

    // Creating a checkpoint resets the counter.
    manager.create(BTreeMap::new(), None, "auto", BTreeMap::new()).await.unwrap();
    assert!(!manager.should_auto_checkpoint().await);
}

#[tokio::test]
async fn auto_checkpoint_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir, false, 1);
    assert!(!manager.should_auto_checkpoint().await);
    assert!(!manager.should_auto_checkpoint().await);
}

#[tokio::test]
async fn delete_through_manager() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir, true, 5);

    let checkpoint = manager
        .create(BTreeMap::new(), None, "manual", BTreeMap::new())
        .await
        .unwrap();
    assert!(manager.delete(&checkpoint.checkpoint_id).await);
    assert!(manager.list(None, 10).await.is_empty());
}
