// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn ns(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_owned()).collect()
}

fn open(dir: &tempfile::TempDir) -> SqliteMemoryStore {
    SqliteMemoryStore::open(&dir.path().join("memories.db")).unwrap()
}

#[tokio::test]
async fn store_and_retrieve() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    store
        .store(&ns(&["proj"]), "build", json!({"tool": "cargo"}), None)
        .await
        .unwrap();

    let memory = store.retrieve(&ns(&["proj"]), "build").await.unwrap().unwrap();
    assert_eq!(memory.value, json!({"tool": "cargo"}));
    assert_eq!(memory.namespace, ns(&["proj"]));
    assert!(store.retrieve(&ns(&["proj"]), "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_replaces_and_bumps_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let namespace = ns(&["a"]);

    store.store(&namespace, "k", json!("v1"), None).await.unwrap();
    let first = store.retrieve(&namespace, "k").await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.store(&namespace, "k", json!("v2"), None).await.unwrap();
    let second = store.retrieve(&namespace, "k").await.unwrap().unwrap();

    assert_eq!(second.value, json!("v2"));
    assert!(second.timestamp > first.timestamp);
    assert_eq!(store.list_keys(&namespace).await.unwrap(), vec!["k"]);
}

#[tokio::test]
async fn fts_search_ranks_and_snippets() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let namespace = ns(&["docs"]);

    store
        .store(&namespace, "one", json!("the release pipeline broke again"), None)
        .await
        .unwrap();
    store
        .store(&namespace, "two", json!("nothing interesting here"), None)
        .await
        .unwrap();

    let results = store.search(&namespace, "pipeline", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.key, "one");
    assert!(results[0].score > 0.0 && results[0].score <= 1.0);
    assert!(results[0].match_context.as_deref().unwrap().contains("pipeline"));
}

#[tokio::test]
async fn search_respects_namespace_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    store.store(&ns(&["proj", "a"]), "k", json!("needle alpha"), None).await.unwrap();
    store.store(&ns(&["proj", "b"]), "k", json!("needle beta"), None).await.unwrap();
    store.store(&ns(&["other"]), "k", json!("needle gamma"), None).await.unwrap();

    let scoped = store.search(&ns(&["proj"]), "needle", 10).await.unwrap();
    assert_eq!(scoped.len(), 2);

    let all = store.search(&[], "needle", 10).await.unwrap();
    // Root prefix "/" only matches the root namespace itself.
    assert!(all.len() <= 3);
}

#[tokio::test]
async fn search_updates_follow_upserts() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let namespace = ns(&["a"]);

    store.store(&namespace, "k", json!("original phrase"), None).await.unwrap();
    store.store(&namespace, "k", json!("replacement wording"), None).await.unwrap();

    assert!(store.search(&namespace, "original", 10).await.unwrap().is_empty());
    assert_eq!(store.search(&namespace, "replacement", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_special_characters_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let namespace = ns(&["a"]);

    store
        .store(&namespace, "weird", json!("value with (parens) and * stars"), None)
        .await
        .unwrap();

    // An empty phrase is rejected by the FTS parser, so the LIKE fallback
    // answers with a flat score.
    let results = store.search(&namespace, "", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, 0.5);
    assert!(results[0].match_context.is_none());

    // Parenthesized text still matches through the quoted FTS phrase.
    let parens = store.search(&namespace, "parens", 10).await.unwrap();
    assert_eq!(parens.len(), 1);
}

#[tokio::test]
async fn search_in_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let namespace = ns(&["a"]);

    store
        .store(
            &namespace,
            "k",
            json!("plain"),
            Some(std::collections::BTreeMap::from([(
                "source".to_owned(),
                json!("retrospective"),
            )])),
        )
        .await
        .unwrap();

    let results = store.search(&namespace, "retrospective", 10).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn delete_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let namespace = ns(&["a"]);

    store.store(&namespace, "k1", json!(0), None).await.unwrap();
    store.store(&namespace, "k2", json!(0), None).await.unwrap();

    assert!(store.delete(&namespace, "k1").await.unwrap());
    assert!(!store.delete(&namespace, "k1").await.unwrap());
    // The FTS mirror follows deletes.
    assert!(store.search(&namespace, "k1", 10).await.unwrap().is_empty());

    assert_eq!(store.clear_namespace(&namespace).await.unwrap(), 1);
    assert_eq!(store.clear_namespace(&namespace).await.unwrap(), 0);
}

#[tokio::test]
async fn list_namespaces_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    store.store(&ns(&["a"]), "k1", json!(0), None).await.unwrap();
    store.store(&ns(&["a"]), "k2", json!(0), None).await.unwrap();
    store.store(&ns(&["b", "c"]), "k", json!(0), None).await.unwrap();

    let namespaces = store.list_namespaces(None).await.unwrap();
    assert_eq!(namespaces.len(), 2);

    let scoped = store.list_namespaces(Some(&ns(&["b"]))).await.unwrap();
    assert_eq!(scoped, vec![ns(&["b", "c"])]);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_memories, 3);
    assert_eq!(stats.total_namespaces, 2);
    assert_eq!(stats.top_namespaces[0].namespace, "a");
    assert!(stats.backend_path.ends_with("memories.db"));
}

#[tokio::test]
async fn persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(&dir);
        store.store(&ns(&["a"]), "k", json!(42), None).await.unwrap();
        store.close().await.unwrap();
    }

    let reopened = open(&dir);
    assert_eq!(reopened.retrieve(&ns(&["a"]), "k").await.unwrap().unwrap().value, json!(42));
    // The FTS mirror is intact after reopen.
    assert_eq!(reopened.search(&ns(&["a"]), "42", 10).await.unwrap().len(), 1);
}
