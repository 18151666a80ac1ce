// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end orchestration scenarios over the full kernel stack.

use std::collections::BTreeMap;
use std::time::Duration;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use roost::checkpoint::{CheckpointManager, FileCheckpointer, SqliteCheckpointer};
use roost::expect::{expect, ExpectOptions, ExpectPattern};
use roost::memory::{FileMemoryStore, MemoryStore, SqliteMemoryStore};
use roost::message::{AgentMessage, MessagePayload};
use roost::registry::{AgentRegistry, CascadingMessage};
use roost::target::Target;
use roost::wait::{wait_for_agent, WaitRequest, WaitStatus};
use roost_specs::Orchestrator;

// -- Cascade routing ----------------------------------------------------------

#[tokio::test]
async fn cascade_routes_most_specific_message() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("alice", "p1", &["frontend"]).await?;
    orch.spawn_agent("bob", "p2", &["frontend"]).await?;
    orch.spawn_agent("carol", "p3", &["backend"]).await?;

    let cascade = CascadingMessage {
        broadcast: Some("all hands".into()),
        teams: IndexMap::from([("frontend".to_owned(), "ship it".to_owned())]),
        agents: IndexMap::from([("alice".to_owned(), "own the release".to_owned())]),
    };

    let resolved = orch.registry.resolve_cascade(&cascade).await;
    assert_eq!(resolved.get("own the release"), Some(&vec!["alice".to_owned()]));
    assert_eq!(resolved.get("ship it"), Some(&vec!["bob".to_owned()]));
    assert_eq!(resolved.get("all hands"), Some(&vec!["carol".to_owned()]));

    let outcome = orch.handlers.cascade_message(&cascade, true, true).await?;
    assert_eq!(outcome.delivered_count, 3);
    assert_eq!(orch.backend.sent_text("p1"), vec!["own the release"]);
    assert_eq!(orch.backend.sent_text("p2"), vec!["ship it"]);
    assert_eq!(orch.backend.sent_text("p3"), vec!["all hands"]);
    Ok(())
}

// -- Deduplication ------------------------------------------------------------

#[tokio::test]
async fn dedup_filters_previously_sent_recipients() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;

    orch.registry
        .record_sent("deploy to staging", vec!["alice".into(), "bob".into()])
        .await?;

    let unsent = orch
        .registry
        .filter_unsent(
            "deploy to staging",
            &["alice".into(), "bob".into(), "carol".into()],
        )
        .await;
    assert_eq!(unsent, vec!["carol"]);
    Ok(())
}

// -- Lock handoff -------------------------------------------------------------

#[tokio::test]
async fn lock_handoff_sequence() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;

    assert_eq!(orch.guard.lock("p", "alice"), (true, Some("alice".into())));
    assert_eq!(orch.guard.lock("p", "bob"), (false, Some("alice".into())));
    assert!(!orch.guard.unlock("p", Some("bob")));
    assert!(orch.guard.unlock("p", Some("alice")));
    assert_eq!(orch.guard.lock("p", "bob"), (true, Some("bob".into())));
    Ok(())
}

// -- Focus cooldown -----------------------------------------------------------

#[tokio::test]
async fn focus_cooldown_window() -> anyhow::Result<()> {
    let orch = Orchestrator::start_with(Duration::from_millis(300), true).await?;

    orch.cooldown.record("p1", Some("alice"));

    let (allowed, blocker, remaining) = orch.cooldown.check("p2", Some("bob"));
    assert!(!allowed);
    assert_eq!(blocker.as_deref(), Some("alice"));
    assert!(remaining > 0.0 && remaining <= 0.3);

    // Same pane is allowed within the window.
    assert_eq!(orch.cooldown.check("p1", Some("bob")), (true, None, 0.0));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(orch.cooldown.check("p2", Some("bob")), (true, None, 0.0));
    Ok(())
}

// -- Expect -------------------------------------------------------------------

#[tokio::test]
async fn expect_matches_growing_output() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("builder", "p1", &[]).await?;
    orch.backend.set_screen("p1", "compiling\n");

    let writer = {
        let backend = orch.backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            backend.append_line("p1", "BUILD_OK xyz");
        })
    };

    let patterns = vec![
        ExpectPattern::literal("BUILD_OK"),
        ExpectPattern::pattern(r"ERROR \w+")?,
        ExpectPattern::timeout(10.0),
    ];
    let options = ExpectOptions {
        timeout: 10.0,
        poll_interval: Duration::from_millis(10),
        ..ExpectOptions::default()
    };
    let cancel = CancellationToken::new();

    let result = expect(orch.backend.as_ref(), "p1", &patterns, &options, &cancel).await?;
    writer.await?;

    assert_eq!(result.match_index, 0);
    assert_eq!(result.matched_text, "BUILD_OK");
    Ok(())
}

// -- Wait-for-agent resume ----------------------------------------------------

#[tokio::test]
async fn wait_for_agent_times_out_then_resumes() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("build", "p1", &[]).await?;
    orch.backend.set_processing("p1", true);
    orch.backend.set_screen("p1", "link step 3/4");

    let request = WaitRequest::new("build", 1)?.with_output(true).with_summary_on_timeout(true);
    let cancel = CancellationToken::new();

    let first = wait_for_agent(&orch.registry, orch.backend.as_ref(), &request, &cancel).await?;
    assert!(!first.completed);
    assert!(first.timed_out);
    assert_eq!(first.status, WaitStatus::Running);
    assert!(first.can_continue_waiting);
    assert!(first.elapsed_seconds <= 1.0 + f64::EPSILON);
    assert!(first.summary.as_deref().is_some_and(|s| s.contains("link step 3/4")));

    orch.backend.set_processing("p1", false);
    let second = wait_for_agent(&orch.registry, orch.backend.as_ref(), &request, &cancel).await?;
    assert!(second.completed);
    assert!(!second.timed_out);
    assert_eq!(second.status, WaitStatus::Idle);
    Ok(())
}

// -- Checkpoint round trip ----------------------------------------------------

#[tokio::test]
async fn registry_survives_checkpoint_restore() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("alice", "p1", &["frontend"]).await?;
    orch.spawn_agent("bob", "p2", &[]).await?;
    orch.registry.create_team("frontend", "web work", None).await?;

    let checkpoint_dir = tempfile::tempdir()?;
    let manager =
        CheckpointManager::new(Box::new(FileCheckpointer::open(checkpoint_dir.path())?), true, 5);

    let state = orch.registry.save_state().await;
    let checkpoint = manager
        .create(BTreeMap::new(), Some(state), "test", BTreeMap::new())
        .await?;

    // A fresh registry over empty journals, restored from the snapshot.
    let fresh_dir = tempfile::tempdir()?;
    let fresh = AgentRegistry::open(fresh_dir.path(), 1000)?;
    assert!(fresh.list(None).await.is_empty());

    let restored = manager.restore(Some(&checkpoint.checkpoint_id)).await;
    let registry_state = restored.and_then(|c| c.registry).ok_or_else(|| anyhow::anyhow!("no registry in checkpoint"))?;
    fresh.load_state(&registry_state).await?;

    let agents: Vec<String> = fresh.list(None).await.into_iter().map(|a| a.name).collect();
    assert_eq!(agents.len(), 2);
    assert!(agents.contains(&"alice".to_owned()));
    assert!(agents.contains(&"bob".to_owned()));

    let teams: Vec<String> = fresh.list_teams().await.into_iter().map(|t| t.name).collect();
    assert_eq!(teams, vec!["frontend"]);
    assert_eq!(fresh.get("alice").await.map(|a| a.pane_id), Some("p1".to_owned()));
    Ok(())
}

#[tokio::test]
async fn checkpoint_round_trip_sqlite() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("alice", "p1", &[]).await?;

    let dir = tempfile::tempdir()?;
    let manager = CheckpointManager::new(
        Box::new(SqliteCheckpointer::open(&dir.path().join("checkpoints.db"))?),
        false,
        5,
    );

    let state = orch.registry.save_state().await;
    let checkpoint = manager
        .create(BTreeMap::new(), Some(state.clone()), "test", BTreeMap::new())
        .await?;

    let loaded = manager.restore(None).await.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(loaded.checkpoint_id, checkpoint.checkpoint_id);
    assert_eq!(loaded.registry, Some(state));
    Ok(())
}

// -- Typed message flow -------------------------------------------------------

#[tokio::test]
async fn command_write_read_flow_with_dedup() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("alice", "p1", &[]).await?;
    orch.backend.set_screen("p1", "$ ");

    let command = AgentMessage::new(
        "orchestrator",
        MessagePayload::TerminalCommand {
            session_target: Target::agent("alice"),
            command: "make test".to_owned(),
            execute: true,
            wait_for_completion: false,
            timeout: 30,
        },
    );

    let response = orch.router.send(command.clone()).await?.ok_or_else(|| anyhow::anyhow!("no response"))?;
    assert_eq!(response.type_tag(), "TerminalOutput");
    assert_eq!(response.correlation_id.as_deref(), Some(command.message_id.as_str()));
    assert_eq!(orch.backend.sent_text("p1"), vec!["make test"]);

    // Identical content (fresh id/timestamp) is suppressed by router dedup.
    let duplicate = AgentMessage::new(
        "orchestrator",
        MessagePayload::TerminalCommand {
            session_target: Target::agent("alice"),
            command: "make test".to_owned(),
            execute: true,
            wait_for_completion: false,
            timeout: 30,
        },
    );
    assert!(orch.router.send(duplicate).await?.is_none());
    assert_eq!(orch.backend.sent_text("p1").len(), 1);
    Ok(())
}

#[tokio::test]
async fn focus_flow_sets_active_pane_and_cooldown_blocks() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("alice", "p1", &[]).await?;
    orch.spawn_agent("bob", "p2", &[]).await?;

    let focus = AgentMessage::new(
        "alice",
        MessagePayload::FocusSession {
            session_target: Target::agent("alice"),
            bring_to_front: true,
        },
    );
    orch.router.send(focus).await?;
    assert_eq!(orch.registry.active_pane().await.as_deref(), Some("p1"));

    let contested = AgentMessage::new(
        "bob",
        MessagePayload::FocusSession {
            session_target: Target::agent("bob"),
            bring_to_front: true,
        },
    );
    let response = orch.router.send(contested).await?.ok_or_else(|| anyhow::anyhow!("no response"))?;
    assert_eq!(response.type_tag(), "Error");
    assert_eq!(orch.registry.active_pane().await.as_deref(), Some("p1"));
    Ok(())
}

// -- Memory stores ------------------------------------------------------------

#[tokio::test]
async fn memory_upsert_and_search_both_backends() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let stores: Vec<Box<dyn MemoryStore>> = vec![
        Box::new(FileMemoryStore::open(&dir.path().join("memories.json"))?),
        Box::new(SqliteMemoryStore::open(&dir.path().join("memories.db"))?),
    ];

    for store in stores {
        let ns = vec!["project".to_owned(), "notes".to_owned()];
        store
            .store(&ns, "deploy", serde_json::json!("released version 1.2.3"), None)
            .await?;
        store
            .store(&ns, "deploy", serde_json::json!("released version 1.2.4"), None)
            .await?;

        let keys = store.list_keys(&ns).await?;
        assert_eq!(keys, vec!["deploy"]);

        let memory = store.retrieve(&ns, "deploy").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
        assert_eq!(memory.value, serde_json::json!("released version 1.2.4"));

        let results = store.search(&["project".to_owned()], "released", 10).await?;
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0 && results[0].score <= 1.0);

        assert_eq!(store.clear_namespace(&ns).await?, 1);
        store.close().await?;
    }
    Ok(())
}

// -- Agent lifecycle ----------------------------------------------------------

#[tokio::test]
async fn removing_agent_releases_its_locks() -> anyhow::Result<()> {
    let orch = Orchestrator::start().await?;
    orch.spawn_agent("alice", "p1", &[]).await?;

    orch.guard.lock("p1", "alice");
    assert!(orch.guard.is_locked("p1"));

    orch.registry.remove("alice").await?;
    assert!(!orch.guard.is_locked("p1"));
    Ok(())
}
