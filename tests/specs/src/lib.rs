// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end orchestration scenarios.
//!
//! Builds a full kernel stack (registry, lock manager, cooldown, router,
//! handlers) on top of the scriptable fake terminal backend and a
//! temporary data directory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use roost::handlers::TerminalHandlers;
use roost::registry::AgentRegistry;
use roost::router::MessageRouter;
use roost::tags::{FocusCooldown, TagLockManager};
use roost::test_support::FakeBackend;

/// A fully wired kernel over a fake backend and a temp data dir.
pub struct Orchestrator {
    pub data_dir: tempfile::TempDir,
    pub backend: Arc<FakeBackend>,
    pub registry: Arc<AgentRegistry>,
    pub guard: Arc<TagLockManager>,
    pub cooldown: Arc<FocusCooldown>,
    pub handlers: Arc<TerminalHandlers>,
    pub router: MessageRouter,
}

impl Orchestrator {
    /// Build the stack with message dedup enabled on the router.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(Duration::from_secs(5), true).await
    }

    pub async fn start_with(cooldown: Duration, dedup: bool) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let backend = FakeBackend::new();
        let registry = Arc::new(AgentRegistry::open(data_dir.path(), 1000)?);
        let guard = Arc::new(TagLockManager::new());
        let cooldown = Arc::new(FocusCooldown::new(cooldown));
        registry.attach_lock_manager(guard.clone());

        let handlers = TerminalHandlers::new(
            backend.clone(),
            registry.clone(),
            guard.clone(),
            cooldown.clone(),
        );
        let router = MessageRouter::new(dedup, 1024);
        handlers.register_all(&router).await;

        Ok(Self { data_dir, backend, registry, guard, cooldown, handlers, router })
    }

    /// Create a pane and register an agent bound to it.
    pub async fn spawn_agent(&self, name: &str, pane_id: &str, teams: &[&str]) -> anyhow::Result<()> {
        self.backend.add_pane(pane_id, &format!("{name}-pane"));
        self.registry
            .register(name, pane_id, teams.iter().map(|t| (*t).to_owned()).collect(), BTreeMap::new())
            .await?;
        Ok(())
    }
}
