// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent and team registry with message deduplication and cascading
//! message resolution.
//!
//! Agents and teams persist to JSONL journals that are replayed at startup.
//! The registry is the single source of truth for name → pane bindings and
//! for the "have we already sent this?" history.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::checkpoint::RegistryState;
use crate::error::{OrchestratorError, Result};
use crate::journal::Journal;
use crate::tags::TagLockManager;

/// How many message records a registry snapshot carries.
const SNAPSHOT_HISTORY: usize = 100;

/// A logical actor bound to exactly one terminal pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub pane_id: String,
    #[serde(default)]
    pub teams: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl Agent {
    pub fn is_member_of(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }
}

/// A named group of agents, optionally forming a tree via `parent_team`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_team: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One delivered message, kept only for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub content_hash: String,
    pub recipients: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Three-layer message (broadcast, per-team, per-agent) resolved
/// most-specific-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadingMessage {
    #[serde(default)]
    pub broadcast: Option<String>,
    #[serde(default)]
    pub teams: IndexMap<String, String>,
    #[serde(default)]
    pub agents: IndexMap<String, String>,
}

/// Brief registry state for logging and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub agent_count: usize,
    pub team_count: usize,
    pub active_pane: Option<String>,
    pub message_history_count: usize,
    pub agents: Vec<String>,
    pub teams: Vec<String>,
}

/// SHA-256 of the content bytes, lowercase hex.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[derive(Debug, Default)]
struct Inner {
    agents: IndexMap<String, Agent>,
    teams: IndexMap<String, Team>,
    history: VecDeque<MessageRecord>,
    active_pane: Option<String>,
}

/// Registry of agents, teams, and recently delivered messages.
pub struct AgentRegistry {
    inner: RwLock<Inner>,
    journal: Journal,
    max_history: usize,
    lock_manager: parking_lot::Mutex<Option<Arc<TagLockManager>>>,
}

impl AgentRegistry {
    /// Open a registry rooted at `data_dir`, replaying existing journals.
    pub fn open(data_dir: &Path, max_history: usize) -> Result<Self> {
        let journal = Journal::new(data_dir)?;

        let mut inner = Inner::default();
        for agent in journal.load_agents::<Agent>() {
            inner.agents.insert(agent.name.clone(), agent);
        }
        for team in journal.load_teams::<Team>() {
            inner.teams.insert(team.name.clone(), team);
        }
        for record in journal.load_messages::<MessageRecord>() {
            if inner.history.len() == max_history {
                inner.history.pop_front();
            }
            inner.history.push_back(record);
        }

        info!(
            agents = inner.agents.len(),
            teams = inner.teams.len(),
            messages = inner.history.len(),
            "registry loaded"
        );

        Ok(Self {
            inner: RwLock::new(inner),
            journal,
            max_history,
            lock_manager: parking_lot::Mutex::new(None),
        })
    }

    /// Attach the lock manager notified when an agent is removed.
    pub fn attach_lock_manager(&self, manager: Arc<TagLockManager>) {
        *self.lock_manager.lock() = Some(manager);
    }

    // ---------------------- agents ---------------------- //

    /// Register a new agent or update an existing one (newest wins).
    pub async fn register(
        &self,
        name: &str,
        pane_id: &str,
        teams: Vec<String>,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<Agent> {
        let name = valid_name(name, "agent name")?;
        if pane_id.is_empty() {
            return Err(OrchestratorError::invalid_args("pane id must not be empty"));
        }

        let agent = Agent {
            name: name.clone(),
            pane_id: pane_id.to_owned(),
            teams,
            created_at: Utc::now(),
            metadata,
        };

        let mut inner = self.inner.write().await;
        inner.agents.insert(name, agent.clone());
        self.journal.rewrite_agents(inner.agents.values())?;
        Ok(agent)
    }

    pub async fn get(&self, name: &str) -> Option<Agent> {
        self.inner.read().await.agents.get(name).cloned()
    }

    pub async fn get_by_pane(&self, pane_id: &str) -> Option<Agent> {
        let inner = self.inner.read().await;
        inner.agents.values().find(|a| a.pane_id == pane_id).cloned()
    }

    /// Remove an agent, releasing any locks it holds.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.agents.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.journal.rewrite_agents(inner.agents.values())?;
        drop(inner);

        if let Some(manager) = self.lock_manager.lock().clone() {
            manager.release_by_agent(name);
        }
        debug!(agent = name, "agent removed");
        Ok(true)
    }

    /// List all agents, optionally filtered by team, in registration order.
    pub async fn list(&self, team: Option<&str>) -> Vec<Agent> {
        let inner = self.inner.read().await;
        inner
            .agents
            .values()
            .filter(|a| team.is_none_or(|t| a.is_member_of(t)))
            .cloned()
            .collect()
    }

    pub async fn assign_to_team(&self, agent: &str, team: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.agents.get_mut(agent) else {
            return Ok(false);
        };
        if entry.is_member_of(team) {
            return Ok(false);
        }
        entry.teams.push(team.to_owned());
        self.journal.rewrite_agents(inner.agents.values())?;
        Ok(true)
    }

    pub async fn remove_from_team(&self, agent: &str, team: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.agents.get_mut(agent) else {
            return Ok(false);
        };
        let before = entry.teams.len();
        entry.teams.retain(|t| t != team);
        if entry.teams.len() == before {
            return Ok(false);
        }
        self.journal.rewrite_agents(inner.agents.values())?;
        Ok(true)
    }

    /// Convert agent names to pane ids, preserving order and skipping
    /// unknown agents.
    pub async fn pane_ids_for(&self, agent_names: &[String]) -> Vec<String> {
        let inner = self.inner.read().await;
        agent_names
            .iter()
            .filter_map(|name| inner.agents.get(name).map(|a| a.pane_id.clone()))
            .collect()
    }

    // ---------------------- teams ---------------------- //

    /// Create a team. A parent chain that would loop back onto the new
    /// team is rejected.
    pub async fn create_team(
        &self,
        name: &str,
        description: &str,
        parent_team: Option<&str>,
    ) -> Result<Team> {
        let name = valid_name(name, "team name")?;

        let mut inner = self.inner.write().await;
        if let Some(parent) = parent_team {
            let mut current = Some(parent.to_owned());
            let mut steps = 0;
            while let Some(team_name) = current {
                if team_name == name {
                    return Err(OrchestratorError::conflict(
                        format!("team '{name}' would create a hierarchy cycle"),
                        None,
                    ));
                }
                steps += 1;
                if steps > inner.teams.len() {
                    break;
                }
                current = inner.teams.get(&team_name).and_then(|t| t.parent_team.clone());
            }
        }

        let team = Team {
            name: name.clone(),
            description: description.to_owned(),
            parent_team: parent_team.map(str::to_owned),
            created_at: Utc::now(),
        };
        inner.teams.insert(name, team.clone());
        self.journal.rewrite_teams(inner.teams.values())?;
        Ok(team)
    }

    pub async fn get_team(&self, name: &str) -> Option<Team> {
        self.inner.read().await.teams.get(name).cloned()
    }

    /// Remove a team and scrub it from every agent's membership list.
    pub async fn remove_team(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.teams.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.journal.rewrite_teams(inner.teams.values())?;

        for agent in inner.agents.values_mut() {
            agent.teams.retain(|t| t != name);
        }
        self.journal.rewrite_agents(inner.agents.values())?;
        Ok(true)
    }

    pub async fn list_teams(&self) -> Vec<Team> {
        self.inner.read().await.teams.values().cloned().collect()
    }

    pub async fn child_teams(&self, parent: &str) -> Vec<Team> {
        let inner = self.inner.read().await;
        inner
            .teams
            .values()
            .filter(|t| t.parent_team.as_deref() == Some(parent))
            .cloned()
            .collect()
    }

    /// Team names from the top-most ancestor down to the given team.
    ///
    /// Traversal is bounded by the team count so a corrupt load that
    /// introduces a cycle cannot loop forever.
    pub async fn hierarchy(&self, team: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut chain = Vec::new();
        let mut current = Some(team.to_owned());

        while let Some(name) = current {
            if chain.contains(&name) || chain.len() > inner.teams.len() {
                break;
            }
            chain.insert(0, name.clone());
            current = inner.teams.get(&name).and_then(|t| t.parent_team.clone());
        }
        chain
    }

    // ---------------------- active pane ---------------------- //

    pub async fn active_pane(&self) -> Option<String> {
        self.inner.read().await.active_pane.clone()
    }

    pub async fn set_active_pane(&self, pane_id: Option<String>) {
        self.inner.write().await.active_pane = pane_id;
    }

    /// The agent bound to the active pane, if any.
    pub async fn active_agent(&self) -> Option<Agent> {
        let inner = self.inner.read().await;
        let active = inner.active_pane.as_deref()?;
        inner.agents.values().find(|a| a.pane_id == active).cloned()
    }

    // ---------------------- deduplication ---------------------- //

    /// Whether this exact content was already delivered to the recipient.
    pub async fn was_sent(&self, content: &str, recipient: &str) -> bool {
        let hash = hash_content(content);
        let inner = self.inner.read().await;
        inner
            .history
            .iter()
            .any(|r| r.content_hash == hash && r.recipients.iter().any(|n| n == recipient))
    }

    /// Record a delivery to the bounded history and the append-only journal.
    pub async fn record_sent(&self, content: &str, recipients: Vec<String>) -> Result<()> {
        let record = MessageRecord {
            content_hash: hash_content(content),
            recipients,
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.write().await;
        if inner.history.len() == self.max_history {
            inner.history.pop_front();
        }
        inner.history.push_back(record.clone());
        drop(inner);

        self.journal.append_message(&record)
    }

    /// Recipients that have never been paired with this content.
    pub async fn filter_unsent(&self, content: &str, recipients: &[String]) -> Vec<String> {
        let hash = hash_content(content);
        let inner = self.inner.read().await;

        let mut already: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for record in &inner.history {
            if record.content_hash == hash {
                already.extend(record.recipients.iter().map(String::as_str));
            }
        }

        recipients.iter().filter(|r| !already.contains(r.as_str())).cloned().collect()
    }

    /// The most recent message records, oldest first.
    pub async fn recent_messages(&self, limit: usize) -> Vec<MessageRecord> {
        let inner = self.inner.read().await;
        let skip = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(skip).cloned().collect()
    }

    // ---------------------- cascading messages ---------------------- //

    /// Resolve a cascade to `text -> sorted agent names`, most specific
    /// layer winning per agent: broadcast, then team entries, then
    /// agent-specific entries.
    pub async fn resolve_cascade(&self, cascade: &CascadingMessage) -> IndexMap<String, Vec<String>> {
        let inner = self.inner.read().await;

        let mut chosen: IndexMap<String, String> = IndexMap::new();

        if let Some(text) = &cascade.broadcast {
            for name in inner.agents.keys() {
                chosen.insert(name.clone(), text.clone());
            }
        }

        for (team, text) in &cascade.teams {
            for agent in inner.agents.values() {
                if agent.is_member_of(team) {
                    chosen.insert(agent.name.clone(), text.clone());
                }
            }
        }

        for (agent, text) in &cascade.agents {
            if inner.agents.contains_key(agent) {
                chosen.insert(agent.clone(), text.clone());
            }
        }

        let mut targets: IndexMap<String, Vec<String>> = IndexMap::new();
        for (agent, text) in chosen {
            targets.entry(text).or_default().push(agent);
        }
        for names in targets.values_mut() {
            names.sort();
        }
        targets
    }

    // ---------------------- snapshots ---------------------- //

    /// Serialize the registry into a checkpointable snapshot.
    pub async fn save_state(&self) -> RegistryState {
        let inner = self.inner.read().await;
        let skip = inner.history.len().saturating_sub(SNAPSHOT_HISTORY);
        RegistryState {
            agents: inner.agents.values().cloned().map(|a| (a.name.clone(), a)).collect(),
            teams: inner.teams.values().cloned().map(|t| (t.name.clone(), t)).collect(),
            active_pane: inner.active_pane.clone(),
            message_history: inner.history.iter().skip(skip).cloned().collect(),
        }
    }

    /// Replace the in-memory state with a snapshot and rewrite all
    /// journals to match.
    pub async fn load_state(&self, state: &RegistryState) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.agents = state.agents.values().cloned().map(|a| (a.name.clone(), a)).collect();
        inner.teams = state.teams.values().cloned().map(|t| (t.name.clone(), t)).collect();
        inner.active_pane = state.active_pane.clone();
        inner.history = state.message_history.iter().cloned().collect();

        self.journal.rewrite_agents(inner.agents.values())?;
        self.journal.rewrite_teams(inner.teams.values())?;
        self.journal.rewrite_messages(inner.history.iter())?;
        info!(agents = inner.agents.len(), teams = inner.teams.len(), "registry state restored");
        Ok(())
    }

    pub async fn summary(&self) -> RegistrySummary {
        let inner = self.inner.read().await;
        RegistrySummary {
            agent_count: inner.agents.len(),
            team_count: inner.teams.len(),
            active_pane: inner.active_pane.clone(),
            message_history_count: inner.history.len(),
            agents: inner.agents.keys().cloned().collect(),
            teams: inner.teams.keys().cloned().collect(),
        }
    }
}

fn valid_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::invalid_args(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
