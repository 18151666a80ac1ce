// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane addressing: resolve any legal way of naming a pane to the
//! backend's pane id.

use serde::{Deserialize, Serialize};

use crate::backend::TerminalBackend;
use crate::error::{OrchestratorError, Result};
use crate::registry::AgentRegistry;

/// Any subset of pane addressing fields. Resolution order is fixed:
/// pane id, then pane name, then agent name, then team name. An empty
/// target means the registry's active pane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl Target {
    pub fn pane(pane_id: &str) -> Self {
        Self { pane_id: Some(pane_id.to_owned()), ..Self::default() }
    }

    pub fn named(pane_name: &str) -> Self {
        Self { pane_name: Some(pane_name.to_owned()), ..Self::default() }
    }

    pub fn agent(agent: &str) -> Self {
        Self { agent: Some(agent.to_owned()), ..Self::default() }
    }

    pub fn team(team: &str) -> Self {
        Self { team: Some(team.to_owned()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.pane_id.is_none()
            && self.pane_name.is_none()
            && self.agent.is_none()
            && self.team.is_none()
    }
}

/// Resolve a target to a single pane id.
///
/// Team targets resolve to the first member in registration order; use
/// [`resolve_all`] for fan-out.
pub async fn resolve(
    target: &Target,
    registry: &AgentRegistry,
    backend: &dyn TerminalBackend,
) -> Result<String> {
    if target.is_empty() {
        return registry
            .active_pane()
            .await
            .ok_or_else(|| OrchestratorError::not_found("active pane", "(none set)"));
    }

    if let Some(pane_id) = &target.pane_id {
        return Ok(pane_id.clone());
    }

    if let Some(name) = &target.pane_name {
        if let Some(handle) = backend.get_by_name(name).await? {
            return Ok(handle.pane_id);
        }
        return Err(OrchestratorError::not_found("pane", name.clone()));
    }

    if let Some(agent) = &target.agent {
        if let Some(agent) = registry.get(agent).await {
            return Ok(agent.pane_id);
        }
        return Err(OrchestratorError::not_found("agent", agent.clone()));
    }

    if let Some(team) = &target.team {
        let members = registry.list(Some(team)).await;
        if let Some(first) = members.first() {
            return Ok(first.pane_id.clone());
        }
        return Err(OrchestratorError::not_found("team", team.clone()));
    }

    Err(OrchestratorError::not_found("target", "(empty)"))
}

/// Resolve a target to every pane it addresses. Single-pane targets
/// return one element; team targets fan out to all members.
pub async fn resolve_all(
    target: &Target,
    registry: &AgentRegistry,
    backend: &dyn TerminalBackend,
) -> Result<Vec<String>> {
    if let Some(team) = &target.team {
        if target.pane_id.is_none() && target.pane_name.is_none() && target.agent.is_none() {
            let members = registry.list(Some(team)).await;
            if members.is_empty() {
                return Err(OrchestratorError::not_found("team", team.clone()));
            }
            return Ok(members.into_iter().map(|a| a.pane_id).collect());
        }
    }
    Ok(vec![resolve(target, registry, backend).await?])
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
