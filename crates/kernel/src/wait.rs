// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, resumable waiting on a pane reaching idle.
//!
//! The contract is deliberately timeout-friendly: a caller that gets
//! `timed_out` with `can_continue_waiting` simply calls again with the
//! same arguments and picks up where it left off.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::TerminalBackend;
use crate::error::{OrchestratorError, Result};
use crate::registry::AgentRegistry;

/// Bounds for `wait_up_to` in seconds.
pub const MIN_WAIT_SECONDS: u64 = 1;
pub const MAX_WAIT_SECONDS: u64 = 600;

/// Poll cadence between busy checks.
pub const DEFAULT_WAIT_POLL: std::time::Duration = std::time::Duration::from_millis(500);

/// What the pane was doing when the wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitStatus {
    Idle,
    Running,
    Blocked,
    Error,
    Unknown,
}

impl WaitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Validated request for [`wait_for_agent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitRequest {
    pub agent: String,
    pub wait_up_to: u64,
    #[serde(default)]
    pub return_output: bool,
    #[serde(default)]
    pub summary_on_timeout: bool,
}

impl WaitRequest {
    pub fn new(agent: &str, wait_up_to: u64) -> Result<Self> {
        if agent.trim().is_empty() {
            return Err(OrchestratorError::invalid_args("agent name must not be empty"));
        }
        if !(MIN_WAIT_SECONDS..=MAX_WAIT_SECONDS).contains(&wait_up_to) {
            return Err(OrchestratorError::invalid_args(format!(
                "wait_up_to must be between {MIN_WAIT_SECONDS} and {MAX_WAIT_SECONDS} seconds, got {wait_up_to}"
            )));
        }
        Ok(Self {
            agent: agent.to_owned(),
            wait_up_to,
            return_output: false,
            summary_on_timeout: false,
        })
    }

    pub fn with_output(mut self, return_output: bool) -> Self {
        self.return_output = return_output;
        self
    }

    pub fn with_summary_on_timeout(mut self, summary_on_timeout: bool) -> Self {
        self.summary_on_timeout = summary_on_timeout;
        self
    }
}

/// Outcome of one bounded wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitResult {
    pub agent: String,
    pub completed: bool,
    pub timed_out: bool,
    pub elapsed_seconds: f64,
    pub status: WaitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub can_continue_waiting: bool,
}

impl WaitResult {
    fn unknown(agent: &str, summary: String) -> Self {
        Self {
            agent: agent.to_owned(),
            completed: false,
            timed_out: false,
            elapsed_seconds: 0.0,
            status: WaitStatus::Unknown,
            output: None,
            summary: Some(summary),
            can_continue_waiting: false,
        }
    }
}

/// The last non-empty line of a screen read, for timeout summaries.
fn last_visible_line(output: &str) -> Option<String> {
    output.lines().rev().map(str::trim).find(|line| !line.is_empty()).map(str::to_owned)
}

/// Poll until the agent's pane goes idle or the budget expires.
pub async fn wait_for_agent(
    registry: &AgentRegistry,
    backend: &dyn TerminalBackend,
    request: &WaitRequest,
    cancel: &CancellationToken,
) -> Result<WaitResult> {
    let Some(agent) = registry.get(&request.agent).await else {
        return Ok(WaitResult::unknown(
            &request.agent,
            format!("Agent '{}' not found", request.agent),
        ));
    };

    // Probe once so a dead pane short-circuits instead of burning the
    // whole wait budget.
    if backend.is_processing(&agent.pane_id).await.is_err() {
        return Ok(WaitResult::unknown(
            &request.agent,
            format!("Session for agent '{}' not found", request.agent),
        ));
    }

    let started = Instant::now();
    let budget = std::time::Duration::from_secs(request.wait_up_to);

    loop {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let busy = match backend.is_processing(&agent.pane_id).await {
            Ok(busy) => busy,
            Err(e) => {
                return Ok(WaitResult {
                    agent: request.agent.clone(),
                    completed: false,
                    timed_out: false,
                    elapsed_seconds: started.elapsed().as_secs_f64().min(budget.as_secs_f64()),
                    status: WaitStatus::Error,
                    output: None,
                    summary: Some(e.to_string()),
                    can_continue_waiting: false,
                });
            }
        };

        if !busy {
            let output = if request.return_output {
                backend.read_screen(&agent.pane_id, None).await.ok()
            } else {
                None
            };
            return Ok(WaitResult {
                agent: request.agent.clone(),
                completed: true,
                timed_out: false,
                elapsed_seconds: started.elapsed().as_secs_f64().min(budget.as_secs_f64()),
                status: WaitStatus::Idle,
                output,
                summary: None,
                can_continue_waiting: false,
            });
        }

        if started.elapsed() >= budget {
            let screen = backend.read_screen(&agent.pane_id, None).await.ok();
            let summary = if request.summary_on_timeout {
                screen.as_deref().and_then(last_visible_line).map(|line| format!("Still running. Last output: {line}"))
            } else {
                None
            };
            let output = if request.return_output { screen } else { None };
            return Ok(WaitResult {
                agent: request.agent.clone(),
                completed: false,
                timed_out: true,
                elapsed_seconds: budget.as_secs_f64(),
                status: WaitStatus::Running,
                output,
                summary,
                can_continue_waiting: true,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(DEFAULT_WAIT_POLL) => {}
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
        }
    }
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
