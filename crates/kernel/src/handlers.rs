// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default message handlers binding the router to the terminal backend,
//! the registry, and the lock/cooldown policy.
//!
//! Transports construct one [`TerminalHandlers`], call
//! [`TerminalHandlers::register_all`], and from then on only speak typed
//! messages through the router.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{encode_for_shell, needs_shell_encoding, TerminalBackend};
use crate::error::{OrchestratorError, Result};
use crate::message::{AgentMessage, MessagePayload, ReadOutput, SessionInfo};
use crate::registry::{AgentRegistry, CascadingMessage};
use crate::router::MessageRouter;
use crate::tags::{FocusCooldown, TagLockManager};
use crate::target::{resolve, Target};
use crate::wait::{wait_for_agent, WaitRequest};

const SERVICE_SENDER: &str = "terminal-service";

/// Delivery outcome for one agent in a cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeDelivery {
    pub agent: String,
    pub pane_id: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// Aggregate result of a cascade delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub results: Vec<CascadeDelivery>,
    pub delivered_count: usize,
    pub skipped_count: usize,
}

/// The default handler set for terminal operations.
pub struct TerminalHandlers {
    backend: Arc<dyn TerminalBackend>,
    registry: Arc<AgentRegistry>,
    guard: Arc<TagLockManager>,
    cooldown: Arc<FocusCooldown>,
    shutdown: CancellationToken,
}

impl TerminalHandlers {
    pub fn new(
        backend: Arc<dyn TerminalBackend>,
        registry: Arc<AgentRegistry>,
        guard: Arc<TagLockManager>,
        cooldown: Arc<FocusCooldown>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            registry,
            guard,
            cooldown,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token observed by long-running handlers (waits); cancel it on
    /// transport shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register every handler with the router.
    pub async fn register_all(self: &Arc<Self>, router: &MessageRouter) {
        macro_rules! route {
            ($this:expr, $tag:expr, $method:ident) => {{
                let this = Arc::clone($this);
                router
                    .register($tag, move |message| {
                        let this = Arc::clone(&this);
                        async move { this.$method(message).await }
                    })
                    .await;
            }};
        }

        route!(self, "TerminalCommand", handle_terminal_command);
        route!(self, "TerminalReadRequest", handle_terminal_read);
        route!(self, "ControlCharacter", handle_control_character);
        route!(self, "SpecialKey", handle_special_key);
        route!(self, "SessionStatusRequest", handle_session_status);
        route!(self, "SessionListRequest", handle_session_list);
        route!(self, "FocusSession", handle_focus_session);
        route!(self, "WaitForAgent", handle_wait_for_agent);

        info!("terminal message handlers registered");
    }

    /// Require write permission on a pane for the message sender.
    fn check_write(&self, pane_id: &str, sender: &str) -> Result<()> {
        let (allowed, owner) = self.guard.check_write(pane_id, Some(sender));
        if allowed {
            return Ok(());
        }
        Err(OrchestratorError::conflict(format!("pane '{pane_id}' is locked"), owner))
    }

    fn read_output_response(&self, pane_id: &str, output: String, started: Instant) -> AgentMessage {
        let line_count = if output.is_empty() { 0 } else { output.lines().count() };
        AgentMessage::new(
            SERVICE_SENDER,
            MessagePayload::TerminalOutput {
                session_id: pane_id.to_owned(),
                session_name: None,
                output,
                duration: started.elapsed().as_secs_f64(),
                line_count,
                truncated: false,
            },
        )
    }

    async fn handle_terminal_command(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::TerminalCommand {
            session_target,
            command,
            execute,
            wait_for_completion,
            ..
        } = &message.payload
        else {
            return Ok(None);
        };

        let started = Instant::now();
        let pane_id = resolve(session_target, &self.registry, self.backend.as_ref()).await?;
        self.check_write(&pane_id, &message.sender)?;

        // Shell-hostile commands travel base64-wrapped so quoting survives.
        let text = if *execute && needs_shell_encoding(command) {
            encode_for_shell(command)
        } else {
            command.clone()
        };
        self.backend.send_text(&pane_id, &text, *execute).await?;

        if *wait_for_completion && *execute {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        let output = self.backend.read_screen(&pane_id, None).await?;
        debug!(pane = %pane_id, "command dispatched");
        Ok(Some(self.read_output_response(&pane_id, output, started)))
    }

    async fn handle_terminal_read(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::TerminalReadRequest { targets, max_lines, filter_pattern } =
            &message.payload
        else {
            return Ok(None);
        };

        let filter = match filter_pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                OrchestratorError::invalid_args(format!("invalid filter regex: {e}"))
            })?),
            None => None,
        };

        // Empty target list reads the active pane.
        let targets = if targets.is_empty() {
            vec![crate::message::ReadTarget { target: Target::default(), max_lines: None }]
        } else {
            targets.clone()
        };

        let mut outputs = Vec::new();
        for read_target in &targets {
            let pane_id =
                match resolve(&read_target.target, &self.registry, self.backend.as_ref()).await {
                    Ok(pane_id) => pane_id,
                    Err(e) => {
                        outputs.push(ReadOutput {
                            pane_id: String::new(),
                            error: Some(e.to_string()),
                            ..ReadOutput::default()
                        });
                        continue;
                    }
                };

            let lines = read_target.max_lines.or(*max_lines);
            match self.backend.read_screen(&pane_id, lines).await {
                Ok(content) => {
                    let content = match &filter {
                        Some(regex) => content
                            .lines()
                            .filter(|line| regex.is_match(line))
                            .collect::<Vec<_>>()
                            .join("\n"),
                        None => content,
                    };
                    let name = self
                        .registry
                        .get_by_pane(&pane_id)
                        .await
                        .map(|a| a.name)
                        .or_else(|| Some(pane_id.clone()));
                    outputs.push(ReadOutput {
                        pane_id: pane_id.clone(),
                        name,
                        line_count: if content.is_empty() { 0 } else { content.lines().count() },
                        content: Some(content),
                        error: None,
                    });
                }
                Err(e) => outputs.push(ReadOutput {
                    pane_id: pane_id.clone(),
                    error: Some(e.to_string()),
                    ..ReadOutput::default()
                }),
            }
        }

        Ok(Some(AgentMessage::new(
            SERVICE_SENDER,
            MessagePayload::TerminalReadResponse { total_sessions: outputs.len(), outputs },
        )))
    }

    async fn handle_control_character(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::ControlCharacter { session_target, character } = &message.payload
        else {
            return Ok(None);
        };

        let started = Instant::now();
        let pane_id = resolve(session_target, &self.registry, self.backend.as_ref()).await?;
        self.check_write(&pane_id, &message.sender)?;
        self.backend.send_control(&pane_id, *character).await?;

        let text = format!("Sent Ctrl+{}", character.to_ascii_uppercase());
        Ok(Some(self.read_output_response(&pane_id, text, started)))
    }

    async fn handle_special_key(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::SpecialKey { session_target, key } = &message.payload else {
            return Ok(None);
        };

        let started = Instant::now();
        let pane_id = resolve(session_target, &self.registry, self.backend.as_ref()).await?;
        self.check_write(&pane_id, &message.sender)?;
        self.backend.send_special(&pane_id, *key).await?;

        let text = format!("Sent {key:?} key");
        Ok(Some(self.read_output_response(&pane_id, text, started)))
    }

    async fn handle_session_status(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::SessionStatusRequest { session_target } = &message.payload else {
            return Ok(None);
        };

        let pane_id = resolve(session_target, &self.registry, self.backend.as_ref()).await?;
        let is_processing = self.backend.is_processing(&pane_id).await?;
        let agent = self.registry.get_by_pane(&pane_id).await;

        Ok(Some(AgentMessage::new(
            SERVICE_SENDER,
            MessagePayload::SessionStatusResponse {
                session_id: pane_id,
                session_name: None,
                agent: agent.map(|a| a.name),
                is_processing,
                is_at_prompt: !is_processing,
            },
        )))
    }

    async fn handle_session_list(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::SessionListRequest { include_agents, team_filter } = &message.payload
        else {
            return Ok(None);
        };

        let mut sessions = Vec::new();
        for handle in self.backend.enumerate_panes().await? {
            let agent = self.registry.get_by_pane(&handle.pane_id).await;

            if let Some(team) = team_filter {
                let in_team = agent.as_ref().is_some_and(|a| a.is_member_of(team));
                if !in_team {
                    continue;
                }
            }

            let is_processing =
                self.backend.is_processing(&handle.pane_id).await.unwrap_or(false);
            let (agent_name, teams) = if *include_agents {
                match agent {
                    Some(agent) => (Some(agent.name), agent.teams),
                    None => (None, vec![]),
                }
            } else {
                (None, vec![])
            };

            sessions.push(SessionInfo {
                pane_id: handle.pane_id,
                name: handle.name,
                is_processing,
                agent: agent_name,
                teams,
            });
        }

        Ok(Some(AgentMessage::new(
            SERVICE_SENDER,
            MessagePayload::SessionListResponse { total_count: sessions.len(), sessions },
        )))
    }

    async fn handle_focus_session(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::FocusSession { session_target, bring_to_front } = &message.payload
        else {
            return Ok(None);
        };

        let started = Instant::now();
        let pane_id = resolve(session_target, &self.registry, self.backend.as_ref()).await?;

        let (allowed, blocker, remaining) = self.cooldown.check(&pane_id, Some(&message.sender));
        if !allowed {
            return Err(OrchestratorError::conflict(
                format!("focus cooldown active for another {remaining:.1}s"),
                blocker,
            ));
        }

        if *bring_to_front {
            self.backend.focus(&pane_id).await?;
        }
        self.cooldown.record(&pane_id, Some(&message.sender));
        self.registry.set_active_pane(Some(pane_id.clone())).await;

        let text = format!("Focused session {pane_id}");
        Ok(Some(self.read_output_response(&pane_id, text, started)))
    }

    async fn handle_wait_for_agent(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        let MessagePayload::WaitForAgent {
            target_agent,
            wait_up_to,
            return_output,
            summary_on_timeout,
        } = &message.payload
        else {
            return Ok(None);
        };

        let request = WaitRequest::new(target_agent, *wait_up_to)?
            .with_output(*return_output)
            .with_summary_on_timeout(*summary_on_timeout);
        let result =
            wait_for_agent(&self.registry, self.backend.as_ref(), &request, &self.shutdown).await?;

        Ok(Some(AgentMessage::new(
            SERVICE_SENDER,
            MessagePayload::WaitForAgentResponse { result },
        )))
    }

    /// Deliver a cascading message: resolve the layers, drop recipients
    /// that already received identical content (when `skip_duplicates`),
    /// send the rest, and record the deliveries.
    pub async fn cascade_message(
        &self,
        cascade: &CascadingMessage,
        skip_duplicates: bool,
        execute: bool,
    ) -> Result<CascadeOutcome> {
        let resolved = self.registry.resolve_cascade(cascade).await;
        let mut outcome = CascadeOutcome::default();

        for (text, agents) in resolved {
            let recipients = if skip_duplicates {
                self.registry.filter_unsent(&text, &agents).await
            } else {
                agents.clone()
            };

            for agent_name in &agents {
                if !recipients.contains(agent_name) {
                    outcome.results.push(CascadeDelivery {
                        agent: agent_name.clone(),
                        pane_id: String::new(),
                        delivered: false,
                        skipped_reason: Some("duplicate".to_owned()),
                    });
                    outcome.skipped_count += 1;
                    continue;
                }

                let Some(agent) = self.registry.get(agent_name).await else {
                    continue;
                };
                match self.backend.send_text(&agent.pane_id, &text, execute).await {
                    Ok(()) => {
                        outcome.results.push(CascadeDelivery {
                            agent: agent_name.clone(),
                            pane_id: agent.pane_id,
                            delivered: true,
                            skipped_reason: None,
                        });
                        outcome.delivered_count += 1;
                    }
                    Err(e) => {
                        outcome.results.push(CascadeDelivery {
                            agent: agent_name.clone(),
                            pane_id: agent.pane_id,
                            delivered: false,
                            skipped_reason: Some(e.to_string()),
                        });
                        outcome.skipped_count += 1;
                    }
                }
            }

            if !recipients.is_empty() {
                self.registry.record_sent(&text, recipients).await?;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
