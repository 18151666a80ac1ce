// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed messages exchanged between transports and handlers.
//!
//! Every message is one envelope plus a payload variant. Payloads carry a
//! `_type` discriminator on the wire so transports can route without
//! understanding the full schema; unknown or missing discriminators are
//! rejected at deserialization time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::backend::SpecialKey;
use crate::target::Target;
use crate::wait::WaitResult;

/// Delivery priority carried on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A read target: any pane addressing plus an optional line override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadTarget {
    #[serde(flatten)]
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,
}

/// Output captured from one pane during a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadOutput {
    pub pane_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub line_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One pane row in a session listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub pane_id: String,
    pub name: String,
    pub is_processing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    30
}

fn default_wait_up_to() -> u64 {
    30
}

/// Payload variants, discriminated by `_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum MessagePayload {
    TerminalCommand {
        session_target: Target,
        command: String,
        #[serde(default = "default_true")]
        execute: bool,
        #[serde(default = "default_true")]
        wait_for_completion: bool,
        #[serde(default = "default_command_timeout")]
        timeout: u64,
    },
    TerminalOutput {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
        output: String,
        #[serde(default)]
        duration: f64,
        #[serde(default)]
        line_count: usize,
        #[serde(default)]
        truncated: bool,
    },
    TerminalReadRequest {
        #[serde(default)]
        targets: Vec<ReadTarget>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_lines: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_pattern: Option<String>,
    },
    TerminalReadResponse {
        outputs: Vec<ReadOutput>,
        total_sessions: usize,
    },
    ControlCharacter {
        session_target: Target,
        character: char,
    },
    SpecialKey {
        session_target: Target,
        key: SpecialKey,
    },
    SessionStatusRequest {
        session_target: Target,
    },
    SessionStatusResponse {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        is_processing: bool,
        is_at_prompt: bool,
    },
    SessionListRequest {
        #[serde(default = "default_true")]
        include_agents: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team_filter: Option<String>,
    },
    SessionListResponse {
        sessions: Vec<SessionInfo>,
        total_count: usize,
    },
    FocusSession {
        session_target: Target,
        #[serde(default = "default_true")]
        bring_to_front: bool,
    },
    BroadcastNotification {
        topic: String,
        payload: Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        target_teams: Vec<String>,
        #[serde(default = "default_true")]
        exclude_sender: bool,
    },
    WaitForAgent {
        target_agent: String,
        #[serde(default = "default_wait_up_to")]
        wait_up_to: u64,
        #[serde(default)]
        return_output: bool,
        #[serde(default)]
        summary_on_timeout: bool,
    },
    WaitForAgentResponse {
        result: WaitResult,
    },
    Error {
        error_code: String,
        error_message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_message_id: Option<String>,
        #[serde(default = "default_true")]
        recoverable: bool,
    },
}

impl MessagePayload {
    /// The stable string tag this payload serializes under.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::TerminalCommand { .. } => "TerminalCommand",
            Self::TerminalOutput { .. } => "TerminalOutput",
            Self::TerminalReadRequest { .. } => "TerminalReadRequest",
            Self::TerminalReadResponse { .. } => "TerminalReadResponse",
            Self::ControlCharacter { .. } => "ControlCharacter",
            Self::SpecialKey { .. } => "SpecialKey",
            Self::SessionStatusRequest { .. } => "SessionStatusRequest",
            Self::SessionStatusResponse { .. } => "SessionStatusResponse",
            Self::SessionListRequest { .. } => "SessionListRequest",
            Self::SessionListResponse { .. } => "SessionListResponse",
            Self::FocusSession { .. } => "FocusSession",
            Self::BroadcastNotification { .. } => "BroadcastNotification",
            Self::WaitForAgent { .. } => "WaitForAgent",
            Self::WaitForAgentResponse { .. } => "WaitForAgentResponse",
            Self::Error { .. } => "Error",
        }
    }
}

/// Envelope wrapping every payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

impl AgentMessage {
    /// Build a message with a fresh id and the current timestamp.
    pub fn new(sender: &str, payload: MessagePayload) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            sender: sender.to_owned(),
            timestamp: Utc::now(),
            priority: MessagePriority::Normal,
            correlation_id: None,
            metadata: serde_json::Map::new(),
            payload,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_owned());
        self
    }

    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }

    /// Deterministic hash over everything except `message_id` and
    /// `timestamp`: two messages carrying the same content hash the same
    /// regardless of when or under which id they were minted.
    ///
    /// Relies on serde_json's sorted object keys for a canonical form.
    pub fn content_hash(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.remove("message_id");
            map.remove("timestamp");
        }
        let canonical = value.to_string();

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
