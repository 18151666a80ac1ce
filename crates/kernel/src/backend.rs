// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal backend capability set.
//!
//! The kernel never talks to an emulator directly; every integration
//! (iTerm2, tmux, a headless PTY harness) implements [`TerminalBackend`]
//! and the kernel stays emulator-agnostic.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// A pane as reported by the backend: the opaque id plus its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneHandle {
    pub pane_id: String,
    pub name: String,
}

/// Where a new pane is placed relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDirection {
    None,
    Above,
    Below,
    Left,
    Right,
}

/// Named keys that can be delivered to a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKey {
    Enter,
    Tab,
    Escape,
    Space,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
}

impl SpecialKey {
    /// Parse a key name (e.g. "enter", "return", "esc") into a `SpecialKey`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "enter" | "return" => Some(Self::Enter),
            "tab" => Some(Self::Tab),
            "escape" | "esc" => Some(Self::Escape),
            "space" => Some(Self::Space),
            "backspace" => Some(Self::Backspace),
            "delete" => Some(Self::Delete),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "home" => Some(Self::Home),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    /// The escape sequence delivered to the terminal for this key.
    pub fn sequence(self) -> &'static str {
        match self {
            Self::Enter => "\r",
            Self::Tab => "\t",
            Self::Escape => "\x1b",
            Self::Space => " ",
            Self::Backspace => "\x7f",
            Self::Delete => "\x1b[3~",
            Self::Up => "\x1b[A",
            Self::Down => "\x1b[B",
            Self::Right => "\x1b[C",
            Self::Left => "\x1b[D",
            Self::Home => "\x1b[H",
            Self::End => "\x1b[F",
        }
    }
}

/// Map a control letter ("c" for Ctrl+C) to its ASCII control code.
pub fn control_code(letter: char) -> Result<u8> {
    if !letter.is_ascii_alphabetic() {
        return Err(OrchestratorError::invalid_args(format!(
            "control character must be a single letter, got '{letter}'"
        )));
    }
    Ok(letter.to_ascii_uppercase() as u8 - 64)
}

/// Suspend/resume bookkeeping owned by the backend adapter's session object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspendState {
    pub is_suspended: bool,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspended_by: Option<String>,
}

impl SuspendState {
    /// Mark the pane suspended. Double-suspend is an error.
    pub fn suspend(&mut self, agent: Option<&str>) -> Result<()> {
        if self.is_suspended {
            return Err(OrchestratorError::conflict(
                "pane is already suspended",
                self.suspended_by.clone(),
            ));
        }
        self.is_suspended = true;
        self.suspended_at = Some(Utc::now());
        self.suspended_by = agent.map(str::to_owned);
        Ok(())
    }

    /// Mark the pane resumed. Resume-while-running is an error.
    pub fn resume(&mut self) -> Result<()> {
        if !self.is_suspended {
            return Err(OrchestratorError::conflict("pane is not suspended", None));
        }
        self.is_suspended = false;
        self.suspended_at = None;
        self.suspended_by = None;
        Ok(())
    }
}

/// Whether a command would be mangled by shell parsing if typed literally.
pub fn needs_shell_encoding(command: &str) -> bool {
    command
        .chars()
        .any(|c| matches!(c, '"' | '\'' | '`' | '$' | '\\' | '\n' | '!' | ';' | '|' | '&' | '<' | '>'))
}

/// Wrap a command so the shell re-parses it from a base64 payload.
///
/// Decouples transport encoding from shell quoting: the command travels as
/// plain text, the pane decodes and `eval`s it.
pub fn encode_for_shell(command: &str) -> String {
    let clean = command.trim_end_matches(['\r', '\n']);
    let encoded = base64::engine::general_purpose::STANDARD.encode(clean.as_bytes());
    format!("eval \"$(echo {encoded} | base64 -d)\"")
}

/// Capability set the kernel requires from a terminal emulator.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Create a new pane, optionally splitting an existing one.
    async fn create_pane(
        &self,
        parent: Option<&str>,
        split: SplitDirection,
        profile: Option<&str>,
    ) -> Result<PaneHandle>;

    async fn set_pane_name(&self, pane_id: &str, name: &str) -> Result<()>;

    /// Send text to a pane, optionally pressing Enter afterwards.
    async fn send_text(&self, pane_id: &str, text: &str, press_enter: bool) -> Result<()>;

    /// Send a control character (single letter A-Z).
    async fn send_control(&self, pane_id: &str, letter: char) -> Result<()>;

    async fn send_special(&self, pane_id: &str, key: SpecialKey) -> Result<()>;

    /// Read the last `max_lines` lines of the pane's screen buffer.
    async fn read_screen(&self, pane_id: &str, max_lines: Option<usize>) -> Result<String>;

    /// Whether the pane's foreground process is still busy.
    async fn is_processing(&self, pane_id: &str) -> Result<bool>;

    /// Bring the pane to the foreground.
    async fn focus(&self, pane_id: &str) -> Result<()>;

    async fn suspend(&self, pane_id: &str, agent: Option<&str>) -> Result<()>;

    async fn resume(&self, pane_id: &str) -> Result<()>;

    async fn close(&self, pane_id: &str) -> Result<()>;

    async fn enumerate_panes(&self) -> Result<Vec<PaneHandle>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<PaneHandle>>;
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
