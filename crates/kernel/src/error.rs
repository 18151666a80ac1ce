// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Convenience alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Unified error type for all kernel operations.
///
/// Transports translate these into their own wire representations using
/// [`OrchestratorError::code`] for the machine-readable half and `Display`
/// for the human-readable half.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// An agent, team, pane, handler, memory, or checkpoint is not present.
    NotFound { what: &'static str, name: String },
    /// A caller-supplied argument failed validation.
    InvalidArgs { message: String },
    /// The operation collides with existing state (lock held, cooldown
    /// active, hierarchy cycle).
    Conflict { message: String, owner: Option<String> },
    /// An expect deadline expired with no sentinel pattern present.
    Timeout { seconds: f64, patterns: Vec<String>, output: String },
    /// Cooperative cancellation fired.
    Cancelled,
    /// The terminal backend failed.
    Backend { message: String, recoverable: bool },
    /// A journal or database write failed. In-memory state is kept
    /// consistent so the caller may retry the persistence step.
    Persist { message: String },
}

impl OrchestratorError {
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound { what, name: name.into() }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>, owner: Option<String>) -> Self {
        Self::Conflict { message: message.into(), owner }
    }

    pub fn backend(message: impl Into<String>, recoverable: bool) -> Self {
        Self::Backend { message: message.into(), recoverable }
    }

    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist { message: message.into() }
    }

    /// Stable machine-readable code for transports and error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidArgs { .. } => "INVALID_ARGS",
            Self::Conflict { .. } => "CONFLICT",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Backend { .. } => "BACKEND_FAILURE",
            Self::Persist { .. } => "PERSIST_FAILED",
        }
    }

    /// Whether a retry of the same operation can reasonably succeed.
    pub fn recoverable(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::InvalidArgs { .. } => false,
            Self::Conflict { .. } | Self::Timeout { .. } | Self::Cancelled => true,
            Self::Backend { recoverable, .. } => *recoverable,
            Self::Persist { .. } => true,
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what, name } => write!(f, "{what} '{name}' not found"),
            Self::InvalidArgs { message } => write!(f, "invalid arguments: {message}"),
            Self::Conflict { message, owner } => match owner {
                Some(owner) => write!(f, "{message} (held by '{owner}')"),
                None => f.write_str(message),
            },
            Self::Timeout { seconds, patterns, .. } => {
                write!(f, "timed out after {seconds}s waiting for [{}]", patterns.join(", "))
            }
            Self::Cancelled => f.write_str("operation cancelled"),
            Self::Backend { message, .. } => write!(f, "terminal backend error: {message}"),
            Self::Persist { message } => write!(f, "persistence failed: {message}"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        Self::Persist { message: e.to_string() }
    }
}

impl From<rusqlite::Error> for OrchestratorError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persist { message: e.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
