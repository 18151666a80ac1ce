// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Terminal pane orchestration kernel for fleets of AI coding agents.
#[derive(Debug, Clone, Parser)]
#[command(name = "roost", version, about)]
pub struct Config {
    /// Base directory for journals, memories, and checkpoints.
    #[arg(long, env = "ROOST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Memory store backend (file or sqlite).
    #[arg(long, env = "ROOST_MEMORY_BACKEND", default_value = "sqlite")]
    pub memory_backend: String,

    /// Checkpoint backend (file or sqlite).
    #[arg(long, env = "ROOST_CHECKPOINT_BACKEND", default_value = "file")]
    pub checkpoint_backend: String,

    /// Focus cooldown in seconds.
    #[arg(long, env = "ROOST_FOCUS_COOLDOWN", default_value = "5.0")]
    pub focus_cooldown: f64,

    /// Message records kept for deduplication.
    #[arg(long, env = "ROOST_MESSAGE_HISTORY", default_value = "1000")]
    pub message_history: usize,

    /// Router dedup FIFO capacity.
    #[arg(long, env = "ROOST_ROUTER_DEDUP", default_value = "1024")]
    pub router_dedup: usize,

    /// Default expect timeout in seconds.
    #[arg(long, env = "ROOST_EXPECT_TIMEOUT", default_value = "30.0")]
    pub expect_timeout: f64,

    /// Expect poll interval in seconds.
    #[arg(long, env = "ROOST_EXPECT_POLL", default_value = "0.1")]
    pub expect_poll: f64,

    /// Screen lines scanned per expect poll.
    #[arg(long, env = "ROOST_EXPECT_WINDOW", default_value = "200")]
    pub expect_window: usize,

    /// Wait-for-agent poll cadence in seconds.
    #[arg(long, env = "ROOST_WAIT_POLL", default_value = "0.5")]
    pub wait_poll: f64,

    /// Create checkpoints automatically on major operations.
    /// Default: true.
    #[arg(long, env = "ROOST_AUTO_CHECKPOINT")]
    pub auto_checkpoint: Option<bool>,

    /// Operations between automatic checkpoints.
    #[arg(long, env = "ROOST_CHECKPOINT_INTERVAL", default_value = "5")]
    pub checkpoint_interval: u32,

    /// Log format (json or text).
    #[arg(long, env = "ROOST_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ROOST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Selectable storage backends for memories and checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Sqlite,
}

impl Default for Config {
    fn default() -> Self {
        // Parse with no CLI arguments so embedders get the documented
        // defaults without going through clap themselves.
        Self::parse_from(["roost"])
    }
}

impl Config {
    /// Resolve the data directory, defaulting to `~/.iterm-mcp`.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".iterm-mcp"),
        }
    }

    pub fn focus_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.focus_cooldown.max(0.0))
    }

    pub fn expect_poll(&self) -> Duration {
        Duration::from_secs_f64(self.expect_poll.max(0.01))
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_secs_f64(self.wait_poll.max(0.05))
    }

    /// Resolve whether auto-checkpointing is enabled. Defaults to `true`.
    pub fn effective_auto_checkpoint(&self) -> bool {
        self.auto_checkpoint.unwrap_or(true)
    }

    /// Parse the memory backend string into an enum.
    pub fn memory_backend_enum(&self) -> anyhow::Result<StoreBackend> {
        parse_backend(&self.memory_backend)
    }

    /// Parse the checkpoint backend string into an enum.
    pub fn checkpoint_backend_enum(&self) -> anyhow::Result<StoreBackend> {
        parse_backend(&self.checkpoint_backend)
    }

    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.memory_backend_enum()?;
        self.checkpoint_backend_enum()?;

        if self.message_history == 0 {
            anyhow::bail!("--message-history must be at least 1");
        }
        if self.router_dedup == 0 {
            anyhow::bail!("--router-dedup must be at least 1");
        }
        if self.expect_timeout <= 0.0 {
            anyhow::bail!("--expect-timeout must be positive");
        }
        if self.expect_window == 0 {
            anyhow::bail!("--expect-window must be at least 1");
        }
        if self.checkpoint_interval == 0 {
            anyhow::bail!("--checkpoint-interval must be at least 1");
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }
}

fn parse_backend(value: &str) -> anyhow::Result<StoreBackend> {
    match value.to_lowercase().as_str() {
        "file" => Ok(StoreBackend::File),
        "sqlite" => Ok(StoreBackend::Sqlite),
        other => anyhow::bail!("invalid store backend: {other}"),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
