// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[test]
fn defaults_validate() {
    let config = Config::parse_from(["roost"]);
    assert!(config.validate().is_ok());
    assert_eq!(config.message_history, 1000);
    assert_eq!(config.router_dedup, 1024);
    assert_eq!(config.focus_cooldown, 5.0);
    assert_eq!(config.memory_backend_enum().ok(), Some(StoreBackend::Sqlite));
}

#[test]
fn data_dir_default_under_home() {
    let config = Config::parse_from(["roost"]);
    assert!(config.data_dir().ends_with(".iterm-mcp"));
}

#[test]
fn data_dir_override() {
    let config = Config::parse_from(["roost", "--data-dir", "/tmp/orch"]);
    assert_eq!(config.data_dir(), PathBuf::from("/tmp/orch"));
}

#[yare::parameterized(
    memory = { &["roost", "--memory-backend", "redis"] },
    checkpoint = { &["roost", "--checkpoint-backend", "s3"] },
    history = { &["roost", "--message-history", "0"] },
    dedup = { &["roost", "--router-dedup", "0"] },
    timeout = { &["roost", "--expect-timeout", "0"] },
    log_format = { &["roost", "--log-format", "xml"] },
)]
fn invalid_values_rejected(args: &[&str]) {
    let config = Config::parse_from(args.iter().copied());
    assert!(config.validate().is_err());
}

#[test]
fn poll_intervals_clamped() {
    let config = Config::parse_from(["roost", "--expect-poll", "0.0", "--wait-poll", "0.0"]);
    assert!(config.expect_poll() >= Duration::from_millis(10));
    assert!(config.wait_poll() >= Duration::from_millis(50));
}

#[test]
fn auto_checkpoint_defaults_on() {
    let config = Config::parse_from(["roost"]);
    assert!(config.effective_auto_checkpoint());

    let disabled = Config::parse_from(["roost", "--auto-checkpoint", "false"]);
    assert!(!disabled.effective_auto_checkpoint());
}
