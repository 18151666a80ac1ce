// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    enter = { "enter", SpecialKey::Enter },
    return_alias = { "return", SpecialKey::Enter },
    escape = { "escape", SpecialKey::Escape },
    esc_alias = { "esc", SpecialKey::Escape },
    uppercase = { "TAB", SpecialKey::Tab },
    arrow = { "up", SpecialKey::Up },
)]
fn special_key_from_name(name: &str, expected: SpecialKey) {
    assert_eq!(SpecialKey::from_name(name), Some(expected));
}

#[test]
fn special_key_unknown() {
    assert_eq!(SpecialKey::from_name("f13"), None);
}

#[test]
fn special_key_sequences() {
    assert_eq!(SpecialKey::Enter.sequence(), "\r");
    assert_eq!(SpecialKey::Delete.sequence(), "\x1b[3~");
    assert_eq!(SpecialKey::Left.sequence(), "\x1b[D");
}

#[test]
fn control_code_letters() {
    assert_eq!(control_code('c').unwrap(), 3);
    assert_eq!(control_code('C').unwrap(), 3);
    assert_eq!(control_code('a').unwrap(), 1);
    assert_eq!(control_code('z').unwrap(), 26);
}

#[test]
fn control_code_rejects_non_letters() {
    assert!(control_code('1').is_err());
    assert!(control_code('%').is_err());
}

#[test]
fn suspend_resume_cycle() {
    let mut state = SuspendState::default();
    state.suspend(Some("alice")).unwrap();
    assert!(state.is_suspended);
    assert_eq!(state.suspended_by.as_deref(), Some("alice"));
    assert!(state.suspended_at.is_some());

    // Double suspend fails and reports the holder.
    let err = state.suspend(Some("bob")).unwrap_err();
    assert_eq!(err.code(), "CONFLICT");

    state.resume().unwrap();
    assert!(!state.is_suspended);
    assert!(state.resume().is_err());
}

#[yare::parameterized(
    plain = { "ls -la", false },
    quotes = { r#"echo "hi""#, true },
    dollar = { "echo $HOME", true },
    backtick = { "echo `date`", true },
    pipe = { "ps | grep x", true },
    newline = { "a\nb", true },
)]
fn shell_encoding_detection(command: &str, expected: bool) {
    assert_eq!(needs_shell_encoding(command), expected);
}

#[test]
fn encode_for_shell_wraps_base64() {
    let wrapped = encode_for_shell("echo \"hello world\"\n");
    assert!(wrapped.starts_with("eval \"$(echo "));
    assert!(wrapped.ends_with(" | base64 -d)\""));
    // The trailing newline is stripped before encoding.
    let payload = wrapped
        .strip_prefix("eval \"$(echo ")
        .and_then(|s| s.strip_suffix(" | base64 -d)\""))
        .unwrap();
    let decoded = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
    assert_eq!(decoded, b"echo \"hello world\"");
}
