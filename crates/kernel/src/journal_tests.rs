// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Entry {
    name: String,
    count: u32,
}

fn entry(name: &str, count: u32) -> Entry {
    Entry { name: name.to_owned(), count }
}

#[test]
fn rewrite_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path()).unwrap();

    journal.rewrite_agents([entry("alice", 1), entry("bob", 2)]).unwrap();
    let loaded: Vec<Entry> = journal.load_agents();
    assert_eq!(loaded, vec![entry("alice", 1), entry("bob", 2)]);
}

#[test]
fn rewrite_replaces_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path()).unwrap();

    journal.rewrite_teams([entry("frontend", 3)]).unwrap();
    journal.rewrite_teams([entry("backend", 4)]).unwrap();

    let loaded: Vec<Entry> = journal.load_teams();
    assert_eq!(loaded, vec![entry("backend", 4)]);
}

#[test]
fn append_accumulates() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path()).unwrap();

    journal.append_message(&entry("a", 1)).unwrap();
    journal.append_message(&entry("b", 2)).unwrap();

    let loaded: Vec<Entry> = journal.load_messages();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1], entry("b", 2));
}

#[test]
fn malformed_lines_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path()).unwrap();

    journal.append_message(&entry("good", 1)).unwrap();
    std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("messages.jsonl"))
        .unwrap()
        .write_all(b"{not json\n")
        .unwrap();
    journal.append_message(&entry("also-good", 2)).unwrap();

    let loaded: Vec<Entry> = journal.load_messages();
    assert_eq!(loaded.len(), 2);
}

#[test]
fn missing_files_load_empty() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path()).unwrap();
    let loaded: Vec<Entry> = journal.load_agents();
    assert!(loaded.is_empty());
}
