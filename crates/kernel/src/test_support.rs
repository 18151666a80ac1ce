// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scriptable in-memory terminal backend.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::backend::{
    control_code, PaneHandle, SpecialKey, SplitDirection, SuspendState, TerminalBackend,
};
use crate::error::{OrchestratorError, Result};

/// Scripted state of one fake pane.
#[derive(Debug, Default, Clone)]
pub struct FakePane {
    pub name: String,
    pub screen: String,
    pub processing: bool,
    pub sent_text: Vec<(String, bool)>,
    pub sent_controls: Vec<u8>,
    pub sent_specials: Vec<SpecialKey>,
    pub focus_count: usize,
    pub suspend: SuspendState,
    pub closed: bool,
}

/// In-memory [`TerminalBackend`] whose panes are scripted by tests.
#[derive(Debug, Default)]
pub struct FakeBackend {
    panes: Mutex<IndexMap<String, FakePane>>,
    next_pane: Mutex<u32>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a pane with a fixed id and name.
    pub fn add_pane(&self, pane_id: &str, name: &str) {
        let mut panes = self.panes.lock();
        panes.insert(pane_id.to_owned(), FakePane { name: name.to_owned(), ..FakePane::default() });
    }

    /// Replace the pane's screen contents.
    pub fn set_screen(&self, pane_id: &str, screen: &str) {
        if let Some(pane) = self.panes.lock().get_mut(pane_id) {
            pane.screen = screen.to_owned();
        }
    }

    /// Append a line to the pane's screen contents.
    pub fn append_line(&self, pane_id: &str, line: &str) {
        if let Some(pane) = self.panes.lock().get_mut(pane_id) {
            if !pane.screen.is_empty() {
                pane.screen.push('\n');
            }
            pane.screen.push_str(line);
        }
    }

    pub fn set_processing(&self, pane_id: &str, processing: bool) {
        if let Some(pane) = self.panes.lock().get_mut(pane_id) {
            pane.processing = processing;
        }
    }

    /// Snapshot a pane's scripted state for assertions.
    pub fn pane(&self, pane_id: &str) -> Option<FakePane> {
        self.panes.lock().get(pane_id).cloned()
    }

    /// Text writes recorded for a pane, without the press-enter flags.
    pub fn sent_text(&self, pane_id: &str) -> Vec<String> {
        self.panes
            .lock()
            .get(pane_id)
            .map(|p| p.sent_text.iter().map(|(text, _)| text.clone()).collect())
            .unwrap_or_default()
    }

    fn with_pane<T>(&self, pane_id: &str, f: impl FnOnce(&mut FakePane) -> T) -> Result<T> {
        let mut panes = self.panes.lock();
        match panes.get_mut(pane_id) {
            Some(pane) if !pane.closed => Ok(f(pane)),
            _ => Err(OrchestratorError::not_found("pane", pane_id)),
        }
    }
}

#[async_trait]
impl TerminalBackend for FakeBackend {
    async fn create_pane(
        &self,
        _parent: Option<&str>,
        _split: SplitDirection,
        _profile: Option<&str>,
    ) -> Result<PaneHandle> {
        let mut next = self.next_pane.lock();
        *next += 1;
        let pane_id = format!("fake-{}", *next);
        drop(next);

        let name = pane_id.clone();
        self.add_pane(&pane_id, &name);
        Ok(PaneHandle { pane_id, name })
    }

    async fn set_pane_name(&self, pane_id: &str, name: &str) -> Result<()> {
        self.with_pane(pane_id, |pane| pane.name = name.to_owned())
    }

    async fn send_text(&self, pane_id: &str, text: &str, press_enter: bool) -> Result<()> {
        self.with_pane(pane_id, |pane| {
            pane.sent_text.push((text.to_owned(), press_enter));
        })
    }

    async fn send_control(&self, pane_id: &str, letter: char) -> Result<()> {
        let code = control_code(letter)?;
        self.with_pane(pane_id, |pane| pane.sent_controls.push(code))
    }

    async fn send_special(&self, pane_id: &str, key: SpecialKey) -> Result<()> {
        self.with_pane(pane_id, |pane| pane.sent_specials.push(key))
    }

    async fn read_screen(&self, pane_id: &str, max_lines: Option<usize>) -> Result<String> {
        self.with_pane(pane_id, |pane| match max_lines {
            Some(max) => {
                let lines: Vec<&str> = pane.screen.lines().collect();
                let skip = lines.len().saturating_sub(max);
                lines[skip..].join("\n")
            }
            None => pane.screen.clone(),
        })
    }

    async fn is_processing(&self, pane_id: &str) -> Result<bool> {
        self.with_pane(pane_id, |pane| pane.processing)
    }

    async fn focus(&self, pane_id: &str) -> Result<()> {
        self.with_pane(pane_id, |pane| pane.focus_count += 1)
    }

    async fn suspend(&self, pane_id: &str, agent: Option<&str>) -> Result<()> {
        self.with_pane(pane_id, |pane| pane.suspend.suspend(agent))?
    }

    async fn resume(&self, pane_id: &str) -> Result<()> {
        self.with_pane(pane_id, |pane| pane.suspend.resume())?
    }

    async fn close(&self, pane_id: &str) -> Result<()> {
        self.with_pane(pane_id, |pane| pane.closed = true)
    }

    async fn enumerate_panes(&self) -> Result<Vec<PaneHandle>> {
        let panes = self.panes.lock();
        Ok(panes
            .iter()
            .filter(|(_, pane)| !pane.closed)
            .map(|(id, pane)| PaneHandle { pane_id: id.clone(), name: pane.name.clone() })
            .collect())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<PaneHandle>> {
        let panes = self.panes.lock();
        Ok(panes
            .iter()
            .find(|(_, pane)| !pane.closed && pane.name == name)
            .map(|(id, pane)| PaneHandle { pane_id: id.clone(), name: pane.name.clone() }))
    }
}
