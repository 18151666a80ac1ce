// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background pane watcher: polls a pane's screen and broadcasts changed
//! content to subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::TerminalBackend;
use crate::error::OrchestratorError;

/// One changed-screen notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenUpdate {
    pub pane_id: String,
    pub content: String,
}

/// Handle to a running screen monitor task.
///
/// Callers own the handle and must call [`ScreenMonitor::stop`] to tear
/// the task down; dropping the handle without stopping leaves the task
/// running until the process exits.
pub struct ScreenMonitor {
    pane_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    update_tx: broadcast::Sender<ScreenUpdate>,
    last_update_ms: Arc<AtomicU64>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ScreenMonitor {
    /// Spawn a monitor polling the pane every `interval`.
    pub fn spawn(
        backend: Arc<dyn TerminalBackend>,
        pane_id: &str,
        interval: Duration,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let last_update_ms = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run_monitor(
            backend,
            pane_id.to_owned(),
            interval,
            update_tx.clone(),
            cancel.clone(),
            last_update_ms.clone(),
        ));

        Self { pane_id: pane_id.to_owned(), cancel, task: Some(task), update_tx, last_update_ms }
    }

    pub fn pane_id(&self) -> &str {
        &self.pane_id
    }

    /// Subscribe to changed-screen notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ScreenUpdate> {
        self.update_tx.subscribe()
    }

    /// Whether the monitor task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Milliseconds since the epoch of the last observed change, 0 if
    /// none yet.
    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms.load(Ordering::Relaxed)
    }

    /// Cancel the poll loop and wait for it to drain.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(pane = %self.pane_id, error = %e, "monitor task join failed");
            }
        }
    }
}

async fn run_monitor(
    backend: Arc<dyn TerminalBackend>,
    pane_id: String,
    interval: Duration,
    update_tx: broadcast::Sender<ScreenUpdate>,
    cancel: CancellationToken,
    last_update_ms: Arc<AtomicU64>,
) {
    let mut last_content: Option<String> = None;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                debug!(pane = %pane_id, "screen monitor stopping");
                return;
            }
        }

        match backend.read_screen(&pane_id, None).await {
            Ok(content) => {
                if last_content.as_deref() != Some(content.as_str()) {
                    last_update_ms.store(now_ms(), Ordering::Relaxed);
                    let _ = update_tx.send(ScreenUpdate {
                        pane_id: pane_id.clone(),
                        content: content.clone(),
                    });
                    last_content = Some(content);
                }
            }
            Err(OrchestratorError::NotFound { .. }) => {
                // Pane closed underneath us, normal during shutdown.
                debug!(pane = %pane_id, "pane gone, monitor exiting");
                return;
            }
            Err(e) => {
                warn!(pane = %pane_id, error = %e, "screen poll failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
