// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane tags, advisory write locks, and the focus-change cooldown.
//!
//! All three facilities are in-process only: tags are derived at runtime by
//! external policy, locks are advisory (handlers consult them before
//! forwarding writes), and the cooldown is UI debounce, not durable state.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Default cooldown between cross-agent focus changes.
pub const DEFAULT_FOCUS_COOLDOWN: Duration = Duration::from_secs(5);

/// Tags and lock owner for a single pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneGuardInfo {
    pub tags: Vec<String>,
    pub locked_by: Option<String>,
}

/// In-memory manager for pane tags and exclusive write locks.
#[derive(Debug, Default)]
pub struct TagLockManager {
    tags: Mutex<HashMap<String, BTreeSet<String>>>,
    locks: Mutex<HashMap<String, String>>,
}

fn normalize(tags: &[String]) -> BTreeSet<String> {
    tags.iter().map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()).collect()
}

impl TagLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or append tags for a pane. Replacing with an empty set clears.
    pub fn set_tags(&self, pane_id: &str, tags: &[String], append: bool) -> Vec<String> {
        let normalized = normalize(tags);
        let mut all = self.tags.lock();

        if normalized.is_empty() && !append {
            all.remove(pane_id);
            return vec![];
        }

        if append {
            all.entry(pane_id.to_owned()).or_default().extend(normalized);
        } else {
            all.insert(pane_id.to_owned(), normalized);
        }

        all.get(pane_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Remove specific tags from a pane, returning the remainder.
    pub fn remove_tags(&self, pane_id: &str, tags: &[String]) -> Vec<String> {
        let to_remove = normalize(tags);
        let mut all = self.tags.lock();

        let Some(existing) = all.get_mut(pane_id) else {
            return vec![];
        };
        existing.retain(|t| !to_remove.contains(t));
        if existing.is_empty() {
            all.remove(pane_id);
            return vec![];
        }
        existing.iter().cloned().collect()
    }

    pub fn get_tags(&self, pane_id: &str) -> Vec<String> {
        self.tags
            .lock()
            .get(pane_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Lock a pane for an agent. Returns `(acquired, current_owner)`.
    /// Re-locking by the current owner is idempotent.
    pub fn lock(&self, pane_id: &str, agent: &str) -> (bool, Option<String>) {
        let mut locks = self.locks.lock();
        match locks.get(pane_id) {
            Some(owner) if owner != agent => (false, Some(owner.clone())),
            _ => {
                locks.insert(pane_id.to_owned(), agent.to_owned());
                (true, Some(agent.to_owned()))
            }
        }
    }

    /// Unlock a pane. Succeeds when the pane is unlocked, when the agent
    /// matches the owner, or when no agent is given (admin override).
    pub fn unlock(&self, pane_id: &str, agent: Option<&str>) -> bool {
        let mut locks = self.locks.lock();
        match locks.get(pane_id) {
            None => true,
            Some(owner) => {
                if agent.is_none() || agent == Some(owner.as_str()) {
                    locks.remove(pane_id);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_locked(&self, pane_id: &str) -> bool {
        self.locks.lock().contains_key(pane_id)
    }

    pub fn lock_owner(&self, pane_id: &str) -> Option<String> {
        self.locks.lock().get(pane_id).cloned()
    }

    /// Whether `requester` may write to the pane: allowed iff unlocked or
    /// the requester owns the lock.
    pub fn check_write(&self, pane_id: &str, requester: Option<&str>) -> (bool, Option<String>) {
        let locks = self.locks.lock();
        match locks.get(pane_id) {
            None => (true, None),
            Some(owner) => (requester == Some(owner.as_str()), Some(owner.clone())),
        }
    }

    /// Release every lock held by an agent (called on agent removal).
    pub fn release_by_agent(&self, agent: &str) {
        self.locks.lock().retain(|_, owner| owner != agent);
    }

    /// Tags and lock owner for a pane in one snapshot.
    pub fn describe(&self, pane_id: &str) -> PaneGuardInfo {
        PaneGuardInfo { tags: self.get_tags(pane_id), locked_by: self.lock_owner(pane_id) }
    }
}

/// Snapshot of the cooldown state for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownStatus {
    pub in_cooldown: bool,
    pub last_pane: Option<String>,
    pub last_agent: Option<String>,
    pub remaining_seconds: f64,
}

#[derive(Debug, Default)]
struct FocusState {
    last_focus: Option<Instant>,
    last_pane: Option<String>,
    last_agent: Option<String>,
}

/// Debounce preventing rapid cross-agent UI refocus thrash.
#[derive(Debug)]
pub struct FocusCooldown {
    cooldown: Mutex<Duration>,
    state: Mutex<FocusState>,
}

impl Default for FocusCooldown {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_COOLDOWN)
    }
}

impl FocusCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown: Mutex::new(cooldown), state: Mutex::new(FocusState::default()) }
    }

    pub fn cooldown(&self) -> Duration {
        *self.cooldown.lock()
    }

    pub fn set_cooldown(&self, cooldown: Duration) {
        *self.cooldown.lock() = cooldown;
    }

    /// Whether a focus request is allowed.
    ///
    /// Returns `(allowed, blocking_agent, remaining_seconds)`. Allowed when
    /// there is no prior focus, the cooldown has elapsed, the request
    /// refocuses the same pane, or it comes from the same agent.
    pub fn check(&self, pane_id: &str, agent: Option<&str>) -> (bool, Option<String>, f64) {
        let cooldown = self.cooldown();
        let state = self.state.lock();

        let Some(last_focus) = state.last_focus else {
            return (true, None, 0.0);
        };

        let elapsed = last_focus.elapsed();
        if elapsed >= cooldown {
            return (true, None, 0.0);
        }
        if state.last_pane.as_deref() == Some(pane_id) {
            return (true, None, 0.0);
        }
        if agent.is_some() && state.last_agent.as_deref() == agent {
            return (true, None, 0.0);
        }

        let remaining = (cooldown - elapsed).as_secs_f64();
        (false, state.last_agent.clone(), remaining)
    }

    /// Stamp a focus event, starting the cooldown window.
    pub fn record(&self, pane_id: &str, agent: Option<&str>) {
        let mut state = self.state.lock();
        state.last_focus = Some(Instant::now());
        state.last_pane = Some(pane_id.to_owned());
        state.last_agent = agent.map(str::to_owned);
    }

    /// Clear the cooldown state (tests and admin override).
    pub fn reset(&self) {
        *self.state.lock() = FocusState::default();
    }

    pub fn status(&self) -> CooldownStatus {
        let cooldown = self.cooldown();
        let state = self.state.lock();

        let remaining = match state.last_focus {
            None => 0.0,
            Some(last) => (cooldown.as_secs_f64() - last.elapsed().as_secs_f64()).max(0.0),
        };

        CooldownStatus {
            in_cooldown: remaining > 0.0,
            last_pane: state.last_pane.clone(),
            last_agent: state.last_agent.clone(),
            remaining_seconds: remaining,
        }
    }
}

#[cfg(test)]
#[path = "tags_tests.rs"]
mod tests;
